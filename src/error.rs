//! Error taxonomy (spec.md §7): every failure path in the core collapses
//! into one of these kinds, each with a fixed exit-code policy and a
//! user-visible rendering.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ShellError {
    #[error("{0}: syntax error: {1}")]
    Syntax(String, String),

    #[error("{0}: command not found")]
    CommandNotFound(String),

    #[error("{0}: {1}")]
    FileNotFound(String, String),

    #[error("{0}: permission denied")]
    PermissionDenied(String),

    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    Runtime(String),

    #[error("{0}")]
    Fatal(String),
}

impl ShellError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ShellError::Syntax(..) => ErrorKind::SyntaxError,
            ShellError::CommandNotFound(_) => ErrorKind::CommandNotFound,
            ShellError::FileNotFound(..) => ErrorKind::FileNotFound,
            ShellError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            ShellError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            ShellError::Runtime(_) => ErrorKind::RuntimeError,
            ShellError::Fatal(_) => ErrorKind::FatalError,
        }
    }

    /// The exit code this error implies per spec.md §7's table, when it is
    /// not already carrying one of its own (e.g. a file-not-found during an
    /// `exec` vs. during a plain lookup differ; callers that know the exact
    /// code should not rely on this default).
    pub fn default_exit_code(&self) -> i32 {
        match self.kind() {
            ErrorKind::SyntaxError => 2,
            ErrorKind::CommandNotFound => 127,
            ErrorKind::FileNotFound => 127,
            ErrorKind::PermissionDenied => 126,
            ErrorKind::InvalidArgument => 2,
            ErrorKind::RuntimeError => 1,
            ErrorKind::FatalError => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    SyntaxError,
    CommandNotFound,
    FileNotFound,
    PermissionDenied,
    InvalidArgument,
    RuntimeError,
    FatalError,
}

/// Print a `ShellError` the way cjsh's error_out collaborator does:
/// `cjsh: <context>: <message>` to stderr. Returns the exit code to use.
pub fn report(prefix: &str, err: &ShellError) -> i32 {
    eprintln!("{prefix}: {err}");
    err.default_exit_code()
}

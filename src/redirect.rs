//! Redirection planning (spec.md §4.R): turns the `ast::Redirection` list
//! attached to a command into a left-to-right sequence of fd operations,
//! applied verbatim in a forked child before `exec`.
//!
//! Grounded on the teacher's `redirect::extract_redirections`/
//! `RedirectTarget` shape, generalized from its hand-rolled token-prefix
//! matching to the typed `ast::RedirectionOp` the parser now produces.

use thiserror::Error;

use crate::ast::{DupTarget, HereDocBody, Redirection, RedirectionOp, Word};

#[derive(Debug, Error)]
pub enum RedirectError {
    #[error("{0}: ambiguous redirect")]
    Ambiguous(String),
    #[error("{0}")]
    Resolve(String),
    #[error("{0}: cannot overwrite existing file")]
    Noclobber(String),
    #[error("{0}")]
    Io(String),
}

/// Expands a redirection target `Word` to the single filename/fd-string it
/// must resolve to. Implemented by the executor via `expander::expand_words`.
pub trait WordResolver {
    fn resolve(&mut self, word: &Word) -> Result<String, RedirectError>;
}

/// Produces a readable fd for here-documents / here-strings, expanding
/// their body first unless the delimiter was quoted. Implemented by
/// `heredoc.rs`, which owns the pipe/FIFO plumbing.
pub trait HereDocSource {
    fn open_heredoc(&mut self, body: &HereDocBody) -> Result<i32, RedirectError>;
    fn open_herestring(&mut self, word: &Word) -> Result<i32, RedirectError>;
}

/// One planner gets both capabilities — a single `&mut dyn` value, so
/// `build_plan` never needs two simultaneous mutable borrows of the same
/// underlying shell state to plan one command's redirections.
pub trait RedirectSource: WordResolver + HereDocSource {}
impl<T: WordResolver + HereDocSource + ?Sized> RedirectSource for T {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    Read,
    Write,
    Append,
    ReadWrite,
}

#[derive(Debug, Clone)]
pub enum PlannedAction {
    OpenFile { path: String, mode: OpenMode },
    DupFd { target: i32 },
    CloseFd,
    /// An already-open readable fd (here-doc/here-string pipe) to be
    /// duped into place and then closed.
    FromReaderFd { reader_fd: i32 },
}

#[derive(Debug, Clone)]
pub struct PlannedRedirection {
    pub fd: i32,
    pub action: PlannedAction,
}

/// Build the ordered, immutable plan for one command's redirections. The
/// planner never mutates shared shell state — only `apply` (run inside the
/// forked child) touches real file descriptors.
pub fn build_plan(
    redirections: &[Redirection],
    ctx: &mut dyn RedirectSource,
) -> Result<Vec<PlannedRedirection>, RedirectError> {
    let mut plan = Vec::new();
    for redir in redirections {
        if matches!(redir.op, RedirectionOp::BothOut(_)) {
            plan.extend(expand_both_out(redir, ctx)?);
        } else {
            plan.push(plan_one(redir, ctx)?);
        }
    }
    Ok(plan)
}

fn plan_one(redir: &Redirection, ctx: &mut dyn RedirectSource) -> Result<PlannedRedirection, RedirectError> {
    match &redir.op {
        RedirectionOp::In(word) => Ok(PlannedRedirection {
            fd: redir.fd.unwrap_or(0) as i32,
            action: PlannedAction::OpenFile { path: ctx.resolve(word)?, mode: OpenMode::Read },
        }),
        RedirectionOp::Out(word) => Ok(PlannedRedirection {
            fd: redir.fd.unwrap_or(1) as i32,
            action: PlannedAction::OpenFile { path: ctx.resolve(word)?, mode: OpenMode::Write },
        }),
        RedirectionOp::Append(word) => Ok(PlannedRedirection {
            fd: redir.fd.unwrap_or(1) as i32,
            action: PlannedAction::OpenFile { path: ctx.resolve(word)?, mode: OpenMode::Append },
        }),
        RedirectionOp::ReadWrite(word) => Ok(PlannedRedirection {
            fd: redir.fd.unwrap_or(0) as i32,
            action: PlannedAction::OpenFile { path: ctx.resolve(word)?, mode: OpenMode::ReadWrite },
        }),
        RedirectionOp::DupOut(target) | RedirectionOp::DupIn(target) => {
            let fd = redir.fd.unwrap_or(match &redir.op {
                RedirectionOp::DupIn(_) => 0,
                _ => 1,
            }) as i32;
            Ok(match target {
                DupTarget::Fd(n) => PlannedRedirection { fd, action: PlannedAction::DupFd { target: *n as i32 } },
                DupTarget::Close => PlannedRedirection { fd, action: PlannedAction::CloseFd },
            })
        }
        RedirectionOp::Close => Ok(PlannedRedirection {
            fd: redir.fd.unwrap_or(1) as i32,
            action: PlannedAction::CloseFd,
        }),
        // `&>word` / `>&word`: stdout to the file, then stderr duped onto
        // stdout. Expressed as two planned steps collapsed into one by
        // having the caller push both — see `expand_both_out`.
        RedirectionOp::BothOut(_) => unreachable!("BothOut expands to two steps via expand_both_out"),
        RedirectionOp::HereDoc { body } => {
            let reader_fd = ctx.open_heredoc(body)?;
            Ok(PlannedRedirection {
                fd: redir.fd.unwrap_or(0) as i32,
                action: PlannedAction::FromReaderFd { reader_fd },
            })
        }
        RedirectionOp::HereString(word) => {
            let reader_fd = ctx.open_herestring(word)?;
            Ok(PlannedRedirection {
                fd: redir.fd.unwrap_or(0) as i32,
                action: PlannedAction::FromReaderFd { reader_fd },
            })
        }
    }
}

/// `&>word`/`>&word` need two fd operations (stdout to the file, then
/// stderr onto stdout); `build_plan` special-cases it here so the main
/// per-redirection match can stay one-action-per-step.
pub fn expand_both_out(redir: &Redirection, ctx: &mut dyn RedirectSource) -> Result<[PlannedRedirection; 2], RedirectError> {
    let RedirectionOp::BothOut(word) = &redir.op else {
        unreachable!("expand_both_out called on non-BothOut redirection");
    };
    let path = ctx.resolve(word)?;
    Ok([
        PlannedRedirection { fd: 1, action: PlannedAction::OpenFile { path, mode: OpenMode::Write } },
        PlannedRedirection { fd: 2, action: PlannedAction::DupFd { target: 1 } },
    ])
}

/// Applies a plan's operations in order against the current process's file
/// descriptor table. Must run after `fork`, before `exec`, in the child —
/// never in the shell's own process.
#[cfg(unix)]
pub fn apply_plan(plan: &[PlannedRedirection], noclobber: bool) -> Result<(), RedirectError> {
    use std::os::unix::io::RawFd;

    for step in plan {
        match &step.action {
            PlannedAction::OpenFile { path, mode } => {
                let fd = open_for(path, *mode, noclobber)?;
                dup2_checked(fd, step.fd as RawFd)?;
                if fd != step.fd as RawFd {
                    unsafe { libc::close(fd) };
                }
            }
            PlannedAction::DupFd { target } => {
                dup2_checked(*target as RawFd, step.fd as RawFd)?;
            }
            PlannedAction::CloseFd => {
                unsafe { libc::close(step.fd as RawFd) };
            }
            PlannedAction::FromReaderFd { reader_fd } => {
                dup2_checked(*reader_fd as RawFd, step.fd as RawFd)?;
                if *reader_fd != step.fd {
                    unsafe { libc::close(*reader_fd as RawFd) };
                }
            }
        }
    }
    Ok(())
}

#[cfg(unix)]
fn dup2_checked(src: std::os::unix::io::RawFd, dst: std::os::unix::io::RawFd) -> Result<(), RedirectError> {
    if src == dst {
        return Ok(());
    }
    let rc = unsafe { libc::dup2(src, dst) };
    if rc < 0 {
        return Err(RedirectError::Io(std::io::Error::last_os_error().to_string()));
    }
    Ok(())
}

#[cfg(unix)]
fn open_for(path: &str, mode: OpenMode, noclobber: bool) -> Result<std::os::unix::io::RawFd, RedirectError> {
    use std::ffi::CString;

    let c_path = CString::new(path).map_err(|_| RedirectError::Resolve(format!("{path}: invalid path")))?;
    let flags = match mode {
        OpenMode::Read => libc::O_RDONLY,
        OpenMode::Write if noclobber => libc::O_WRONLY | libc::O_CREAT | libc::O_EXCL,
        OpenMode::Write => libc::O_WRONLY | libc::O_CREAT | libc::O_TRUNC,
        OpenMode::Append => libc::O_WRONLY | libc::O_CREAT | libc::O_APPEND,
        OpenMode::ReadWrite => libc::O_RDWR | libc::O_CREAT,
    };
    let fd = unsafe { libc::open(c_path.as_ptr(), flags, 0o644) };
    if fd < 0 {
        let err = std::io::Error::last_os_error();
        if noclobber && matches!(mode, OpenMode::Write) && err.kind() == std::io::ErrorKind::AlreadyExists {
            return Err(RedirectError::Noclobber(path.to_string()));
        }
        return Err(RedirectError::Io(format!("{path}: {err}")));
    }
    Ok(fd)
}

/// Check if a path refers to a null device (cross-platform).
pub fn is_null_device(path: &str) -> bool {
    if cfg!(windows) {
        path.eq_ignore_ascii_case("NUL") || path.eq_ignore_ascii_case("/dev/null")
    } else {
        path == "/dev/null"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{RedirectionOp, Word};

    struct StubSource;
    impl WordResolver for StubSource {
        fn resolve(&mut self, word: &Word) -> Result<String, RedirectError> {
            Ok(word.as_plain_str().unwrap_or_default().to_string())
        }
    }
    impl HereDocSource for StubSource {
        fn open_heredoc(&mut self, _body: &HereDocBody) -> Result<i32, RedirectError> {
            Err(RedirectError::Resolve("no heredocs in this test".into()))
        }
        fn open_herestring(&mut self, _word: &Word) -> Result<i32, RedirectError> {
            Err(RedirectError::Resolve("no here-strings in this test".into()))
        }
    }

    #[test]
    fn plans_simple_output_redirect() {
        let redirs = vec![Redirection { fd: None, op: RedirectionOp::Out(Word::literal("out.txt")) }];
        let plan = build_plan(&redirs, &mut StubSource).unwrap();
        assert_eq!(plan.len(), 1);
        assert_eq!(plan[0].fd, 1);
        assert!(matches!(&plan[0].action, PlannedAction::OpenFile { path, mode: OpenMode::Write } if path == "out.txt"));
    }

    #[test]
    fn plans_stderr_append() {
        let redirs = vec![Redirection { fd: Some(2), op: RedirectionOp::Append(Word::literal("err.txt")) }];
        let plan = build_plan(&redirs, &mut StubSource).unwrap();
        assert_eq!(plan[0].fd, 2);
        assert!(matches!(&plan[0].action, PlannedAction::OpenFile { mode: OpenMode::Append, .. }));
    }

    #[test]
    fn plans_fd_duplication() {
        let redirs = vec![Redirection { fd: Some(2), op: RedirectionOp::DupOut(DupTarget::Fd(1)) }];
        let plan = build_plan(&redirs, &mut StubSource).unwrap();
        assert_eq!(plan[0].fd, 2);
        assert!(matches!(plan[0].action, PlannedAction::DupFd { target: 1 }));
    }

    #[test]
    fn plans_fd_close() {
        let redirs = vec![Redirection { fd: Some(3), op: RedirectionOp::DupIn(DupTarget::Close) }];
        let plan = build_plan(&redirs, &mut StubSource).unwrap();
        assert_eq!(plan[0].fd, 3);
        assert!(matches!(plan[0].action, PlannedAction::CloseFd));
    }

    #[test]
    fn both_out_expands_to_two_steps() {
        let redir = Redirection { fd: None, op: RedirectionOp::BothOut(Word::literal("all.log")) };
        let steps = expand_both_out(&redir, &mut StubSource).unwrap();
        assert_eq!(steps[0].fd, 1);
        assert_eq!(steps[1].fd, 2);
        assert!(matches!(steps[1].action, PlannedAction::DupFd { target: 1 }));
    }

    #[test]
    fn null_device_detection() {
        assert!(is_null_device("/dev/null"));
    }
}

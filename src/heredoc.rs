//! Here-document / here-string / process-substitution resource manager
//! (spec.md §4.H): produces readable file descriptors for `redirect.rs`
//! and named FIFOs for `expander.rs`'s process-substitution words, with
//! guaranteed cleanup once the command finishes.
//!
//! Grounded on the teacher's `executor::InputHandle::HereString` (content
//! piped in via a spawned `Stdio::piped()` writer) generalized to here-docs
//! and to named FIFOs for `<(...)`/`>(...)`, which need a filesystem path
//! rather than an inherited fd.

use std::io::Write;
use std::os::unix::io::{IntoRawFd, RawFd};

use os_pipe::pipe;
use thiserror::Error;

use crate::ast::{HereDocBody, ProcessSubDirection, Word};
use crate::env::ShellEnv;
use crate::expander::{self, CommandSubstituter};
use crate::redirect::{HereDocSource, RedirectError, WordResolver};

#[derive(Debug, Error)]
pub enum HereDocError {
    #[error("{0}")]
    Expand(String),
    #[error("{0}")]
    Io(String),
}

impl From<HereDocError> for RedirectError {
    fn from(e: HereDocError) -> Self {
        RedirectError::Resolve(e.to_string())
    }
}

/// Owns the resources created while planning/running one command so they
/// can be closed once the process is gone: pipe write-ends for here-docs,
/// and FIFO paths for process substitution (unlinked on drop).
pub struct HereDocManager<'a> {
    env: &'a mut ShellEnv,
    subst: &'a mut dyn CommandSubstituter,
    fifo_paths: Vec<std::path::PathBuf>,
}

impl<'a> HereDocManager<'a> {
    pub fn new(env: &'a mut ShellEnv, subst: &'a mut dyn CommandSubstituter) -> Self {
        HereDocManager { env, subst, fifo_paths: Vec::new() }
    }

    fn write_pipe(&mut self, content: &str) -> Result<RawFd, HereDocError> {
        let (reader, mut writer) = pipe().map_err(|e| HereDocError::Io(e.to_string()))?;
        // Small here-doc bodies fit in the pipe buffer; write from a thread
        // so a body larger than the buffer doesn't deadlock before anyone
        // reads it.
        let owned = content.to_string();
        std::thread::spawn(move || {
            let _ = writer.write_all(owned.as_bytes());
        });
        Ok(reader.into_raw_fd())
    }

    /// Allocates a named FIFO under `TMPDIR` for `<(...)`/`>(...)`, runs the
    /// substitution script against it in the background, and returns the
    /// path the main command's word should be replaced with.
    pub fn resolve_process_substitution(
        &mut self,
        script: &str,
        direction: ProcessSubDirection,
    ) -> Result<String, HereDocError> {
        let path = spawn_process_substitution(script, direction)?;
        let path_str = path.to_string_lossy().into_owned();
        self.fifo_paths.push(path);
        Ok(path_str)
    }
}

/// Allocates a FIFO under `TMPDIR`, spawns a background shell running
/// `script` with its read/write end wired to it, and returns the FIFO's
/// path. The background thread unlinks the FIFO itself once the
/// substitution script exits, so cleanup doesn't depend on which process
/// (this one, or a forked pipeline child) created it (spec.md §8
/// invariant 8: no FIFO outlives the pipeline it was created for).
pub fn spawn_process_substitution(
    script: &str,
    direction: ProcessSubDirection,
) -> Result<std::path::PathBuf, HereDocError> {
    let path = allocate_fifo_path();
    make_fifo(&path).map_err(HereDocError::Io)?;

    let path_str = path.to_string_lossy().into_owned();
    let script = script.to_string();
    let cleanup_path = path.clone();
    std::thread::spawn(move || {
        let redirect = match direction {
            ProcessSubDirection::Read => format!("{script} > {path_str}"),
            ProcessSubDirection::Write => format!("{script} < {path_str}"),
        };
        let _ = std::process::Command::new("/bin/sh").arg("-c").arg(redirect).status();
        let _ = std::fs::remove_file(&cleanup_path);
    });

    Ok(path)
}

fn allocate_fifo_path() -> std::path::PathBuf {
    static COUNTER: std::sync::atomic::AtomicU64 = std::sync::atomic::AtomicU64::new(0);
    let n = COUNTER.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or(0);
    std::env::temp_dir().join(format!("cjsh-procsub-{}-{}-{}", std::process::id(), now, n))
}

/// Also resolves plain redirection targets, so one `HereDocManager` can
/// serve as the single `redirect::RedirectSource` a command's whole
/// redirection list is planned against.
impl<'a> WordResolver for HereDocManager<'a> {
    fn resolve(&mut self, word: &Word) -> Result<String, RedirectError> {
        let fields = expander::expand_words(std::slice::from_ref(word), self.env, self.subst)
            .map_err(|e| RedirectError::Resolve(e.to_string()))?;
        Ok(fields.join(""))
    }
}

impl<'a> HereDocSource for HereDocManager<'a> {
    fn open_heredoc(&mut self, body: &HereDocBody) -> Result<i32, RedirectError> {
        let content = if body.quoted {
            body.raw_text.clone()
        } else {
            expander::expand_heredoc_text(&body.raw_text, self.env, self.subst)
                .map_err(|e| RedirectError::Resolve(e.to_string()))?
        };
        self.write_pipe(&content).map_err(Into::into)
    }

    fn open_herestring(&mut self, word: &Word) -> Result<i32, RedirectError> {
        let fields = expander::expand_words(std::slice::from_ref(word), self.env, self.subst)
            .map_err(|e| RedirectError::Resolve(e.to_string()))?;
        let mut content = fields.join(" ");
        content.push('\n');
        self.write_pipe(&content).map_err(Into::into)
    }
}

impl<'a> Drop for HereDocManager<'a> {
    fn drop(&mut self) {
        for path in self.fifo_paths.drain(..) {
            let _ = std::fs::remove_file(path);
        }
    }
}

fn make_fifo(path: &std::path::Path) -> Result<(), String> {
    use std::ffi::CString;
    let c_path = CString::new(path.to_string_lossy().as_bytes()).map_err(|e| e.to_string())?;
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), 0o600) };
    if rc != 0 {
        return Err(std::io::Error::last_os_error().to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expander::NoSubstitution;
    use std::io::Read;

    #[test]
    fn heredoc_pipe_round_trips_content() {
        let mut env = ShellEnv::new("cjsh".into(), vec![]);
        let mut subst = NoSubstitution;
        let mut mgr = HereDocManager::new(&mut env, &mut subst);
        let body = HereDocBody {
            delimiter: "EOF".into(),
            strip_tabs: false,
            quoted: true,
            raw_text: "hello\nworld\n".into(),
        };
        let fd = mgr.open_heredoc(&body).unwrap();
        let mut file = unsafe { <std::fs::File as std::os::unix::io::FromRawFd>::from_raw_fd(fd) };
        let mut out = String::new();
        file.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hello\nworld\n");
    }

    #[test]
    fn herestring_appends_trailing_newline() {
        let mut env = ShellEnv::new("cjsh".into(), vec![]);
        let mut subst = NoSubstitution;
        let mut mgr = HereDocManager::new(&mut env, &mut subst);
        let fd = mgr.open_herestring(&Word::literal("hi")).unwrap();
        let mut file = unsafe { <std::fs::File as std::os::unix::io::FromRawFd>::from_raw_fd(fd) };
        let mut out = String::new();
        file.read_to_string(&mut out).unwrap();
        assert_eq!(out, "hi\n");
    }
}

//! The single `Shell` owner (spec.md §9: "no implicit singletons"):
//! composes `ShellEnv` with the job table, trap/hook tables, and the
//! top-level `source → parse → interpret` pipeline every entry point
//! (REPL, `-c`, script file) drives through `run_source`.
//!
//! `Engine` — everything besides `ShellEnv` — is kept as a sibling field
//! rather than folded into one flat struct, so the `CommandSubstituter`
//! seam (`fn run_capture(&mut self, script, env: &mut ShellEnv)`) and the
//! builtin `ExecContext` seam can each borrow exactly the half of `Shell`
//! they need without fighting the borrow checker over one `&mut Shell`.

use std::io::{IntoRawFd, Read};

use os_pipe::pipe;

use crate::builtins::HookTable;
use crate::env::ShellEnv;
use crate::executor;
use crate::expander::{CommandSubstituter, ExpandError};
use crate::interpreter;
use crate::jobs::JobTable;
use crate::parser;
use crate::signals::TrapTable;

/// Job-table, trap, and hook state — the half of the shell that isn't
/// `ShellEnv`. Implements `CommandSubstituter` directly since it never
/// holds its own `ShellEnv`; callers always pass the live one in.
pub struct Engine {
    pub jobs: JobTable,
    pub traps: TrapTable,
    pub hooks: HookTable,
    #[cfg(unix)]
    pub shell_pgid: libc::pid_t,
    pub interactive: bool,
}

impl Engine {
    pub fn new(interactive: bool) -> Self {
        Engine {
            jobs: JobTable::new(),
            traps: TrapTable::new(),
            hooks: HookTable::new(),
            #[cfg(unix)]
            shell_pgid: unsafe { libc::getpgrp() },
            interactive,
        }
    }
}

impl CommandSubstituter for Engine {
    /// Forks a child that runs `script` with stdout wired to a pipe, reads
    /// the captured text in the parent, and trims trailing newlines the
    /// way `$(...)`/backtick substitution is defined to.
    fn run_capture(&mut self, script: &str, env: &mut ShellEnv) -> Result<String, ExpandError> {
        let list = parser::parse(script).map_err(|e| ExpandError::Substitution(e.to_string()))?;

        #[cfg(unix)]
        {
            let (mut reader, writer) = pipe().map_err(|e| ExpandError::Substitution(e.to_string()))?;
            let pid = unsafe { libc::fork() };
            if pid < 0 {
                return Err(ExpandError::Substitution(std::io::Error::last_os_error().to_string()));
            }
            if pid == 0 {
                drop(reader);
                let fd = writer.into_raw_fd();
                unsafe { libc::dup2(fd, libc::STDOUT_FILENO) };
                if fd != libc::STDOUT_FILENO {
                    unsafe { libc::close(fd) };
                }
                let status = interpreter::run_logical_list(&list, env, self);
                std::process::exit(status & 0xff);
            }
            drop(writer);
            let mut out = String::new();
            let _ = reader.read_to_string(&mut out);
            let _ = crate::job_control::wait_for_pid(pid);
            while out.ends_with('\n') {
                out.pop();
            }
            Ok(out)
        }
        #[cfg(not(unix))]
        {
            let _ = (env, list);
            Err(ExpandError::Substitution("command substitution requires unix".into()))
        }
    }

    #[cfg(unix)]
    fn resolve_process_substitution(
        &mut self,
        script: &str,
        direction: crate::ast::ProcessSubDirection,
    ) -> Result<String, ExpandError> {
        let path = crate::heredoc::spawn_process_substitution(script, direction)
            .map_err(|e| ExpandError::Substitution(e.to_string()))?;
        Ok(path.to_string_lossy().into_owned())
    }

    #[cfg(not(unix))]
    fn resolve_process_substitution(
        &mut self,
        script: &str,
        _direction: crate::ast::ProcessSubDirection,
    ) -> Result<String, ExpandError> {
        Err(ExpandError::Substitution(format!("process substitution requires unix: {script}")))
    }
}

/// The shell's whole state: variables/options plus job control. Every
/// entry point (`main.rs`'s REPL, `-c`, a script file) drives its input
/// through `run_source`.
pub struct Shell {
    pub env: ShellEnv,
    pub engine: Engine,
}

impl Shell {
    pub fn new(argv0: String, positional: Vec<String>, interactive: bool) -> Self {
        Shell {
            env: ShellEnv::new(argv0, positional),
            engine: Engine::new(interactive),
        }
    }

    /// Parses and runs one chunk of shell source (a REPL line, a `-c`
    /// string, or a whole script file), returning its exit status.
    pub fn run_source(&mut self, text: &str) -> i32 {
        match parser::parse(text) {
            Ok(list) => interpreter::run_logical_list(&list, &mut self.env, &mut self.engine),
            Err(e) => {
                eprintln!("cjsh: {e}");
                2
            }
        }
    }

    /// Reaps finished background jobs, prints their notifications in
    /// ascending job-id order (spec.md §9's resolved Open Question on
    /// notification ordering), and removes them from the table once
    /// notified — a Done/Terminated job must not linger (spec.md §8
    /// invariant 5, scenario D's "`jobs` reports nothing after cleanup").
    /// Called by the REPL between prompts.
    #[cfg(unix)]
    pub fn reap_background_jobs(&mut self) {
        let mut to_remove = Vec::new();
        for id in self.engine.jobs.update_statuses() {
            if let Some(job) = self.engine.jobs.get_mut(id) {
                let label = match job.state {
                    crate::jobs::JobState::Done => "Done",
                    crate::jobs::JobState::Terminated => "Terminated",
                    _ => continue,
                };
                if !job.notified {
                    println!("[{id}]+ {label}    {}", job.command);
                    job.notified = true;
                }
                to_remove.push(id);
            }
        }
        for id in to_remove {
            self.engine.jobs.remove(id);
        }
    }

    pub fn run_exit_trap(&mut self) {
        if let Some(action) = self.engine.traps.get("EXIT").map(str::to_string) {
            self.run_source(&action);
        }
    }
}

pub use executor::run_pipeline;

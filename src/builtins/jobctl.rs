//! `jobs`/`fg`/`bg`/`wait`/`kill` (spec.md §4.J/§4.B): the user-facing
//! half of job control, built directly on `jobs::JobTable` and delegating
//! the actual terminal/process-group work to `ExecContext`.
//!
//! Grounded on the teacher's `executor.rs` job-notification printing
//! (`[{id}] {pid}` / `[{id}]  Stopped  {cmd}`), lifted out into its own
//! builtin family now that the job table supports multi-stage pipelines.

use std::io::Write;

use super::ExecContext;
use crate::jobs::JobState;

/// Parses `%N`, bare `N`, `%+`/`%%` (current), `%-` (previous), or no
/// argument (current job) into a job id.
fn resolve_job_id(arg: Option<&String>, ctx: &mut dyn ExecContext) -> Result<u32, String> {
    match arg.map(String::as_str) {
        None | Some("%+") | Some("%%") => ctx.jobs().current_job().ok_or_else(|| "no current job".to_string()),
        Some("%-") => ctx.jobs().previous_job().ok_or_else(|| "no previous job".to_string()),
        Some(spec) => {
            let digits = spec.strip_prefix('%').unwrap_or(spec);
            digits.parse::<u32>().map_err(|_| format!("{spec}: no such job"))
        }
    }
}

pub fn jobs(args: &[String], ctx: &mut dyn ExecContext, stdout: &mut dyn Write) -> i32 {
    let show_pids_only = args.iter().any(|a| a == "-p");
    let table = ctx.jobs();
    for job in table.jobs_ascending() {
        if show_pids_only {
            let _ = writeln!(stdout, "{}", job.pgid);
            continue;
        }
        let marker = table.marker_for(job.id);
        let state = match job.state {
            JobState::Running => "Running",
            JobState::Stopped => "Stopped",
            JobState::Done => "Done",
            JobState::Terminated => "Terminated",
        };
        let _ = writeln!(stdout, "[{}]{marker} {state}    {}", job.id, job.command);
    }
    0
}

pub fn fg(args: &[String], ctx: &mut dyn ExecContext, stderr: &mut dyn Write) -> i32 {
    let id = match resolve_job_id(args.first(), ctx) {
        Ok(id) => id,
        Err(e) => {
            let _ = writeln!(stderr, "fg: {e}");
            return 1;
        }
    };
    if ctx.jobs().get(id).is_none() {
        let _ = writeln!(stderr, "fg: {id}: no such job");
        return 1;
    }
    ctx.wait_foreground(id)
}

pub fn bg(args: &[String], ctx: &mut dyn ExecContext, stderr: &mut dyn Write) -> i32 {
    let id = match resolve_job_id(args.first(), ctx) {
        Ok(id) => id,
        Err(e) => {
            let _ = writeln!(stderr, "bg: {e}");
            return 1;
        }
    };
    match ctx.resume_background(id) {
        Ok(()) => 0,
        Err(e) => {
            let _ = writeln!(stderr, "bg: {e}");
            1
        }
    }
}

pub fn wait(args: &[String], ctx: &mut dyn ExecContext, stderr: &mut dyn Write) -> i32 {
    if args.is_empty() {
        let ids: Vec<u32> = ctx.jobs().jobs_ascending().iter().map(|j| j.id).collect();
        let mut last = 0;
        for id in ids {
            last = ctx.wait_foreground(id);
        }
        return last;
    }
    let mut last = 0;
    for arg in args {
        match resolve_job_id(Some(arg), ctx) {
            Ok(id) => last = ctx.wait_foreground(id),
            Err(e) => {
                let _ = writeln!(stderr, "wait: {e}");
                return 127;
            }
        }
    }
    last
}

/// `kill [-SIGNAME|-N] %job|pid...`: resolves a job spec to its process
/// group and a bare number to a pid, matching the two targets a real
/// shell's `kill` accepts.
pub fn kill(args: &[String], ctx: &mut dyn ExecContext, stderr: &mut dyn Write) -> i32 {
    let mut rest = args;
    let mut signal = libc_sigterm();
    if let Some(first) = rest.first() {
        if let Some(sig_name) = first.strip_prefix('-') {
            if let Some(parsed) = parse_signal(sig_name) {
                signal = parsed;
                rest = &rest[1..];
            }
        }
    }
    if rest.is_empty() {
        let _ = writeln!(stderr, "kill: usage: kill [-signal] pid|%job ...");
        return 2;
    }
    let mut status = 0;
    for target in rest {
        let result = if let Some(job_spec) = target.strip_prefix('%') {
            match job_spec.parse::<u32>().ok().and_then(|id| ctx.jobs().get(id)) {
                Some(job) => send_to_pgid(job.pgid, signal),
                None => Err(format!("{target}: no such job")),
            }
        } else {
            match target.parse::<i32>() {
                Ok(pid) => send_to_pid(pid, signal),
                Err(_) => Err(format!("{target}: arguments must be process or job IDs")),
            }
        };
        if let Err(e) = result {
            let _ = writeln!(stderr, "kill: {e}");
            status = 1;
        }
    }
    status
}

#[cfg(unix)]
fn libc_sigterm() -> i32 {
    libc::SIGTERM
}
#[cfg(not(unix))]
fn libc_sigterm() -> i32 {
    15
}

#[cfg(unix)]
fn parse_signal(name: &str) -> Option<i32> {
    if let Ok(n) = name.parse::<i32>() {
        return Some(n);
    }
    let upper = name.to_ascii_uppercase();
    let normalized = upper.strip_prefix("SIG").unwrap_or(&upper);
    Some(match normalized {
        "HUP" => libc::SIGHUP,
        "INT" => libc::SIGINT,
        "QUIT" => libc::SIGQUIT,
        "KILL" => libc::SIGKILL,
        "TERM" => libc::SIGTERM,
        "CONT" => libc::SIGCONT,
        "STOP" => libc::SIGSTOP,
        "TSTP" => libc::SIGTSTP,
        "USR1" => libc::SIGUSR1,
        "USR2" => libc::SIGUSR2,
        _ => return None,
    })
}
#[cfg(not(unix))]
fn parse_signal(_: &str) -> Option<i32> {
    None
}

#[cfg(unix)]
fn send_to_pgid(pgid: i32, signal: i32) -> Result<(), String> {
    crate::job_control::send_signal_to_group(pgid, signal).map_err(|e| e.to_string())
}
#[cfg(not(unix))]
fn send_to_pgid(_: i32, _: i32) -> Result<(), String> {
    Err("job control is unix-only".to_string())
}

#[cfg(unix)]
fn send_to_pid(pid: i32, signal: i32) -> Result<(), String> {
    if unsafe { libc::kill(pid, signal) } == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error().to_string())
    }
}
#[cfg(not(unix))]
fn send_to_pid(_: i32, _: i32) -> Result<(), String> {
    Err("job control is unix-only".to_string())
}

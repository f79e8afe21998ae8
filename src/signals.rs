//! Signal routing (spec.md §4.S): async-signal-safe handlers that only set
//! atomic flags, drained at well-defined synchronous points in the command
//! loop. `SIGPIPE`/`SIGTTIN`/`SIGTTOU` are ignored outright so the shell
//! survives writing to a closed pipe and backgrounding itself doesn't stop
//! it.
//!
//! Grounded on the teacher's `main.rs` `ctrlc::set_handler` for the overall
//! shape (handler does minimal work, main loop reacts), generalized to the
//! full signal set via raw `libc::signal` the way `job_control.rs` already
//! touches `libc` directly, plus a `trap` disposition table modeled on the
//! teacher's `HashMap`-based alias/function stores.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::env::ShellEnv;
use crate::shell::Engine;

static SIGINT_FLAG: AtomicBool = AtomicBool::new(false);
static SIGCHLD_FLAG: AtomicBool = AtomicBool::new(false);
static SIGHUP_FLAG: AtomicBool = AtomicBool::new(false);
static SIGTERM_FLAG: AtomicBool = AtomicBool::new(false);
static SIGTSTP_FLAG: AtomicBool = AtomicBool::new(false);
static SIGWINCH_FLAG: AtomicBool = AtomicBool::new(false);

extern "C" fn on_sigint(_: libc::c_int) {
    SIGINT_FLAG.store(true, Ordering::SeqCst);
}
extern "C" fn on_sigchld(_: libc::c_int) {
    SIGCHLD_FLAG.store(true, Ordering::SeqCst);
}
extern "C" fn on_sighup(_: libc::c_int) {
    SIGHUP_FLAG.store(true, Ordering::SeqCst);
}
extern "C" fn on_sigterm(_: libc::c_int) {
    SIGTERM_FLAG.store(true, Ordering::SeqCst);
}
extern "C" fn on_sigtstp(_: libc::c_int) {
    SIGTSTP_FLAG.store(true, Ordering::SeqCst);
}
extern "C" fn on_sigwinch(_: libc::c_int) {
    SIGWINCH_FLAG.store(true, Ordering::SeqCst);
}

/// Installs handlers for the signals the shell reacts to, and ignores the
/// three it must never act on directly (spec.md §4.S).
#[cfg(unix)]
pub fn install() -> std::io::Result<()> {
    let installs: &[(libc::c_int, extern "C" fn(libc::c_int))] = &[
        (libc::SIGINT, on_sigint),
        (libc::SIGCHLD, on_sigchld),
        (libc::SIGHUP, on_sighup),
        (libc::SIGTERM, on_sigterm),
        (libc::SIGTSTP, on_sigtstp),
        (libc::SIGWINCH, on_sigwinch),
    ];
    for &(sig, handler) in installs {
        if unsafe { libc::signal(sig, handler as libc::sighandler_t) } == libc::SIG_ERR {
            return Err(std::io::Error::last_os_error());
        }
    }
    for &sig in &[libc::SIGPIPE, libc::SIGTTIN, libc::SIGTTOU] {
        if unsafe { libc::signal(sig, libc::SIG_IGN) } == libc::SIG_ERR {
            return Err(std::io::Error::last_os_error());
        }
    }
    Ok(())
}

macro_rules! drain_flag {
    ($name:ident, $flag:expr) => {
        pub fn $name() -> bool {
            $flag.swap(false, Ordering::SeqCst)
        }
    };
}

drain_flag!(take_sigint, SIGINT_FLAG);
drain_flag!(take_sigchld, SIGCHLD_FLAG);
drain_flag!(take_sighup, SIGHUP_FLAG);
drain_flag!(take_sigterm, SIGTERM_FLAG);
drain_flag!(take_sigtstp, SIGTSTP_FLAG);
drain_flag!(take_sigwinch, SIGWINCH_FLAG);

/// Drains every pending signal flag and dispatches the trap installed for
/// it, or the built-in default action when none is (spec.md §4.S/§5).
/// Called before each prompt, between statements in the script
/// interpreter, and after each `waitpid` return. Returns `Some(exit_code)`
/// when the shell itself must now terminate.
#[cfg(unix)]
pub fn drain_pending(env: &mut ShellEnv, engine: &mut Engine) -> Option<i32> {
    let _ = take_sigchld(); // wakes a blocked read; reaping itself goes through JobTable::update_statuses

    if take_sigint() {
        if let Some(action) = engine.traps.get("INT").map(str::to_string) {
            run_trap_action(&action, env, engine);
        }
    }

    if take_sigtstp() {
        if let Some(action) = engine.traps.get("TSTP").map(str::to_string) {
            run_trap_action(&action, env, engine);
        }
    }

    if take_sigwinch() {
        if let Some(action) = engine.traps.get("WINCH").map(str::to_string) {
            run_trap_action(&action, env, engine);
        }
    }

    if take_sigterm() {
        match engine.traps.get("TERM").map(str::to_string) {
            Some(action) => run_trap_action(&action, env, engine),
            None => return Some(128 + libc::SIGTERM),
        }
    }

    if take_sighup() {
        match engine.traps.get("HUP").map(str::to_string) {
            Some(action) => run_trap_action(&action, env, engine),
            None => {
                kill_all_jobs(engine);
                return Some(129);
            }
        }
    }

    None
}

#[cfg(not(unix))]
pub fn drain_pending(_env: &mut ShellEnv, _engine: &mut Engine) -> Option<i32> {
    None
}

#[cfg(unix)]
fn run_trap_action(action: &str, env: &mut ShellEnv, engine: &mut Engine) {
    match crate::parser::parse(action) {
        Ok(list) => {
            crate::interpreter::run_logical_list(&list, env, engine);
        }
        Err(e) => eprintln!("cjsh: trap: {e}"),
    }
}

/// `SIGHUP` with no trap installed: SIGTERM every live job's process
/// group, give them a moment, then SIGKILL anything still alive
/// (spec.md §5).
#[cfg(unix)]
fn kill_all_jobs(engine: &mut Engine) {
    let pgids: Vec<i32> = engine.jobs.jobs_ascending().iter().map(|j| j.pgid).collect();
    for &pgid in &pgids {
        let _ = crate::job_control::send_signal_to_group(pgid, libc::SIGTERM);
    }
    std::thread::sleep(std::time::Duration::from_millis(200));
    for &pgid in &pgids {
        let _ = crate::job_control::send_signal_to_group(pgid, libc::SIGKILL);
    }
}

/// `trap name-or-number command` dispositions, checked by the interpreter
/// at each drain point and on `EXIT`.
#[derive(Debug, Default)]
pub struct TrapTable {
    handlers: HashMap<String, String>,
}

impl TrapTable {
    pub fn new() -> Self {
        TrapTable::default()
    }

    pub fn set(&mut self, signal: &str, action: &str) {
        self.handlers.insert(normalize_signal_name(signal), action.to_string());
    }

    pub fn reset(&mut self, signal: &str) {
        self.handlers.remove(&normalize_signal_name(signal));
    }

    pub fn get(&self, signal: &str) -> Option<&str> {
        self.handlers.get(&normalize_signal_name(signal)).map(String::as_str)
    }

    pub fn entries(&self) -> impl Iterator<Item = (&String, &String)> {
        self.handlers.iter()
    }
}

fn normalize_signal_name(signal: &str) -> String {
    let upper = signal.trim().to_ascii_uppercase();
    upper.strip_prefix("SIG").unwrap_or(&upper).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trap_table_normalizes_sig_prefix() {
        let mut traps = TrapTable::new();
        traps.set("SIGINT", "echo caught");
        assert_eq!(traps.get("INT"), Some("echo caught"));
        assert_eq!(traps.get("sigint"), Some("echo caught"));
    }

    #[test]
    fn trap_reset_removes_handler() {
        let mut traps = TrapTable::new();
        traps.set("TERM", "cleanup");
        traps.reset("TERM");
        assert_eq!(traps.get("TERM"), None);
    }

    #[test]
    fn sigint_flag_drains_once() {
        on_sigint(libc::SIGINT);
        assert!(take_sigint());
        assert!(!take_sigint());
    }
}

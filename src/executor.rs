//! Pipeline and simple-command execution (spec.md §4.X): forks one process
//! per pipeline stage, wires stdin/stdout through anonymous pipes, applies
//! each stage's redirection plan in the child, and reaps the resulting
//! process group either synchronously (foreground) or via the job table
//! (background).
//!
//! Grounded on the teacher's `executor::execute_pipeline` (pgid election by
//! racing `setpgid` calls from both parent and child, `wait_for_pipeline_
//! process_group`, `[{id}] {pid}` background notification), generalized from
//! `std::process::Command`/`pre_exec` to a direct `libc::fork` so a stage can
//! itself be a compound command (`while read x; do …; done | sort`) run
//! in-process by `interpreter.rs` after the fork, not just an external exec.

use std::io::BufReader;

use os_pipe::pipe;

use crate::ast::{self, Command, Pipeline, SimpleCommand};
use crate::builtins::{self, ExecContext, HookTable};
use crate::env::ShellEnv;
use crate::expander::{self, CommandSubstituter};
use crate::heredoc::HereDocManager;
use crate::jobs::JobTable;
use crate::redirect;
use crate::shell::Engine;
use crate::signals::TrapTable;
use crate::status;

/// Bridges one simple command through `builtins::ExecContext` by holding
/// disjoint `&mut ShellEnv`/`&mut Engine` references — never one struct
/// bundling both, so `Engine::run_capture`'s separate `env` parameter never
/// fights a `&mut self` borrow of the same state (see shell.rs's doc comment
/// on why `Engine` deliberately excludes `ShellEnv`).
struct BuiltinCtx<'a> {
    env: &'a mut ShellEnv,
    engine: &'a mut Engine,
}

impl<'a> ExecContext for BuiltinCtx<'a> {
    fn env(&mut self) -> &mut ShellEnv {
        self.env
    }
    fn jobs(&mut self) -> &mut JobTable {
        &mut self.engine.jobs
    }
    fn traps(&mut self) -> &mut TrapTable {
        &mut self.engine.traps
    }
    fn hooks(&mut self) -> &mut HookTable {
        &mut self.engine.hooks
    }
    fn subst(&mut self) -> &mut dyn CommandSubstituter {
        self.engine
    }
    fn run_script(&mut self, text: &str) -> i32 {
        match crate::parser::parse(text) {
            Ok(list) => crate::interpreter::run_logical_list(&list, self.env, self.engine),
            Err(e) => {
                eprintln!("cjsh: {e}");
                2
            }
        }
    }
    fn exec_replace(&mut self, argv: &[String]) -> std::io::Error {
        exec_into_process(argv)
    }
    fn wait_foreground(&mut self, job_id: u32) -> i32 {
        bring_job_to_foreground(job_id, self.engine)
    }
    fn resume_background(&mut self, job_id: u32) -> Result<(), String> {
        resume_job_background(job_id, self.engine)
    }
    fn run_external(&mut self, name: &str, args: &[String]) -> i32 {
        let simple = SimpleCommand {
            assignments: Vec::new(),
            words: std::iter::once(name.to_string()).chain(args.iter().cloned()).map(ast::Word::literal).collect(),
            redirections: Vec::new(),
        };
        run_pipeline(&Pipeline::single(Command::Simple(simple)), false, self.env, self.engine)
    }
}

#[cfg(unix)]
fn exec_into_process(argv: &[String]) -> std::io::Error {
    use std::ffi::CString;

    let Ok(cstrs) = argv.iter().map(|s| CString::new(s.as_str())).collect::<Result<Vec<CString>, _>>() else {
        return std::io::Error::new(std::io::ErrorKind::InvalidInput, "argument contains a NUL byte");
    };
    let mut ptrs: Vec<*const libc::c_char> = cstrs.iter().map(|c| c.as_ptr()).collect();
    ptrs.push(std::ptr::null());
    unsafe { libc::execvp(ptrs[0], ptrs.as_ptr()) };
    std::io::Error::last_os_error()
}
#[cfg(not(unix))]
fn exec_into_process(_argv: &[String]) -> std::io::Error {
    std::io::Error::new(std::io::ErrorKind::Unsupported, "exec requires unix")
}

/// Best-effort one-line rendering of a command for `jobs`/background
/// notifications; the parser doesn't retain source spans, so this
/// reconstructs from literal words rather than echoing the original text.
pub fn pipeline_display(pipeline: &Pipeline) -> String {
    pipeline
        .stages
        .iter()
        .map(|stage| command_display(&stage.command))
        .collect::<Vec<_>>()
        .join(" | ")
}

fn command_display(command: &Command) -> String {
    match command {
        Command::Simple(simple) => simple
            .words
            .iter()
            .map(|w| w.as_plain_str().unwrap_or("...").to_string())
            .collect::<Vec<_>>()
            .join(" "),
        Command::Subshell { .. } => "(...)".to_string(),
        Command::BraceGroup { .. } => "{ ...; }".to_string(),
        Command::If(_) => "if ...".to_string(),
        Command::For(_) => "for ...".to_string(),
        Command::While(_) => "while ...".to_string(),
        Command::Until(_) => "until ...".to_string(),
        Command::Case(_) => "case ...".to_string(),
        Command::FunctionDef(def) => format!("{}()", def.name),
    }
}

fn stage_redirections(command: &Command) -> &[ast::Redirection] {
    match command {
        Command::Simple(s) => &s.redirections,
        Command::Subshell { redirections, .. } => redirections,
        Command::BraceGroup { redirections, .. } => redirections,
        Command::If(c) => &c.redirections,
        Command::For(c) => &c.redirections,
        Command::While(c) => &c.redirections,
        Command::Until(c) => &c.redirections,
        Command::Case(c) => &c.redirections,
        Command::FunctionDef(_) => &[],
    }
}

/// Runs a pipeline to completion (or registers it as a background job) and
/// returns the exit status to feed into `$?`/the enclosing logical list.
#[cfg(unix)]
pub fn run_pipeline(pipeline: &Pipeline, background: bool, env: &mut ShellEnv, engine: &mut Engine) -> i32 {
    use std::os::unix::io::AsRawFd;

    if env.options.noexec {
        env.last_status = 0;
        env.pipestatus = vec![0];
        return 0;
    }

    if pipeline.stages.len() == 1 && !background {
        let stage = &pipeline.stages[0];
        match &stage.command {
            Command::Simple(simple) => {
                if let Some(result_status) = try_run_in_process(simple, env, engine) {
                    let result = if pipeline.negate { (result_status == 0) as i32 } else { result_status };
                    env.last_status = result;
                    env.pipestatus = vec![result];
                    return result;
                }
            }
            // Everything except a subshell shares the caller's env/engine
            // directly: `if`/`for`/`while`/`case`/brace groups mutate the
            // live shell state (`if cond; then x=1; fi` must set `x` here,
            // not in a forked copy). A subshell's whole point is isolation,
            // so it still goes through the fork path below.
            other if !matches!(other, Command::Subshell { .. }) && stage_redirections(other).is_empty() && !stage.merge_stderr => {
                let raw = crate::interpreter::run_command(other, env, engine);
                if status::is_sentinel(raw) {
                    return raw;
                }
                let result = if pipeline.negate { (raw == 0) as i32 } else { raw };
                env.last_status = result;
                env.pipestatus = vec![result];
                return result;
            }
            _ => {}
        }
    }

    let stage_count = pipeline.stages.len();
    let mut pids: Vec<libc::pid_t> = Vec::with_capacity(stage_count);
    let mut pgid: libc::pid_t = 0;
    let mut prev_reader: Option<os_pipe::PipeReader> = None;

    for (idx, stage) in pipeline.stages.iter().enumerate() {
        let is_last = idx + 1 == stage_count;
        let pipe_pair = if is_last { None } else { Some(pipe().expect("failed to create pipe")) };

        let child_pid = unsafe { libc::fork() };
        if child_pid < 0 {
            eprintln!("cjsh: fork: {}", std::io::Error::last_os_error());
            return status::EX_OSERR;
        }

        if child_pid == 0 {
            unsafe { libc::setpgid(0, pgid) };

            if let Some(reader) = &prev_reader {
                unsafe { libc::dup2(reader.as_raw_fd(), libc::STDIN_FILENO) };
            }
            if let Some((_, writer)) = &pipe_pair {
                unsafe { libc::dup2(writer.as_raw_fd(), libc::STDOUT_FILENO) };
            }
            if stage.merge_stderr {
                unsafe { libc::dup2(libc::STDOUT_FILENO, libc::STDERR_FILENO) };
            }
            drop(prev_reader);
            drop(pipe_pair);

            unsafe {
                libc::signal(libc::SIGINT, libc::SIG_DFL);
                libc::signal(libc::SIGQUIT, libc::SIG_DFL);
                libc::signal(libc::SIGTSTP, libc::SIG_DFL);
                libc::signal(libc::SIGTTIN, libc::SIG_DFL);
                libc::signal(libc::SIGTTOU, libc::SIG_DFL);
                libc::signal(libc::SIGPIPE, libc::SIG_DFL);
            }

            let redirs = stage_redirections(&stage.command);
            {
                let mut resolver = HereDocManager::new(env, engine);
                match redirect::build_plan(redirs, &mut resolver) {
                    Ok(plan) => {
                        if let Err(e) = redirect::apply_plan(&plan, env.options.noclobber) {
                            eprintln!("cjsh: {e}");
                            std::process::exit(1);
                        }
                    }
                    Err(e) => {
                        eprintln!("cjsh: {e}");
                        std::process::exit(1);
                    }
                }
            }

            let code = run_stage_command(&stage.command, env, engine);
            std::process::exit(code & 0xff);
        }

        if pgid == 0 {
            pgid = child_pid;
        }
        let _ = crate::job_control::set_process_group(child_pid, pgid);
        pids.push(child_pid);
        prev_reader = pipe_pair.map(|(reader, writer)| {
            drop(writer);
            reader
        });
    }

    let command_text = pipeline_display(pipeline);

    if background {
        let id = engine.jobs.add(pgid, pids.iter().map(|p| *p as i32).collect(), command_text, true, crate::jobs::JobState::Running);
        env.last_bg_pid = pids.last().map(|p| *p as u32);
        println!("[{id}] {}", pids.last().copied().unwrap_or(pgid));
        return 0;
    }

    let guard = if engine.interactive {
        crate::job_control::ForegroundTerminalGuard::new(pgid).ok()
    } else {
        None
    };

    let mut statuses: Vec<Option<i32>> = vec![None; pids.len()];
    let mut stopped = false;
    for (idx, pid) in pids.iter().enumerate() {
        match crate::job_control::wait_for_pid(*pid) {
            Ok(crate::job_control::WaitOutcome::Exited(code)) => statuses[idx] = Some(code),
            Ok(crate::job_control::WaitOutcome::Stopped) => {
                stopped = true;
                statuses[idx] = Some(128 + libc::SIGTSTP);
            }
            Ok(crate::job_control::WaitOutcome::Continued) => statuses[idx] = Some(0),
            Err(_) => statuses[idx] = Some(status::EX_OSERR),
        }
        if let Some(code) = crate::signals::drain_pending(env, engine) {
            drop(guard);
            std::process::exit(code);
        }
    }
    drop(guard);

    let pipestatus: Vec<i32> = statuses.iter().map(|s| s.unwrap_or(status::EX_OSERR)).collect();
    env.pipestatus = pipestatus.clone();

    if stopped {
        // Foreground jobs in an interactive shell are `auto_background_on_stop`
        // (spec.md §4.X point 7): a `SIGTSTP` stop auto-continues them in the
        // background instead of leaving them stopped.
        let auto_background_on_stop = engine.interactive;
        if auto_background_on_stop {
            let _ = crate::job_control::send_continue_to_group(pgid);
            let id = engine.jobs.add_with_auto_background(
                pgid,
                pids.iter().map(|p| *p as i32).collect(),
                command_text.clone(),
                true,
                crate::jobs::JobState::Running,
                true,
            );
            env.last_bg_pid = pids.last().map(|p| *p as u32);
            println!("[{id}]+ {command_text} &");
            return 0;
        }
        let id = engine.jobs.add(pgid, pids.iter().map(|p| *p as i32).collect(), command_text.clone(), false, crate::jobs::JobState::Stopped);
        println!("[{id}]+  Stopped    {command_text}");
        let last = pipestatus.last().copied().unwrap_or(0);
        env.last_status = last;
        return last;
    }

    let result = if env.options.pipefail {
        pipestatus.iter().rev().copied().find(|&c| c != 0).unwrap_or(0)
    } else {
        pipestatus.last().copied().unwrap_or(0)
    };
    let result = if pipeline.negate { (result == 0) as i32 } else { result };
    env.last_status = result;
    result
}

#[cfg(not(unix))]
pub fn run_pipeline(_pipeline: &Pipeline, _background: bool, env: &mut ShellEnv, _engine: &mut Engine) -> i32 {
    eprintln!("cjsh: process execution requires unix");
    env.last_status = 1;
    1
}

fn run_stage_command(command: &Command, env: &mut ShellEnv, engine: &mut Engine) -> i32 {
    match command {
        Command::Simple(simple) => run_simple_in_child(simple, env, engine),
        other => crate::interpreter::run_command(other, env, engine),
    }
}

/// Runs a solo, foreground simple command directly in the shell's own
/// process when it's a builtin or function call — so `cd`, `export`,
/// `exit`, and function side effects land in `env`/`engine` themselves
/// rather than a forked copy. Returns `None` for anything that must go
/// through `run_pipeline`'s fork (external commands, redirected builtins).
fn try_run_in_process(simple: &SimpleCommand, env: &mut ShellEnv, engine: &mut Engine) -> Option<i32> {
    if simple.is_empty() {
        return Some(0);
    }
    if !simple.redirections.is_empty() {
        return None;
    }

    let words = match expander::expand_words(&simple.words, env, engine) {
        Ok(w) => w,
        Err(e) => {
            eprintln!("cjsh: {e}");
            return Some(2);
        }
    };
    if apply_assignments(simple, env, engine).is_err() {
        return Some(1);
    }
    let Some(name) = words.first() else { return Some(0) };
    let args = &words[1..];

    if let Some(def) = env.get_function(name).cloned() {
        env.push_frame(args.to_vec());
        let raw = crate::interpreter::run_logical_list(&def.body, env, engine);
        env.pop_frame();
        return Some(if status::is_sentinel(raw) { env.last_status } else { raw });
    }

    if builtins::is_builtin(name) {
        let mut ctx = BuiltinCtx { env, engine };
        let stdin_handle = std::io::stdin();
        let mut reader = BufReader::new(stdin_handle.lock());
        let mut stdout = std::io::stdout();
        let mut stderr = std::io::stderr();
        return Some(builtins::execute(name, args, &mut ctx, &mut reader, &mut stdout, &mut stderr));
    }

    None
}

fn apply_assignments(simple: &SimpleCommand, env: &mut ShellEnv, engine: &mut Engine) -> Result<(), ()> {
    for (name, word) in &simple.assignments {
        let value = match expander::expand_words(std::slice::from_ref(word), env, engine) {
            Ok(v) => v.join(""),
            Err(e) => {
                eprintln!("cjsh: {e}");
                return Err(());
            }
        };
        if let Err(e) = env.set(name, &value) {
            eprintln!("cjsh: {e}");
            return Err(());
        }
    }
    Ok(())
}

/// Runs a simple command inside a forked child: builtins/functions execute
/// in-process (mutating only this child's copy of `env`/`engine`), external
/// commands replace the child's image via `execvp`.
fn run_simple_in_child(simple: &SimpleCommand, env: &mut ShellEnv, engine: &mut Engine) -> i32 {
    if simple.is_empty() {
        return 0;
    }
    let words = match expander::expand_words(&simple.words, env, engine) {
        Ok(w) => w,
        Err(e) => {
            eprintln!("cjsh: {e}");
            return 2;
        }
    };
    if apply_assignments(simple, env, engine).is_err() {
        return 1;
    }
    let Some(name) = words.first() else { return 0 };
    let args = &words[1..];

    if let Some(alias) = env.get_alias(name).map(str::to_string) {
        let rest = args.join(" ");
        let text = if rest.is_empty() { alias } else { format!("{alias} {rest}") };
        return match crate::parser::parse(&text) {
            Ok(list) => crate::interpreter::run_logical_list(&list, env, engine),
            Err(e) => {
                eprintln!("cjsh: {e}");
                2
            }
        };
    }

    if let Some(def) = env.get_function(name).cloned() {
        env.push_frame(args.to_vec());
        let raw = crate::interpreter::run_logical_list(&def.body, env, engine);
        env.pop_frame();
        return if status::is_sentinel(raw) { env.last_status } else { raw };
    }

    if builtins::is_builtin(name) {
        let mut ctx = BuiltinCtx { env, engine };
        let stdin_handle = std::io::stdin();
        let mut reader = BufReader::new(stdin_handle.lock());
        let mut stdout = std::io::stdout();
        let mut stderr = std::io::stderr();
        return builtins::execute(name, args, &mut ctx, &mut reader, &mut stdout, &mut stderr);
    }

    match builtins::find_in_path(name) {
        Some(path) => {
            let argv: Vec<String> = std::iter::once(path.to_string_lossy().into_owned()).chain(args.iter().cloned()).collect();
            let err = exec_into_process(&argv);
            let shell_err = if err.kind() == std::io::ErrorKind::NotFound {
                crate::error::ShellError::FileNotFound(name.to_string(), err.to_string())
            } else {
                crate::error::ShellError::PermissionDenied(name.to_string())
            };
            crate::error::report("cjsh", &shell_err)
        }
        None => {
            let code = crate::error::report("cjsh", &crate::error::ShellError::CommandNotFound(name.to_string()));
            let suggestions = crate::suggest::suggest(name);
            if !suggestions.is_empty() {
                eprintln!("Did you mean: {}?", suggestions.join(", "));
            }
            code
        }
    }
}

/// `fg`: gives a stopped/background job the controlling terminal, resumes
/// it with `SIGCONT` if stopped, and waits for it to finish or stop again.
#[cfg(unix)]
fn bring_job_to_foreground(job_id: u32, engine: &mut Engine) -> i32 {
    let Some(job) = engine.jobs.get(job_id) else {
        eprintln!("cjsh: fg: {job_id}: no such job");
        return 1;
    };
    let pgid = job.pgid;
    let pids: Vec<libc::pid_t> = job.pids.iter().map(|p| *p as libc::pid_t).collect();
    println!("{}", job.command);
    engine.jobs.mark_running(job_id);

    let _ = crate::job_control::send_continue_to_group(pgid);
    let guard = crate::job_control::ForegroundTerminalGuard::new(pgid).ok();

    let mut last = 0;
    let mut stopped_again = false;
    for pid in &pids {
        match crate::job_control::wait_for_pid(*pid) {
            Ok(crate::job_control::WaitOutcome::Exited(code)) => last = code,
            Ok(crate::job_control::WaitOutcome::Stopped) => stopped_again = true,
            _ => {}
        }
    }
    drop(guard);

    if stopped_again {
        engine.jobs.mark_stopped(job_id);
    } else {
        engine.jobs.remove(job_id);
    }
    last
}
#[cfg(not(unix))]
fn bring_job_to_foreground(_job_id: u32, _engine: &mut Engine) -> i32 {
    1
}

/// `bg`: resumes a stopped job with `SIGCONT` and leaves it running in the
/// background.
#[cfg(unix)]
fn resume_job_background(job_id: u32, engine: &mut Engine) -> Result<(), String> {
    let Some(job) = engine.jobs.get(job_id) else {
        return Err(format!("{job_id}: no such job"));
    };
    crate::job_control::send_continue_to_group(job.pgid).map_err(|e| e.to_string())?;
    println!("[{job_id}] {}", job.command);
    engine.jobs.mark_running(job_id);
    Ok(())
}
#[cfg(not(unix))]
fn resume_job_background(_job_id: u32, _engine: &mut Engine) -> Result<(), String> {
    Err("job control is unix-only".to_string())
}

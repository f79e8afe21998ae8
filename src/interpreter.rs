//! Script interpreter (spec.md §4.I): walks a parsed `LogicalList`,
//! short-circuiting `&&`/`||` chains, dispatching compound commands
//! (`if`/`for`/`while`/`until`/`case`/brace groups/function definitions),
//! and unwinding `break`/`continue`/`return` via the sentinel exit codes
//! `status.rs` defines.
//!
//! Grounded on the teacher's lack of compound-command support at all; the
//! control-flow shape here follows POSIX's `&&`/`||`/`;` precedence and the
//! errexit-suppression contexts spec.md §7 calls out (conditions of
//! `if`/`while`/`until`, and either side of `&&`/`||`, never trigger
//! `errexit`).

use crate::ast::{self, CaseTerminator, Command, Connector, LogicalList};
use crate::env::ShellEnv;
use crate::executor;
use crate::expander;
use crate::glob_expand;
use crate::shell::Engine;
use crate::status;

/// Runs a whole parsed chunk (a REPL line, `-c` string, or script file),
/// with `errexit` active from the start.
pub fn run_logical_list(list: &LogicalList, env: &mut ShellEnv, engine: &mut Engine) -> i32 {
    run_list(list, env, engine, true)
}

/// Runs a list with `errexit` suppressed — used for `if`/`while`/`until`
/// conditions, whose failure is the point of the test, not a real error.
fn run_list_no_errexit(list: &LogicalList, env: &mut ShellEnv, engine: &mut Engine) -> i32 {
    run_list(list, env, engine, false)
}

fn run_list(list: &LogicalList, env: &mut ShellEnv, engine: &mut Engine, errexit_active: bool) -> i32 {
    let mut status = 0;
    let mut prev_connector = Connector::Sequence;
    for entry in &list.entries {
        #[cfg(unix)]
        if let Some(code) = crate::signals::drain_pending(env, engine) {
            std::process::exit(code);
        }

        let should_run = match prev_connector {
            Connector::And => status == 0,
            Connector::Or => status != 0,
            Connector::Sequence | Connector::Background => true,
        };
        prev_connector = entry.connector;
        if !should_run {
            continue;
        }

        let background = matches!(entry.connector, Connector::Background);
        status = executor::run_pipeline(&entry.pipeline, background, env, engine);

        if status::is_sentinel(status) {
            return status;
        }

        let tested_by_connector = matches!(entry.connector, Connector::And | Connector::Or);
        if errexit_active && env.options.errexit && status != 0 && !tested_by_connector && !entry.pipeline.negate {
            std::process::exit(status & 0xff);
        }
    }
    status
}

/// What a loop should do after its body returns a `break`/`continue`/
/// `return` sentinel: consume it locally, or decrement the requested
/// unwind count (`break N`/`continue N`) and keep propagating outward.
enum LoopSignal {
    Break,
    Continue,
    Propagate(i32),
}

fn handle_loop_sentinel(body_status: i32, env: &mut ShellEnv) -> LoopSignal {
    if body_status == status::SENTINEL_BREAK {
        let remaining = env.control_level.saturating_sub(1);
        if remaining > 0 {
            env.control_level = remaining;
            return LoopSignal::Propagate(status::SENTINEL_BREAK);
        }
        LoopSignal::Break
    } else if body_status == status::SENTINEL_CONTINUE {
        let remaining = env.control_level.saturating_sub(1);
        if remaining > 0 {
            env.control_level = remaining;
            return LoopSignal::Propagate(status::SENTINEL_CONTINUE);
        }
        LoopSignal::Continue
    } else {
        LoopSignal::Propagate(body_status)
    }
}

fn pattern_match_word(pattern: &ast::Word, subject: &str, env: &mut ShellEnv, engine: &mut Engine) -> bool {
    match expander::expand_words(std::slice::from_ref(pattern), env, engine) {
        Ok(fields) => fields.iter().any(|f| glob_expand::pattern_matches(f, subject)),
        Err(_) => false,
    }
}

/// Runs one command — simple or compound — in the current process. Simple
/// commands are handed to `executor::run_pipeline` (wrapped as a one-stage
/// pipeline) so external-program/builtin dispatch stays in one place;
/// compound commands are interpreted directly here.
pub fn run_command(command: &Command, env: &mut ShellEnv, engine: &mut Engine) -> i32 {
    match command {
        Command::Simple(_) => executor::run_pipeline(&ast::Pipeline::single(command.clone()), false, env, engine),

        Command::Subshell { body, .. } => run_list(body, env, engine, true),

        Command::BraceGroup { body, .. } => run_list(body, env, engine, true),

        Command::If(c) => {
            for (cond, body) in &c.branches {
                let cond_status = run_list_no_errexit(cond, env, engine);
                if status::is_sentinel(cond_status) {
                    return cond_status;
                }
                if cond_status == 0 {
                    return run_list(body, env, engine, true);
                }
            }
            match &c.else_branch {
                Some(else_branch) => run_list(else_branch, env, engine, true),
                None => 0,
            }
        }

        Command::For(c) => {
            let items: Vec<String> = match &c.words {
                Some(words) => match expander::expand_words(words, env, engine) {
                    Ok(v) => v,
                    Err(e) => {
                        eprintln!("cjsh: {e}");
                        return 1;
                    }
                },
                None => env.positional().to_vec(),
            };
            let mut status = 0;
            for item in items {
                if let Err(e) = env.set(&c.variable, &item) {
                    eprintln!("cjsh: {e}");
                    return 1;
                }
                let body_status = run_list(&c.body, env, engine, true);
                if status::is_sentinel(body_status) {
                    match handle_loop_sentinel(body_status, env) {
                        LoopSignal::Break => {
                            status = 0;
                            break;
                        }
                        LoopSignal::Continue => {
                            status = 0;
                            continue;
                        }
                        LoopSignal::Propagate(code) => return code,
                    }
                }
                status = body_status;
            }
            status
        }

        Command::While(c) => {
            let mut status = 0;
            loop {
                let cond_status = run_list_no_errexit(&c.condition, env, engine);
                if status::is_sentinel(cond_status) {
                    return cond_status;
                }
                if cond_status != 0 {
                    break;
                }
                let body_status = run_list(&c.body, env, engine, true);
                if status::is_sentinel(body_status) {
                    match handle_loop_sentinel(body_status, env) {
                        LoopSignal::Break => {
                            status = 0;
                            break;
                        }
                        LoopSignal::Continue => {
                            status = 0;
                            continue;
                        }
                        LoopSignal::Propagate(code) => return code,
                    }
                }
                status = body_status;
            }
            status
        }

        Command::Until(c) => {
            let mut status = 0;
            loop {
                let cond_status = run_list_no_errexit(&c.condition, env, engine);
                if status::is_sentinel(cond_status) {
                    return cond_status;
                }
                if cond_status == 0 {
                    break;
                }
                let body_status = run_list(&c.body, env, engine, true);
                if status::is_sentinel(body_status) {
                    match handle_loop_sentinel(body_status, env) {
                        LoopSignal::Break => {
                            status = 0;
                            break;
                        }
                        LoopSignal::Continue => {
                            status = 0;
                            continue;
                        }
                        LoopSignal::Propagate(code) => return code,
                    }
                }
                status = body_status;
            }
            status
        }

        Command::Case(c) => {
            let subject = match expander::expand_words(std::slice::from_ref(&c.subject), env, engine) {
                Ok(fields) => fields.join(" "),
                Err(e) => {
                    eprintln!("cjsh: {e}");
                    return 1;
                }
            };
            let mut status = 0;
            let mut idx = 0;
            let mut force_run = false;
            while idx < c.arms.len() {
                let arm = &c.arms[idx];
                let matched = force_run || arm.patterns.iter().any(|p| pattern_match_word(p, &subject, env, engine));
                force_run = false;
                if !matched {
                    idx += 1;
                    continue;
                }
                status = match &arm.body {
                    Some(body) => {
                        let body_status = run_list(body, env, engine, true);
                        if status::is_sentinel(body_status) {
                            return body_status;
                        }
                        body_status
                    }
                    None => 0,
                };
                match arm.terminator {
                    CaseTerminator::Stop => break,
                    CaseTerminator::FallThrough => {
                        force_run = true;
                        idx += 1;
                    }
                    CaseTerminator::ContinueMatching => idx += 1,
                }
            }
            status
        }

        Command::FunctionDef(def) => {
            env.define_function(def.clone());
            0
        }
    }
}

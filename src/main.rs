use std::io::{self, IsTerminal, Write};

use cjsh::cli::Cli;
use cjsh::editor::LineEditor;
use cjsh::lexer::LexError;
use cjsh::parser::{self, ParseError};
use cjsh::shell::Shell;
use cjsh::{signals, status};

fn main() {
    let cli = Cli::parse_args();

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    #[cfg(unix)]
    if let Err(e) = signals::install() {
        eprintln!("cjsh: failed to install signal handlers: {e}");
    }

    if cli.minimal || cli.secure {
        tracing::debug!(minimal = cli.minimal, secure = cli.secure, "reduced-feature startup requested");
    }

    let code = if let Some(command) = &cli.command {
        run_command_mode(command, &cli)
    } else if let Some(script_path) = cli.args.first() {
        run_script_mode(script_path, &cli)
    } else {
        let interactive = !cli.read_stdin && io::stdin().is_terminal();
        run_repl_loop(&cli, interactive)
    };

    std::process::exit(code);
}

fn build_shell(argv0: String, positional: Vec<String>, interactive: bool, cli: &Cli) -> Shell {
    let mut shell = Shell::new(argv0, positional, interactive);
    shell.env.options.posix = cli.posix;
    shell.env.options.noexec = cli.no_exec;
    shell.env.options.history_expansion = !cli.no_history_expansion;
    // SAFETY: single-threaded startup, before any child process is spawned.
    unsafe { std::env::set_var("CJSH_VERSION", env!("CARGO_PKG_VERSION")) };
    shell
}

fn run_command_mode(command: &str, cli: &Cli) -> i32 {
    let argv0 = cli.args.first().cloned().unwrap_or_else(|| "cjsh".to_string());
    let positional = cli.args.iter().skip(1).cloned().collect();
    let mut shell = build_shell(argv0, positional, cli.interactive, cli);
    let code = shell.run_source(command);
    shell.run_exit_trap();
    status_for_exit(code)
}

fn run_script_mode(path: &str, cli: &Cli) -> i32 {
    let text = match std::fs::read_to_string(path) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("cjsh: {path}: {e}");
            return 127;
        }
    };
    let positional = cli.args.iter().skip(1).cloned().collect();
    let mut shell = build_shell(path.to_string(), positional, false, cli);
    let code = shell.run_source(&text);
    shell.run_exit_trap();
    status_for_exit(code)
}

/// Drives the REPL: reads a logical input unit at a time through
/// `LineEditor` (which itself falls back to a plain `read_line` when stdin
/// isn't a terminal, so piped/`-s` input and genuine interactive sessions
/// share this one loop) and runs each as it completes.
fn run_repl_loop(cli: &Cli, interactive: bool) -> i32 {
    let mut shell = build_shell("cjsh".to_string(), cli.args.clone(), interactive, cli);
    let mut editor = LineEditor::new();
    let mut last_code = 0;

    loop {
        shell.reap_background_jobs();

        #[cfg(unix)]
        if let Some(code) = signals::drain_pending(&mut shell.env, &mut shell.engine) {
            last_code = code;
            break;
        }

        let prompt = shell.env.get("PS1").unwrap_or_else(|| "cjsh> ".to_string());
        let mut pending = match editor.read_line(&prompt) {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                last_code = 130;
                continue;
            }
            Err(e) => {
                eprintln!("cjsh: {e}");
                break;
            }
        };

        // Keep reading continuation lines (PS2) while the buffer so far is an
        // incomplete logical unit: an open quote, here-doc, or compound
        // command missing its terminator.
        loop {
            match parser::parse(&pending) {
                Ok(_) => break,
                Err(e) if needs_more_input(&e) => {
                    let ps2 = shell.env.get("PS2").unwrap_or_else(|| "> ".to_string());
                    match editor.read_line(&ps2) {
                        Ok(Some(more)) => {
                            pending.push('\n');
                            pending.push_str(&more);
                        }
                        Ok(None) | Err(_) => break,
                    }
                }
                Err(_) => break,
            }
        }

        editor.add_to_history(&pending);
        if pending.trim().is_empty() {
            continue;
        }
        last_code = shell.run_source(&pending);
        let _ = io::stdout().flush();
    }

    shell.run_exit_trap();
    status_for_exit(last_code)
}

fn needs_more_input(e: &ParseError) -> bool {
    matches!(
        e,
        ParseError::UnexpectedEof
            | ParseError::MissingTerminator(_)
            | ParseError::Lex(LexError::UnterminatedSingleQuote)
            | ParseError::Lex(LexError::UnterminatedDoubleQuote)
            | ParseError::Lex(LexError::UnterminatedExpansion(_))
    )
}

fn status_for_exit(code: i32) -> i32 {
    if status::is_sentinel(code) {
        0
    } else {
        code & 0xff
    }
}

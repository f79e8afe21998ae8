//! Builtin command table (spec.md §4.B): a name → `(argv) -> int` dispatch,
//! executed in-process so things like `cd`/`export`/`exit` can mutate the
//! shell's own state instead of a forked child's copy.
//!
//! Grounded on the teacher's flat `builtins::execute` match statement,
//! generalized from its 7-entry table to the full POSIX-ish set and split
//! by concern the way the teacher keeps `job_control.rs` separate from
//! `executor.rs`: `test_builtin.rs` owns `test`/`[`/`[[`, `jobctl.rs` owns
//! the job-control family.

mod jobctl;
mod test_builtin;

use std::io::{BufRead, Write};

use crate::env::ShellEnv;
use crate::expander::CommandSubstituter;
use crate::jobs::JobTable;
use crate::signals::TrapTable;
use crate::status::{SENTINEL_BREAK, SENTINEL_CONTINUE, SENTINEL_RETURN};

/// Named hooks fired around prompt/command events (spec.md §4.B `hook`).
/// Modeled on `TrapTable`: a name maps to shell source run when the event
/// fires; `shell.rs`'s REPL loop drains `precmd`/`preexec` at the right
/// points.
#[derive(Debug, Default)]
pub struct HookTable {
    hooks: std::collections::HashMap<String, Vec<String>>,
}

impl HookTable {
    pub fn new() -> Self {
        HookTable::default()
    }

    pub fn add(&mut self, name: &str, command: &str) {
        self.hooks.entry(name.to_string()).or_default().push(command.to_string());
    }

    pub fn remove_all(&mut self, name: &str) {
        self.hooks.remove(name);
    }

    pub fn get(&self, name: &str) -> &[String] {
        self.hooks.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn names(&self) -> impl Iterator<Item = &String> {
        self.hooks.keys()
    }
}

/// Everything a builtin needs from the rest of the shell, kept as a trait
/// so this module doesn't depend on `executor.rs`/`shell.rs` directly —
/// the same seam `expander::CommandSubstituter` and `redirect::WordResolver`
/// use to decouple lower modules from the thing that will implement them.
pub trait ExecContext {
    fn env(&mut self) -> &mut ShellEnv;
    fn jobs(&mut self) -> &mut JobTable;
    fn traps(&mut self) -> &mut TrapTable;
    fn hooks(&mut self) -> &mut HookTable;
    fn subst(&mut self) -> &mut dyn CommandSubstituter;

    /// Runs `text` as shell source in the current environment (used by
    /// `eval`, `.`/`source`), returning its exit status.
    fn run_script(&mut self, text: &str) -> i32;

    /// `exec argv...`: replaces the current process image. Only returns on
    /// failure to do so (`execvp` returning means it failed).
    fn exec_replace(&mut self, argv: &[String]) -> std::io::Error;

    /// Brings a job to the foreground and waits for it, returning its exit
    /// status, for `fg`/`wait`.
    fn wait_foreground(&mut self, job_id: u32) -> i32;

    /// Sends `SIGCONT` to a stopped job and leaves it running in the
    /// background, for `bg`.
    fn resume_background(&mut self, job_id: u32) -> Result<(), String>;

    /// Runs `name args...` as an external command through the same
    /// fork/execvp/process-group path as ordinary pipeline dispatch, so
    /// `command name` gets TTY passthrough and job-control visibility
    /// identical to running `name` directly.
    fn run_external(&mut self, name: &str, args: &[String]) -> i32;
}

pub const NAMES: &[&str] = &[
    ":", ".", "source", "[", "[[", "alias", "unalias", "break", "cd", "command", "continue",
    "echo", "eval", "exec", "exit", "export", "false", "fc", "fg", "bg", "getopts", "hash",
    "help", "history", "jobs", "kill", "local", "printf", "pwd", "read", "readonly", "return",
    "set", "shift", "test", "trap", "true", "type", "umask", "ulimit", "unset", "wait", "which",
    "times", "hook",
];

pub fn is_builtin(name: &str) -> bool {
    NAMES.contains(&name)
}

/// Runs one builtin. `stdin`/`stdout`/`stderr` are already pointed at
/// whatever the command's redirections resolved to.
#[allow(clippy::too_many_arguments)]
pub fn execute(
    name: &str,
    args: &[String],
    ctx: &mut dyn ExecContext,
    stdin: &mut dyn BufRead,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> i32 {
    match name {
        ":" | "true" => 0,
        "false" => 1,
        "echo" => builtin_echo(args, stdout),
        "printf" => builtin_printf(args, stdout, stderr),
        "pwd" => builtin_pwd(stdout, stderr),
        "cd" => builtin_cd(args, ctx, stdout, stderr),
        "exit" => builtin_exit(args, ctx, stderr),
        "return" => builtin_return(args, ctx, stderr),
        "break" => builtin_loop_control(args, ctx, SENTINEL_BREAK),
        "continue" => builtin_loop_control(args, ctx, SENTINEL_CONTINUE),
        "export" => builtin_export(args, ctx, stdout, stderr),
        "readonly" => builtin_readonly(args, ctx, stdout, stderr),
        "unset" => builtin_unset(args, ctx, stderr),
        "local" => builtin_local(args, ctx, stderr),
        "shift" => builtin_shift(args, ctx, stderr),
        "set" => builtin_set(args, ctx, stdout, stderr),
        "getopts" => builtin_getopts(args, ctx, stderr),
        "read" => builtin_read(args, ctx, stdin, stderr),
        "alias" => builtin_alias(args, ctx, stdout),
        "unalias" => builtin_unalias(args, ctx, stderr),
        "type" => builtin_type(args, ctx, stdout, stderr),
        "command" => builtin_command(args, ctx, stdin, stdout, stderr),
        "hash" => builtin_hash(stdout),
        "which" => builtin_which(args, stdout, stderr),
        "help" => builtin_help(stdout),
        "history" => builtin_history(stdout),
        "times" => builtin_times(stdout),
        "umask" => builtin_umask(args, stdout, stderr),
        "ulimit" => builtin_ulimit(args, stdout, stderr),
        "trap" => builtin_trap(args, ctx, stdout, stderr),
        "hook" => builtin_hook(args, ctx, stdout, stderr),
        "eval" => builtin_eval(args, ctx),
        "exec" => builtin_exec(args, ctx, stderr),
        "." | "source" => builtin_source(args, ctx, stderr),
        "fc" => builtin_fc(args, stdout),
        "test" | "[" => test_builtin::run(name, args),
        "[[" => test_builtin::run_bracket_bracket(args),
        "fg" => jobctl::fg(args, ctx, stderr),
        "bg" => jobctl::bg(args, ctx, stderr),
        "jobs" => jobctl::jobs(args, ctx, stdout),
        "wait" => jobctl::wait(args, ctx, stderr),
        "kill" => jobctl::kill(args, ctx, stderr),
        _ => {
            let _ = writeln!(stderr, "cjsh: {name}: not a builtin");
            127
        }
    }
}

fn builtin_echo(args: &[String], stdout: &mut dyn Write) -> i32 {
    let mut words = args;
    let mut newline = true;
    let mut interpret_escapes = false;
    while let Some(first) = words.first() {
        match first.as_str() {
            "-n" => newline = false,
            "-e" => interpret_escapes = true,
            "-E" => interpret_escapes = false,
            _ => break,
        }
        words = &words[1..];
    }
    let joined = words.join(" ");
    let rendered = if interpret_escapes { interpret_backslashes(&joined) } else { joined };
    if newline {
        let _ = writeln!(stdout, "{rendered}");
    } else {
        let _ = write!(stdout, "{rendered}");
    }
    0
}

fn interpret_backslashes(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// A small `printf(1)`: `%s`/`%d`/`%%` directives, cycling the format over
/// remaining args the way POSIX `printf` does.
fn builtin_printf(args: &[String], stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
    let Some(format) = args.first() else {
        let _ = writeln!(stderr, "printf: usage: printf format [arguments]");
        return 2;
    };
    let rest = &args[1..];
    let mut idx = 0;
    loop {
        let consumed = render_one_format(format, rest, &mut idx, stdout);
        if !consumed || idx >= rest.len() {
            break;
        }
    }
    0
}

fn render_one_format(format: &str, args: &[String], idx: &mut usize, stdout: &mut dyn Write) -> bool {
    let mut chars = format.chars().peekable();
    let mut any_directive = false;
    while let Some(c) = chars.next() {
        if c != '%' {
            let _ = write!(stdout, "{c}");
            continue;
        }
        match chars.next() {
            Some('%') => {
                let _ = write!(stdout, "%");
            }
            Some('s') => {
                any_directive = true;
                let v = args.get(*idx).cloned().unwrap_or_default();
                *idx += 1;
                let _ = write!(stdout, "{v}");
            }
            Some('d') | Some('i') => {
                any_directive = true;
                let v = args.get(*idx).cloned().unwrap_or_default();
                *idx += 1;
                let n: i64 = v.parse().unwrap_or(0);
                let _ = write!(stdout, "{n}");
            }
            Some(other) => {
                let _ = write!(stdout, "%{other}");
            }
            None => {
                let _ = write!(stdout, "%");
            }
        }
    }
    any_directive
}

fn builtin_pwd(stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
    match std::env::current_dir() {
        Ok(path) => {
            let _ = writeln!(stdout, "{}", path.display());
            0
        }
        Err(e) => {
            let _ = writeln!(stderr, "pwd: {e}");
            1
        }
    }
}

fn builtin_cd(args: &[String], ctx: &mut dyn ExecContext, stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
    let target = match args.first().map(String::as_str) {
        Some("-") => match ctx.env().get("OLDPWD") {
            Some(prev) => {
                let _ = writeln!(stdout, "{prev}");
                prev
            }
            None => {
                let _ = writeln!(stderr, "cd: OLDPWD not set");
                return 1;
            }
        },
        Some(dir) => dir.to_string(),
        None => ctx.env().get("HOME").unwrap_or_else(|| ".".to_string()),
    };

    if let Ok(cwd) = std::env::current_dir() {
        let _ = ctx.env().set("OLDPWD", &cwd.to_string_lossy());
    }
    if let Err(e) = std::env::set_current_dir(&target) {
        let _ = writeln!(stderr, "cd: {target}: {e}");
        return 1;
    }
    if let Ok(cwd) = std::env::current_dir() {
        let _ = ctx.env().set("PWD", &cwd.to_string_lossy());
    }
    0
}

fn builtin_exit(args: &[String], ctx: &mut dyn ExecContext, stderr: &mut dyn Write) -> i32 {
    let code = match args.first() {
        None => ctx.env().last_status,
        Some(s) => match s.parse::<i32>() {
            Ok(n) => n,
            Err(_) => {
                let _ = writeln!(stderr, "exit: {s}: numeric argument required");
                2
            }
        },
    };
    std::process::exit(code & 0xff);
}

fn builtin_return(args: &[String], ctx: &mut dyn ExecContext, stderr: &mut dyn Write) -> i32 {
    let code = match args.first() {
        None => ctx.env().last_status,
        Some(s) => match s.parse::<i32>() {
            Ok(n) => n,
            Err(_) => {
                let _ = writeln!(stderr, "return: {s}: numeric argument required");
                return 2;
            }
        },
    };
    ctx.env().last_status = code;
    SENTINEL_RETURN
}

fn builtin_loop_control(args: &[String], ctx: &mut dyn ExecContext, sentinel: i32) -> i32 {
    let level = args.first().and_then(|s| s.parse::<u32>().ok()).unwrap_or(1).max(1);
    ctx.env().control_level = level;
    sentinel
}

fn builtin_export(args: &[String], ctx: &mut dyn ExecContext, stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
    if args.is_empty() {
        for name in ctx.env().exported_names() {
            let value = ctx.env().get(&name).unwrap_or_default();
            let _ = writeln!(stdout, "export {name}={value}");
        }
        return 0;
    }
    let mut status = 0;
    for arg in args {
        if let Some((name, value)) = arg.split_once('=') {
            if let Err(e) = ctx.env().set(name, value) {
                let _ = writeln!(stderr, "export: {e}");
                status = 1;
                continue;
            }
        }
        let name = arg.split_once('=').map(|(n, _)| n).unwrap_or(arg.as_str());
        ctx.env().export(name);
    }
    status
}

fn builtin_readonly(args: &[String], ctx: &mut dyn ExecContext, stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
    if args.is_empty() {
        for name in ctx.env().all_shell_var_names() {
            if ctx.env().is_readonly(&name) {
                let value = ctx.env().get(&name).unwrap_or_default();
                let _ = writeln!(stdout, "readonly {name}={value}");
            }
        }
        return 0;
    }
    let mut status = 0;
    for arg in args {
        let (name, value) = match arg.split_once('=') {
            Some((n, v)) => (n, Some(v)),
            None => (arg.as_str(), None),
        };
        if let Some(v) = value {
            if let Err(e) = ctx.env().set(name, v) {
                let _ = writeln!(stderr, "readonly: {e}");
                status = 1;
                continue;
            }
        }
        ctx.env().mark_readonly(name);
    }
    status
}

fn builtin_unset(args: &[String], ctx: &mut dyn ExecContext, stderr: &mut dyn Write) -> i32 {
    let mut status = 0;
    for arg in args {
        if arg == "-f" || arg == "-v" {
            continue;
        }
        if let Err(e) = ctx.env().unset(arg) {
            let _ = writeln!(stderr, "unset: {e}");
            status = 1;
        }
    }
    status
}

fn builtin_local(args: &[String], ctx: &mut dyn ExecContext, stderr: &mut dyn Write) -> i32 {
    if !ctx.env().in_function() {
        let _ = writeln!(stderr, "local: can only be used inside a function");
        return 1;
    }
    for arg in args {
        let (name, value) = match arg.split_once('=') {
            Some((n, v)) => (n, v.to_string()),
            None => (arg.as_str(), String::new()),
        };
        ctx.env().set_local(name, &value);
    }
    0
}

fn builtin_shift(args: &[String], ctx: &mut dyn ExecContext, stderr: &mut dyn Write) -> i32 {
    let n = args.first().and_then(|s| s.parse::<usize>().ok()).unwrap_or(1);
    match ctx.env().shift(n) {
        Ok(()) => 0,
        Err(e) => {
            let _ = writeln!(stderr, "shift: {e}");
            1
        }
    }
}

/// Handles the `-e`/`-x`/`-u`/`-o pipefail`/`-o posix` forms and, with
/// bare `--`/positional args, resets `"$@"` the way `set -- a b c` does.
fn builtin_set(args: &[String], ctx: &mut dyn ExecContext, stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
    if args.is_empty() {
        for name in ctx.env().all_shell_var_names() {
            let value = ctx.env().get(&name).unwrap_or_default();
            let _ = writeln!(stdout, "{name}={value}");
        }
        return 0;
    }
    let mut i = 0;
    while i < args.len() {
        match args[i].as_str() {
            "-e" => ctx.env().options.errexit = true,
            "+e" => ctx.env().options.errexit = false,
            "-x" => ctx.env().options.xtrace = true,
            "+x" => ctx.env().options.xtrace = false,
            "-u" => ctx.env().options.nounset = true,
            "+u" => ctx.env().options.nounset = false,
            "-C" => ctx.env().options.noclobber = true,
            "+C" => ctx.env().options.noclobber = false,
            "-n" => ctx.env().options.noexec = true,
            "+n" => ctx.env().options.noexec = false,
            "-o" => {
                i += 1;
                let Some(name) = args.get(i) else {
                    let _ = writeln!(stderr, "set: -o: option name required");
                    return 2;
                };
                if !apply_dash_o(ctx.env(), name, true) {
                    let _ = writeln!(stderr, "set: {name}: invalid option name");
                    return 2;
                }
            }
            "+o" => {
                i += 1;
                let Some(name) = args.get(i) else {
                    let _ = writeln!(stderr, "set: +o: option name required");
                    return 2;
                };
                apply_dash_o(ctx.env(), name, false);
            }
            "--" => {
                let positional = args[i + 1..].to_vec();
                ctx.env().set_positional(positional);
                return 0;
            }
            _ => {
                let positional = args[i..].to_vec();
                ctx.env().set_positional(positional);
                return 0;
            }
        }
        i += 1;
    }
    0
}

fn apply_dash_o(env: &mut ShellEnv, name: &str, value: bool) -> bool {
    match name {
        "pipefail" => env.options.pipefail = value,
        "errexit" => env.options.errexit = value,
        "noclobber" => env.options.noclobber = value,
        "noexec" => env.options.noexec = value,
        "posix" => env.options.posix = value,
        "histexpand" => env.options.history_expansion = value,
        "xtrace" => env.options.xtrace = value,
        "nounset" => env.options.nounset = value,
        _ => return false,
    }
    true
}

/// `getopts optstring name [args...]`: a minimal single-pass version driven
/// off `OPTIND`, consistent with running it repeatedly from a `while` loop.
fn builtin_getopts(args: &[String], ctx: &mut dyn ExecContext, stderr: &mut dyn Write) -> i32 {
    let (Some(optstring), Some(varname)) = (args.first(), args.get(1)) else {
        let _ = writeln!(stderr, "getopts: usage: getopts optstring name [arg ...]");
        return 2;
    };
    let source: Vec<String> = if args.len() > 2 {
        args[2..].to_vec()
    } else {
        ctx.env().positional().to_vec()
    };
    let optind: usize = ctx.env().get("OPTIND").and_then(|s| s.parse().ok()).unwrap_or(1);
    let idx = optind.saturating_sub(1);

    let Some(current) = source.get(idx) else {
        let _ = ctx.env().set(varname, "?");
        return 1;
    };
    if !current.starts_with('-') || current == "-" {
        let _ = ctx.env().set(varname, "?");
        return 1;
    }
    let opt_char = current.chars().nth(1).unwrap_or('?');
    let wants_arg = optstring.contains(&format!("{opt_char}:"));
    if !optstring.contains(opt_char) {
        let _ = ctx.env().set(varname, "?");
        let _ = ctx.env().set("OPTIND", &(optind + 1).to_string());
        return 0;
    }
    let _ = ctx.env().set(varname, &opt_char.to_string());
    if wants_arg {
        if let Some(arg) = source.get(idx + 1) {
            let _ = ctx.env().set("OPTARG", arg);
            let _ = ctx.env().set("OPTIND", &(optind + 2).to_string());
        } else {
            let _ = writeln!(stderr, "getopts: option requires an argument -- '{opt_char}'");
            return 1;
        }
    } else {
        let _ = ctx.env().set("OPTIND", &(optind + 1).to_string());
    }
    0
}

/// `read [-r] name [name2 ...]`: one line, split on `$IFS` across the
/// trailing variable (like POSIX `read`'s field assignment).
fn builtin_read(args: &[String], ctx: &mut dyn ExecContext, stdin: &mut dyn BufRead, stderr: &mut dyn Write) -> i32 {
    let mut raw = false;
    let mut names: Vec<&str> = Vec::new();
    for arg in args {
        if arg == "-r" {
            raw = true;
        } else {
            names.push(arg);
        }
    }
    if names.is_empty() {
        names.push("REPLY");
    }

    let mut line = String::new();
    match stdin.read_line(&mut line) {
        Ok(0) => return 1,
        Ok(_) => {}
        Err(e) => {
            let _ = writeln!(stderr, "read: {e}");
            return 1;
        }
    }
    if line.ends_with('\n') {
        line.pop();
    }
    if !raw && line.ends_with('\\') {
        line.pop();
    }

    let ifs = ctx.env().ifs.clone();
    let fields: Vec<&str> = if ifs.is_empty() {
        vec![line.as_str()]
    } else {
        line.split(|c| ifs.contains(c)).filter(|s| !s.is_empty()).collect()
    };

    for (i, name) in names.iter().enumerate() {
        let value = if i + 1 == names.len() {
            fields[i.min(fields.len())..].join(" ")
        } else {
            fields.get(i).copied().unwrap_or("").to_string()
        };
        let _ = ctx.env().set(name, &value);
    }
    0
}

fn builtin_alias(args: &[String], ctx: &mut dyn ExecContext, stdout: &mut dyn Write) -> i32 {
    if args.is_empty() {
        for (name, value) in ctx.env().aliases() {
            let _ = writeln!(stdout, "alias {name}='{value}'");
        }
        return 0;
    }
    for arg in args {
        match arg.split_once('=') {
            Some((name, value)) => ctx.env().set_alias(name, value.trim_matches(['\'', '"'])),
            None => {
                if let Some(value) = ctx.env().get_alias(arg) {
                    let _ = writeln!(stdout, "alias {arg}='{value}'");
                }
            }
        }
    }
    0
}

fn builtin_unalias(args: &[String], ctx: &mut dyn ExecContext, stderr: &mut dyn Write) -> i32 {
    let mut status = 0;
    for arg in args {
        if !ctx.env().remove_alias(arg) {
            let _ = writeln!(stderr, "unalias: {arg}: not found");
            status = 1;
        }
    }
    status
}

fn builtin_type(args: &[String], ctx: &mut dyn ExecContext, stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
    let mut status = 0;
    for arg in args {
        if ctx.env().get_alias(arg).is_some() {
            let _ = writeln!(stdout, "{arg} is an alias");
        } else if ctx.env().has_function(arg) {
            let _ = writeln!(stdout, "{arg} is a function");
        } else if is_builtin(arg) {
            let _ = writeln!(stdout, "{arg} is a shell builtin");
        } else if let Some(path) = find_in_path(arg) {
            let _ = writeln!(stdout, "{arg} is {}", path.display());
        } else {
            let _ = writeln!(stderr, "type: {arg}: not found");
            status = 1;
        }
    }
    status
}

/// `command [-v|-V] name [args...]`: runs `name` bypassing functions and
/// aliases, or (`-v`) just reports what it resolves to.
fn builtin_command(
    args: &[String],
    ctx: &mut dyn ExecContext,
    stdin: &mut dyn BufRead,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> i32 {
    let mut rest = args;
    let mut describe_only = false;
    if rest.first().map(String::as_str) == Some("-v") || rest.first().map(String::as_str) == Some("-V") {
        describe_only = true;
        rest = &rest[1..];
    }
    let Some(name) = rest.first() else {
        let _ = writeln!(stderr, "command: usage: command [-v] name [args...]");
        return 2;
    };
    if describe_only {
        if is_builtin(name) {
            let _ = writeln!(stdout, "{name}");
        } else if let Some(path) = find_in_path(name) {
            let _ = writeln!(stdout, "{}", path.display());
        } else {
            return 1;
        }
        return 0;
    }
    if is_builtin(name) {
        return execute(name, &rest[1..], ctx, stdin, stdout, stderr);
    }
    ctx.run_external(name, &rest[1..])
}

fn builtin_hash(stdout: &mut dyn Write) -> i32 {
    let _ = writeln!(stdout, "hash: command path caching is not tracked");
    0
}

fn builtin_which(args: &[String], stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
    let mut status = 0;
    for arg in args {
        match find_in_path(arg) {
            Some(path) => {
                let _ = writeln!(stdout, "{}", path.display());
            }
            None => {
                let _ = writeln!(stderr, "{arg}: not found");
                status = 1;
            }
        }
    }
    status
}

fn builtin_help(stdout: &mut dyn Write) -> i32 {
    let _ = writeln!(stdout, "cjsh builtins: {}", NAMES.join(" "));
    0
}

fn builtin_history(stdout: &mut dyn Write) -> i32 {
    let _ = writeln!(stdout, "history: use the interactive editor's recall (up-arrow / ^R)");
    0
}

fn builtin_times(stdout: &mut dyn Write) -> i32 {
    let _ = writeln!(stdout, "0m0.000s 0m0.000s\n0m0.000s 0m0.000s");
    0
}

fn builtin_umask(args: &[String], stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
    #[cfg(unix)]
    {
        if let Some(mode_str) = args.first() {
            let Ok(mode) = u32::from_str_radix(mode_str, 8) else {
                let _ = writeln!(stderr, "umask: {mode_str}: invalid mode");
                return 1;
            };
            unsafe { libc::umask(mode as libc::mode_t) };
            return 0;
        }
        let current = unsafe {
            let existing = libc::umask(0);
            libc::umask(existing);
            existing
        };
        let _ = writeln!(stdout, "{current:04o}");
        0
    }
    #[cfg(not(unix))]
    {
        let _ = (args, stdout, stderr);
        0
    }
}

fn builtin_ulimit(args: &[String], stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
    #[cfg(unix)]
    {
        if args.is_empty() || args.first().map(String::as_str) == Some("-a") {
            let mut limit = std::mem::MaybeUninit::<libc::rlimit>::uninit();
            if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, limit.as_mut_ptr()) } == 0 {
                let limit = unsafe { limit.assume_init() };
                let _ = writeln!(stdout, "open files: {}", limit.rlim_cur);
            }
            return 0;
        }
        let _ = writeln!(stderr, "ulimit: setting resource limits is not supported");
        1
    }
    #[cfg(not(unix))]
    {
        let _ = (args, stdout, stderr);
        0
    }
}

fn builtin_trap(args: &[String], ctx: &mut dyn ExecContext, stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
    if args.is_empty() {
        for (signal, action) in ctx.traps().entries() {
            let _ = writeln!(stdout, "trap -- '{action}' {signal}");
        }
        return 0;
    }
    if args.len() == 1 {
        let _ = writeln!(stderr, "trap: usage: trap [action] signal...");
        return 2;
    }
    let action = &args[0];
    for signal in &args[1..] {
        if action == "-" {
            ctx.traps().reset(signal);
        } else {
            ctx.traps().set(signal, action);
        }
    }
    0
}

fn builtin_hook(args: &[String], ctx: &mut dyn ExecContext, stdout: &mut dyn Write, stderr: &mut dyn Write) -> i32 {
    match args.first().map(String::as_str) {
        Some("add") => {
            let (Some(name), Some(command)) = (args.get(1), args.get(2)) else {
                let _ = writeln!(stderr, "hook: usage: hook add name command");
                return 2;
            };
            ctx.hooks().add(name, command);
            0
        }
        Some("remove") => {
            let Some(name) = args.get(1) else {
                let _ = writeln!(stderr, "hook: usage: hook remove name");
                return 2;
            };
            ctx.hooks().remove_all(name);
            0
        }
        Some("list") | None => {
            for name in ctx.hooks().names() {
                let _ = writeln!(stdout, "{name}");
            }
            0
        }
        Some(other) => {
            let _ = writeln!(stderr, "hook: {other}: unknown subcommand");
            2
        }
    }
}

fn builtin_eval(args: &[String], ctx: &mut dyn ExecContext) -> i32 {
    let text = args.join(" ");
    if text.is_empty() {
        return 0;
    }
    ctx.run_script(&text)
}

fn builtin_exec(args: &[String], ctx: &mut dyn ExecContext, stderr: &mut dyn Write) -> i32 {
    if args.is_empty() {
        return 0;
    }
    let err = ctx.exec_replace(args);
    let _ = writeln!(stderr, "cjsh: exec: {}: {err}", args[0]);
    126
}

fn builtin_source(args: &[String], ctx: &mut dyn ExecContext, stderr: &mut dyn Write) -> i32 {
    let Some(path) = args.first() else {
        let _ = writeln!(stderr, "source: filename argument required");
        return 2;
    };
    match std::fs::read_to_string(path) {
        Ok(text) => ctx.run_script(&text),
        Err(e) => {
            let _ = writeln!(stderr, "source: {path}: {e}");
            1
        }
    }
}

fn builtin_fc(args: &[String], stdout: &mut dyn Write) -> i32 {
    let _ = (args, &mut *stdout);
    let _ = writeln!(stdout, "fc: history editing is not supported in non-interactive mode");
    0
}

/// Search `$PATH` for an executable named `name`, the way the teacher's
/// `type`/`which` did, generalized into a shared helper every lookup-style
/// builtin uses.
pub fn find_in_path(name: &str) -> Option<std::path::PathBuf> {
    if name.contains('/') {
        let path = std::path::PathBuf::from(name);
        return is_executable(&path).then_some(path);
    }
    let path_var = std::env::var("PATH").ok()?;
    for dir in std::env::split_paths(&path_var) {
        let candidate = dir.join(name);
        if is_executable(&candidate) {
            return Some(candidate);
        }
    }
    None
}

fn is_executable(path: &std::path::Path) -> bool {
    let Ok(meta) = path.metadata() else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echo_dash_n_suppresses_newline() {
        let mut out = Vec::new();
        builtin_echo(&["-n".to_string(), "hi".to_string()], &mut out);
        assert_eq!(out, b"hi");
    }

    #[test]
    fn echo_dash_e_interprets_escapes() {
        let mut out = Vec::new();
        builtin_echo(&["-e".to_string(), r"a\tb".to_string()], &mut out);
        assert_eq!(out, b"a\tb\n");
    }

    #[test]
    fn printf_cycles_format_over_args() {
        let mut out = Vec::new();
        builtin_printf(
            &["%s-".to_string(), "a".to_string(), "b".to_string()],
            &mut out,
            &mut Vec::new(),
        );
        assert_eq!(out, b"a-b-");
    }

    #[test]
    fn hook_table_round_trips() {
        let mut hooks = HookTable::new();
        hooks.add("precmd", "echo hi");
        assert_eq!(hooks.get("precmd"), &["echo hi".to_string()]);
        hooks.remove_all("precmd");
        assert!(hooks.get("precmd").is_empty());
    }
}

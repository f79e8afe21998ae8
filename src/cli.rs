//! Command-line surface (spec.md §6): every flag the shell binary accepts,
//! parsed with `clap`'s derive API the way `Cargo.toml` already pulls it in
//! for this purpose.

use clap::Parser;

/// An interactive, POSIX-flavored command shell.
#[derive(Debug, Parser)]
#[command(name = "cjsh", version, about = "cjsh — a POSIX-style command shell")]
pub struct Cli {
    /// Execute CMD then exit; exit status is CMD's.
    #[arg(short = 'c', value_name = "CMD")]
    pub command: Option<String>,

    /// Force interactive mode even when stdin is not a terminal.
    #[arg(short = 'i')]
    pub interactive: bool,

    /// Act as a login shell: load profile files before the first prompt.
    #[arg(short = 'l')]
    pub login: bool,

    /// Read commands from stdin.
    #[arg(short = 's')]
    pub read_stdin: bool,

    #[arg(long)]
    pub posix: bool,
    #[arg(long = "no-exec")]
    pub no_exec: bool,
    #[arg(long = "no-history-expansion")]
    pub no_history_expansion: bool,
    #[arg(long)]
    pub minimal: bool,
    #[arg(long)]
    pub secure: bool,
    #[arg(long = "no-colors")]
    pub no_colors: bool,
    #[arg(long = "no-completions")]
    pub no_completions: bool,
    #[arg(long = "no-syntax-highlighting")]
    pub no_syntax_highlighting: bool,
    #[arg(long = "no-smart-cd")]
    pub no_smart_cd: bool,
    #[arg(long = "no-sh-warning")]
    pub no_sh_warning: bool,
    #[arg(long = "startup-test")]
    pub startup_test: bool,
    #[arg(long = "show-startup-time")]
    pub show_startup_time: bool,
    #[arg(long = "no-titleline")]
    pub no_titleline: bool,
    #[arg(long = "no-source")]
    pub no_source: bool,

    /// Script file to run, when `-c` wasn't given. Remaining positionals
    /// become `$1..`; with `-c`, the first positional here becomes `$0`.
    #[arg(value_name = "ARGS", trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

impl Cli {
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}

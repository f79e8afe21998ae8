//! `ShellEnv` (spec.md §3): the two-layer variable model — OS environment
//! variables shared with children, plus shell-only state (positional
//! params, `$?`, `PIPESTATUS`, options, functions' local scopes).

use std::collections::HashMap;

/// Shell options toggled by `set -o name` / `set +o name` or the
/// corresponding short flags.
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub pipefail: bool,
    pub errexit: bool,
    pub noclobber: bool,
    pub noexec: bool,
    pub posix: bool,
    pub history_expansion: bool,
    pub xtrace: bool,
    pub nounset: bool,
}

/// Severity for `errexit` reporting, per spec.md §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrexitSeverity {
    Info,
    Warning,
    #[default]
    Error,
}

/// One function-call frame: positional parameters and `local` variables.
#[derive(Debug, Clone, Default)]
pub struct Frame {
    pub positional: Vec<String>,
    pub locals: HashMap<String, String>,
}

/// The shell's variable and option state. Owned exclusively by `Shell`.
#[derive(Debug)]
pub struct ShellEnv {
    /// Shell-only variables that are *not* exported to the OS environment
    /// (e.g. values set with plain `NAME=value`, not `export NAME=value`).
    shell_vars: HashMap<String, String>,
    /// Names explicitly exported; their values live in `std::env` so child
    /// processes inherit them automatically.
    exported: std::collections::HashSet<String>,
    readonly: std::collections::HashSet<String>,
    /// Call-stack of positional-parameter/local-variable frames. Index 0 is
    /// the top-level script/interactive frame; function calls push a frame.
    frames: Vec<Frame>,
    pub last_status: i32,
    pub pipestatus: Vec<i32>,
    /// `$!`: last background pipeline's last pid only (spec.md §9 Open
    /// Question #2, resolved in SPEC_FULL.md §C.3).
    pub last_bg_pid: Option<u32>,
    pub options: Options,
    pub errexit_severity: ErrexitSeverity,
    pub ifs: String,
    aliases: HashMap<String, String>,
    functions: HashMap<String, crate::ast::FunctionDef>,
    pub shlvl: u32,
    /// How many enclosing loops `break`/`continue` should unwind, read by
    /// `interpreter.rs` after it sees the matching sentinel exit code.
    pub control_level: u32,
}

impl ShellEnv {
    pub fn new(argv0: String, positional: Vec<String>) -> Self {
        let shlvl = std::env::var("SHLVL")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(0)
            + 1;
        // SAFETY: called once at startup before any other thread touches env.
        unsafe { std::env::set_var("SHLVL", shlvl.to_string()) };

        let mut env = ShellEnv {
            shell_vars: HashMap::new(),
            exported: std::collections::HashSet::new(),
            readonly: std::collections::HashSet::new(),
            frames: vec![Frame {
                positional,
                locals: HashMap::new(),
            }],
            last_status: 0,
            pipestatus: vec![0],
            last_bg_pid: None,
            options: Options::default(),
            errexit_severity: ErrexitSeverity::default(),
            ifs: " \t\n".to_string(),
            aliases: HashMap::new(),
            functions: HashMap::new(),
            shlvl,
            control_level: 1,
        };
        env.shell_vars.insert("0".to_string(), argv0);
        env
    }

    fn frame(&self) -> &Frame {
        self.frames.last().expect("frame stack never empty")
    }

    fn frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("frame stack never empty")
    }

    // ── Variable lookup / assignment ──────────────────────────────────────

    /// Look up a variable's value following precedence: locals of the
    /// current frame, then exported/env vars, then shell-only vars.
    pub fn get(&self, name: &str) -> Option<String> {
        match name {
            "?" => return Some(self.last_status.to_string()),
            "$" => return Some(std::process::id().to_string()),
            "!" => return self.last_bg_pid.map(|p| p.to_string()),
            "#" => return Some(self.frame().positional.len().to_string()),
            "0" => return self.shell_vars.get("0").cloned(),
            _ => {}
        }
        if let Ok(idx) = name.parse::<usize>() {
            if idx >= 1 {
                return self.frame().positional.get(idx - 1).cloned();
            }
        }
        if let Some(v) = self.frame().locals.get(name) {
            return Some(v.clone());
        }
        if let Ok(v) = std::env::var(name) {
            return Some(v);
        }
        self.shell_vars.get(name).cloned()
    }

    pub fn is_set(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Assign a variable. Exported names and previously-exported names
    /// update the OS environment; otherwise the assignment is shell-only.
    /// Returns an error if `name` is readonly.
    pub fn set(&mut self, name: &str, value: &str) -> Result<(), String> {
        if self.readonly.contains(name) {
            return Err(format!("{name}: readonly variable"));
        }
        if self.frames.len() > 1 && self.frame().locals.contains_key(name) {
            self.frame_mut().locals.insert(name.to_string(), value.to_string());
            return Ok(());
        }
        if self.exported.contains(name) {
            // SAFETY: env mutation only ever happens from the single shell
            // thread driving the command loop.
            unsafe { std::env::set_var(name, value) };
        } else {
            self.shell_vars.insert(name.to_string(), value.to_string());
        }
        Ok(())
    }

    pub fn set_local(&mut self, name: &str, value: &str) {
        self.frame_mut().locals.insert(name.to_string(), value.to_string());
    }

    pub fn export(&mut self, name: &str) {
        self.exported.insert(name.to_string());
        let value = self.get(name).unwrap_or_default();
        // SAFETY: see `set`.
        unsafe { std::env::set_var(name, value) };
    }

    pub fn is_exported(&self, name: &str) -> bool {
        self.exported.contains(name)
    }

    pub fn mark_readonly(&mut self, name: &str) {
        self.readonly.insert(name.to_string());
    }

    pub fn is_readonly(&self, name: &str) -> bool {
        self.readonly.contains(name)
    }

    pub fn unset(&mut self, name: &str) -> Result<(), String> {
        if self.readonly.contains(name) {
            return Err(format!("{name}: readonly variable"));
        }
        self.shell_vars.remove(name);
        self.frame_mut().locals.remove(name);
        self.exported.remove(name);
        // SAFETY: see `set`.
        unsafe { std::env::remove_var(name) };
        Ok(())
    }

    pub fn exported_names(&self) -> Vec<String> {
        let mut v: Vec<String> = self.exported.iter().cloned().collect();
        v.sort();
        v
    }

    pub fn all_shell_var_names(&self) -> Vec<String> {
        let mut v: Vec<String> = self.shell_vars.keys().cloned().collect();
        v.sort();
        v
    }

    // ── Positional parameters ───────────────────────────────────────────────

    pub fn positional(&self) -> &[String] {
        &self.frame().positional
    }

    pub fn set_positional(&mut self, args: Vec<String>) {
        self.frame_mut().positional = args;
    }

    pub fn shift(&mut self, n: usize) -> Result<(), String> {
        let frame = self.frame_mut();
        if n > frame.positional.len() {
            return Err("shift: shift count out of range".to_string());
        }
        frame.positional.drain(0..n);
        Ok(())
    }

    pub fn push_frame(&mut self, positional: Vec<String>) {
        self.frames.push(Frame {
            positional,
            locals: HashMap::new(),
        });
    }

    pub fn pop_frame(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }

    pub fn in_function(&self) -> bool {
        self.frames.len() > 1
    }

    // ── PIPESTATUS ───────────────────────────────────────────────────────────

    pub fn pipestatus_string(&self) -> String {
        self.pipestatus
            .iter()
            .map(i32::to_string)
            .collect::<Vec<_>>()
            .join(" ")
    }

    // ── Aliases ──────────────────────────────────────────────────────────────

    pub fn set_alias(&mut self, name: &str, value: &str) {
        self.aliases.insert(name.to_string(), value.to_string());
    }

    pub fn get_alias(&self, name: &str) -> Option<&str> {
        self.aliases.get(name).map(String::as_str)
    }

    pub fn remove_alias(&mut self, name: &str) -> bool {
        self.aliases.remove(name).is_some()
    }

    pub fn aliases(&self) -> impl Iterator<Item = (&String, &String)> {
        self.aliases.iter()
    }

    // ── Functions ────────────────────────────────────────────────────────────

    pub fn define_function(&mut self, def: crate::ast::FunctionDef) {
        self.functions.insert(def.name.clone(), def);
    }

    pub fn get_function(&self, name: &str) -> Option<&crate::ast::FunctionDef> {
        self.functions.get(name)
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shell_only_assignment_does_not_touch_os_env() {
        let mut env = ShellEnv::new("cjsh".into(), vec![]);
        env.set("FOO_CJSH_TEST_1", "bar").unwrap();
        assert_eq!(env.get("FOO_CJSH_TEST_1").as_deref(), Some("bar"));
        assert!(std::env::var("FOO_CJSH_TEST_1").is_err());
    }

    #[test]
    fn export_mirrors_into_os_env() {
        let mut env = ShellEnv::new("cjsh".into(), vec![]);
        env.set("FOO_CJSH_TEST_2", "baz").unwrap();
        env.export("FOO_CJSH_TEST_2");
        assert_eq!(std::env::var("FOO_CJSH_TEST_2").as_deref(), Ok("baz"));
        unsafe { std::env::remove_var("FOO_CJSH_TEST_2") };
    }

    #[test]
    fn readonly_rejects_reassignment() {
        let mut env = ShellEnv::new("cjsh".into(), vec![]);
        env.set("RO", "1").unwrap();
        env.mark_readonly("RO");
        assert!(env.set("RO", "2").is_err());
    }

    #[test]
    fn positional_parameters_and_hash() {
        let mut env = ShellEnv::new("cjsh".into(), vec!["a".into(), "b".into()]);
        assert_eq!(env.get("#").as_deref(), Some("2"));
        assert_eq!(env.get("1").as_deref(), Some("a"));
        env.shift(1).unwrap();
        assert_eq!(env.get("1").as_deref(), Some("b"));
        assert_eq!(env.get("#").as_deref(), Some("1"));
    }

    #[test]
    fn function_frames_isolate_locals() {
        let mut env = ShellEnv::new("cjsh".into(), vec!["outer".into()]);
        env.push_frame(vec!["inner".into()]);
        env.set_local("X", "local-val");
        assert_eq!(env.get("1").as_deref(), Some("inner"));
        assert_eq!(env.get("X").as_deref(), Some("local-val"));
        env.pop_frame();
        assert_eq!(env.get("1").as_deref(), Some("outer"));
        assert_eq!(env.get("X"), None);
    }
}

//! Word expansion pipeline (spec.md §4.E): brace, tilde, parameter,
//! command, arithmetic, word-splitting, globbing, quote removal, applied
//! in that fixed order to each word in argv.
//!
//! Grounded on the teacher's `expander::expand_word`/`expand_variables`/
//! `expand_tilde` shapes, generalized to the typed `WordSegment`s the
//! lexer now produces and to the full parameter-expansion family.

use thiserror::Error;

use crate::ast::{ParameterExpansion, ParameterOp, ProcessSubDirection, Word, WordSegment};
use crate::env::ShellEnv;
use crate::glob_expand;

#[derive(Debug, Error)]
pub enum ExpandError {
    #[error("{0}")]
    ParameterMessage(String),
    #[error(transparent)]
    Arithmetic(#[from] crate::arithmetic::ArithError),
    #[error("command substitution failed: {0}")]
    Substitution(String),
}

/// Callback the expander uses for `$(...)`/backtick command substitution
/// and `<(...)`/`>(...)` process substitution. Implemented by `Engine`
/// (`shell.rs`), which actually forks/spawns and wires up the pipe or
/// FIFO; kept as a trait here so the expander doesn't depend on the
/// executor module.
pub trait CommandSubstituter {
    fn run_capture(&mut self, script: &str, env: &mut ShellEnv) -> Result<String, ExpandError>;

    /// Resolves `<(script)`/`>(script)` to the FIFO path the expanded word
    /// should carry. Default implementation refuses, for substituters (like
    /// `NoSubstitution`) that never expect to see one.
    fn resolve_process_substitution(&mut self, script: &str, _direction: ProcessSubDirection) -> Result<String, ExpandError> {
        Err(ExpandError::Substitution(format!(
            "process substitution not available: {script}"
        )))
    }
}

/// A substituter that refuses to run anything, for contexts (like pure
/// arithmetic-only expansion in tests) that should never need it.
pub struct NoSubstitution;

impl CommandSubstituter for NoSubstitution {
    fn run_capture(&mut self, script: &str, _env: &mut ShellEnv) -> Result<String, ExpandError> {
        Err(ExpandError::Substitution(format!(
            "command substitution not available: {script}"
        )))
    }
}

struct Field {
    text: String,
    /// Suppresses word splitting and globbing (came from a quoted source).
    quoted: bool,
}

pub fn expand_words(
    words: &[Word],
    env: &mut ShellEnv,
    subst: &mut dyn CommandSubstituter,
) -> Result<Vec<String>, ExpandError> {
    let mut out = Vec::new();
    for word in words {
        for variant in brace_expand(word) {
            out.extend(expand_one_word(&variant, env, subst)?);
        }
    }
    Ok(out)
}

/// Brace expansion (step 1): `{a,b,c}` and `{1..5}` (optionally `{1..10..2}`).
/// Only applies to words the lexer kept as a single unquoted literal
/// segment — braces mixed with quoting or other expansions pass through
/// unexpanded, matching how rarely that combination appears in practice.
fn brace_expand(word: &Word) -> Vec<Word> {
    if let [WordSegment::Unquoted(text)] = word.segments.as_slice() {
        let variants = brace_expand_str(text);
        if variants.len() > 1 || variants[0] != *text {
            return variants.into_iter().map(Word::literal).collect();
        }
    }
    vec![word.clone()]
}

fn brace_expand_str(s: &str) -> Vec<String> {
    let Some((prefix, body, suffix)) = find_top_level_braces(s) else {
        return vec![s.to_string()];
    };

    let alternatives = split_top_level_commas(body);
    let items: Vec<String> = if alternatives.len() > 1 {
        alternatives.into_iter().map(str::to_string).collect()
    } else if let Some(range) = expand_range(body) {
        range
    } else {
        return vec![s.to_string()];
    };

    let mut out = Vec::new();
    for item in items {
        for tail in brace_expand_str(suffix) {
            for head in brace_expand_str(prefix) {
                out.push(format!("{head}{item}{tail}"));
            }
        }
    }
    out
}

fn find_top_level_braces(s: &str) -> Option<(&str, &str, &str)> {
    let open = s.find('{')?;
    let mut depth = 0i32;
    let mut close = None;
    for (i, c) in s.char_indices().skip(open) {
        match c {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(i);
                    break;
                }
            }
            _ => {}
        }
    }
    let close = close?;
    Some((&s[..open], &s[open + 1..close], &s[close + 1..]))
}

fn split_top_level_commas(body: &str) -> Vec<&str> {
    let mut depth = 0i32;
    let mut parts = Vec::new();
    let mut start = 0;
    for (i, c) in body.char_indices() {
        match c {
            '{' => depth += 1,
            '}' => depth -= 1,
            ',' if depth == 0 => {
                parts.push(&body[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&body[start..]);
    if parts.len() == 1 {
        Vec::new()
    } else {
        parts
    }
}

fn expand_range(body: &str) -> Option<Vec<String>> {
    let parts: Vec<&str> = body.split("..").collect();
    if parts.len() < 2 || parts.len() > 3 {
        return None;
    }
    let step: i64 = if parts.len() == 3 { parts[2].parse().ok()? } else { 1 };
    if step == 0 {
        return None;
    }

    if let (Ok(start), Ok(end)) = (parts[0].parse::<i64>(), parts[1].parse::<i64>()) {
        let width = parts[0]
            .trim_start_matches('-')
            .len()
            .max(parts[1].trim_start_matches('-').len());
        let zero_pad = parts[0].starts_with('0') || parts[0].starts_with("-0");
        let step = if start > end && step > 0 { -step } else { step };
        let mut out = Vec::new();
        let mut n = start;
        loop {
            out.push(if zero_pad {
                format!("{n:0width$}", width = width)
            } else {
                n.to_string()
            });
            if n == end {
                break;
            }
            n += step;
            if (step > 0 && n > end) || (step < 0 && n < end) {
                break;
            }
        }
        return Some(out);
    }

    if parts.len() == 2 {
        let mut start_chars = parts[0].chars();
        let mut end_chars = parts[1].chars();
        if let (Some(start), None, Some(end), None) =
            (start_chars.next(), start_chars.next(), end_chars.next(), end_chars.next())
        {
            let (start, end) = (start as u32, end as u32);
            let mut out = Vec::new();
            if start <= end {
                for c in start..=end {
                    out.push(char::from_u32(c).unwrap().to_string());
                }
            } else {
                for c in (end..=start).rev() {
                    out.push(char::from_u32(c).unwrap().to_string());
                }
            }
            return Some(out);
        }
    }

    None
}

fn expand_one_word(
    word: &Word,
    env: &mut ShellEnv,
    subst: &mut dyn CommandSubstituter,
) -> Result<Vec<String>, ExpandError> {
    // `$@`/`"$@"` as the word's sole segment splits into one field per
    // positional parameter, bypassing the single-field join below.
    if let [single] = word.segments.as_slice() {
        if let Some(fields) = expand_at_splice(single, env) {
            return Ok(fields);
        }
    }

    let mut fields = Vec::new();
    for segment in &word.segments {
        fields.push(expand_segment(segment, env, subst)?);
    }

    let (text, all_quoted) = fields.iter().fold((String::new(), true), |(mut t, q), f| {
        t.push_str(&f.text);
        (t, q && f.quoted)
    });

    if all_quoted {
        return Ok(vec![text]);
    }

    let split = split_on_ifs(&text, env);
    let mut result = Vec::new();
    for field in split {
        result.extend(glob_expand::expand(&field));
    }
    Ok(result)
}

fn expand_at_splice(segment: &WordSegment, env: &mut ShellEnv) -> Option<Vec<String>> {
    let WordSegment::ParameterExpansion(ParameterExpansion { name, op: ParameterOp::Value }) = segment else {
        return None;
    };
    if name != "@" {
        return None;
    }
    Some(env.positional().to_vec())
}

fn expand_segment(
    segment: &WordSegment,
    env: &mut ShellEnv,
    subst: &mut dyn CommandSubstituter,
) -> Result<Field, ExpandError> {
    match segment {
        WordSegment::SingleQuoted(s) => Ok(Field { text: s.clone(), quoted: true }),
        WordSegment::DoubleQuoted(s) => {
            let expanded = expand_dollar_sequences(s, env, subst)?;
            Ok(Field { text: expanded, quoted: true })
        }
        WordSegment::Unquoted(s) => {
            let tilde_expanded = expand_tilde(s);
            Ok(Field { text: tilde_expanded, quoted: false })
        }
        WordSegment::ParameterExpansion(p) => {
            let value = eval_parameter(p, env)?;
            Ok(Field { text: value, quoted: false })
        }
        WordSegment::CommandSubstitution { script, .. } => {
            let raw = subst.run_capture(script, env)?;
            Ok(Field {
                text: raw.trim_end_matches('\n').to_string(),
                quoted: false,
            })
        }
        WordSegment::ArithmeticExpansion(expr) => {
            let value = crate::arithmetic::eval(expr, env)?;
            Ok(Field { text: value.to_string(), quoted: false })
        }
        WordSegment::ProcessSubstitution { script, direction } => {
            let path = subst.resolve_process_substitution(script, *direction)?;
            Ok(Field { text: path, quoted: false })
        }
    }
}

/// Expands an unquoted here-document body the same way double-quoted text
/// is expanded: parameter/command/arithmetic substitution, no splitting or
/// globbing of the result (spec.md §4.H).
pub fn expand_heredoc_text(
    text: &str,
    env: &mut ShellEnv,
    subst: &mut dyn CommandSubstituter,
) -> Result<String, ExpandError> {
    expand_dollar_sequences(text, env, subst)
}

/// Expands `$name`/`${...}`/`$(...)`/backtick/`$(( ))` sequences embedded
/// in a double-quoted chunk of raw text. Results are not split or globbed
/// by the caller (quoted context), matching step 6/7's quote exemption.
fn expand_dollar_sequences(
    text: &str,
    env: &mut ShellEnv,
    subst: &mut dyn CommandSubstituter,
) -> Result<String, ExpandError> {
    let mut out = String::new();
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }

        match chars.peek().copied() {
            Some('(') => {
                chars.next();
                if chars.peek() == Some('(') {
                    chars.next();
                    let expr = take_balanced(&mut chars, '(', ')', true);
                    let value = crate::arithmetic::eval(&expr, env)?;
                    out.push_str(&value.to_string());
                } else {
                    let script = take_balanced(&mut chars, '(', ')', false);
                    let captured = subst.run_capture(&script, env)?;
                    out.push_str(captured.trim_end_matches('\n'));
                }
            }
            Some('{') => {
                chars.next();
                let body: String = chars.by_ref().take_while(|c| *c != '}').collect();
                let param = crate::lexer::parse_braced_parameter_pub(&body);
                out.push_str(&eval_parameter(&param, env)?);
            }
            Some(c) if c.is_alphanumeric() || c == '_' || is_special_param_char(c) => {
                let name = take_parameter_name(&mut chars);
                if name == "@" || name == "*" {
                    out.push_str(&env.positional().join(" "));
                } else {
                    out.push_str(&env.get(&name).unwrap_or_default());
                }
            }
            _ => out.push('$'),
        }
    }

    Ok(out)
}

fn is_special_param_char(c: char) -> bool {
    matches!(c, '?' | '!' | '$' | '#' | '@' | '*')
}

fn take_parameter_name(chars: &mut std::iter::Peekable<std::str::Chars>) -> String {
    if let Some(&c) = chars.peek() {
        if is_special_param_char(c) {
            chars.next();
            return c.to_string();
        }
    }
    let mut name = String::new();
    while matches!(chars.peek(), Some(c) if c.is_alphanumeric() || *c == '_') {
        name.push(chars.next().unwrap());
    }
    name
}

fn take_balanced(
    chars: &mut std::iter::Peekable<std::str::Chars>,
    open: char,
    close: char,
    double_close: bool,
) -> String {
    let mut out = String::new();
    let mut depth = 1;
    while let Some(c) = chars.next() {
        if c == open {
            depth += 1;
            out.push(c);
        } else if c == close {
            depth -= 1;
            if depth == 0 {
                if double_close {
                    chars.next();
                }
                break;
            }
            out.push(c);
        } else {
            out.push(c);
        }
    }
    out
}

fn eval_parameter(p: &ParameterExpansion, env: &mut ShellEnv) -> Result<String, ExpandError> {
    let current = if p.name == "*" || p.name == "@" {
        Some(env.positional().join(" "))
    } else {
        env.get(&p.name)
    };

    // `set -u`: referencing an unset parameter is an error, except through
    // an operator (`:-`/`=`/`:?`/`:+`) that itself handles the unset case.
    if env.options.nounset && current.is_none() && matches!(p.op, ParameterOp::Value | ParameterOp::Length) && p.name != "*" && p.name != "@" {
        return Err(ExpandError::ParameterMessage(format!("{}: unbound variable", p.name)));
    }

    match &p.op {
        ParameterOp::Value => Ok(current.unwrap_or_default()),
        ParameterOp::Length => Ok(current.unwrap_or_default().chars().count().to_string()),
        ParameterOp::UseDefault { word, only_if_unset } => {
            if is_unset_or_empty(&current, *only_if_unset) {
                literal_text(word)
            } else {
                Ok(current.unwrap_or_default())
            }
        }
        ParameterOp::AssignDefault { word, only_if_unset } => {
            if is_unset_or_empty(&current, *only_if_unset) {
                let value = literal_text(word)?;
                env.set(&p.name, &value).map_err(ExpandError::ParameterMessage)?;
                Ok(value)
            } else {
                Ok(current.unwrap_or_default())
            }
        }
        ParameterOp::ErrorIfUnset { word, only_if_unset } => {
            if is_unset_or_empty(&current, *only_if_unset) {
                let msg = literal_text(word)?;
                let msg = if msg.is_empty() { format!("{}: parameter not set", p.name) } else { msg };
                Err(ExpandError::ParameterMessage(msg))
            } else {
                Ok(current.unwrap_or_default())
            }
        }
        ParameterOp::UseAlternate { word, only_if_unset } => {
            if is_unset_or_empty(&current, *only_if_unset) {
                Ok(String::new())
            } else {
                literal_text(word)
            }
        }
        ParameterOp::RemovePrefix { pattern, longest } => {
            let text = current.unwrap_or_default();
            let pat = literal_text(pattern)?;
            match glob_expand::matching_prefix_len(&pat, &text, *longest) {
                Some(len) => Ok(text[len..].to_string()),
                None => Ok(text),
            }
        }
        ParameterOp::RemoveSuffix { pattern, longest } => {
            let text = current.unwrap_or_default();
            let pat = literal_text(pattern)?;
            match glob_expand::matching_suffix_len(&pat, &text, *longest) {
                Some(len) => Ok(text[..text.len() - len].to_string()),
                None => Ok(text),
            }
        }
    }
}

fn is_unset_or_empty(current: &Option<String>, only_if_unset: bool) -> bool {
    match (current.as_deref(), only_if_unset) {
        (None, _) => true,
        (Some(""), false) => true,
        _ => false,
    }
}

fn literal_text(word: &Word) -> Result<String, ExpandError> {
    Ok(word
        .segments
        .iter()
        .map(|s| match s {
            WordSegment::Unquoted(s) | WordSegment::SingleQuoted(s) | WordSegment::DoubleQuoted(s) => s.clone(),
            _ => String::new(),
        })
        .collect())
}

fn expand_tilde(token: &str) -> String {
    if !token.starts_with('~') {
        return token.to_string();
    }
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .unwrap_or_else(|_| "~".to_string());
    if token == "~" {
        return home;
    }
    if let Some(rest) = token.strip_prefix("~/") {
        return format!("{home}/{rest}");
    }
    token.to_string()
}

fn split_on_ifs(text: &str, env: &ShellEnv) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }
    let ifs = env.ifs.as_str();
    if ifs.is_empty() {
        return vec![text.to_string()];
    }
    text.split(|c| ifs.contains(c))
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expand(words: &[Word]) -> Vec<String> {
        let mut env = ShellEnv::new("cjsh".into(), vec![]);
        let mut subst = NoSubstitution;
        expand_words(words, &mut env, &mut subst).unwrap()
    }

    #[test]
    fn single_quoted_untouched() {
        let w = Word { segments: vec![WordSegment::SingleQuoted("$HOME *".into())] };
        assert_eq!(expand(&[w]), vec!["$HOME *"]);
    }

    #[test]
    fn brace_expansion_comma_list() {
        let w = Word::literal("file{1,2,3}.txt");
        assert_eq!(expand(&[w]), vec!["file1.txt", "file2.txt", "file3.txt"]);
    }

    #[test]
    fn brace_expansion_numeric_range() {
        let w = Word::literal("{1..3}");
        assert_eq!(expand(&[w]), vec!["1", "2", "3"]);
    }

    #[test]
    fn parameter_default_when_unset() {
        let mut env = ShellEnv::new("cjsh".into(), vec![]);
        let p = ParameterExpansion {
            name: "UNSET_VAR".into(),
            op: ParameterOp::UseDefault { word: Box::new(Word::literal("fallback")), only_if_unset: true },
        };
        assert_eq!(eval_parameter(&p, &mut env).unwrap(), "fallback");
    }

    #[test]
    fn length_operator() {
        let mut env = ShellEnv::new("cjsh".into(), vec![]);
        env.set("X", "hello").unwrap();
        let p = ParameterExpansion { name: "X".into(), op: ParameterOp::Length };
        assert_eq!(eval_parameter(&p, &mut env).unwrap(), "5");
    }

    #[test]
    fn at_splices_positional_params() {
        let mut env = ShellEnv::new("cjsh".into(), vec!["a".into(), "b c".into()]);
        let mut subst = NoSubstitution;
        let w = Word {
            segments: vec![WordSegment::ParameterExpansion(ParameterExpansion { name: "@".into(), op: ParameterOp::Value })],
        };
        let result = expand_words(std::slice::from_ref(&w), &mut env, &mut subst).unwrap();
        assert_eq!(result, vec!["a", "b c"]);
    }

    #[test]
    fn unquoted_splits_on_ifs() {
        let mut env = ShellEnv::new("cjsh".into(), vec![]);
        env.set("X", "a b  c").unwrap();
        let mut subst = NoSubstitution;
        let w = Word {
            segments: vec![WordSegment::ParameterExpansion(ParameterExpansion { name: "X".into(), op: ParameterOp::Value })],
        };
        let result = expand_words(std::slice::from_ref(&w), &mut env, &mut subst).unwrap();
        assert_eq!(result, vec!["a", "b", "c"]);
    }
}

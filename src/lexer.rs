//! Tokenizer (spec.md §4.L): turns raw input text into a stream of
//! operator tokens and `Word`s, the latter already split into quoted /
//! unquoted / expansion segments for `expander.rs` to act on later.
//!
//! Grounded on the teacher's `parser::tokenize` state machine (char-by-char
//! loop matching `(state, ch)`), generalized with the richer `TokenKind`
//! shape of `alfredjeanlab-oddjobs/crates/shell/src/token.rs` to cover
//! operators, IO numbers, and here-documents.

use std::iter::Peekable;
use std::str::Chars;
use thiserror::Error;

use crate::ast::{HereDocBody, ProcessSubDirection, Word, WordSegment};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LexError {
    #[error("unterminated single quote")]
    UnterminatedSingleQuote,
    #[error("unterminated double quote")]
    UnterminatedDoubleQuote,
    #[error("unterminated `{0}` expansion")]
    UnterminatedExpansion(&'static str),
    #[error("unexpected end of input after `\\`")]
    DanglingEscape,
    #[error("missing here-document delimiter after `<<`")]
    MissingHereDocDelimiter,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    Word(Word),
    IoNumber(u32),
    Pipe,
    PipeAmp,
    AndIf,
    OrIf,
    Semi,
    SemiSemi,
    SemiAmp,
    SemiSemiAmp,
    Amp,
    LParen,
    RParen,
    LBrace,
    RBrace,
    Bang,
    Less,
    Great,
    DGreat,
    DLess(HereDocBody),
    DLessDash(HereDocBody),
    LessAmp,
    GreatAmp,
    /// `<>` — open for both reading and writing.
    LessGreat,
    /// `<<<` — here-string.
    TripleLess,
    AndGreat, // `&>`
    Newline,
    Eof,
}

/// True if `word` spells one of the shell's reserved words *when written
/// bare* (no quoting, no expansion) — spec.md §4.P's keyword recognition.
pub fn is_reserved_word(word: &str) -> bool {
    matches!(
        word,
        "if" | "then"
            | "elif"
            | "else"
            | "fi"
            | "for"
            | "while"
            | "until"
            | "do"
            | "done"
            | "case"
            | "esac"
            | "in"
            | "function"
            | "select"
            | "{"
            | "}"
            | "!"
    )
}

pub struct Lexer<'a> {
    chars: Peekable<Chars<'a>>,
    /// Indices into the output token vector of here-docs whose delimiter
    /// was just seen on the operator line; their text is scanned once the
    /// current logical line ends, then patched back into that token.
    pending_heredocs: Vec<(usize, PendingHereDoc)>,
    /// Set by `next_token` right after it returns a `DLess`/`DLessDash`
    /// token; `tokenize` immediately converts it into a `pending_heredocs`
    /// entry carrying that token's index.
    pending_heredoc_awaiting_index: Option<PendingHereDoc>,
}

struct PendingHereDoc {
    delimiter: String,
    strip_tabs: bool,
    quoted: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Lexer {
            chars: input.chars().peekable(),
            pending_heredocs: Vec::new(),
            pending_heredoc_awaiting_index: None,
        }
    }

    pub fn tokenize(input: &'a str) -> Result<Vec<Token>, LexError> {
        let mut lexer = Lexer::new(input);
        let mut tokens = Vec::new();
        loop {
            let tok = lexer.next_token()?;
            let is_newline = tok == Token::Newline;
            let done = tok == Token::Eof;
            let index = tokens.len();
            tokens.push(tok);
            if let Some(pending) = lexer.pending_heredoc_awaiting_index.take() {
                lexer.pending_heredocs.push((index, pending));
            }
            if is_newline || done {
                lexer.scan_pending_heredocs(&mut tokens)?;
            }
            if done {
                break;
            }
        }
        Ok(tokens)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn bump(&mut self) -> Option<char> {
        self.chars.next()
    }

    fn skip_blanks(&mut self) {
        while matches!(self.peek(), Some(' ') | Some('\t')) {
            self.bump();
        }
        if self.peek() == Some('#') {
            while !matches!(self.peek(), None | Some('\n')) {
                self.bump();
            }
        }
    }

    pub fn next_token(&mut self) -> Result<Token, LexError> {
        self.skip_blanks();

        let Some(ch) = self.peek() else {
            return Ok(Token::Eof);
        };

        match ch {
            '\n' => {
                self.bump();
                Ok(Token::Newline)
            }
            '|' => {
                self.bump();
                if self.peek() == Some('|') {
                    self.bump();
                    Ok(Token::OrIf)
                } else if self.peek() == Some('&') {
                    self.bump();
                    Ok(Token::PipeAmp)
                } else {
                    Ok(Token::Pipe)
                }
            }
            '&' => {
                self.bump();
                if self.peek() == Some('&') {
                    self.bump();
                    Ok(Token::AndIf)
                } else if self.peek() == Some('>') {
                    self.bump();
                    Ok(Token::AndGreat)
                } else {
                    Ok(Token::Amp)
                }
            }
            ';' => {
                self.bump();
                if self.peek() == Some(';') {
                    self.bump();
                    if self.peek() == Some('&') {
                        self.bump();
                        Ok(Token::SemiSemiAmp)
                    } else {
                        Ok(Token::SemiSemi)
                    }
                } else if self.peek() == Some('&') {
                    self.bump();
                    Ok(Token::SemiAmp)
                } else {
                    Ok(Token::Semi)
                }
            }
            '(' => {
                self.bump();
                Ok(Token::LParen)
            }
            ')' => {
                self.bump();
                Ok(Token::RParen)
            }
            '<' => {
                self.bump();
                if self.peek() == Some('<') {
                    self.bump();
                    let strip = self.peek() == Some('-');
                    if strip {
                        self.bump();
                    }
                    if self.peek() == Some('<') {
                        self.bump();
                        return Ok(Token::TripleLess);
                    }
                    let (delim, quoted) = self.scan_heredoc_delimiter()?;
                    self.pending_heredoc_awaiting_index = Some(PendingHereDoc {
                        delimiter: delim.clone(),
                        strip_tabs: strip,
                        quoted,
                    });
                    let body = HereDocBody {
                        delimiter: delim,
                        strip_tabs: strip,
                        quoted,
                        raw_text: String::new(),
                    };
                    if strip {
                        Ok(Token::DLessDash(body))
                    } else {
                        Ok(Token::DLess(body))
                    }
                } else if self.peek() == Some('&') {
                    self.bump();
                    Ok(Token::LessAmp)
                } else if self.peek() == Some('(') {
                    self.bump();
                    let script = self.scan_balanced_parens()?;
                    Ok(Token::Word(Word {
                        segments: vec![WordSegment::ProcessSubstitution {
                            script,
                            direction: ProcessSubDirection::Read,
                        }],
                    }))
                } else if self.peek() == Some('>') {
                    self.bump();
                    Ok(Token::LessGreat)
                } else {
                    Ok(Token::Less)
                }
            }
            '>' => {
                self.bump();
                if self.peek() == Some('>') {
                    self.bump();
                    Ok(Token::DGreat)
                } else if self.peek() == Some('&') {
                    self.bump();
                    Ok(Token::GreatAmp)
                } else if self.peek() == Some('(') {
                    self.bump();
                    let script = self.scan_balanced_parens()?;
                    Ok(Token::Word(Word {
                        segments: vec![WordSegment::ProcessSubstitution {
                            script,
                            direction: ProcessSubDirection::Write,
                        }],
                    }))
                } else {
                    Ok(Token::Great)
                }
            }
            '{' => {
                self.bump();
                Ok(Token::LBrace)
            }
            '}' => {
                self.bump();
                Ok(Token::RBrace)
            }
            c if c.is_ascii_digit() => self.scan_digits_or_word(),
            _ => self.scan_word(),
        }
    }

    /// A bare run of digits immediately followed by `<` or `>` is an
    /// IO_NUMBER (spec.md §4.L); otherwise it's an ordinary word.
    fn scan_digits_or_word(&mut self) -> Result<Token, LexError> {
        let mut digits = String::new();
        while matches!(self.peek(), Some(c) if c.is_ascii_digit()) {
            digits.push(self.bump().unwrap());
        }
        if matches!(self.peek(), Some('<') | Some('>')) {
            return Ok(Token::IoNumber(digits.parse().unwrap_or(0)));
        }
        // Not an IO number: fold the digits back in as the start of a word.
        self.scan_word_with_prefix(digits)
    }

    fn scan_word(&mut self) -> Result<Token, LexError> {
        self.scan_word_with_prefix(String::new())
    }

    fn scan_word_with_prefix(&mut self, prefix: String) -> Result<Token, LexError> {
        let mut segments = Vec::new();
        let mut current = prefix;

        loop {
            match self.peek() {
                None => break,
                Some(c) if is_word_terminator(c) => break,
                Some('\'') => {
                    if !current.is_empty() {
                        segments.push(WordSegment::Unquoted(std::mem::take(&mut current)));
                    }
                    self.bump();
                    let text = self.scan_until('\'', LexError::UnterminatedSingleQuote)?;
                    segments.push(WordSegment::SingleQuoted(text));
                }
                Some('"') => {
                    if !current.is_empty() {
                        segments.push(WordSegment::Unquoted(std::mem::take(&mut current)));
                    }
                    self.bump();
                    let text = self.scan_double_quoted()?;
                    segments.push(WordSegment::DoubleQuoted(text));
                }
                Some('$') => {
                    if !current.is_empty() {
                        segments.push(WordSegment::Unquoted(std::mem::take(&mut current)));
                    }
                    segments.push(self.scan_dollar()?);
                }
                Some('`') => {
                    if !current.is_empty() {
                        segments.push(WordSegment::Unquoted(std::mem::take(&mut current)));
                    }
                    self.bump();
                    let script = self.scan_until('`', LexError::UnterminatedExpansion("`"))?;
                    segments.push(WordSegment::CommandSubstitution {
                        script,
                        legacy_backtick: true,
                    });
                }
                Some('\\') => {
                    self.bump();
                    match self.bump() {
                        Some(next) => current.push(next),
                        None => return Err(LexError::DanglingEscape),
                    }
                }
                Some(c) => {
                    current.push(c);
                    self.bump();
                }
            }
        }

        if !current.is_empty() || segments.is_empty() {
            segments.push(WordSegment::Unquoted(current));
        }

        Ok(Token::Word(Word { segments }))
    }

    fn scan_until(&mut self, end: char, err: LexError) -> Result<String, LexError> {
        let mut out = String::new();
        loop {
            match self.bump() {
                Some(c) if c == end => return Ok(out),
                Some(c) => out.push(c),
                None => return Err(err),
            }
        }
    }

    fn scan_double_quoted(&mut self) -> Result<String, LexError> {
        let mut out = String::new();
        loop {
            match self.bump() {
                Some('"') => return Ok(out),
                Some('\\') => match self.peek() {
                    Some('"' | '\\' | '$' | '`') => out.push(self.bump().unwrap()),
                    Some('\n') => {
                        self.bump();
                    }
                    _ => out.push('\\'),
                },
                Some(c) => out.push(c),
                None => return Err(LexError::UnterminatedDoubleQuote),
            }
        }
    }

    fn scan_dollar(&mut self) -> Result<WordSegment, LexError> {
        self.bump(); // '$'
        match self.peek() {
            Some('(') => {
                self.bump();
                if self.peek() == Some('(') {
                    self.bump();
                    let expr = self.scan_arithmetic()?;
                    Ok(WordSegment::ArithmeticExpansion(expr))
                } else {
                    let script = self.scan_balanced_parens()?;
                    Ok(WordSegment::CommandSubstitution {
                        script,
                        legacy_backtick: false,
                    })
                }
            }
            Some('{') => {
                self.bump();
                let body = self.scan_balanced_braces()?;
                Ok(WordSegment::ParameterExpansion(parse_braced_parameter(&body)))
            }
            Some(c) if is_name_start(c) || c.is_ascii_digit() || is_special_param(c) => {
                let name = self.scan_simple_parameter_name();
                Ok(WordSegment::ParameterExpansion(crate::ast::ParameterExpansion {
                    name,
                    op: crate::ast::ParameterOp::Value,
                }))
            }
            _ => Ok(WordSegment::Unquoted("$".to_string())),
        }
    }

    fn scan_simple_parameter_name(&mut self) -> String {
        if let Some(c) = self.peek() {
            if is_special_param(c) {
                self.bump();
                return c.to_string();
            }
        }
        let mut name = String::new();
        while matches!(self.peek(), Some(c) if c.is_alphanumeric() || c == '_') {
            name.push(self.bump().unwrap());
        }
        name
    }

    /// Scan until the matching `)`, tracking nesting depth; returns the raw
    /// inner text for the parser to re-lex as its own sub-script.
    fn scan_balanced_parens(&mut self) -> Result<String, LexError> {
        let mut out = String::new();
        let mut depth = 1;
        loop {
            match self.bump() {
                Some('(') => {
                    depth += 1;
                    out.push('(');
                }
                Some(')') => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(out);
                    }
                    out.push(')');
                }
                Some(c) => out.push(c),
                None => return Err(LexError::UnterminatedExpansion("(")),
            }
        }
    }

    /// Scan until the matching `}` for `${...}`, tracking nesting so
    /// expansions like `${name:-${other}}` round-trip correctly.
    fn scan_balanced_braces(&mut self) -> Result<String, LexError> {
        let mut out = String::new();
        let mut depth = 1;
        loop {
            match self.bump() {
                Some('{') => {
                    depth += 1;
                    out.push('{');
                }
                Some('}') => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(out);
                    }
                    out.push('}');
                }
                Some(c) => out.push(c),
                None => return Err(LexError::UnterminatedExpansion("${")),
            }
        }
    }

    fn scan_arithmetic(&mut self) -> Result<String, LexError> {
        let mut out = String::new();
        loop {
            if self.peek() == Some(')') {
                self.bump();
                if self.peek() == Some(')') {
                    self.bump();
                    return Ok(out);
                }
                out.push(')');
                continue;
            }
            match self.bump() {
                Some(c) => out.push(c),
                None => return Err(LexError::UnterminatedExpansion("((")),
            }
        }
    }

    fn scan_heredoc_delimiter(&mut self) -> Result<(String, bool), LexError> {
        self.skip_blanks();
        let mut delim = String::new();
        let mut quoted = false;
        loop {
            match self.peek() {
                None | Some(' ' | '\t' | '\n') => break,
                Some('\'') | Some('"') => {
                    quoted = true;
                    let q = self.bump().unwrap();
                    while let Some(c) = self.bump() {
                        if c == q {
                            break;
                        }
                        delim.push(c);
                    }
                }
                Some('\\') => {
                    quoted = true;
                    self.bump();
                    if let Some(c) = self.bump() {
                        delim.push(c);
                    }
                }
                Some(c) => {
                    delim.push(c);
                    self.bump();
                }
            }
        }
        if delim.is_empty() {
            return Err(LexError::MissingHereDocDelimiter);
        }
        Ok((delim, quoted))
    }

    /// After a newline, read the literal lines for every here-doc still
    /// pending on this logical line, in the order their `<<` tokens
    /// appeared (spec.md §4.L), and patch the text back into that token.
    fn scan_pending_heredocs(&mut self, tokens: &mut [Token]) -> Result<(), LexError> {
        for (index, pending) in std::mem::take(&mut self.pending_heredocs) {
            let mut text = String::new();
            loop {
                let line = self.scan_line();
                let trimmed = if pending.strip_tabs {
                    line.trim_start_matches('\t')
                } else {
                    line.as_str()
                };
                if trimmed == pending.delimiter {
                    break;
                }
                text.push_str(&line);
                text.push('\n');
                if self.peek().is_none() {
                    break;
                }
            }
            match &mut tokens[index] {
                Token::DLess(body) | Token::DLessDash(body) => body.raw_text = text,
                _ => unreachable!("pending heredoc index must point at a DLess token"),
            }
        }
        Ok(())
    }

    fn scan_line(&mut self) -> String {
        let mut line = String::new();
        while let Some(c) = self.peek() {
            if c == '\n' {
                self.bump();
                break;
            }
            line.push(c);
            self.bump();
        }
        line
    }
}

fn is_word_terminator(c: char) -> bool {
    matches!(
        c,
        ' ' | '\t' | '\n' | '|' | '&' | ';' | '(' | ')' | '<' | '>'
    )
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_special_param(c: char) -> bool {
    matches!(c, '?' | '!' | '$' | '#' | '@' | '*' | '-')
}

/// Entry point for `expander.rs` to parse a `${...}` body found embedded
/// in double-quoted text, where the lexer only captured raw characters.
pub fn parse_braced_parameter_pub(body: &str) -> crate::ast::ParameterExpansion {
    parse_braced_parameter(body)
}

fn parse_braced_parameter(body: &str) -> crate::ast::ParameterExpansion {
    use crate::ast::{ParameterExpansion, ParameterOp};

    if let Some(name) = body.strip_prefix('#') {
        if !name.is_empty() && name.chars().all(|c| c.is_alphanumeric() || c == '_') {
            return ParameterExpansion {
                name: name.to_string(),
                op: ParameterOp::Length,
            };
        }
    }

    for (marker, build) in [
        ("##", 1usize),
        ("#", 0),
    ] {
        if let Some(idx) = body.find(marker) {
            let (name, pattern) = body.split_at(idx);
            let pattern = &pattern[marker.len()..];
            if !name.is_empty() {
                return ParameterExpansion {
                    name: name.to_string(),
                    op: ParameterOp::RemovePrefix {
                        pattern: Box::new(Word::literal(pattern)),
                        longest: build == 1,
                    },
                };
            }
        }
    }
    for (marker, longest) in [("%%", true), ("%", false)] {
        if let Some(idx) = body.find(marker) {
            let (name, pattern) = body.split_at(idx);
            let pattern = &pattern[marker.len()..];
            if !name.is_empty() {
                return ParameterExpansion {
                    name: name.to_string(),
                    op: ParameterOp::RemoveSuffix {
                        pattern: Box::new(Word::literal(pattern)),
                        longest,
                    },
                };
            }
        }
    }

    for (marker, ctor) in [
        (":-", 0u8),
        (":=", 1),
        (":?", 2),
        (":+", 3),
        ("-", 4),
        ("=", 5),
        ("?", 6),
        ("+", 7),
    ] {
        if let Some(idx) = body.find(marker) {
            let (name, rest) = body.split_at(idx);
            let word = Box::new(Word::literal(&rest[marker.len()..]));
            let only_if_unset = ctor >= 4;
            let op = match ctor % 4 {
                0 => ParameterOp::UseDefault { word, only_if_unset },
                1 => ParameterOp::AssignDefault { word, only_if_unset },
                2 => ParameterOp::ErrorIfUnset { word, only_if_unset },
                _ => ParameterOp::UseAlternate { word, only_if_unset },
            };
            return ParameterExpansion {
                name: name.to_string(),
                op,
            };
        }
    }

    ParameterExpansion {
        name: body.to_string(),
        op: ParameterOp::Value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn words(src: &str) -> Vec<Word> {
        Lexer::tokenize(src)
            .unwrap()
            .into_iter()
            .filter_map(|t| match t {
                Token::Word(w) => Some(w),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn splits_simple_words() {
        let w = words("echo hello world");
        assert_eq!(w.len(), 3);
        assert_eq!(w[0].as_plain_str(), Some("echo"));
    }

    #[test]
    fn recognizes_operators() {
        let toks = Lexer::tokenize("a && b || c | d ; e &").unwrap();
        assert!(toks.contains(&Token::AndIf));
        assert!(toks.contains(&Token::OrIf));
        assert!(toks.contains(&Token::Pipe));
        assert!(toks.contains(&Token::Semi));
        assert!(toks.contains(&Token::Amp));
    }

    #[test]
    fn single_quotes_are_literal() {
        let w = words("echo 'a $b c'");
        match &w[1].segments[0] {
            WordSegment::SingleQuoted(s) => assert_eq!(s, "a $b c"),
            other => panic!("unexpected segment: {other:?}"),
        }
    }

    #[test]
    fn io_number_before_redirection() {
        let toks = Lexer::tokenize("2>file").unwrap();
        assert_eq!(toks[0], Token::IoNumber(2));
        assert_eq!(toks[1], Token::Great);
    }

    #[test]
    fn digits_without_redirection_are_a_word() {
        let w = words("echo 123abc");
        assert_eq!(w[1].as_plain_str(), Some("123abc"));
    }

    #[test]
    fn dollar_variable_is_parameter_expansion() {
        let w = words("echo $HOME");
        match &w[1].segments[0] {
            WordSegment::ParameterExpansion(p) => assert_eq!(p.name, "HOME"),
            other => panic!("unexpected segment: {other:?}"),
        }
    }

    #[test]
    fn braced_default_expansion() {
        let w = words("echo ${FOO:-bar}");
        match &w[1].segments[0] {
            WordSegment::ParameterExpansion(p) => {
                assert_eq!(p.name, "FOO");
                assert!(matches!(p.op, crate::ast::ParameterOp::UseDefault { only_if_unset: false, .. }));
            }
            other => panic!("unexpected segment: {other:?}"),
        }
    }

    #[test]
    fn heredoc_body_is_captured() {
        let toks = Lexer::tokenize("cat <<EOF\nhello\nEOF\n").unwrap();
        assert!(matches!(toks[1], Token::DLess(_)));
    }

    proptest::proptest! {
        /// Invariant 2: a single-quoted body survives tokenization byte for
        /// byte, whatever shell metacharacters it contains.
        #[test]
        fn single_quoted_body_is_never_interpreted(body in "[^'\\n]{0,40}") {
            let src = format!("echo '{body}'");
            let w = words(&src);
            match &w[1].segments[0] {
                WordSegment::SingleQuoted(s) => prop_assert_eq!(s, &body),
                other => prop_assert!(false, "unexpected segment: {other:?}"),
            }
        }
    }
}

//! Recursive-descent parser (spec.md §4.P): turns a `Lexer`'s token stream
//! into a `LogicalList` of `Pipeline`s of `Command`s, with redirections
//! attached to the command they appear on.
//!
//! Grounded on the teacher's `script_parser::parse_chain`, which already
//! splits a flat token stream on `&&`/`||`/`;`; generalized here to a full
//! grammar covering pipelines, compound commands, and redirections, in the
//! `thiserror`-based error style of `alfredjeanlab-oddjobs/crates/shell/src/parser.rs`.

use thiserror::Error;

use crate::ast::{
    CaseArm, CaseCommand, CaseTerminator, Command, Connector, DupTarget, ForCommand, FunctionDef,
    IfCommand, ListEntry, LogicalList, Pipeline, PipelineStage, Redirection, RedirectionOp,
    SimpleCommand, WhileCommand, Word,
};
use crate::lexer::{is_reserved_word, LexError, Lexer, Token};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("{0}")]
    Lex(#[from] LexError),
    #[error("syntax error near unexpected token `{0}`")]
    UnexpectedToken(String),
    #[error("syntax error: unexpected end of input")]
    UnexpectedEof,
    #[error("syntax error: missing `{0}`")]
    MissingTerminator(&'static str),
    #[error("`{0}` is not a valid redirection target")]
    BadRedirectionTarget(String),
}

pub fn parse(input: &str) -> Result<LogicalList, ParseError> {
    let tokens = Lexer::tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let list = parser.parse_list(&[])?;
    parser.skip_separators();
    if !parser.at_eof() {
        return Err(ParseError::UnexpectedToken(parser.describe_current()));
    }
    Ok(list)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> &Token {
        self.tokens.get(self.pos).unwrap_or(&Token::Eof)
    }

    fn peek_at(&self, offset: usize) -> &Token {
        self.tokens.get(self.pos + offset).unwrap_or(&Token::Eof)
    }

    fn bump(&mut self) -> Token {
        let tok = self.tokens.get(self.pos).cloned().unwrap_or(Token::Eof);
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn at_eof(&self) -> bool {
        matches!(self.peek(), Token::Eof)
    }

    fn describe_current(&self) -> String {
        match self.peek() {
            Token::Word(w) => w.as_plain_str().unwrap_or("<word>").to_string(),
            other => format!("{other:?}"),
        }
    }

    fn skip_newlines(&mut self) {
        while matches!(self.peek(), Token::Newline) {
            self.bump();
        }
    }

    fn skip_separators(&mut self) {
        while matches!(self.peek(), Token::Newline | Token::Semi) {
            self.bump();
        }
    }

    /// Reserved-word text at the current position, only when the token is a
    /// single plain unquoted word (spec.md §4.P's tie-break rule).
    fn current_keyword(&self) -> Option<&str> {
        match self.peek() {
            Token::Word(w) => w.as_plain_str().filter(|s| is_reserved_word(s)),
            _ => None,
        }
    }

    fn eat_keyword(&mut self, kw: &str) -> Result<(), ParseError> {
        if self.current_keyword() == Some(kw) {
            self.bump();
            Ok(())
        } else {
            Err(ParseError::UnexpectedToken(self.describe_current()))
        }
    }

    // list := and_or (separator and_or)*
    // `terminators` are keyword strings that end this list (e.g. "fi", "done").
    fn parse_list(&mut self, terminators: &[&str]) -> Result<LogicalList, ParseError> {
        let mut entries = Vec::new();
        self.skip_newlines();

        loop {
            if self.at_eof() {
                break;
            }
            if let Some(kw) = self.current_keyword() {
                if terminators.contains(&kw) {
                    break;
                }
            }

            let pipeline = self.parse_pipeline()?;
            let connector;

            match self.peek() {
                Token::AndIf => {
                    self.bump();
                    self.skip_newlines();
                    connector = Connector::And;
                }
                Token::OrIf => {
                    self.bump();
                    self.skip_newlines();
                    connector = Connector::Or;
                }
                Token::Amp => {
                    self.bump();
                    connector = Connector::Background;
                }
                Token::Semi => {
                    self.bump();
                    connector = Connector::Sequence;
                }
                _ => {
                    connector = Connector::Sequence;
                }
            }

            entries.push(ListEntry { pipeline, connector });

            match connector {
                Connector::And | Connector::Or => continue,
                _ => {
                    self.skip_newlines();
                    if self.at_eof() {
                        break;
                    }
                    if let Some(kw) = self.current_keyword() {
                        if terminators.contains(&kw) {
                            break;
                        }
                    }
                    continue;
                }
            }
        }

        Ok(LogicalList { entries })
    }

    // pipeline := ['!'] command ('|' command)*
    fn parse_pipeline(&mut self) -> Result<Pipeline, ParseError> {
        let negate = if self.current_keyword() == Some("!") {
            self.bump();
            true
        } else {
            false
        };

        let mut stages = vec![self.parse_pipeline_stage()?];
        loop {
            match self.peek() {
                Token::Pipe => {
                    self.bump();
                    self.skip_newlines();
                    stages.last_mut().unwrap().merge_stderr = false;
                    stages.push(self.parse_pipeline_stage()?);
                }
                Token::PipeAmp => {
                    self.bump();
                    self.skip_newlines();
                    stages.last_mut().unwrap().merge_stderr = true;
                    stages.push(self.parse_pipeline_stage()?);
                }
                _ => break,
            }
        }

        Ok(Pipeline { stages, negate })
    }

    fn parse_pipeline_stage(&mut self) -> Result<PipelineStage, ParseError> {
        let command = self.parse_command()?;
        Ok(PipelineStage { command, merge_stderr: false })
    }

    // command := simple_command | compound_command redirections?
    fn parse_command(&mut self) -> Result<Command, ParseError> {
        if let Some(kw) = self.current_keyword() {
            match kw {
                "if" => return self.parse_if(),
                "for" => return self.parse_for(),
                "while" => return self.parse_while(false),
                "until" => return self.parse_while(true),
                "case" => return self.parse_case(),
                "{" => return self.parse_brace_group(),
                "function" => return self.parse_function_def(true),
                _ => {}
            }
        }

        if matches!(self.peek(), Token::LParen) {
            return self.parse_subshell();
        }

        // `name() { ... }` function definition: lookahead for `(` `)`.
        if let Token::Word(w) = self.peek() {
            if w.as_plain_str().is_some()
                && matches!(self.peek_at(1), Token::LParen)
                && matches!(self.peek_at(2), Token::RParen)
            {
                return self.parse_function_def(false);
            }
        }

        self.parse_simple_command()
    }

    fn parse_simple_command(&mut self) -> Result<Command, ParseError> {
        let mut cmd = SimpleCommand::default();

        loop {
            match self.peek().clone() {
                Token::Word(word) => {
                    if cmd.words.is_empty() {
                        if let Some(plain) = word.as_plain_str() {
                            if let Some((name, value)) = split_assignment(plain) {
                                self.bump();
                                cmd.assignments.push((name, Word::literal(value)));
                                continue;
                            }
                        }
                    }
                    self.bump();
                    cmd.words.push(word);
                }
                Token::IoNumber(n) => {
                    self.bump();
                    let redir = self.parse_redirection_with_fd(Some(n))?;
                    cmd.redirections.push(redir);
                }
                Token::Less
                | Token::Great
                | Token::DGreat
                | Token::DLess(_)
                | Token::DLessDash(_)
                | Token::LessAmp
                | Token::GreatAmp
                | Token::LessGreat
                | Token::TripleLess
                | Token::AndGreat => {
                    let redir = self.parse_redirection_with_fd(None)?;
                    cmd.redirections.push(redir);
                }
                _ => break,
            }
        }

        if cmd.is_empty() {
            return Err(ParseError::UnexpectedToken(self.describe_current()));
        }

        Ok(Command::Simple(cmd))
    }

    fn parse_redirection_with_fd(&mut self, fd: Option<u32>) -> Result<Redirection, ParseError> {
        let op_tok = self.bump();
        let op = match op_tok {
            Token::Less => RedirectionOp::In(self.expect_redirection_target()?),
            Token::Great => RedirectionOp::Out(self.expect_redirection_target()?),
            Token::DGreat => RedirectionOp::Append(self.expect_redirection_target()?),
            Token::DLess(body) | Token::DLessDash(body) => RedirectionOp::HereDoc { body },
            Token::LessAmp => RedirectionOp::DupIn(self.expect_dup_target()?),
            Token::GreatAmp => RedirectionOp::DupOut(self.expect_dup_target()?),
            Token::LessGreat => RedirectionOp::ReadWrite(self.expect_redirection_target()?),
            Token::TripleLess => RedirectionOp::HereString(self.expect_redirection_target()?),
            Token::AndGreat => RedirectionOp::BothOut(self.expect_redirection_target()?),
            other => return Err(ParseError::UnexpectedToken(format!("{other:?}"))),
        };
        Ok(Redirection { fd, op })
    }

    fn expect_redirection_target(&mut self) -> Result<Word, ParseError> {
        match self.bump() {
            Token::Word(w) => Ok(w),
            other => Err(ParseError::BadRedirectionTarget(format!("{other:?}"))),
        }
    }

    fn expect_dup_target(&mut self) -> Result<DupTarget, ParseError> {
        match self.bump() {
            Token::Word(w) => match w.as_plain_str() {
                Some("-") => Ok(DupTarget::Close),
                Some(s) => s
                    .parse::<u32>()
                    .map(DupTarget::Fd)
                    .map_err(|_| ParseError::BadRedirectionTarget(s.to_string())),
                None => Err(ParseError::BadRedirectionTarget("<expansion>".to_string())),
            },
            other => Err(ParseError::BadRedirectionTarget(format!("{other:?}"))),
        }
    }

    fn parse_subshell(&mut self) -> Result<Command, ParseError> {
        self.bump(); // '('
        let body = self.parse_list(&[])?;
        self.expect_rparen()?;
        let redirections = self.parse_trailing_redirections()?;
        Ok(Command::Subshell { body: Box::new(body), redirections })
    }

    fn expect_rparen(&mut self) -> Result<(), ParseError> {
        self.skip_newlines();
        if matches!(self.peek(), Token::RParen) {
            self.bump();
            Ok(())
        } else {
            Err(ParseError::MissingTerminator(")"))
        }
    }

    fn parse_brace_group(&mut self) -> Result<Command, ParseError> {
        self.eat_keyword("{")?;
        let body = self.parse_list(&["}"])?;
        if self.current_keyword() == Some("}") {
            self.bump();
        } else {
            return Err(ParseError::MissingTerminator("}"));
        }
        let redirections = self.parse_trailing_redirections()?;
        Ok(Command::BraceGroup { body: Box::new(body), redirections })
    }

    fn parse_if(&mut self) -> Result<Command, ParseError> {
        self.eat_keyword("if")?;
        let mut branches = Vec::new();
        let cond = self.parse_list(&["then"])?;
        self.eat_keyword("then")?;
        let body = self.parse_list(&["elif", "else", "fi"])?;
        branches.push((cond, body));

        while self.current_keyword() == Some("elif") {
            self.bump();
            let cond = self.parse_list(&["then"])?;
            self.eat_keyword("then")?;
            let body = self.parse_list(&["elif", "else", "fi"])?;
            branches.push((cond, body));
        }

        let else_branch = if self.current_keyword() == Some("else") {
            self.bump();
            Some(self.parse_list(&["fi"])?)
        } else {
            None
        };

        self.eat_keyword("fi")?;
        let redirections = self.parse_trailing_redirections()?;
        Ok(Command::If(IfCommand { branches, else_branch, redirections }))
    }

    fn parse_for(&mut self) -> Result<Command, ParseError> {
        self.eat_keyword("for")?;
        let variable = match self.bump() {
            Token::Word(w) => w
                .as_plain_str()
                .ok_or(ParseError::UnexpectedToken("for".into()))?
                .to_string(),
            other => return Err(ParseError::UnexpectedToken(format!("{other:?}"))),
        };
        self.skip_newlines_and_semis();

        let words = if self.current_keyword() == Some("in") {
            self.bump();
            let mut words = Vec::new();
            loop {
                match self.peek().clone() {
                    Token::Word(w) => {
                        self.bump();
                        words.push(w);
                    }
                    _ => break,
                }
            }
            Some(words)
        } else {
            None
        };

        self.skip_newlines_and_semis();
        self.eat_keyword("do")?;
        let body = self.parse_list(&["done"])?;
        self.eat_keyword("done")?;
        let redirections = self.parse_trailing_redirections()?;
        Ok(Command::For(ForCommand { variable, words, body, redirections }))
    }

    fn skip_newlines_and_semis(&mut self) {
        while matches!(self.peek(), Token::Newline | Token::Semi) {
            self.bump();
        }
    }

    fn parse_while(&mut self, until: bool) -> Result<Command, ParseError> {
        self.eat_keyword(if until { "until" } else { "while" })?;
        let condition = self.parse_list(&["do"])?;
        self.eat_keyword("do")?;
        let body = self.parse_list(&["done"])?;
        self.eat_keyword("done")?;
        let redirections = self.parse_trailing_redirections()?;
        let loop_cmd = WhileCommand { condition, body, redirections };
        Ok(if until { Command::Until(loop_cmd) } else { Command::While(loop_cmd) })
    }

    fn parse_case(&mut self) -> Result<Command, ParseError> {
        self.eat_keyword("case")?;
        let subject = match self.bump() {
            Token::Word(w) => w,
            other => return Err(ParseError::UnexpectedToken(format!("{other:?}"))),
        };
        self.skip_newlines();
        self.eat_keyword("in")?;
        self.skip_newlines();

        let mut arms = Vec::new();
        while self.current_keyword() != Some("esac") {
            if matches!(self.peek(), Token::LParen) {
                self.bump();
            }
            let mut patterns = vec![self.expect_word()?];
            while matches!(self.peek(), Token::Pipe) {
                self.bump();
                patterns.push(self.expect_word()?);
            }
            if !matches!(self.peek(), Token::RParen) {
                return Err(ParseError::MissingTerminator(")"));
            }
            self.bump();
            self.skip_newlines();

            let body = if matches!(
                self.peek(),
                Token::SemiSemi | Token::SemiAmp | Token::SemiSemiAmp
            ) {
                None
            } else {
                Some(self.parse_list(&["esac"])?)
            };

            let terminator = match self.peek() {
                Token::SemiSemi => {
                    self.bump();
                    CaseTerminator::Stop
                }
                Token::SemiAmp => {
                    self.bump();
                    CaseTerminator::FallThrough
                }
                Token::SemiSemiAmp => {
                    self.bump();
                    CaseTerminator::ContinueMatching
                }
                _ => CaseTerminator::Stop,
            };
            self.skip_newlines();
            arms.push(CaseArm { patterns, body, terminator });
        }

        self.eat_keyword("esac")?;
        let redirections = self.parse_trailing_redirections()?;
        Ok(Command::Case(CaseCommand { subject, arms, redirections }))
    }

    fn expect_word(&mut self) -> Result<Word, ParseError> {
        match self.bump() {
            Token::Word(w) => Ok(w),
            other => Err(ParseError::UnexpectedToken(format!("{other:?}"))),
        }
    }

    fn parse_function_def(&mut self, keyword_form: bool) -> Result<Command, ParseError> {
        if keyword_form {
            self.eat_keyword("function")?;
        }
        let name = match self.bump() {
            Token::Word(w) => w
                .as_plain_str()
                .ok_or(ParseError::UnexpectedToken("function name".into()))?
                .to_string(),
            other => return Err(ParseError::UnexpectedToken(format!("{other:?}"))),
        };
        if matches!(self.peek(), Token::LParen) {
            self.bump();
            if !matches!(self.peek(), Token::RParen) {
                return Err(ParseError::MissingTerminator(")"));
            }
            self.bump();
        }
        self.skip_newlines();
        let body = if self.current_keyword() == Some("{") {
            match self.parse_brace_group()? {
                Command::BraceGroup { body, .. } => *body,
                _ => unreachable!(),
            }
        } else if matches!(self.peek(), Token::LParen) {
            match self.parse_subshell()? {
                Command::Subshell { body, .. } => *body,
                _ => unreachable!(),
            }
        } else {
            return Err(ParseError::UnexpectedToken(self.describe_current()));
        };
        Ok(Command::FunctionDef(FunctionDef { name, body: Box::new(body) }))
    }

    fn parse_trailing_redirections(&mut self) -> Result<Vec<Redirection>, ParseError> {
        let mut redirections = Vec::new();
        loop {
            match self.peek().clone() {
                Token::IoNumber(n) => {
                    self.bump();
                    redirections.push(self.parse_redirection_with_fd(Some(n))?);
                }
                Token::Less
                | Token::Great
                | Token::DGreat
                | Token::DLess(_)
                | Token::DLessDash(_)
                | Token::LessAmp
                | Token::GreatAmp
                | Token::LessGreat
                | Token::TripleLess
                | Token::AndGreat => {
                    redirections.push(self.parse_redirection_with_fd(None)?);
                }
                _ => break,
            }
        }
        Ok(redirections)
    }
}

/// `NAME=value` per spec.md §4.P's tie-break rule: `NAME` matches
/// `[A-Za-z_][A-Za-z0-9_]*`.
fn split_assignment(token: &str) -> Option<(String, String)> {
    let eq = token.find('=')?;
    let (name, rest) = token.split_at(eq);
    if name.is_empty() {
        return None;
    }
    let mut chars = name.chars();
    let first = chars.next()?;
    if !(first.is_alphabetic() || first == '_') {
        return None;
    }
    if !chars.all(|c| c.is_alphanumeric() || c == '_') {
        return None;
    }
    Some((name.to_string(), rest[1..].to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_pipeline() {
        let list = parse("echo hi | wc -l").unwrap();
        assert_eq!(list.entries.len(), 1);
        assert_eq!(list.entries[0].pipeline.stages.len(), 2);
    }

    #[test]
    fn parses_logical_connectors() {
        let list = parse("true && echo yes || echo no").unwrap();
        assert_eq!(list.entries.len(), 2);
        assert_eq!(list.entries[0].connector, Connector::And);
    }

    #[test]
    fn parses_background_marker() {
        let list = parse("sleep 1 &").unwrap();
        assert_eq!(list.entries[0].connector, Connector::Background);
    }

    #[test]
    fn parses_redirections_in_order() {
        let list = parse("cmd > out 2>&1").unwrap();
        let Command::Simple(cmd) = &list.entries[0].pipeline.stages[0].command else {
            panic!("expected simple command");
        };
        assert_eq!(cmd.redirections.len(), 2);
        assert!(matches!(cmd.redirections[0].op, RedirectionOp::Out(_)));
        assert!(matches!(cmd.redirections[1].op, RedirectionOp::DupOut(DupTarget::Fd(1))));
    }

    #[test]
    fn parses_assignment_prefix() {
        let list = parse("FOO=bar echo $FOO").unwrap();
        let Command::Simple(cmd) = &list.entries[0].pipeline.stages[0].command else {
            panic!("expected simple command");
        };
        assert_eq!(cmd.assignments[0].0, "FOO");
        assert_eq!(cmd.words.len(), 2);
    }

    #[test]
    fn parses_if_elif_else() {
        let list = parse("if false; then echo a; elif true; then echo b; else echo c; fi").unwrap();
        let Command::If(if_cmd) = &list.entries[0].pipeline.stages[0].command else {
            panic!("expected if command");
        };
        assert_eq!(if_cmd.branches.len(), 2);
        assert!(if_cmd.else_branch.is_some());
    }

    #[test]
    fn parses_for_loop() {
        let list = parse("for x in a b c; do echo $x; done").unwrap();
        let Command::For(for_cmd) = &list.entries[0].pipeline.stages[0].command else {
            panic!("expected for command");
        };
        assert_eq!(for_cmd.variable, "x");
        assert_eq!(for_cmd.words.as_ref().unwrap().len(), 3);
    }

    #[test]
    fn parses_case_statement() {
        let list = parse("case $x in a|b) echo ab ;; *) echo other ;; esac").unwrap();
        let Command::Case(case_cmd) = &list.entries[0].pipeline.stages[0].command else {
            panic!("expected case command");
        };
        assert_eq!(case_cmd.arms.len(), 2);
        assert_eq!(case_cmd.arms[0].patterns.len(), 2);
    }

    #[test]
    fn parses_function_definition() {
        let list = parse("greet() { echo hi; }").unwrap();
        let Command::FunctionDef(func) = &list.entries[0].pipeline.stages[0].command else {
            panic!("expected function definition");
        };
        assert_eq!(func.name, "greet");
    }

    #[test]
    fn missing_fi_is_a_syntax_error() {
        assert!(parse("if true; then echo hi").is_err());
    }
}

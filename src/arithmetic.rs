//! `$(( expr ))` arithmetic expansion (spec.md §4.E step 5): signed 64-bit
//! integer arithmetic with C operator precedence.
//!
//! Grounded on `alfredjeanlab-oddjobs/crates/shell/src/exec/expand`'s
//! precedence-climbing approach to arithmetic; variable lookups go through
//! `ShellEnv` rather than a standalone symbol table.

use thiserror::Error;

use crate::env::ShellEnv;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ArithError {
    #[error("arithmetic syntax error near `{0}`")]
    Syntax(String),
    #[error("division by zero")]
    DivideByZero,
    #[error("unexpected end of arithmetic expression")]
    UnexpectedEof,
}

pub fn eval(expr: &str, env: &mut ShellEnv) -> Result<i64, ArithError> {
    let tokens = tokenize(expr)?;
    let mut parser = ArithParser { tokens, pos: 0, env };
    let value = parser.parse_expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(ArithError::Syntax(format!("{:?}", parser.tokens[parser.pos])));
    }
    Ok(value)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    Num(i64),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
}

fn tokenize(expr: &str) -> Result<Vec<Tok>, ArithError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = expr.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == 'x' || chars[i] == 'X' || chars[i].is_ascii_hexdigit()) {
                i += 1;
            }
            let text: String = chars[start..i].iter().collect();
            let value = if let Some(hex) = text.strip_prefix("0x").or_else(|| text.strip_prefix("0X")) {
                i64::from_str_radix(hex, 16).map_err(|_| ArithError::Syntax(text.clone()))?
            } else {
                text.parse().map_err(|_| ArithError::Syntax(text.clone()))?
            };
            tokens.push(Tok::Num(value));
            continue;
        }
        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push(Tok::Ident(chars[start..i].iter().collect()));
            continue;
        }

        let two: String = chars[i..(i + 2).min(chars.len())].iter().collect();
        let op = match two.as_str() {
            "**" | "==" | "!=" | "<=" | ">=" | "&&" | "||" | "<<" | ">>" => {
                i += 2;
                match two.as_str() {
                    "**" => "**",
                    "==" => "==",
                    "!=" => "!=",
                    "<=" => "<=",
                    ">=" => ">=",
                    "&&" => "&&",
                    "||" => "||",
                    "<<" => "<<",
                    ">>" => ">>",
                    _ => unreachable!(),
                }
            }
            _ => {
                i += 1;
                match c {
                    '+' => "+",
                    '-' => "-",
                    '*' => "*",
                    '/' => "/",
                    '%' => "%",
                    '<' => "<",
                    '>' => ">",
                    '!' => "!",
                    '&' => "&",
                    '|' => "|",
                    '^' => "^",
                    '~' => "~",
                    '(' => {
                        tokens.push(Tok::LParen);
                        continue;
                    }
                    ')' => {
                        tokens.push(Tok::RParen);
                        continue;
                    }
                    other => return Err(ArithError::Syntax(other.to_string())),
                }
            }
        };
        tokens.push(Tok::Op(op));
    }

    Ok(tokens)
}

struct ArithParser<'a> {
    tokens: Vec<Tok>,
    pos: usize,
    env: &'a mut ShellEnv,
}

impl<'a> ArithParser<'a> {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos)
    }

    fn bump(&mut self) -> Option<Tok> {
        let t = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        t
    }

    fn expect_op(&mut self, op: &str) -> bool {
        if matches!(self.peek(), Some(Tok::Op(o)) if *o == op) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    // expr := logical_or (',' logical_or)*   (comma lowest precedence; last value wins)
    fn parse_expr(&mut self) -> Result<i64, ArithError> {
        let mut value = self.parse_ternary()?;
        while matches!(self.peek(), Some(Tok::Op(","))) {
            self.bump();
            value = self.parse_ternary()?;
        }
        Ok(value)
    }

    fn parse_ternary(&mut self) -> Result<i64, ArithError> {
        let cond = self.parse_logical_or()?;
        if matches!(self.peek(), Some(Tok::Op("?"))) {
            self.bump();
            let then_val = self.parse_ternary()?;
            if !matches!(self.peek(), Some(Tok::Op(":"))) {
                return Err(ArithError::Syntax(":".to_string()));
            }
            self.bump();
            let else_val = self.parse_ternary()?;
            return Ok(if cond != 0 { then_val } else { else_val });
        }
        Ok(cond)
    }

    fn parse_logical_or(&mut self) -> Result<i64, ArithError> {
        let mut left = self.parse_logical_and()?;
        while self.expect_op("||") {
            let right = self.parse_logical_and()?;
            left = ((left != 0) || (right != 0)) as i64;
        }
        Ok(left)
    }

    fn parse_logical_and(&mut self) -> Result<i64, ArithError> {
        let mut left = self.parse_bitor()?;
        while self.expect_op("&&") {
            let right = self.parse_bitor()?;
            left = ((left != 0) && (right != 0)) as i64;
        }
        Ok(left)
    }

    fn parse_bitor(&mut self) -> Result<i64, ArithError> {
        let mut left = self.parse_bitxor()?;
        while self.expect_op("|") {
            left |= self.parse_bitxor()?;
        }
        Ok(left)
    }

    fn parse_bitxor(&mut self) -> Result<i64, ArithError> {
        let mut left = self.parse_bitand()?;
        while self.expect_op("^") {
            left ^= self.parse_bitand()?;
        }
        Ok(left)
    }

    fn parse_bitand(&mut self) -> Result<i64, ArithError> {
        let mut left = self.parse_equality()?;
        while self.expect_op("&") {
            left &= self.parse_equality()?;
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<i64, ArithError> {
        let mut left = self.parse_relational()?;
        loop {
            if self.expect_op("==") {
                left = (left == self.parse_relational()?) as i64;
            } else if self.expect_op("!=") {
                left = (left != self.parse_relational()?) as i64;
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> Result<i64, ArithError> {
        let mut left = self.parse_shift()?;
        loop {
            if self.expect_op("<=") {
                left = (left <= self.parse_shift()?) as i64;
            } else if self.expect_op(">=") {
                left = (left >= self.parse_shift()?) as i64;
            } else if self.expect_op("<") {
                left = (left < self.parse_shift()?) as i64;
            } else if self.expect_op(">") {
                left = (left > self.parse_shift()?) as i64;
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn parse_shift(&mut self) -> Result<i64, ArithError> {
        let mut left = self.parse_additive()?;
        loop {
            if self.expect_op("<<") {
                left <<= self.parse_additive()?;
            } else if self.expect_op(">>") {
                left >>= self.parse_additive()?;
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> Result<i64, ArithError> {
        let mut left = self.parse_multiplicative()?;
        loop {
            if self.expect_op("+") {
                left += self.parse_multiplicative()?;
            } else if self.expect_op("-") {
                left -= self.parse_multiplicative()?;
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<i64, ArithError> {
        let mut left = self.parse_power()?;
        loop {
            if self.expect_op("*") {
                left *= self.parse_power()?;
            } else if self.expect_op("/") {
                let rhs = self.parse_power()?;
                if rhs == 0 {
                    return Err(ArithError::DivideByZero);
                }
                left /= rhs;
            } else if self.expect_op("%") {
                let rhs = self.parse_power()?;
                if rhs == 0 {
                    return Err(ArithError::DivideByZero);
                }
                left %= rhs;
            } else {
                break;
            }
        }
        Ok(left)
    }

    fn parse_power(&mut self) -> Result<i64, ArithError> {
        let base = self.parse_unary()?;
        if self.expect_op("**") {
            let exp = self.parse_power()?;
            return Ok(base.pow(exp.max(0) as u32));
        }
        Ok(base)
    }

    fn parse_unary(&mut self) -> Result<i64, ArithError> {
        if self.expect_op("-") {
            return Ok(-self.parse_unary()?);
        }
        if self.expect_op("+") {
            return self.parse_unary();
        }
        if self.expect_op("!") {
            return Ok((self.parse_unary()? == 0) as i64);
        }
        if self.expect_op("~") {
            return Ok(!self.parse_unary()?);
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<i64, ArithError> {
        match self.bump() {
            Some(Tok::Num(n)) => Ok(n),
            Some(Tok::Ident(name)) => Ok(self
                .env
                .get(&name)
                .and_then(|v| v.trim().parse::<i64>().ok())
                .unwrap_or(0)),
            Some(Tok::LParen) => {
                let value = self.parse_expr()?;
                if !matches!(self.peek(), Some(Tok::RParen)) {
                    return Err(ArithError::Syntax(")".to_string()));
                }
                self.bump();
                Ok(value)
            }
            Some(other) => Err(ArithError::Syntax(format!("{other:?}"))),
            None => Err(ArithError::UnexpectedEof),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eval_str(s: &str) -> i64 {
        let mut env = ShellEnv::new("cjsh".into(), vec![]);
        eval(s, &mut env).unwrap()
    }

    #[test]
    fn precedence_respected() {
        assert_eq!(eval_str("2 + 3 * 4"), 14);
        assert_eq!(eval_str("(2 + 3) * 4"), 20);
    }

    #[test]
    fn comparisons_and_logic() {
        assert_eq!(eval_str("1 < 2 && 3 > 2"), 1);
        assert_eq!(eval_str("1 == 2"), 0);
    }

    #[test]
    fn variable_lookup() {
        let mut env = ShellEnv::new("cjsh".into(), vec![]);
        env.set("X", "10").unwrap();
        assert_eq!(eval("X * 2", &mut env).unwrap(), 20);
    }

    #[test]
    fn division_by_zero_errs() {
        let mut env = ShellEnv::new("cjsh".into(), vec![]);
        assert_eq!(eval("1 / 0", &mut env), Err(ArithError::DivideByZero));
    }

    #[test]
    fn ternary_operator() {
        assert_eq!(eval_str("1 ? 5 : 9"), 5);
        assert_eq!(eval_str("0 ? 5 : 9"), 9);
    }

    proptest::proptest! {
        /// Addition of two literals never depends on surrounding whitespace
        /// or on evaluation order beyond ordinary integer arithmetic.
        #[test]
        fn addition_matches_checked_sum(a in -1_000_000i64..1_000_000, b in -1_000_000i64..1_000_000) {
            let mut env = ShellEnv::new("cjsh".into(), vec![]);
            let got = eval(&format!("{a} + {b}"), &mut env).unwrap();
            prop_assert_eq!(got, a + b);
        }
    }
}

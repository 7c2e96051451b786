//! Integer expression evaluation for `#if` and `#elif`.
//!
//! The caller has already expanded macros and replaced `defined` operators
//! with literals. Identifiers left over evaluate to 0, as in C.

use super::lexer::{Token, TokenKind};

/// Evaluate a preprocessor condition.
pub fn evaluate(tokens: &[Token]) -> Result<i64, String> {
    if tokens.is_empty() {
        return Err("#if with no expression".to_string());
    }

    let mut parser = ExprParser { tokens, pos: 0 };
    let value = parser.ternary()?;
    if let Some(token) = parser.peek() {
        return Err(format!("unexpected `{}` in expression", token.text));
    }
    Ok(value)
}

struct ExprParser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

fn precedence(op: &str) -> Option<u8> {
    Some(match op {
        "||" => 1,
        "&&" => 2,
        "|" => 3,
        "^" => 4,
        "&" => 5,
        "==" | "!=" => 6,
        "<" | "<=" | ">" | ">=" => 7,
        "<<" | ">>" => 8,
        "+" | "-" => 9,
        "*" | "/" | "%" => 10,
        _ => return None,
    })
}

fn apply(op: &str, lhs: i64, rhs: i64) -> Result<i64, String> {
    Ok(match op {
        "||" => (lhs != 0 || rhs != 0) as i64,
        "&&" => (lhs != 0 && rhs != 0) as i64,
        "|" => lhs | rhs,
        "^" => lhs ^ rhs,
        "&" => lhs & rhs,
        "==" => (lhs == rhs) as i64,
        "!=" => (lhs != rhs) as i64,
        "<" => (lhs < rhs) as i64,
        "<=" => (lhs <= rhs) as i64,
        ">" => (lhs > rhs) as i64,
        ">=" => (lhs >= rhs) as i64,
        "<<" => lhs.wrapping_shl(rhs as u32),
        ">>" => lhs.wrapping_shr(rhs as u32),
        "+" => lhs.wrapping_add(rhs),
        "-" => lhs.wrapping_sub(rhs),
        "*" => lhs.wrapping_mul(rhs),
        "/" | "%" if rhs == 0 => return Err("division by zero in expression".to_string()),
        "/" => lhs.wrapping_div(rhs),
        "%" => lhs.wrapping_rem(rhs),
        _ => return Err(format!("unknown operator `{}`", op)),
    })
}

/// Parse an integer literal, ignoring `u`/`l` suffixes.
pub fn parse_int(text: &str) -> Option<i64> {
    let digits = text.trim_end_matches(['u', 'U', 'l', 'L']);
    if let Some(hex) = digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        i64::from_str_radix(hex, 16).ok()
    } else if digits.len() > 1 && digits.starts_with('0') {
        i64::from_str_radix(&digits[1..], 8).ok()
    } else {
        digits.parse().ok()
    }
}

impl ExprParser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn expect(&mut self, punct: &str) -> Result<(), String> {
        match self.next() {
            Some(token) if token.is_punct(punct) => Ok(()),
            Some(token) => Err(format!("expected `{}`, found `{}`", punct, token.text)),
            None => Err(format!("expected `{}` at end of expression", punct)),
        }
    }

    fn ternary(&mut self) -> Result<i64, String> {
        let condition = self.binary(1)?;
        if self.peek().is_some_and(|t| t.is_punct("?")) {
            self.pos += 1;
            let then = self.ternary()?;
            self.expect(":")?;
            let otherwise = self.ternary()?;
            return Ok(if condition != 0 { then } else { otherwise });
        }
        Ok(condition)
    }

    fn binary(&mut self, min_precedence: u8) -> Result<i64, String> {
        let mut lhs = self.unary()?;
        loop {
            let Some(op) = self
                .peek()
                .filter(|t| t.kind == TokenKind::Punct)
                .map(|t| t.text.clone())
            else {
                break;
            };
            let Some(prec) = precedence(&op) else {
                break;
            };
            if prec < min_precedence {
                break;
            }
            self.pos += 1;
            let rhs = self.binary(prec + 1)?;
            lhs = apply(&op, lhs, rhs)?;
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<i64, String> {
        let Some(token) = self.next().cloned() else {
            return Err("unexpected end of expression".to_string());
        };

        match token.kind {
            TokenKind::Punct => match token.text.as_str() {
                "!" => Ok((self.unary()? == 0) as i64),
                "~" => Ok(!self.unary()?),
                "-" => Ok(self.unary()?.wrapping_neg()),
                "+" => self.unary(),
                "(" => {
                    let value = self.ternary()?;
                    self.expect(")")?;
                    Ok(value)
                }
                other => Err(format!("unexpected `{}` in expression", other)),
            },
            TokenKind::Number => {
                parse_int(&token.text).ok_or_else(|| format!("invalid number `{}`", token.text))
            }
            TokenKind::Literal => {
                let inner = token.text.trim_matches('\'');
                Ok(inner.chars().next().map_or(0, |c| c as i64))
            }
            TokenKind::Ident => {
                // Unknown function-like operators such as `__has_include(...)`.
                if self.peek().is_some_and(|t| t.is_punct("(")) {
                    let mut depth = 0;
                    while let Some(t) = self.next() {
                        if t.is_punct("(") {
                            depth += 1;
                        } else if t.is_punct(")") {
                            depth -= 1;
                            if depth == 0 {
                                break;
                            }
                        }
                    }
                }
                Ok(0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::header::lexer::tokenize;
    use std::sync::Arc;

    fn eval(text: &str) -> Result<i64, String> {
        evaluate(&tokenize(text, &Arc::from("t.h"), 1))
    }

    #[test]
    fn test_arithmetic_and_precedence() {
        assert_eq!(eval("1 + 2 * 3").unwrap(), 7);
        assert_eq!(eval("(1 + 2) * 3").unwrap(), 9);
        assert_eq!(eval("1 << 4 | 1").unwrap(), 17);
        assert_eq!(eval("-3 + 5").unwrap(), 2);
    }

    #[test]
    fn test_comparisons_and_logic() {
        assert_eq!(eval("21 >= 21 && 9 < 14").unwrap(), 1);
        assert_eq!(eval("!1 || 0").unwrap(), 0);
        assert_eq!(eval("1 ? 5 : 6").unwrap(), 5);
        assert_eq!(eval("0 ? 5 : 6").unwrap(), 6);
    }

    #[test]
    fn test_unknown_identifiers_are_zero() {
        assert_eq!(eval("__cplusplus").unwrap(), 0);
        assert_eq!(eval("__has_include(<foo.h>) || 2").unwrap(), 1);
    }

    #[test]
    fn test_literals() {
        assert_eq!(parse_int("0x10"), Some(16));
        assert_eq!(parse_int("010"), Some(8));
        assert_eq!(parse_int("200809L"), Some(200809));
        assert_eq!(eval("'A'").unwrap(), 65);
    }

    #[test]
    fn test_errors() {
        assert!(eval("1 / 0").is_err());
        assert!(eval("(1").is_err());
        assert!(eval("1 2").is_err());
        assert!(evaluate(&[]).is_err());
    }
}

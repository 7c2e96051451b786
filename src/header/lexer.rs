//! Tokenizer for C header text.

use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Ident,
    Number,
    /// String or character literal, quotes included.
    Literal,
    Punct,
}

/// A token with its presumed source position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    pub text: String,
    pub file: Arc<str>,
    pub line: u32,
    pub column: u32,
    /// Names a function-like macro; the parser drops it with its arguments.
    pub macro_call: bool,
}

impl Token {
    pub fn is_ident(&self) -> bool {
        self.kind == TokenKind::Ident
    }

    pub fn is_punct(&self, punct: &str) -> bool {
        self.kind == TokenKind::Punct && self.text == punct
    }

    pub fn is_ident_named(&self, name: &str) -> bool {
        self.kind == TokenKind::Ident && self.text == name
    }
}

const PUNCTS: [&str; 14] = [
    "...", "<<", ">>", "<=", ">=", "==", "!=", "&&", "||", "::", "->", "##", "++", "--",
];

/// Replace comments with spaces, keeping line structure and columns intact.
pub fn strip_comments(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    let mut chars = source.chars().peekable();
    let mut in_string: Option<char> = None;

    while let Some(c) = chars.next() {
        if let Some(quote) = in_string {
            out.push(c);
            if c == '\\' {
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            } else if c == quote || c == '\n' {
                in_string = None;
            }
            continue;
        }

        match c {
            '"' | '\'' => {
                in_string = Some(c);
                out.push(c);
            }
            '/' if chars.peek() == Some(&'/') => {
                out.push(' ');
                while let Some(&next) = chars.peek() {
                    if next == '\n' {
                        break;
                    }
                    out.push(' ');
                    chars.next();
                }
            }
            '/' if chars.peek() == Some(&'*') => {
                chars.next();
                out.push_str("  ");
                let mut prev = '\0';
                for next in chars.by_ref() {
                    if prev == '*' && next == '/' {
                        out.push(' ');
                        break;
                    }
                    out.push(if next == '\n' { '\n' } else { ' ' });
                    prev = next;
                }
            }
            _ => out.push(c),
        }
    }

    out
}

/// Split source into logical lines, joining backslash continuations.
///
/// Each logical line is tagged with the physical line number it starts on.
pub fn logical_lines(source: &str) -> Vec<(u32, String)> {
    let mut lines = Vec::new();
    let mut pending: Option<(u32, String)> = None;

    for (index, raw) in source.lines().enumerate() {
        let number = index as u32 + 1;
        let (start, mut text) = pending.take().unwrap_or((number, String::new()));

        match raw.strip_suffix('\\') {
            Some(body) => {
                text.push_str(body);
                text.push(' ');
                pending = Some((start, text));
            }
            None => {
                text.push_str(raw);
                lines.push((start, text));
            }
        }
    }

    if let Some(rest) = pending {
        lines.push(rest);
    }
    lines
}

/// Tokenize one logical line.
pub fn tokenize(text: &str, file: &Arc<str>, line: u32) -> Vec<Token> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i] as char;
        if bytes[i].is_ascii_whitespace() {
            i += 1;
            continue;
        }

        let start = i;
        let kind = if c.is_ascii_alphabetic() || c == '_' {
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            TokenKind::Ident
        } else if c.is_ascii_digit()
            || (c == '.' && bytes.get(i + 1).is_some_and(u8::is_ascii_digit))
        {
            while i < bytes.len()
                && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'.' || bytes[i] == b'_')
            {
                i += 1;
            }
            TokenKind::Number
        } else if c == '"' || c == '\'' {
            i += 1;
            while i < bytes.len() && bytes[i] as char != c {
                if bytes[i] == b'\\' {
                    i += 1;
                }
                i += 1;
            }
            i = (i + 1).min(bytes.len());
            TokenKind::Literal
        } else {
            let rest = &text[i..];
            let len = PUNCTS
                .iter()
                .find(|p| rest.starts_with(*p))
                .map_or_else(|| rest.chars().next().map_or(1, char::len_utf8), |p| p.len());
            i += len;
            TokenKind::Punct
        };

        tokens.push(Token {
            kind,
            text: text[start..i].to_string(),
            file: Arc::clone(file),
            line,
            column: start as u32 + 1,
            macro_call: false,
        });
    }

    tokens
}

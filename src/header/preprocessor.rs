//! A small C preprocessor.
//!
//! Handles conditionals, object-like macro expansion, includes and `#line`.
//! Function-like macros are recorded but not expanded; their invocations are
//! marked so the declaration scanner can drop them.

use std::collections::{HashMap, HashSet};
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use crate::core::{VersionerError, VersionerResult};

use super::expr;
use super::lexer::{logical_lines, strip_comments, tokenize, Token, TokenKind};
use super::parser::ANNOTATION_MACROS;

#[derive(Debug, Clone)]
enum Macro {
    Object(Vec<Token>),
    Function,
}

#[derive(Debug, Clone, Copy)]
struct Conditional {
    parent_active: bool,
    active: bool,
    taken: bool,
}

/// One translation unit's worth of preprocessing state.
pub struct Preprocessor<'a> {
    search_path: &'a [PathBuf],
    macros: HashMap<String, Macro>,
    conditionals: Vec<Conditional>,
    included: HashSet<PathBuf>,
    output: Vec<Token>,
}

/// Where the presumed location of the next line comes from.
struct FileState {
    presumed: Arc<str>,
    line_offset: i64,
}

impl<'a> Preprocessor<'a> {
    pub fn new(search_path: &'a [PathBuf]) -> Self {
        Self {
            search_path,
            macros: HashMap::new(),
            conditionals: Vec::new(),
            included: HashSet::new(),
            output: Vec::new(),
        }
    }

    /// Predefine an object-like macro, as `-Dname=value` would.
    pub fn define(&mut self, name: &str, value: &str) {
        let file: Arc<str> = Arc::from("<command line>");
        self.macros
            .insert(name.to_string(), Macro::Object(tokenize(value, &file, 0)));
    }

    pub fn is_defined(&self, name: &str) -> bool {
        self.macros.contains_key(name)
    }

    /// Preprocess `path` and everything it includes.
    pub fn run(mut self, path: &Path) -> VersionerResult<Vec<Token>> {
        self.process_file(path)?;
        Ok(self.output)
    }

    fn active(&self) -> bool {
        self.conditionals.last().map_or(true, |c| c.active)
    }

    fn process_file(&mut self, path: &Path) -> VersionerResult<()> {
        let path = normalize(path);
        let identity = path.canonicalize().unwrap_or_else(|_| path.clone());
        if !self.included.insert(identity) {
            return Ok(());
        }

        let source = std::fs::read_to_string(&path).map_err(|e| VersionerError::io(&path, e))?;
        let source = strip_comments(&source);

        let mut state = FileState {
            presumed: Arc::from(path.display().to_string()),
            line_offset: 0,
        };
        let depth = self.conditionals.len();

        for (number, text) in logical_lines(&source) {
            let line = (number as i64 + state.line_offset).max(0) as u32;
            let trimmed = text.trim_start();

            if let Some(directive) = trimmed.strip_prefix('#') {
                self.directive(&path, &mut state, number, line, directive)?;
                continue;
            }
            if !self.active() {
                continue;
            }

            let tokens = tokenize(&text, &state.presumed, line);
            let mut hidden = Vec::new();
            let mut expanded = Vec::with_capacity(tokens.len());
            self.expand_into(&tokens, &mut hidden, &mut expanded);
            self.output.extend(expanded);
        }

        if self.conditionals.len() > depth {
            self.conditionals.truncate(depth);
            return Err(VersionerError::Preprocessor {
                file: state.presumed.to_string(),
                line: 0,
                message: "unterminated conditional directive".to_string(),
            });
        }
        Ok(())
    }

    fn directive(
        &mut self,
        path: &Path,
        state: &mut FileState,
        physical_line: u32,
        line: u32,
        text: &str,
    ) -> VersionerResult<()> {
        let tokens = tokenize(text, &state.presumed, line);
        let Some(name) = tokens.first() else {
            return Ok(());
        };
        let rest = &tokens[1..];

        let error = |message: String| VersionerError::Preprocessor {
            file: state.presumed.to_string(),
            line,
            message,
        };

        match name.text.as_str() {
            "ifdef" | "ifndef" => {
                let defined = rest.first().is_some_and(|t| self.is_defined(&t.text));
                self.push_conditional(defined == (name.text == "ifdef"));
            }
            "if" => {
                let value = if self.active() {
                    self.condition(rest).map_err(error)?
                } else {
                    false
                };
                self.push_conditional(value);
            }
            "elif" => {
                let Some(top) = self.conditionals.last().copied() else {
                    return Err(error("#elif without #if".to_string()));
                };
                let value = if top.parent_active && !top.taken {
                    self.condition(rest).map_err(error)?
                } else {
                    false
                };
                if let Some(top) = self.conditionals.last_mut() {
                    top.active = value;
                    top.taken |= value;
                }
            }
            "else" => {
                let Some(top) = self.conditionals.last_mut() else {
                    return Err(error("#else without #if".to_string()));
                };
                top.active = top.parent_active && !top.taken;
                top.taken = true;
            }
            "endif" => {
                if self.conditionals.pop().is_none() {
                    return Err(error("#endif without #if".to_string()));
                }
            }
            _ if !self.active() => {}
            "define" => self.define_directive(rest),
            "undef" => {
                if let Some(target) = rest.first() {
                    self.macros.remove(&target.text);
                }
            }
            "include" | "include_next" => {
                let spec = text.trim_start()[name.text.len()..].trim();
                return self.include(path, state, spec);
            }
            "line" => self.line_directive(state, physical_line, rest),
            _ if name.kind == TokenKind::Number => self.line_directive(state, physical_line, &tokens),
            "error" => {
                let message = text.trim_start()["error".len()..].trim();
                return Err(error(format!("#error {}", message)));
            }
            _ => {}
        }
        Ok(())
    }

    fn push_conditional(&mut self, value: bool) {
        let parent_active = self.active();
        self.conditionals.push(Conditional {
            parent_active,
            active: parent_active && value,
            taken: value,
        });
    }

    fn define_directive(&mut self, tokens: &[Token]) {
        let Some(name) = tokens.first().filter(|t| t.is_ident()) else {
            return;
        };
        if ANNOTATION_MACROS.contains(&name.text.as_str()) {
            return;
        }

        let function_like = tokens.get(1).is_some_and(|t| {
            t.is_punct("(") && t.column == name.column + name.text.len() as u32
        });
        let definition = if function_like {
            Macro::Function
        } else {
            Macro::Object(tokens[1..].to_vec())
        };
        self.macros.insert(name.text.clone(), definition);
    }

    fn line_directive(&mut self, state: &mut FileState, physical_line: u32, tokens: &[Token]) {
        let Some(number) = tokens.first().and_then(|t| expr::parse_int(&t.text)) else {
            return;
        };
        state.line_offset = number - (physical_line as i64 + 1);
        if let Some(file) = tokens.get(1).filter(|t| t.text.starts_with('"')) {
            state.presumed = Arc::from(file.text.trim_matches('"'));
        }
    }

    fn include(&mut self, path: &Path, state: &FileState, spec: &str) -> VersionerResult<()> {
        let (name, quoted) = if let Some(rest) = spec.strip_prefix('"') {
            (rest.split('"').next().unwrap_or_default(), true)
        } else if let Some(rest) = spec.strip_prefix('<') {
            (rest.split('>').next().unwrap_or_default(), false)
        } else {
            tracing::debug!("{}: skipping computed include `{}`", state.presumed, spec);
            return Ok(());
        };

        let current_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let local = quoted.then(|| current_dir.join(name));
        let found = local
            .into_iter()
            .chain(self.search_path.iter().map(|dir| dir.join(name)))
            .find(|candidate| candidate.is_file());

        let Some(target) = found else {
            tracing::debug!("{}: include `{}` not found", state.presumed, name);
            return Ok(());
        };
        match self.process_file(&target) {
            // Unreadable includes are skipped; only the root header must exist.
            Err(VersionerError::Io { path, source }) => {
                tracing::debug!("{}: cannot read {}: {}", state.presumed, path.display(), source);
                Ok(())
            }
            other => other,
        }
    }

    /// Evaluate an `#if` condition.
    fn condition(&self, tokens: &[Token]) -> Result<bool, String> {
        let mut resolved = Vec::with_capacity(tokens.len());
        let mut iter = tokens.iter().peekable();

        while let Some(token) = iter.next() {
            if !token.is_ident_named("defined") {
                resolved.push(token.clone());
                continue;
            }

            let parenthesized = iter.next_if(|t| t.is_punct("(")).is_some();
            let Some(target) = iter.next().filter(|t| t.is_ident()) else {
                return Err("`defined` without an identifier".to_string());
            };
            if parenthesized && iter.next_if(|t| t.is_punct(")")).is_none() {
                return Err("missing `)` after `defined`".to_string());
            }

            let value = if self.is_defined(&target.text) { "1" } else { "0" };
            resolved.push(Token {
                kind: TokenKind::Number,
                text: value.to_string(),
                ..target.clone()
            });
        }

        let mut hidden = Vec::new();
        let mut expanded = Vec::with_capacity(resolved.len());
        self.expand_into(&resolved, &mut hidden, &mut expanded);
        expr::evaluate(&expanded).map(|v| v != 0)
    }

    fn expand_into(&self, tokens: &[Token], hidden: &mut Vec<String>, out: &mut Vec<Token>) {
        for token in tokens {
            if token.is_ident() && !hidden.contains(&token.text) {
                match self.macros.get(&token.text) {
                    Some(Macro::Object(body)) => {
                        // Replacement tokens take the position of the macro name.
                        let placed: Vec<Token> = body
                            .iter()
                            .map(|t| Token {
                                file: Arc::clone(&token.file),
                                line: token.line,
                                column: token.column,
                                ..t.clone()
                            })
                            .collect();
                        hidden.push(token.text.clone());
                        self.expand_into(&placed, hidden, out);
                        hidden.pop();
                        continue;
                    }
                    Some(Macro::Function) => {
                        out.push(Token {
                            macro_call: true,
                            ..token.clone()
                        });
                        continue;
                    }
                    None => {}
                }
            }
            out.push(token.clone());
        }
    }
}

/// Lexically resolve `.` and `..` so one header always gets one name.
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

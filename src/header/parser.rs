//! Declaration scanner over preprocessed tokens.
//!
//! Splits the token stream into top-level statements and records every
//! function and variable declaration, together with the availability its
//! annotations describe for the target architecture.

use std::sync::OnceLock;

use regex::Regex;

use crate::core::{
    Arch, Availability, DeclarationLocation, HeaderDatabase, Linkage, LocationKey, SymbolKind,
    VersionerError, VersionerResult,
};

use super::lexer::{Token, TokenKind};

/// Names the scanner interprets itself. Headers may not redefine them.
pub const ANNOTATION_MACROS: &[&str] = &[
    "__INTRODUCED_IN",
    "__INTRODUCED_IN_32",
    "__INTRODUCED_IN_64",
    "__INTRODUCED_IN_ARM",
    "__INTRODUCED_IN_MIPS",
    "__INTRODUCED_IN_X86",
    "__DEPRECATED_IN",
    "__REMOVED_IN",
    "__attribute__",
    "__attribute",
];

/// Attribute shorthands dropped when a header uses them without defining them.
const BARE_ATTRIBUTES: &[&str] = &[
    "__unused",
    "__used",
    "__dead",
    "__noreturn",
    "__wur",
    "__pure",
    "__pure2",
    "__mallocfunc",
    "__returns_twice",
    "__attribute_const__",
];

/// Tokens that never name a declaration.
const KEYWORDS: &[&str] = &[
    "const",
    "__const",
    "volatile",
    "__volatile__",
    "restrict",
    "__restrict",
    "__restrict__",
    "signed",
    "__signed",
    "__signed__",
    "unsigned",
    "void",
    "char",
    "short",
    "int",
    "long",
    "float",
    "double",
    "_Bool",
    "bool",
    "wchar_t",
    "_Complex",
    "_Atomic",
    "_Noreturn",
    "struct",
    "union",
    "enum",
    "class",
    "register",
    "auto",
    "__extension__",
    "_Thread_local",
    "__thread",
    "thread_local",
    "noexcept",
    "throw",
];

/// Statements that start with these declare no symbols.
const SKIPPED_LEADERS: &[&str] = &[
    "using",
    "template",
    "namespace",
    "static_assert",
    "_Static_assert",
    "friend",
];

#[derive(Debug, Default)]
struct Annotations {
    availability: Availability,
    unavailable: bool,
    foreign_platforms: Vec<String>,
}

fn availability_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?:__)?availability(?:__)?\s*\(\s*(\w+)\s*,([^)]*)\)")
            .expect("availability pattern")
    })
}

fn version_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(introduced|deprecated|obsoleted)\s*=\s*(\d+)").expect("version pattern")
    })
}

fn unavailable_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b(?:__)?unavailable(?:__)?\b").expect("unavailable pattern"))
}

/// Record every declaration in `tokens` into `db`.
pub fn scan(tokens: &[Token], arch: Arch, db: &mut HeaderDatabase) -> VersionerResult<()> {
    let mut statement: Vec<Token> = Vec::new();
    let mut open_blocks = 0usize;
    let mut i = 0;

    while i < tokens.len() {
        let token = &tokens[i];
        if token.is_punct(";") {
            declare(&statement, false, arch, db)?;
            statement.clear();
        } else if token.is_punct("{") {
            if opens_block(&statement) {
                open_blocks += 1;
                statement.clear();
            } else {
                let end = matching(tokens, i, "{", "}");
                if is_function_header(&statement) {
                    declare(&statement, true, arch, db)?;
                    statement.clear();
                } else {
                    // Struct bodies and brace initializers collapse to one token.
                    statement.push(Token {
                        text: "{}".to_string(),
                        ..token.clone()
                    });
                }
                i = end;
            }
        } else if token.is_punct("}") {
            open_blocks = open_blocks.saturating_sub(1);
            statement.clear();
        } else {
            statement.push(token.clone());
        }
        i += 1;
    }

    Ok(())
}

/// Index of the token closing the group opened at `start`.
fn matching(tokens: &[Token], start: usize, open: &str, close: &str) -> usize {
    let mut depth = 0usize;
    for (offset, token) in tokens[start..].iter().enumerate() {
        if token.is_punct(open) {
            depth += 1;
        } else if token.is_punct(close) {
            depth -= 1;
            if depth == 0 {
                return start + offset;
            }
        }
    }
    tokens.len().saturating_sub(1)
}

/// `extern "C" {` and `namespace x {` do not nest declarations.
fn opens_block(statement: &[Token]) -> bool {
    if let [ext, lang] = statement {
        if ext.is_ident_named("extern") && lang.kind == TokenKind::Literal {
            return lang.text.contains('C');
        }
    }
    statement.len() <= 2 && statement.first().is_some_and(|t| t.is_ident_named("namespace"))
}

fn is_function_header(statement: &[Token]) -> bool {
    let Some(first) = statement.first() else {
        return false;
    };
    if first.is_ident_named("typedef") {
        return false;
    }

    // A tag body only opens a function when a parameter list precedes it,
    // as in `struct timespec make(void) {`.
    let mut depth = 0i32;
    let mut has_call = false;
    let mut previous: Option<&Token> = None;
    for token in statement {
        match token.text.as_str() {
            "(" if token.kind == TokenKind::Punct => {
                let attribute = previous.is_some_and(|p| {
                    ["__attribute__", "__attribute", "__declspec", "alignas", "_Alignas"]
                        .iter()
                        .any(|kw| p.is_ident_named(kw))
                });
                has_call |= depth == 0 && !attribute;
                depth += 1;
            }
            ")" if token.kind == TokenKind::Punct => depth -= 1,
            "=" if token.kind == TokenKind::Punct && depth == 0 => return false,
            _ => {}
        }
        previous = Some(token);
    }
    has_call
}

fn is_keyword(token: &Token) -> bool {
    token.is_ident() && KEYWORDS.contains(&token.text.as_str())
}

fn is_candidate(token: &Token) -> bool {
    token.is_ident() && !is_keyword(token)
}

/// Remove attributes, asm labels and annotation macros, collecting availability.
fn strip_annotations(statement: &[Token], arch: Arch) -> (Vec<Token>, Annotations) {
    let mut out = Vec::with_capacity(statement.len());
    let mut notes = Annotations::default();
    let mut i = 0;

    while i < statement.len() {
        let token = &statement[i];
        let has_group = statement.get(i + 1).is_some_and(|t| t.is_punct("("));
        let group_end = || matching(statement, i + 1, "(", ")");

        if token.is_ident() {
            let name = token.text.as_str();
            if (name == "__attribute__" || name == "__attribute") && has_group {
                let end = group_end();
                parse_attribute(&statement[(i + 2).min(end)..end], &mut notes);
                i = end + 1;
                continue;
            }
            if matches!(name, "__declspec" | "asm" | "__asm" | "__asm__") && has_group {
                i = group_end() + 1;
                continue;
            }
            if ANNOTATION_MACROS.contains(&name) && has_group {
                let end = group_end();
                if let Some(level) = annotation_level(&statement[(i + 2).min(end)..end]) {
                    apply_annotation(name, level, arch, &mut notes.availability);
                }
                i = end + 1;
                continue;
            }
            if (BARE_ATTRIBUTES.contains(&name) && !has_group)
                || name == "__BEGIN_DECLS"
                || name == "__END_DECLS"
            {
                i += 1;
                continue;
            }
            if token.macro_call {
                i = if has_group { group_end() + 1 } else { i + 1 };
                continue;
            }
        }

        out.push(token.clone());
        i += 1;
    }

    (out, notes)
}

/// The API level an annotation names; `14.0` reads as 14.
fn annotation_level(args: &[Token]) -> Option<u32> {
    args.iter()
        .find(|t| t.kind == TokenKind::Number)
        .and_then(|t| t.text.split('.').next())
        .and_then(|major| major.parse().ok())
}

fn apply_annotation(name: &str, level: u32, arch: Arch, availability: &mut Availability) {
    match name {
        "__INTRODUCED_IN" => availability.introduced = level,
        "__INTRODUCED_IN_32" if !arch.is_lp64() => availability.introduced = level,
        "__INTRODUCED_IN_64" if arch.is_lp64() => availability.introduced = level,
        "__INTRODUCED_IN_ARM" if arch == Arch::Arm => availability.introduced = level,
        "__INTRODUCED_IN_MIPS" if arch == Arch::Mips => availability.introduced = level,
        "__INTRODUCED_IN_X86" if arch == Arch::X86 => availability.introduced = level,
        "__DEPRECATED_IN" => availability.deprecated = level,
        "__REMOVED_IN" => availability.obsoleted = level,
        _ => {}
    }
}

/// Interpret the contents of `__attribute__((...))`.
fn parse_attribute(args: &[Token], notes: &mut Annotations) {
    let text = args
        .iter()
        .map(|t| t.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    for capture in availability_regex().captures_iter(&text) {
        let platform = &capture[1];
        if platform != "android" {
            notes.foreign_platforms.push(platform.to_string());
            continue;
        }

        let versions = &capture[2];
        for version in version_regex().captures_iter(versions) {
            let level = version[2].parse().unwrap_or(0);
            match &version[1] {
                "introduced" => notes.availability.introduced = level,
                "deprecated" => notes.availability.deprecated = level,
                _ => notes.availability.obsoleted = level,
            }
        }
        if unavailable_regex().is_match(versions) {
            notes.unavailable = true;
        }
    }

    let rest = availability_regex().replace_all(&text, "");
    if unavailable_regex().is_match(&rest) {
        notes.unavailable = true;
    }
}

/// Statements like `struct foo;` or `enum { A, B };` that declare only a tag.
fn is_tag_only(tokens: &[Token]) -> bool {
    let Some(pos) = tokens.iter().position(|t| {
        ["struct", "union", "enum", "class"]
            .iter()
            .any(|kw| t.is_ident_named(kw))
    }) else {
        return false;
    };

    let rest = &tokens[pos + 1..];
    tokens[..pos].iter().all(is_keyword)
        && rest.len() <= 2
        && rest.iter().all(|t| t.is_ident() || t.is_punct("{}"))
}

/// Split at top-level commas.
fn split_declarators(tokens: &[Token]) -> Vec<&[Token]> {
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    for (i, token) in tokens.iter().enumerate() {
        if token.kind != TokenKind::Punct {
            continue;
        }
        match token.text.as_str() {
            "(" | "[" => depth += 1,
            ")" | "]" => depth -= 1,
            "," if depth == 0 => {
                parts.push(&tokens[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&tokens[start..]);
    parts
}

/// The declared name and whether it is a function.
fn declarator_name(tokens: &[Token]) -> Option<(&Token, SymbolKind)> {
    let paren = tokens.iter().position(|t| t.is_punct("("));
    let Some(open) = paren else {
        // Plain variable: last candidate before array bounds or an initializer.
        let end = tokens
            .iter()
            .position(|t| t.is_punct("[") || t.is_punct("="))
            .unwrap_or(tokens.len());
        return tokens[..end]
            .iter()
            .rev()
            .find(|t| is_candidate(t))
            .map(|t| (t, SymbolKind::Variable));
    };

    if let Some(name) = open.checked_sub(1).map(|p| &tokens[p]) {
        if is_candidate(name) {
            return Some((name, SymbolKind::Function));
        }
    }

    // Parenthesized declarator: `(*name)(...)`, `(*name(args))(...)` or `(name)(...)`.
    let close = matching(tokens, open, "(", ")");
    let group = &tokens[(open + 1).min(close)..close];
    let mut depth = 0i32;
    let mut found = None;
    for (i, token) in group.iter().enumerate() {
        if token.is_punct("(") {
            if depth == 0 && found.is_some() {
                break;
            }
            depth += 1;
        } else if token.is_punct(")") {
            depth -= 1;
        } else if depth == 0 && is_candidate(token) {
            found = Some(i);
        }
    }

    let index = found?;
    let name = &group[index];
    if group.get(index + 1).is_some_and(|t| t.is_punct("(")) {
        return Some((name, SymbolKind::Function));
    }

    let is_pointer = group[..index]
        .iter()
        .any(|t| t.is_punct("*") || t.is_punct("^") || t.is_punct("&"));
    let called = tokens.get(close + 1).is_some_and(|t| t.is_punct("("));
    if called && !is_pointer {
        Some((name, SymbolKind::Function))
    } else {
        Some((name, SymbolKind::Variable))
    }
}

fn has_initializer(tokens: &[Token]) -> bool {
    let mut depth = 0i32;
    tokens.iter().any(|t| {
        match t.text.as_str() {
            "(" | "[" if t.kind == TokenKind::Punct => depth += 1,
            ")" | "]" if t.kind == TokenKind::Punct => depth -= 1,
            _ => {}
        }
        depth == 0 && t.is_punct("=")
    })
}

fn declare(
    statement: &[Token],
    has_body: bool,
    arch: Arch,
    db: &mut HeaderDatabase,
) -> VersionerResult<()> {
    let (tokens, notes) = strip_annotations(statement, arch);
    let Some(first) = tokens.first() else {
        return Ok(());
    };
    if SKIPPED_LEADERS.iter().any(|kw| first.is_ident_named(kw))
        || tokens.iter().any(|t| t.is_ident_named("typedef") || t.is_ident_named("operator"))
        || is_tag_only(&tokens)
    {
        return Ok(());
    }

    let mut is_extern = false;
    let mut is_static = false;
    let body: Vec<Token> = tokens
        .into_iter()
        .filter(|t| match t.text.as_str() {
            "extern" if t.is_ident() => {
                is_extern = true;
                false
            }
            "static" if t.is_ident() => {
                is_static = true;
                false
            }
            "inline" | "__inline" | "__inline__" if t.is_ident() => false,
            // Language linkage of `extern "C" int f(void);`
            "\"C\"" | "\"C++\"" => false,
            _ => true,
        })
        .collect();

    for declarator in split_declarators(&body) {
        let Some((name, kind)) = declarator_name(declarator) else {
            continue;
        };
        let position = format!("{}:{}:{}", name.file, name.line, name.column);

        for platform in &notes.foreign_platforms {
            tracing::warn!(
                "{}: ignoring availability for platform `{}` on `{}`",
                position,
                platform,
                name.text
            );
        }
        if notes.unavailable {
            tracing::debug!("{}: skipping unavailable declaration `{}`", position, name.text);
            continue;
        }

        let is_definition = match kind {
            SymbolKind::Function => has_body,
            SymbolKind::Variable => has_initializer(declarator),
        };
        if kind == SymbolKind::Variable && !is_extern && !is_definition {
            return Err(VersionerError::TentativeDefinition {
                symbol: name.text.clone(),
                location: position,
            });
        }

        let location = DeclarationLocation {
            key: LocationKey {
                filename: name.file.to_string(),
                line: name.line,
                column: name.column,
                kind,
                linkage: if is_static {
                    Linkage::Static
                } else {
                    Linkage::Extern
                },
                is_definition,
            },
            availability: notes.availability,
        };
        db.insert(&name.text, location)?;
    }

    Ok(())
}

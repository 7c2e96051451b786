//! Header parsing.
//!
//! Every header is preprocessed as its own translation unit for a given
//! compilation type, then scanned for function and variable declarations.
//! Declarations reached through includes are recorded under the file they
//! were written in, so a header shared by many translation units yields one
//! location per declaration.

mod expr;
pub mod lexer;
mod parser;
mod preprocessor;

use std::path::PathBuf;

use crate::core::{CompilationType, HeaderDatabase, VersionerResult};

pub use preprocessor::Preprocessor;

/// Extracts declarations from a set of headers for one compilation type.
pub trait HeaderParser: Send + Sync {
    fn parse(
        &self,
        compilation_type: CompilationType,
        headers: &[PathBuf],
        search_path: &[PathBuf],
    ) -> VersionerResult<HeaderDatabase>;
}

/// Macros defined for every translation unit, as `-D` flags would.
pub fn predefined_macros(compilation_type: CompilationType) -> Vec<(String, String)> {
    let mut macros: Vec<(String, String)> = [
        ("__ANDROID__", "1"),
        ("ANDROID", "1"),
        ("_FORTIFY_SOURCE", "2"),
        ("_GNU_SOURCE", "1"),
        ("__STDC__", "1"),
        ("__GNUC__", "4"),
        ("__clang__", "1"),
    ]
    .into_iter()
    .map(|(name, value)| (name.to_string(), value.to_string()))
    .collect();

    macros.push((
        "__ANDROID_API__".to_string(),
        compilation_type.api_level.to_string(),
    ));
    macros.extend(
        compilation_type
            .arch
            .predefined_macros()
            .iter()
            .map(|name| (name.to_string(), "1".to_string())),
    );
    macros
}

/// The built-in parser: a small preprocessor plus a declaration scanner.
#[derive(Debug, Clone, Default)]
pub struct SourceParser {
    defines: Vec<(String, String)>,
}

impl SourceParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a macro definition on top of the predefined ones.
    pub fn with_define(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.defines.push((name.into(), value.into()));
        self
    }
}

impl HeaderParser for SourceParser {
    fn parse(
        &self,
        compilation_type: CompilationType,
        headers: &[PathBuf],
        search_path: &[PathBuf],
    ) -> VersionerResult<HeaderDatabase> {
        let defines = predefined_macros(compilation_type);
        let mut db = HeaderDatabase::new();

        for header in headers {
            let mut preprocessor = Preprocessor::new(search_path);
            for (name, value) in defines.iter().chain(&self.defines) {
                preprocessor.define(name, value);
            }

            let tokens = preprocessor.run(header)?;
            parser::scan(&tokens, compilation_type.arch, &mut db)?;
        }

        tracing::debug!(
            "{}: {} declarations from {} headers",
            compilation_type,
            db.len(),
            headers.len()
        );
        Ok(db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Arch, Availability, Linkage, SymbolKind, VersionerError};
    use crate::test_support::write_header;
    use tempfile::TempDir;

    fn parse(
        root: &std::path::Path,
        headers: &[&str],
        ct: CompilationType,
    ) -> VersionerResult<HeaderDatabase> {
        let headers: Vec<PathBuf> = headers.iter().map(|h| root.join(h)).collect();
        SourceParser::new().parse(ct, &headers, &[root.to_path_buf()])
    }

    #[test]
    fn test_api_level_guards() {
        let tmp = TempDir::new().unwrap();
        write_header(
            tmp.path(),
            "foo.h",
            "#if __ANDROID_API__ >= 21\nint newer(void) __INTRODUCED_IN(21);\n#endif\nint older(void);\n",
        );

        let low = parse(tmp.path(), &["foo.h"], CompilationType::new(Arch::Arm, 19)).unwrap();
        assert!(low.get("newer").is_none());
        assert!(low.get("older").is_some());

        let high = parse(tmp.path(), &["foo.h"], CompilationType::new(Arch::Arm, 21)).unwrap();
        let newer = high.get("newer").unwrap();
        assert_eq!(newer.availability(), Some(Availability::introduced(21)));
    }

    #[test]
    fn test_arch_macros() {
        let tmp = TempDir::new().unwrap();
        write_header(
            tmp.path(),
            "bits.h",
            "#if defined(__LP64__)\nlong wide(void);\n#else\nint narrow(void);\n#endif\n",
        );

        let arm = parse(tmp.path(), &["bits.h"], CompilationType::new(Arch::Arm, 9)).unwrap();
        assert!(arm.get("narrow").is_some());
        let arm64 = parse(tmp.path(), &["bits.h"], CompilationType::new(Arch::Arm64, 21)).unwrap();
        assert!(arm64.get("wide").is_some());
    }

    #[test]
    fn test_shared_include_yields_one_location() {
        let tmp = TempDir::new().unwrap();
        write_header(tmp.path(), "common.h", "#pragma once\nint shared(void);\n");
        write_header(tmp.path(), "a.h", "#include <common.h>\nint a(void);\n");
        write_header(tmp.path(), "b.h", "#include \"common.h\"\nint b(void);\n");

        let db = parse(
            tmp.path(),
            &["a.h", "b.h", "common.h"],
            CompilationType::new(Arch::X86, 9),
        )
        .unwrap();
        let shared = db.get("shared").unwrap();
        assert_eq!(shared.locations.len(), 1);
        assert!(shared.locations.iter().next().unwrap().filename().ends_with("common.h"));
    }

    #[test]
    fn test_line_directive_moves_location() {
        let tmp = TempDir::new().unwrap();
        write_header(tmp.path(), "gen.h", "#line 40 \"orig.h\"\nint f(void);\n");

        let db = parse(tmp.path(), &["gen.h"], CompilationType::new(Arch::Arm, 9)).unwrap();
        let loc = db.get("f").unwrap().locations.iter().next().unwrap().clone();
        assert_eq!(loc.filename(), "orig.h");
        assert_eq!(loc.line(), 40);
    }

    #[test]
    fn test_inline_definition_in_header() {
        let tmp = TempDir::new().unwrap();
        write_header(
            tmp.path(),
            "inl.h",
            "static __inline__ int helper(int x) { return x + 1; }\n",
        );

        let db = parse(tmp.path(), &["inl.h"], CompilationType::new(Arch::Mips, 9)).unwrap();
        let loc = db.get("helper").unwrap().locations.iter().next().unwrap().clone();
        assert!(loc.is_definition());
        assert_eq!(loc.linkage(), Linkage::Static);
        assert_eq!(loc.kind(), SymbolKind::Function);
    }

    #[test]
    fn test_tentative_definition_rejected_everywhere() {
        let tmp = TempDir::new().unwrap();
        write_header(tmp.path(), "bad.h", "int oops;\n");

        for ct in [
            CompilationType::new(Arch::Arm, 9),
            CompilationType::new(Arch::X86_64, 24),
        ] {
            let err = parse(tmp.path(), &["bad.h"], ct).unwrap_err();
            assert!(matches!(err, VersionerError::TentativeDefinition { .. }));
        }
    }

    #[test]
    fn test_missing_header_is_io_error() {
        let tmp = TempDir::new().unwrap();
        let err = parse(tmp.path(), &["nope.h"], CompilationType::new(Arch::Arm, 9)).unwrap_err();
        assert!(matches!(err, VersionerError::Io { .. }));
    }

    #[test]
    fn test_extra_defines() {
        let tmp = TempDir::new().unwrap();
        write_header(tmp.path(), "opt.h", "#ifdef EXTRA\nint extra(void);\n#endif\n");

        let parser = SourceParser::new().with_define("EXTRA", "1");
        let db = parser
            .parse(
                CompilationType::new(Arch::Arm, 9),
                &[tmp.path().join("opt.h")],
                &[],
            )
            .unwrap();
        assert!(db.get("extra").is_some());
    }
}

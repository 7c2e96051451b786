//! Header compilation across the whole compilation matrix.
//!
//! Per-architecture inputs (header list and include search path) are computed
//! once up front. Each compilation type is then parsed as one task on a
//! fixed-size worker pool, and the per-type results are transposed into a
//! [`DeclarationDatabase`].

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;

use crate::core::{
    Arch, CompilationType, HeaderDatabase, TargetCatalog, VersionerError, VersionerResult,
};
use crate::database::DeclarationDatabase;
use crate::header::HeaderParser;
use crate::util::fs::{collect_files, list_dir, relative_display};

/// Worker pool size when none is requested.
pub const DEFAULT_JOBS: usize = 8;

/// Options for header compilation.
#[derive(Debug, Clone)]
pub struct CompileOptions {
    /// Root of the headers under test.
    pub header_dir: PathBuf,
    /// Directory whose entries are added to the include search path.
    pub dependency_dir: Option<PathBuf>,
    /// Worker pool size
    pub jobs: usize,
    /// Show a progress bar
    pub progress: bool,
}

impl CompileOptions {
    pub fn new(header_dir: impl Into<PathBuf>) -> Self {
        CompileOptions {
            header_dir: header_dir.into(),
            dependency_dir: None,
            jobs: DEFAULT_JOBS,
            progress: false,
        }
    }
}

/// Inputs shared by every compilation type of one architecture.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchInputs {
    pub headers: Vec<PathBuf>,
    pub search_path: Vec<PathBuf>,
}

/// Compute the header list and search path for each of `archs`.
pub fn arch_inputs(
    catalog: &TargetCatalog,
    options: &CompileOptions,
    archs: &BTreeSet<Arch>,
) -> VersionerResult<BTreeMap<Arch, ArchInputs>> {
    let headers = collect_files(&options.header_dir)?;

    let mut search_path = vec![options.header_dir.clone()];
    if let Some(deps) = &options.dependency_dir {
        search_path.extend(list_dir(deps)?);
    }

    let mut inputs = BTreeMap::new();
    for &arch in archs {
        let triple = catalog.triple(arch)?;
        let selected: Vec<PathBuf> = headers
            .iter()
            .filter(|header| {
                let relative = relative_display(&options.header_dir, header);
                let skipped = catalog.skips_header(&relative, arch);
                if skipped {
                    tracing::debug!("{}: skipping {}", arch, relative);
                }
                !skipped
            })
            .cloned()
            .collect();
        tracing::debug!("{} ({}): {} headers", arch, triple, selected.len());

        inputs.insert(
            arch,
            ArchInputs {
                headers: selected,
                search_path: search_path.clone(),
            },
        );
    }
    Ok(inputs)
}

/// Parse the headers for every entry of `matrix`.
///
/// The first parser error stops any task that has not started yet and is
/// returned; no partial database is produced.
pub fn compile_headers(
    parser: &dyn HeaderParser,
    catalog: &TargetCatalog,
    matrix: &BTreeSet<CompilationType>,
    options: &CompileOptions,
) -> VersionerResult<DeclarationDatabase> {
    let archs: BTreeSet<Arch> = matrix.iter().map(|t| t.arch).collect();
    let inputs = arch_inputs(catalog, options, &archs)?;

    let jobs = options.jobs.max(1);
    tracing::info!(
        "compiling headers in {} for {} compilation types ({} jobs)",
        options.header_dir.display(),
        matrix.len(),
        jobs
    );

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(jobs)
        .build()
        .map_err(|e| VersionerError::WorkerPool(e.to_string()))?;

    let pb = if options.progress && matrix.len() > 1 {
        let pb = ProgressBar::new(matrix.len() as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}");
        if let Ok(style) = style {
            pb.set_style(style.progress_chars("#>-"));
        }
        Some(pb)
    } else {
        None
    };

    let results: Mutex<BTreeMap<CompilationType, HeaderDatabase>> = Mutex::new(BTreeMap::new());
    let first_error: Mutex<Option<VersionerError>> = Mutex::new(None);
    let failed = AtomicBool::new(false);

    pool.install(|| {
        matrix.par_iter().for_each(|&compilation_type| {
            if failed.load(Ordering::SeqCst) {
                return;
            }

            let Some(arch) = inputs.get(&compilation_type.arch) else {
                return;
            };
            match parser.parse(compilation_type, &arch.headers, &arch.search_path) {
                Ok(db) => {
                    results
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .insert(compilation_type, db);
                }
                Err(e) => {
                    failed.store(true, Ordering::SeqCst);
                    first_error
                        .lock()
                        .unwrap_or_else(PoisonError::into_inner)
                        .get_or_insert(e);
                }
            }

            if let Some(pb) = &pb {
                pb.set_message(compilation_type.to_string());
                pb.inc(1);
            }
        });
    });

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    if let Some(e) = first_error
        .into_inner()
        .unwrap_or_else(PoisonError::into_inner)
    {
        return Err(e);
    }

    let per_type = results.into_inner().unwrap_or_else(PoisonError::into_inner);
    let db = DeclarationDatabase::from_headers(per_type);
    tracing::info!("declaration database has {} symbols", db.len());
    Ok(db)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Availability;
    use crate::header::SourceParser;
    use crate::test_support::{catalog, write_header};
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    fn matrix(arch: Arch, levels: &[u32]) -> BTreeSet<CompilationType> {
        levels
            .iter()
            .map(|&level| CompilationType::new(arch, level))
            .collect()
    }

    struct CountingParser {
        calls: AtomicUsize,
        fail_at: Option<CompilationType>,
    }

    impl HeaderParser for CountingParser {
        fn parse(
            &self,
            compilation_type: CompilationType,
            headers: &[PathBuf],
            _search_path: &[PathBuf],
        ) -> VersionerResult<HeaderDatabase> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_at == Some(compilation_type) {
                return Err(VersionerError::TentativeDefinition {
                    symbol: "broken".to_string(),
                    location: "broken.h:1:5".to_string(),
                });
            }
            let mut db = HeaderDatabase::new();
            for header in headers {
                let name = header.file_stem().unwrap().to_string_lossy().to_string();
                db.insert(
                    &name,
                    crate::test_support::location("x.h", 1, Availability::default()),
                )
                .unwrap();
            }
            Ok(db)
        }
    }

    #[test]
    fn test_compile_builds_database() {
        let tmp = TempDir::new().unwrap();
        write_header(tmp.path(), "foo.h", "void foo(void) __INTRODUCED_IN(14);\n");

        let cat = catalog(&[(Arch::Arm, 9)], &[9, 14]);
        let db = compile_headers(
            &SourceParser::new(),
            &cat,
            &matrix(Arch::Arm, &[9, 14]),
            &CompileOptions::new(tmp.path()),
        )
        .unwrap();

        let cells = db.get("foo").unwrap();
        assert_eq!(cells.len(), 2);
        for decl in cells.values() {
            assert_eq!(decl.availability(), Some(Availability::introduced(14)));
        }
    }

    #[test]
    fn test_one_task_per_compilation_type() {
        let tmp = TempDir::new().unwrap();
        write_header(tmp.path(), "a.h", "");
        let parser = CountingParser {
            calls: AtomicUsize::new(0),
            fail_at: None,
        };

        let cat = catalog(&[(Arch::Arm, 9)], &[9, 12, 13, 14]);
        let mut options = CompileOptions::new(tmp.path());
        options.jobs = 2;
        let db = compile_headers(&parser, &cat, &matrix(Arch::Arm, &[9, 12, 13, 14]), &options)
            .unwrap();

        assert_eq!(parser.calls.load(Ordering::SeqCst), 4);
        assert_eq!(db.get("a").unwrap().len(), 4);
    }

    #[test]
    fn test_first_error_is_returned() {
        let tmp = TempDir::new().unwrap();
        write_header(tmp.path(), "a.h", "");
        let parser = CountingParser {
            calls: AtomicUsize::new(0),
            fail_at: Some(CompilationType::new(Arch::Arm, 12)),
        };

        let cat = catalog(&[(Arch::Arm, 9)], &[9, 12, 14]);
        let mut options = CompileOptions::new(tmp.path());
        options.jobs = 1;
        let err = compile_headers(&parser, &cat, &matrix(Arch::Arm, &[9, 12, 14]), &options)
            .unwrap_err();
        assert!(matches!(err, VersionerError::TentativeDefinition { .. }));
    }

    #[test]
    fn test_skipped_headers_are_not_compiled() {
        let tmp = TempDir::new().unwrap();
        write_header(tmp.path(), "sys/_system_properties.h", "int tentative;\n");
        write_header(tmp.path(), "ok.h", "int fine(void);\n");

        let cat = catalog(&[(Arch::Arm, 9)], &[9])
            .with_header_skip("sys/_system_properties.h", [Arch::Arm]);
        let db = compile_headers(
            &SourceParser::new(),
            &cat,
            &matrix(Arch::Arm, &[9]),
            &CompileOptions::new(tmp.path()),
        )
        .unwrap();
        assert!(db.get("fine").is_some());
    }

    #[test]
    fn test_dependency_entries_join_search_path() {
        let tmp = TempDir::new().unwrap();
        let headers = tmp.path().join("include");
        let deps = tmp.path().join("deps");
        write_header(&deps, "common/dep.h", "#define DEP_LEVEL 12\n");
        write_header(
            &headers,
            "uses.h",
            "#include <dep.h>\n#if DEP_LEVEL == 12\nint from_dep(void);\n#endif\n",
        );

        let mut options = CompileOptions::new(&headers);
        options.dependency_dir = Some(deps.clone());

        let cat = catalog(&[(Arch::Arm, 9)], &[9]);
        let inputs = arch_inputs(&cat, &options, &BTreeSet::from([Arch::Arm])).unwrap();
        assert_eq!(
            inputs[&Arch::Arm].search_path,
            vec![headers.clone(), deps.join("common")]
        );

        let db =
            compile_headers(&SourceParser::new(), &cat, &matrix(Arch::Arm, &[9]), &options).unwrap();
        assert!(db.get("from_dep").is_some());
        assert!(db.get("DEP_LEVEL").is_none());
    }

    #[test]
    fn test_inputs_require_catalog_arch() {
        let tmp = TempDir::new().unwrap();
        write_header(tmp.path(), "ok.h", "int fine(void);\n");

        let cat = catalog(&[(Arch::Arm, 9)], &[9]);
        let options = CompileOptions::new(tmp.path());
        let err = arch_inputs(&cat, &options, &BTreeSet::from([Arch::X86])).unwrap_err();
        assert!(matches!(err, VersionerError::UnsupportedArch(Arch::X86)));
        assert!(arch_inputs(&cat, &options, &BTreeSet::from([Arch::Arm])).is_ok());
    }

    #[test]
    fn test_missing_header_dir() {
        let tmp = TempDir::new().unwrap();
        let cat = catalog(&[(Arch::Arm, 9)], &[9]);
        let err = compile_headers(
            &SourceParser::new(),
            &cat,
            &matrix(Arch::Arm, &[9]),
            &CompileOptions::new(tmp.path().join("missing")),
        )
        .unwrap_err();
        assert!(matches!(err, VersionerError::Io { .. }));
    }
}

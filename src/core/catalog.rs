//! Target catalog.
//!
//! The catalog is the static description of a platform: which architectures
//! and API levels exist, the lowest API level each architecture shipped with,
//! and the compiler triple used for it. It is passed around by reference so
//! that tests can run against small, purpose-built catalogs.
//!
//! A catalog can be loaded from TOML:
//!
//! ```toml
//! api_levels = [9, 14, 21]
//!
//! [archs.arm]
//! min_api = 9
//! triple = "arm-linux-androideabi"
//!
//! [header_skip]
//! "time64.h" = ["arm64"]
//! ```

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::arch::Arch;
use crate::core::errors::{VersionerError, VersionerResult};

/// Per-architecture catalog entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArchTarget {
    /// Lowest API level this architecture exists at.
    pub min_api: u32,
    /// Compiler target triple.
    pub triple: String,
}

/// Immutable platform configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetCatalog {
    api_levels: BTreeSet<u32>,
    archs: BTreeMap<Arch, ArchTarget>,
    header_skip: BTreeMap<String, BTreeSet<Arch>>,
}

/// On-disk shape of a catalog file.
#[derive(Debug, Deserialize)]
struct CatalogFile {
    api_levels: Vec<u32>,
    archs: BTreeMap<String, ArchTarget>,
    #[serde(default)]
    header_skip: BTreeMap<String, Vec<String>>,
}

impl Default for TargetCatalog {
    /// The Android NDK platform table.
    fn default() -> Self {
        let archs = [
            (Arch::Arm, 9, "arm-linux-androideabi"),
            (Arch::Arm64, 21, "aarch64-linux-android"),
            (Arch::Mips, 9, "mipsel-linux-android"),
            (Arch::Mips64, 21, "mips64el-linux-android"),
            (Arch::X86, 9, "i686-linux-android"),
            (Arch::X86_64, 21, "x86_64-linux-android"),
        ]
        .into_iter()
        .map(|(arch, min_api, triple)| {
            (
                arch,
                ArchTarget {
                    min_api,
                    triple: triple.to_string(),
                },
            )
        })
        .collect();

        let mut header_skip = BTreeMap::new();
        // Internal header, never meant to be compiled on its own.
        header_skip.insert(
            "sys/_system_properties.h".to_string(),
            Arch::ALL.into_iter().collect(),
        );
        // time64.h #errors on LP64.
        header_skip.insert(
            "time64.h".to_string(),
            Arch::ALL.into_iter().filter(Arch::is_lp64).collect(),
        );

        TargetCatalog {
            api_levels: [9, 12, 13, 14, 15, 16, 17, 18, 19, 21, 23, 24]
                .into_iter()
                .collect(),
            archs,
            header_skip,
        }
    }
}

impl TargetCatalog {
    /// Build a catalog from its parts, validating that it is usable.
    pub fn new(
        api_levels: impl IntoIterator<Item = u32>,
        archs: impl IntoIterator<Item = (Arch, ArchTarget)>,
    ) -> VersionerResult<Self> {
        let catalog = TargetCatalog {
            api_levels: api_levels.into_iter().collect(),
            archs: archs.into_iter().collect(),
            header_skip: BTreeMap::new(),
        };
        catalog.validate()?;
        Ok(catalog)
    }

    /// Skip `header` (relative to the header root) when compiling for `archs`.
    pub fn with_header_skip(
        mut self,
        header: impl Into<String>,
        archs: impl IntoIterator<Item = Arch>,
    ) -> Self {
        self.header_skip
            .entry(header.into())
            .or_default()
            .extend(archs);
        self
    }

    /// Load a catalog from a TOML file.
    pub fn load(path: &Path) -> VersionerResult<Self> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| VersionerError::io(path, e))?;
        Self::from_toml(&contents)
    }

    /// Parse a catalog from TOML text.
    pub fn from_toml(contents: &str) -> VersionerResult<Self> {
        let file: CatalogFile =
            toml::from_str(contents).map_err(|e| VersionerError::InvalidCatalog(e.to_string()))?;

        let mut archs = BTreeMap::new();
        for (name, target) in file.archs {
            let arch: Arch = name
                .parse()
                .map_err(|e: crate::core::arch::ArchParseError| {
                    VersionerError::InvalidCatalog(e.to_string())
                })?;
            archs.insert(arch, target);
        }

        let mut catalog = TargetCatalog::new(file.api_levels, archs)?;
        for (header, names) in file.header_skip {
            let mut skip = BTreeSet::new();
            for name in names {
                let arch: Arch = name.parse().map_err(|e: crate::core::arch::ArchParseError| {
                    VersionerError::InvalidCatalog(e.to_string())
                })?;
                skip.insert(arch);
            }
            catalog = catalog.with_header_skip(header, skip);
        }

        Ok(catalog)
    }

    fn validate(&self) -> VersionerResult<()> {
        if self.api_levels.is_empty() {
            return Err(VersionerError::InvalidCatalog(
                "no API levels defined".to_string(),
            ));
        }
        if self.archs.is_empty() {
            return Err(VersionerError::InvalidCatalog(
                "no architectures defined".to_string(),
            ));
        }
        for (arch, target) in &self.archs {
            if target.triple.is_empty() {
                return Err(VersionerError::InvalidCatalog(format!(
                    "architecture `{}` has no target triple",
                    arch
                )));
            }
            if !self.api_levels.iter().any(|&level| level >= target.min_api) {
                return Err(VersionerError::InvalidCatalog(format!(
                    "architecture `{}` has no API level at or above its minimum {}",
                    arch, target.min_api
                )));
            }
        }
        Ok(())
    }

    /// Supported API levels, ascending.
    pub fn api_levels(&self) -> &BTreeSet<u32> {
        &self.api_levels
    }

    /// Supported architectures, in canonical order.
    pub fn archs(&self) -> impl Iterator<Item = Arch> + '_ {
        self.archs.keys().copied()
    }

    pub fn supports_arch(&self, arch: Arch) -> bool {
        self.archs.contains_key(&arch)
    }

    pub fn supports_api_level(&self, level: u32) -> bool {
        self.api_levels.contains(&level)
    }

    /// Lowest API level `arch` exists at.
    pub fn min_api(&self, arch: Arch) -> VersionerResult<u32> {
        self.archs
            .get(&arch)
            .map(|t| t.min_api)
            .ok_or(VersionerError::UnsupportedArch(arch))
    }

    /// Compiler target triple for `arch`.
    pub fn triple(&self, arch: Arch) -> VersionerResult<&str> {
        self.archs
            .get(&arch)
            .map(|t| t.triple.as_str())
            .ok_or(VersionerError::UnsupportedArch(arch))
    }

    /// Whether `header` (path relative to the header root) is excluded for `arch`.
    pub fn skips_header(&self, header: &str, arch: Arch) -> bool {
        self.header_skip
            .get(header)
            .is_some_and(|archs| archs.contains(&arch))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_catalog() {
        let catalog = TargetCatalog::default();
        assert_eq!(catalog.min_api(Arch::Arm).unwrap(), 9);
        assert_eq!(catalog.min_api(Arch::X86_64).unwrap(), 21);
        assert_eq!(catalog.triple(Arch::Arm64).unwrap(), "aarch64-linux-android");
        assert!(catalog.supports_api_level(23));
        assert!(!catalog.supports_api_level(22));
        assert!(catalog.skips_header("time64.h", Arch::Arm64));
        assert!(!catalog.skips_header("time64.h", Arch::Arm));
        assert!(catalog.skips_header("sys/_system_properties.h", Arch::X86));
    }

    #[test]
    fn test_catalog_from_toml() {
        let catalog = TargetCatalog::from_toml(
            r#"
api_levels = [9, 14]

[archs.arm]
min_api = 9
triple = "arm-linux-androideabi"

[header_skip]
"private.h" = ["arm"]
"#,
        )
        .unwrap();

        assert_eq!(catalog.archs().collect::<Vec<_>>(), vec![Arch::Arm]);
        assert_eq!(
            catalog.api_levels().iter().copied().collect::<Vec<_>>(),
            vec![9, 14]
        );
        assert!(catalog.skips_header("private.h", Arch::Arm));
        assert!(matches!(
            catalog.min_api(Arch::X86),
            Err(VersionerError::UnsupportedArch(Arch::X86))
        ));
    }

    #[test]
    fn test_catalog_rejects_unreachable_floor() {
        let err = TargetCatalog::new(
            [9, 14],
            [(
                Arch::Arm64,
                ArchTarget {
                    min_api: 21,
                    triple: "aarch64-linux-android".to_string(),
                },
            )],
        )
        .unwrap_err();
        assert!(err.to_string().contains("arm64"));
    }

    #[test]
    fn test_catalog_rejects_unknown_arch() {
        let err = TargetCatalog::from_toml(
            r#"
api_levels = [9]

[archs.sparc]
min_api = 9
triple = "sparc-linux"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, VersionerError::InvalidCatalog(_)));
    }
}

//! Target architectures.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A target instruction set / ABI that headers are compiled for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Arch {
    Arm,
    Arm64,
    Mips,
    Mips64,
    X86,
    #[serde(rename = "x86_64")]
    X86_64,
}

impl Arch {
    /// Every architecture, in canonical order.
    pub const ALL: [Arch; 6] = [
        Arch::Arm,
        Arch::Arm64,
        Arch::Mips,
        Arch::Mips64,
        Arch::X86,
        Arch::X86_64,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Arch::Arm => "arm",
            Arch::Arm64 => "arm64",
            Arch::Mips => "mips",
            Arch::Mips64 => "mips64",
            Arch::X86 => "x86",
            Arch::X86_64 => "x86_64",
        }
    }

    /// Whether pointers are 64 bits wide on this architecture.
    pub fn is_lp64(&self) -> bool {
        matches!(self, Arch::Arm64 | Arch::Mips64 | Arch::X86_64)
    }

    /// Compiler-predefined macros identifying this architecture.
    pub fn predefined_macros(&self) -> &'static [&'static str] {
        match self {
            Arch::Arm => &["__arm__"],
            Arch::Arm64 => &["__aarch64__", "__LP64__"],
            Arch::Mips => &["__mips__"],
            Arch::Mips64 => &["__mips__", "__mips64", "__LP64__"],
            Arch::X86 => &["__i386__"],
            Arch::X86_64 => &["__x86_64__", "__LP64__"],
        }
    }
}

impl fmt::Display for Arch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error parsing an architecture name.
#[derive(Debug, Clone)]
pub struct ArchParseError(pub String);

impl fmt::Display for ArchParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid architecture '{}', valid values: arm, arm64, mips, mips64, x86, x86_64",
            self.0
        )
    }
}

impl std::error::Error for ArchParseError {}

impl FromStr for Arch {
    type Err = ArchParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "arm" => Ok(Arch::Arm),
            "arm64" | "aarch64" => Ok(Arch::Arm64),
            "mips" => Ok(Arch::Mips),
            "mips64" => Ok(Arch::Mips64),
            "x86" | "i686" => Ok(Arch::X86),
            "x86_64" | "x86-64" => Ok(Arch::X86_64),
            _ => Err(ArchParseError(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arch_parse_roundtrip() {
        for arch in Arch::ALL {
            assert_eq!(arch.as_str().parse::<Arch>().unwrap(), arch);
        }
        assert_eq!("aarch64".parse::<Arch>().unwrap(), Arch::Arm64);
        assert!("sparc".parse::<Arch>().is_err());
    }

    #[test]
    fn test_arch_lp64() {
        assert!(!Arch::Arm.is_lp64());
        assert!(Arch::X86_64.is_lp64());
        assert!(Arch::Arm64.predefined_macros().contains(&"__LP64__"));
    }
}

//! Readers for exported-symbol inputs: ELF shared libraries and text manifests.

pub mod elf;
pub mod manifest;

pub use elf::read_exports;
pub use manifest::{is_manifest, manifest_kind, read_manifest};

//! Test utilities and fixtures for versioner unit tests.
//!
//! Provides builders for in-memory declarations and helpers that lay out
//! header trees and platform trees on disk inside a temporary directory.
//!
//! # Example
//!
//! ```rust,ignore
//! use versioner::test_support::{location, header_db};
//!
//! #[test]
//! fn test_example() {
//!     let db = header_db(&[("foo", location("a.h", 1, Availability::introduced(14)))]);
//!     assert!(db.get("foo").is_some());
//! }
//! ```

pub mod fixtures;

pub use fixtures::*;

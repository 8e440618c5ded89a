//! # Cabinet Testkit
//!
//! Test utilities for the cabinet binding.
//!
//! This crate provides:
//! - Temporary database fixtures for every handle type
//! - Log capture for tests
//! - A counting execution permit
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use cabinet_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_tree() {
//!     with_temp_bdb(|db| {
//!         db.put(b"k", b"v").unwrap();
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;

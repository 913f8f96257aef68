//! Testing infrastructure for taskboard.
//!
//! - **Mocks**: verifiers with controllable behavior, usable from
//!   integration tests and downstream crates
//! - **Fixtures**: throwaway comm roots with a wired-up store (test-only)
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use taskboard::task::TaskStore;
//! use taskboard::testing::FixedVerifier;
//!
//! let store = TaskStore::new("comm", ".").with_verifier(Arc::new(FixedVerifier::new(70)));
//! assert_eq!(store.comm_root(), std::path::Path::new("comm"));
//! ```

#[cfg(test)]
pub mod fixtures;
pub mod mocks;

#[cfg(test)]
pub use fixtures::*;
pub use mocks::*;

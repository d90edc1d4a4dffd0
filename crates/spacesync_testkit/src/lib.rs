//! # spacesync testkit
//!
//! Test utilities for spacesync.
//!
//! This crate provides:
//! - Temporary workspaces wired to a zero-delay [`SyncConfig`](spacesync_engine::SyncConfig)
//! - Seeded in-memory remotes
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use spacesync_testkit::prelude::*;
//!
//! #[test]
//! fn pull_then_push_is_quiet() {
//!     let ws = TestWorkspace::new();
//!     let (remote, _ids) = seeded_remote(&[("Intro", "<p>hi</p>")]);
//!     let engine = ws.engine(remote.clone());
//!     engine.pull().unwrap();
//!     remote.clear_calls();
//!     engine.push().unwrap();
//!     assert!(remote.calls().is_empty());
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

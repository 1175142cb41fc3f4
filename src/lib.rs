//! Verification of the code examples in a multi-language documentation build.
//!
//! For the active [`Language`](language::Language), every example a document
//! shows or runs is located under `code/<language>/`, built and run with that
//! language's toolchain, and its output compared with the recorded golden
//! file. Coverage is tracked across the whole build so that examples shown
//! but never run (or run but never shown) fail it.
//!
//! Components, in data-flow order:
//!
//! - [`toolchain`]: build and run commands per language
//! - [`runner`]: subprocess execution and output capture
//! - [`compare`]: golden-file resolution and comparison
//! - [`coverage`]: declared/run/missing bookkeeping
//! - [`aggregator`]: per-document and whole-build error counts
//! - [`harness`]: the build context tying them together
//! - [`document`]: reStructuredText directive scanning and rendering

pub mod aggregator;
pub mod compare;
pub mod coverage;
pub mod document;
pub mod error;
pub mod harness;
pub mod language;
pub mod runner;
pub mod toolchain;

pub use error::{ConfigError, HarnessError};
pub use harness::Harness;
pub use language::Language;

//! buildlog-triage - Classify build-log failures into structured problems
//!
//! This library scans sbuild and autopkgtest transcripts for known failure
//! signatures and classifies the most relevant one into a small, closed set
//! of comparable problem records, so downstream tooling can react to
//! specific failure categories instead of re-parsing free text.

// Deny all clippy warnings in this crate
#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    missing_debug_implementations,
    missing_copy_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unsafe_code,
    unused_import_braces,
    unused_qualifications
)]
// Allow some pedantic lints that are too noisy or not applicable
#![allow(
    clippy::module_name_repetitions,
    clippy::missing_errors_doc,
    clippy::cargo_common_metadata
)]

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod apt;
pub mod autopkgtest;
pub mod cli;
pub mod output;
pub mod problems;
pub mod relations;
pub mod sbuild;
pub mod sections;

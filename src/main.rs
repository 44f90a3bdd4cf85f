//! buildlog-triage - Classify build-log failures into structured problems
//!
//! Thin binary entry point; all logic lives in the library.

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

/// Main entry point for the buildlog-triage CLI
fn main() {
    if let Err(err) = buildlog_triage::cli::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

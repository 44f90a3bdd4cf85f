//! Failure taxonomy for build-log transcripts
//!
//! Every recognized failure is classified into one `Problem` variant.
//! Variants compare structurally, render a human-readable description via
//! `Display`, and carry a stable machine-readable `kind` tag that
//! downstream consumers key off. Kind tags are part of the output format
//! and must not change.

use std::fmt;

use serde::Serialize;

use crate::relations::{RelationGroup, format_relations};

/// A classified build failure
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind")]
pub enum Problem {
    /// dpkg reported an error
    #[serde(rename = "dpkg-error")]
    DpkgError {
        /// The dpkg error message
        error: String,
    },

    /// Apt failed to fetch a file during an update or install
    #[serde(rename = "apt-file-fetch-failure")]
    AptFetchFailure {
        /// URL of the file that could not be fetched, when known
        #[serde(skip_serializing_if = "Option::is_none")]
        url: Option<String>,
        /// The fetch error message
        error: String,
    },

    /// A configured repository has no Release file
    #[serde(rename = "missing-release-file")]
    AptMissingReleaseFile {
        /// Repository URL
        url: String,
    },

    /// Apt could not locate a requested package
    #[serde(rename = "apt-package-unknown")]
    AptPackageUnknown {
        /// The unknown package name
        package: String,
    },

    /// Apt reported broken packages
    #[serde(rename = "apt-broken-packages")]
    AptBrokenPackages {
        /// The line preceding the broken-packages marker
        description: String,
    },

    /// The filesystem ran out of space
    #[serde(rename = "no-space-on-device")]
    NoSpaceOnDevice,

    /// The resolver could not satisfy build dependencies
    #[serde(rename = "unsatisfied-dependencies")]
    UnsatisfiedDependencies {
        /// The unsatisfiable dependency relations
        relations: Vec<RelationGroup>,
    },

    /// The resolver could not satisfy conflicts
    #[serde(rename = "unsatisfied-conflicts")]
    UnsatisfiedConflicts {
        /// The unsatisfiable conflict relations
        relations: Vec<RelationGroup>,
    },

    /// The autopkgtest chroot does not exist
    #[serde(rename = "chroot-not-found")]
    ChrootNotFound {
        /// Name of the missing chroot
        chroot: String,
    },

    /// autopkgtest declared the test dependencies unsatisfiable (badpkg)
    #[serde(rename = "badpkg")]
    AutopkgtestDepsUnsatisfiable {
        /// Parsed blame entries as (kind, argument) pairs
        args: Vec<(Option<String>, String)>,
    },

    /// An autopkgtest test timed out
    #[serde(rename = "timed-out")]
    AutopkgtestTimedOut,

    /// The autopkgtest testbed failed
    #[serde(rename = "testbed-failure")]
    AutopkgtestTestbedFailure {
        /// Failure reason reported by the testbed
        reason: String,
    },

    /// The testbed chroot disappeared mid-run
    #[serde(rename = "testbed-chroot-disappeared")]
    AutopkgtestDepChrootDisappeared,

    /// autopkgtest flagged the package under test as erroneous
    #[serde(rename = "erroneous-package")]
    AutopkgtestErroneousPackage {
        /// The reported reason
        reason: String,
    },

    /// A test failed because it wrote to stderr
    #[serde(rename = "stderr-output")]
    AutopkgtestStderrFailure {
        /// The offending stderr line
        stderr_line: String,
    },

    /// A testbed setup command failed
    #[serde(rename = "testbed-setup-failure")]
    AutopkgtestTestbedSetupFailure {
        /// The command that failed
        command: String,
        /// Its exit status
        exit_status: i32,
        /// Captured stderr
        error: String,
    },
}

impl Problem {
    /// Stable machine-readable tag for this variant
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::DpkgError { .. } => "dpkg-error",
            Self::AptFetchFailure { .. } => "apt-file-fetch-failure",
            Self::AptMissingReleaseFile { .. } => "missing-release-file",
            Self::AptPackageUnknown { .. } => "apt-package-unknown",
            Self::AptBrokenPackages { .. } => "apt-broken-packages",
            Self::NoSpaceOnDevice => "no-space-on-device",
            Self::UnsatisfiedDependencies { .. } => "unsatisfied-dependencies",
            Self::UnsatisfiedConflicts { .. } => "unsatisfied-conflicts",
            Self::ChrootNotFound { .. } => "chroot-not-found",
            Self::AutopkgtestDepsUnsatisfiable { .. } => "badpkg",
            Self::AutopkgtestTimedOut => "timed-out",
            Self::AutopkgtestTestbedFailure { .. } => "testbed-failure",
            Self::AutopkgtestDepChrootDisappeared => "testbed-chroot-disappeared",
            Self::AutopkgtestErroneousPackage { .. } => "erroneous-package",
            Self::AutopkgtestStderrFailure { .. } => "stderr-output",
            Self::AutopkgtestTestbedSetupFailure { .. } => "testbed-setup-failure",
        }
    }

    /// Whether this problem is an apt update error (fetch or release file)
    #[must_use]
    pub const fn is_apt_update_error(&self) -> bool {
        matches!(
            self,
            Self::AptFetchFailure { .. } | Self::AptMissingReleaseFile { .. }
        )
    }

    /// Parse an autopkgtest `blame:` line into a badpkg problem
    ///
    /// Entries look like `deb:foo` or `arg:bar`; an entry without a known
    /// `kind:` prefix is kept with no kind.
    #[must_use]
    pub fn from_blame_line(line: &str) -> Self {
        let mut args = Vec::new();
        let entries = line.strip_prefix("blame: ").unwrap_or(line).trim_end_matches('\n');
        for entry in entries.split(' ') {
            let (kind, arg) = match entry.split_once(':') {
                Some((kind, arg)) => (Some(kind.to_string()), arg.to_string()),
                None => (None, entry.to_string()),
            };
            if let Some(kind) = &kind {
                if !matches!(kind.as_str(), "deb" | "arg" | "dsc") {
                    log::warn!("unknown entry {entry} on badpkg line");
                }
            }
            args.push((kind, arg));
        }
        Self::AutopkgtestDepsUnsatisfiable { args }
    }
}

impl fmt::Display for Problem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DpkgError { error } => write!(f, "Dpkg Error: {error}"),
            Self::AptFetchFailure { error, .. } => {
                write!(f, "Apt file fetch error: {error}")
            },
            Self::AptMissingReleaseFile { url } => write!(f, "Missing release file: {url}"),
            Self::AptPackageUnknown { package } => write!(f, "Unknown package: {package}"),
            Self::AptBrokenPackages { description } => {
                write!(f, "Broken apt packages: {description}")
            },
            Self::NoSpaceOnDevice => write!(f, "No space left on device"),
            Self::UnsatisfiedDependencies { relations } => {
                write!(f, "Unsatisfied dependencies: {}", format_relations(relations))
            },
            Self::UnsatisfiedConflicts { relations } => {
                write!(f, "Unsatisfied conflicts: {}", format_relations(relations))
            },
            Self::ChrootNotFound { chroot } => write!(f, "Chroot not found: {chroot}"),
            Self::AutopkgtestDepsUnsatisfiable { args } => {
                let rendered: Vec<String> = args
                    .iter()
                    .map(|(kind, arg)| match kind {
                        Some(kind) => format!("{kind}:{arg}"),
                        None => arg.clone(),
                    })
                    .collect();
                write!(f, "Unsatisfiable test dependencies: {}", rendered.join(" "))
            },
            Self::AutopkgtestTimedOut => write!(f, "Timed out"),
            Self::AutopkgtestTestbedFailure { reason }
            | Self::AutopkgtestErroneousPackage { reason } => f.write_str(reason),
            Self::AutopkgtestDepChrootDisappeared => write!(f, "chroot disappeared"),
            Self::AutopkgtestStderrFailure { stderr_line } => {
                write!(f, "output on stderr: {stderr_line}")
            },
            Self::AutopkgtestTestbedSetupFailure {
                command,
                exit_status,
                error,
            } => {
                write!(f, "Error setting up testbed: {command:?} failed ({exit_status}): {error}")
            },
        }
    }
}

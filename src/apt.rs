//! Apt/dpkg failure detection
//!
//! The scanner walks a bounded window at the end of a section looking for
//! known apt and dpkg failure signatures, most recent line first. The
//! locators select the relevant sections of a segmented log and delegate to
//! the scanner; the dependency-installation locator also consults the
//! embedded dose3/CUDF resolver report when one is present.

use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use serde_yaml::Value;
use thiserror::Error;

use crate::problems::Problem;
use crate::relations::parse_relations;
use crate::sections::SectionedLog;

/// How many trailing lines of a section the scanner examines
const SCAN_WINDOW: usize = 50;

/// Section holding the apt-get update transcript
pub const UPDATE_SECTION: &str = "update chroot";

/// Section holding the aspcud resolver transcript
pub const DOSE3_SECTION: &str = "install dose3 build dependencies (aspcud-based resolver)";

/// The synthetic package sbuild uses to express the build's dependency set
const DUMMY_PACKAGE: &str = "sbuild-build-depends-main-dummy";

static FETCH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^E: Failed to fetch ([^ ]+)  (.*)").expect("valid pattern")
});
static RELEASE_FILE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^E: The repository '([^']+)' does not have a Release file\.")
        .expect("valid pattern")
});
static DPKG_DEB_NO_SPACE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^dpkg-deb: error: unable to write file '(.*)': No space left on device")
        .expect("valid pattern")
});
static FREE_SPACE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^E: You don't have enough free space in (.*)\.").expect("valid pattern")
});
static PACKAGE_UNKNOWN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^E: Unable to locate package (.*)").expect("valid pattern"));
static DPKG_ERROR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^dpkg: error: (.*)").expect("valid pattern"));
static DPKG_PROCESSING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^dpkg: error processing package (.*) \((.*)\):").expect("valid pattern")
});
static COPY_NO_SPACE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^ cannot copy extracted data for '(.*)' to '(.*)': failed to write \(No space left on device\)")
        .expect("valid pattern")
});
static ANY_NO_SPACE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ .*: No space left on device").expect("valid pattern"));
static INSTALL_DEPS_SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^install (.*) build dependencies.*").expect("valid pattern")
});

/// Result of scanning one line sequence for a failure
///
/// A `None` offset means no recognizable failure was located. A located
/// offset with no problem means a failure boundary was found but could not
/// be classified; the raw line is still useful to a human.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanResult {
    /// 1-based offset of the key failure line, if located
    pub offset: Option<usize>,
    /// Text of the key failure line, if located
    pub line: Option<String>,
    /// The classified problem, if the line was recognized
    pub problem: Option<Problem>,
}

impl ScanResult {
    /// A scan that located nothing
    #[must_use]
    pub const fn none() -> Self {
        Self {
            offset: None,
            line: None,
            problem: None,
        }
    }

    /// A fully classified failure at a 1-based offset
    #[must_use]
    pub fn found(offset: usize, line: &str, problem: Problem) -> Self {
        Self {
            offset: Some(offset),
            line: Some(line.to_string()),
            problem: Some(problem),
        }
    }

    /// A located but unclassified failure line
    #[must_use]
    pub fn unclassified(offset: usize, line: &str) -> Self {
        Self {
            offset: Some(offset),
            line: Some(line.to_string()),
            problem: None,
        }
    }

    /// Whether the scan located a failure line
    #[must_use]
    pub const fn is_located(&self) -> bool {
        self.offset.is_some()
    }
}

/// Result of locating a failure within a named section
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SectionScanResult {
    /// Title of the section the result refers to, when known
    pub section: Option<String>,
    /// 1-based offset of the key failure line within the section
    pub offset: Option<usize>,
    /// Text of the key failure line
    pub line: Option<String>,
    /// The classified problem
    pub problem: Option<Problem>,
}

/// Fatal analysis faults
///
/// Distinct from "no failure found": these indicate the transcript itself
/// does not have the structure this crate is built against, which must
/// surface loudly rather than be absorbed into a no-problem result.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// The dose3 report does not describe the expected dummy package
    #[error("unexpected dose3 report packages: {packages:?}")]
    UnexpectedDose3Report {
        /// The package names the report actually listed
        packages: Vec<String>,
    },
}

/// Find the key failure line in apt-get output
///
/// Scans the last lines of the buffer in reverse (most recent first),
/// testing known signatures in priority order and stopping at the first
/// match. A generic unrecognized `E: ` line is remembered as a fallback but
/// does not stop the scan. If the windowed reverse scan finds nothing
/// definitive, a second forward pass over the whole buffer looks for
/// out-of-disk-space complaints.
#[must_use]
pub fn find_apt_get_failure(lines: &[String]) -> ScanResult {
    let mut fallback = ScanResult::none();
    for i in 1..SCAN_WINDOW {
        let Some(lineno) = lines.len().checked_sub(i) else {
            break;
        };
        let line = lines[lineno].trim_matches('\n');
        if line.starts_with("E: Failed to fetch ") {
            if let Some(caps) = FETCH_RE.captures(line) {
                return ScanResult::found(
                    lineno + 1,
                    line,
                    Problem::AptFetchFailure {
                        url: Some(caps[1].to_string()),
                        error: caps[2].to_string(),
                    },
                );
            }
            return ScanResult::unclassified(lineno + 1, line);
        }
        if line == "E: Broken packages"
            || line == "E: Unable to correct problems, you have held broken packages."
        {
            // The useful description is on the line before the marker.
            if lineno > 0 {
                let description = lines[lineno - 1].trim();
                return ScanResult::found(
                    lineno,
                    description,
                    Problem::AptBrokenPackages {
                        description: description.to_string(),
                    },
                );
            }
        }
        if let Some(caps) = RELEASE_FILE_RE.captures(line) {
            return ScanResult::found(
                lineno + 1,
                line,
                Problem::AptMissingReleaseFile {
                    url: caps[1].to_string(),
                },
            );
        }
        if DPKG_DEB_NO_SPACE_RE.is_match(line) || FREE_SPACE_RE.is_match(line) {
            return ScanResult::found(lineno + 1, line, Problem::NoSpaceOnDevice);
        }
        if let Some(caps) = PACKAGE_UNKNOWN_RE.captures(line) {
            return ScanResult::found(
                lineno + 1,
                line,
                Problem::AptPackageUnknown {
                    package: caps[1].to_string(),
                },
            );
        }
        if let Some(caps) = DPKG_ERROR_RE.captures(line) {
            if caps[1].ends_with(": No space left on device") {
                return ScanResult::found(lineno + 1, line, Problem::NoSpaceOnDevice);
            }
            return ScanResult::found(
                lineno + 1,
                line,
                Problem::DpkgError {
                    error: caps[1].to_string(),
                },
            );
        }
        if let Some(caps) = DPKG_PROCESSING_RE.captures(line) {
            let problem = Problem::DpkgError {
                error: format!("processing package {} ({})", &caps[1], &caps[2]),
            };
            // The detail line follows the header line.
            return match lines.get(lineno + 1) {
                Some(detail) => ScanResult::found(lineno + 2, detail.trim(), problem),
                None => ScanResult::found(lineno + 1, line, problem),
            };
        }
        if line.starts_with("E: ") && !fallback.is_located() {
            fallback = ScanResult::unclassified(lineno + 1, line);
        }
    }

    for (i, line) in lines.iter().enumerate() {
        if COPY_NO_SPACE_RE.is_match(line) || ANY_NO_SPACE_RE.is_match(line) {
            return ScanResult::found(i + 1, line, Problem::NoSpaceOnDevice);
        }
    }

    fallback
}

/// Locate an apt-get update failure in the `update chroot` section
#[must_use]
pub fn find_apt_get_update_failure(log: &SectionedLog) -> SectionScanResult {
    let lines = log.lines(UPDATE_SECTION).unwrap_or(&[]);
    let scan = find_apt_get_failure(lines);
    SectionScanResult {
        section: Some(UPDATE_SECTION.to_string()),
        offset: scan.offset,
        line: scan.line,
        problem: scan.problem,
    }
}

/// Extract the embedded CUDF document from resolver output
///
/// The block starts at the last line with the `output-version: ` prefix and
/// extends through contiguous non-blank lines. A block that fails to decode
/// is logged and treated as "no document".
#[must_use]
pub fn find_cudf_output(lines: &[String]) -> Option<Value> {
    let start = lines.iter().rposition(|line| line.starts_with("output-version: "))?;
    let mut block = Vec::new();
    for line in &lines[start..] {
        if line.trim().is_empty() {
            break;
        }
        block.push(line.as_str());
    }
    match serde_yaml::from_str(&block.join("\n")) {
        Ok(document) => Some(document),
        Err(err) => {
            log::warn!("failed to decode CUDF output block: {err}");
            None
        },
    }
}

/// Interpret the `report` entry of a decoded dose3 document
///
/// The report must describe exactly the sbuild dependency dummy package;
/// anything else means the resolver output format has drifted and is
/// surfaced as [`AnalysisError::UnexpectedDose3Report`]. A non-broken
/// status yields no problem. A broken status yields the accumulated missing
/// dependencies, or failing that the accumulated conflicts.
pub fn problem_from_dose3_report(report: &Value) -> Result<Option<Problem>, AnalysisError> {
    let entries = report.as_sequence().ok_or(AnalysisError::UnexpectedDose3Report {
        packages: Vec::new(),
    })?;
    let mut packages = Vec::with_capacity(entries.len());
    for entry in entries {
        // An entry without a package name is itself a format violation.
        match entry.get("package").and_then(Value::as_str) {
            Some(package) => packages.push(package.to_string()),
            None => return Err(AnalysisError::UnexpectedDose3Report { packages }),
        }
    }
    if packages != [DUMMY_PACKAGE] {
        return Err(AnalysisError::UnexpectedDose3Report { packages });
    }
    let entry = &entries[0];
    if entry.get("status").and_then(Value::as_str) != Some("broken") {
        return Ok(None);
    }

    let mut missing = Vec::new();
    let mut conflict = Vec::new();
    let reasons = entry.get("reasons").and_then(Value::as_sequence);
    for reason in reasons.into_iter().flatten() {
        if let Some(dependency) = reason
            .get("missing")
            .and_then(|m| m.get("pkg"))
            .and_then(|p| p.get("unsat-dependency"))
            .and_then(Value::as_str)
        {
            missing.extend(parse_relations(dependency));
        }
        if let Some(conflicting) = reason
            .get("conflict")
            .and_then(|c| c.get("pkg1"))
            .and_then(|p| p.get("unsat-conflict"))
            .and_then(Value::as_str)
        {
            conflict.extend(parse_relations(conflicting));
        }
    }

    if !missing.is_empty() {
        return Ok(Some(Problem::UnsatisfiedDependencies { relations: missing }));
    }
    if !conflict.is_empty() {
        return Ok(Some(Problem::UnsatisfiedConflicts { relations: conflict }));
    }
    Ok(None)
}

/// Locate a dependency-installation failure across candidate sections
///
/// The dose3 resolver report, when present, provides the classification
/// candidate; the apt-get scanner over each `install ... build
/// dependencies` section provides the location. The first section whose
/// scan locates a failure line wins, with a dose3-derived problem taking
/// precedence over the scanner's own classification.
pub fn find_install_deps_failure(
    log: &SectionedLog,
) -> Result<SectionScanResult, AnalysisError> {
    let mut problem = None;
    if let Some(lines) = log.lines(DOSE3_SECTION)
        && let Some(document) = find_cudf_output(lines)
        && let Some(report) = document.get("report")
    {
        problem = problem_from_dose3_report(report)?;
    }

    let mut last_section = None;
    for section in log {
        last_section.clone_from(&section.title);
        let Some(title) = &section.title else {
            continue;
        };
        if !INSTALL_DEPS_SECTION_RE.is_match(title) {
            continue;
        }
        let scan = find_apt_get_failure(&section.lines);
        if problem.is_none() {
            problem = scan.problem;
        }
        if scan.offset.is_some() {
            return Ok(SectionScanResult {
                section: Some(title.clone()),
                offset: scan.offset,
                line: scan.line,
                problem,
            });
        }
    }

    Ok(SectionScanResult {
        section: last_section,
        offset: None,
        line: None,
        problem,
    })
}

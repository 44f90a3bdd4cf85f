//! Autopkgtest transcript analysis
//!
//! An autopkgtest run interleaves per-test output with timestamped control
//! lines (`autopkgtest [hh:mm:ss]: ...`). The analyzer replays the control
//! stream to attribute output to tests, catches testbed-level errors as
//! they appear, and otherwise falls back to the summary table at the end of
//! the run.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;

use crate::apt::{ScanResult, find_apt_get_failure};
use crate::problems::Problem;

static CONTROL_LINE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^autopkgtest \[([0-9:]+)\]: (.*)").expect("valid pattern"));
static SUMMARY_PASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^ ]+)(?:[ ]+)PASS").expect("valid pattern"));
static SUMMARY_RESULT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^ ]+)(?:[ ]+)(FAIL|PASS|SKIP) (.+)").expect("valid pattern"));
static ERROR_STDERR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"^"(.*)" failed with stderr "(.*)("?)$"#).expect("valid pattern")
});
static STAT_FAILED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^W: (.*): Failed to stat file: No such file or directory$")
        .expect("valid pattern")
});
static TESTBED_FAILURE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^testbed failure: (.*)$").expect("valid pattern"));
static ERRONEOUS_PACKAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^erroneous package: (.*)$").expect("valid pattern"));
static SETUP_FAILURE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\[(.*)\] failed \(exit status ([0-9]+), stderr '(.*)'\)$")
        .expect("valid pattern")
});
static SETUP_CHROOT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^E: (.*): Chroot not found\\n$").expect("valid pattern"));

/// A timestamped control message from the autopkgtest harness
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ControlMessage {
    /// `@@@...@@@ source` marker
    Source,
    /// `@@@...@@@ summary` marker
    Summary,
    /// A per-test status line
    Test {
        /// The test name
        name: String,
        /// Which part of the test the line introduces
        field: TestField,
    },
    /// An `ERROR: ` line from the harness
    Error(String),
    /// Any other harness message
    Other(String),
}

/// The part of a test that a control line introduces
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestField {
    /// Start of captured test output
    BeginOutput,
    /// End of captured test output
    EndOutput,
    /// Results block
    Results,
    /// Captured stderr block
    Stderr,
    /// Testbed preparation block
    PrepareTestbed,
    /// Any other per-test status message
    Status(String),
}

/// Parse one transcript line
///
/// Returns the timestamp and control message for harness lines, or `None`
/// for plain output lines.
#[must_use]
pub fn parse_autopkgtest_line(line: &str) -> Option<(String, ControlMessage)> {
    let caps = CONTROL_LINE_RE.captures(line)?;
    let timestamp = caps[1].to_string();
    let message = &caps[2];
    let content = if message.starts_with("@@@@@@@@@@@@@@@@@@@@ source ") {
        ControlMessage::Source
    } else if message.starts_with("@@@@@@@@@@@@@@@@@@@@ summary") {
        ControlMessage::Summary
    } else if let Some(rest) = message.strip_prefix("test ") {
        match rest.trim_end_matches('\n').split_once(": ") {
            Some((name, status)) => {
                let field = match status {
                    "[-----------------------" => TestField::BeginOutput,
                    "-----------------------]" => TestField::EndOutput,
                    " - - - - - - - - - - results - - - - - - - - - -" => TestField::Results,
                    " - - - - - - - - - - stderr - - - - - - - - - -" => TestField::Stderr,
                    "preparing testbed" => TestField::PrepareTestbed,
                    other => TestField::Status(other.to_string()),
                };
                ControlMessage::Test {
                    name: name.to_string(),
                    field,
                }
            },
            None => ControlMessage::Other(message.to_string()),
        }
    } else if let Some(rest) = message.strip_prefix("ERROR: ") {
        ControlMessage::Error(rest.to_string())
    } else {
        ControlMessage::Other(message.to_string())
    };
    Some((timestamp, content))
}

/// Outcome column of a summary entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TestResult {
    /// The test passed
    Pass,
    /// The test failed
    Fail,
    /// The test was skipped
    Skip,
}

/// One row of the autopkgtest summary table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryEntry {
    /// 0-based offset of the row within the summary block
    pub offset: usize,
    /// The test name
    pub name: String,
    /// The reported outcome
    pub result: TestResult,
    /// Failure reason, when present
    pub reason: Option<String>,
    /// Continuation lines (`badpkg:` / `blame:`) attached to the row
    pub extra: Vec<String>,
}

/// Parse the summary table at the end of a run
#[must_use]
pub fn parse_autopkgtest_summary(lines: &[String]) -> Vec<SummaryEntry> {
    let mut entries = Vec::new();
    let mut i = 0;
    while i < lines.len() {
        let line = &lines[i];
        if let Some(caps) = SUMMARY_PASS_RE.captures(line) {
            entries.push(SummaryEntry {
                offset: i,
                name: caps[1].to_string(),
                result: TestResult::Pass,
                reason: None,
                extra: Vec::new(),
            });
            i += 1;
            continue;
        }
        let Some(caps) = SUMMARY_RESULT_RE.captures(line) else {
            i += 1;
            continue;
        };
        let result = match &caps[2] {
            "PASS" => TestResult::Pass,
            "SKIP" => TestResult::Skip,
            _ => TestResult::Fail,
        };
        let reason = caps[3].to_string();
        let offset = i;
        let mut extra = Vec::new();
        if reason == "badpkg" {
            while i + 1 < lines.len()
                && (lines[i + 1].starts_with("badpkg:") || lines[i + 1].starts_with("blame:"))
            {
                extra.push(lines[i + 1].clone());
                i += 1;
            }
        }
        entries.push(SummaryEntry {
            offset,
            name: caps[1].to_string(),
            result,
            reason: Some(reason),
            extra,
        });
        i += 1;
    }
    entries
}

/// Scan for a failed testbed setup command, most recent first
#[must_use]
pub fn find_testbed_setup_failure(lines: &[String]) -> ScanResult {
    for (i, line) in lines.iter().enumerate().rev() {
        let Some(caps) = SETUP_FAILURE_RE.captures(line.trim_end_matches('\n')) else {
            continue;
        };
        let command = caps[1].to_string();
        let Ok(exit_status) = caps[2].parse::<i32>() else {
            continue;
        };
        let stderr = caps[3].to_string();
        if let Some(chroot) = SETUP_CHROOT_RE.captures(&stderr) {
            return ScanResult::found(
                i + 1,
                line,
                Problem::ChrootNotFound {
                    chroot: chroot[1].to_string(),
                },
            );
        }
        return ScanResult::found(
            i + 1,
            line,
            Problem::AutopkgtestTestbedSetupFailure {
                command,
                exit_status,
                error: stderr,
            },
        );
    }
    ScanResult::none()
}

/// Result of analyzing an autopkgtest transcript
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AutopkgtestResult {
    /// 1-based offset of the key failure line
    pub offset: Option<usize>,
    /// The test the failure is attributed to, when known
    pub testname: Option<String>,
    /// The classified problem
    pub problem: Option<Problem>,
    /// Human-oriented description of the failure
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum FieldKey {
    Summary,
    Test { name: String, field: String },
}

impl FieldKey {
    fn test_name(&self) -> String {
        match self {
            Self::Summary => "summary".to_string(),
            Self::Test { name, .. } => name.clone(),
        }
    }
}

fn field_name(field: &TestField) -> &str {
    match field {
        TestField::BeginOutput | TestField::EndOutput => "output",
        TestField::Results => "results",
        TestField::Stderr => "stderr",
        TestField::PrepareTestbed => "prepare testbed",
        TestField::Status(status) => status.as_str(),
    }
}

/// Find the failure in autopkgtest output
///
/// Replays the control stream, attributing plain output lines to the
/// current test field. Harness `ERROR:` lines are classified on the spot;
/// failures the harness does not announce are recovered from the summary
/// table. Where the failure points into captured output, that output is
/// rescanned with the apt/dpkg scanner to pull out a more specific problem.
#[must_use]
#[allow(clippy::too_many_lines)] // one state machine, kept in one place
pub fn find_autopkgtest_failure_description(lines: &[String]) -> AutopkgtestResult {
    let mut test_output: HashMap<FieldKey, Vec<String>> = HashMap::new();
    let mut test_output_offset: HashMap<FieldKey, usize> = HashMap::new();
    let mut current_field: Option<FieldKey> = None;

    let mut i = 0;
    while i < lines.len() {
        let line = &lines[i];
        let Some((_timestamp, content)) = parse_autopkgtest_line(line) else {
            if let Some(field) = &current_field
                && let Some(output) = test_output.get_mut(field)
            {
                output.push(line.clone());
            }
            i += 1;
            continue;
        };
        match content {
            ControlMessage::Test { name, field } => {
                if matches!(field, TestField::EndOutput) {
                    current_field = None;
                    i += 1;
                    continue;
                }
                let key = FieldKey::Test {
                    name,
                    field: field_name(&field).to_string(),
                };
                if test_output.contains_key(&key) {
                    log::warn!("duplicate output fields for {key:?}");
                }
                test_output.insert(key.clone(), Vec::new());
                test_output_offset.insert(key.clone(), i + 1);
                current_field = Some(key);
            },
            ControlMessage::Summary => {
                test_output.insert(FieldKey::Summary, Vec::new());
                test_output_offset.insert(FieldKey::Summary, i + 1);
                current_field = Some(FieldKey::Summary);
            },
            ControlMessage::Error(message) => {
                // A message that opens a quote spans lines until the quote
                // closes.
                let mut message = message;
                if message.starts_with('"') && message.matches('"').count() == 1 {
                    while i + 1 < lines.len() {
                        i += 1;
                        message.push_str(&lines[i]);
                        if lines[i].matches('"').count() == 1 {
                            break;
                        }
                    }
                }
                let last_test = current_field.as_ref().map(FieldKey::test_name);

                if let Some(caps) = ERROR_STDERR_RE.captures(&message) {
                    let stderr = caps[2].to_string();
                    if STAT_FAILED_RE.is_match(&stderr) {
                        return AutopkgtestResult {
                            offset: Some(i + 1),
                            testname: last_test,
                            problem: Some(Problem::AutopkgtestDepChrootDisappeared),
                            description: Some(stderr),
                        };
                    }
                }
                if let Some(caps) = TESTBED_FAILURE_RE.captures(&message) {
                    return testbed_failure(
                        &caps[1],
                        i,
                        last_test,
                        current_field.as_ref(),
                        &test_output,
                        &test_output_offset,
                        lines,
                    );
                }
                if let Some(caps) = ERRONEOUS_PACKAGE_RE.captures(&message) {
                    let scan = find_apt_get_failure(&lines[..i]);
                    if let Some(problem) = scan.problem {
                        return AutopkgtestResult {
                            offset: scan.offset,
                            testname: last_test,
                            problem: Some(problem),
                            description: scan.line,
                        };
                    }
                    return AutopkgtestResult {
                        offset: Some(i + 1),
                        testname: last_test,
                        problem: Some(Problem::AutopkgtestErroneousPackage {
                            reason: caps[1].to_string(),
                        }),
                        description: None,
                    };
                }
                if let Some(field) = &current_field
                    && let Some(output) = test_output.get(field)
                {
                    let scan = find_apt_get_failure(output);
                    if let (Some(problem), Some(offset), Some(base)) =
                        (scan.problem, scan.offset, test_output_offset.get(field))
                    {
                        return AutopkgtestResult {
                            offset: Some(base + offset),
                            testname: last_test,
                            problem: Some(problem),
                            description: scan.line,
                        };
                    }
                }
                return AutopkgtestResult {
                    offset: Some(i + 1),
                    testname: last_test,
                    problem: None,
                    description: Some(message),
                };
            },
            ControlMessage::Source | ControlMessage::Other(_) => {},
        }
        i += 1;
    }

    let (Some(summary_lines), Some(summary_offset)) = (
        test_output.get(&FieldKey::Summary),
        test_output_offset.get(&FieldKey::Summary).copied(),
    ) else {
        // No summary block: point at the last non-blank line, if any.
        let mut end = lines.len();
        while end > 0 && lines[end - 1].trim().is_empty() {
            end -= 1;
        }
        if end == 0 {
            return AutopkgtestResult::default();
        }
        return AutopkgtestResult {
            offset: Some(end),
            testname: None,
            problem: None,
            description: Some(lines[end - 1].clone()),
        };
    };

    for entry in parse_autopkgtest_summary(summary_lines) {
        if matches!(entry.result, TestResult::Pass | TestResult::Skip) {
            continue;
        }
        let reason = entry.reason.clone().unwrap_or_default();
        if reason == "timed out" {
            return AutopkgtestResult {
                offset: Some(summary_offset + entry.offset + 1),
                testname: Some(entry.name),
                problem: Some(Problem::AutopkgtestTimedOut),
                description: Some(reason),
            };
        }
        if let Some(output) = reason.strip_prefix("stderr: ") {
            return stderr_failure(
                output,
                &entry.name,
                summary_offset + entry.offset,
                &test_output,
                &test_output_offset,
            );
        }
        if reason == "badpkg" {
            return badpkg_failure(
                &entry,
                summary_offset,
                &test_output,
                &test_output_offset,
            );
        }

        let key = FieldKey::Test {
            name: entry.name.clone(),
            field: "output".to_string(),
        };
        let scan = test_output.get(&key).map(|output| find_apt_get_failure(output));
        let offset = match (
            scan.as_ref().and_then(|s| s.offset),
            test_output_offset.get(&key),
        ) {
            (Some(scan_offset), Some(base)) => scan_offset + base,
            _ => summary_offset + entry.offset,
        };
        let (problem, description) = match scan {
            Some(scan) => (
                scan.problem,
                scan.line
                    .or_else(|| Some(format!("Test {} failed: {}", entry.name, reason))),
            ),
            None => (None, Some(format!("Test {} failed: {}", entry.name, reason))),
        };
        return AutopkgtestResult {
            offset: Some(offset + 1),
            testname: Some(entry.name),
            problem,
            description,
        };
    }

    AutopkgtestResult::default()
}

/// Classify a `testbed failure: <reason>` harness error
fn testbed_failure(
    reason: &str,
    i: usize,
    last_test: Option<String>,
    current_field: Option<&FieldKey>,
    test_output: &HashMap<FieldKey, Vec<String>>,
    test_output_offset: &HashMap<FieldKey, usize>,
    lines: &[String],
) -> AutopkgtestResult {
    if reason == "testbed auxverb failed with exit code 255"
        && let Some(field) = current_field
    {
        let key = FieldKey::Test {
            name: field.test_name(),
            field: "output".to_string(),
        };
        if let Some(output) = test_output.get(&key) {
            let scan = find_apt_get_failure(output);
            if let (Some(problem), Some(offset), Some(base)) =
                (scan.problem, scan.offset, test_output_offset.get(&key))
            {
                return AutopkgtestResult {
                    offset: Some(base + offset),
                    testname: last_test,
                    problem: Some(problem),
                    description: scan.line,
                };
            }
        }
    }

    if reason == "sent `auxverb_debug_fail', got `copy-failed', expected `ok...'" {
        let scan = find_apt_get_failure(lines);
        if let Some(problem) = scan.problem {
            return AutopkgtestResult {
                offset: scan.offset,
                testname: last_test,
                problem: Some(problem),
                description: scan.line,
            };
        }
    }

    if reason == "cannot send to testbed: [Errno 32] Broken pipe" {
        let scan = find_testbed_setup_failure(lines);
        if scan.problem.is_some() && scan.offset.is_some() {
            return AutopkgtestResult {
                offset: scan.offset,
                testname: last_test,
                problem: scan.problem,
                description: scan.line,
            };
        }
    }

    if reason == "apt repeatedly failed to download packages" {
        let scan = find_apt_get_failure(lines);
        if scan.problem.is_some() && scan.offset.is_some() {
            return AutopkgtestResult {
                offset: scan.offset,
                testname: last_test,
                problem: scan.problem,
                description: scan.line,
            };
        }
        return AutopkgtestResult {
            offset: Some(i + 1),
            testname: last_test,
            problem: Some(Problem::AptFetchFailure {
                url: None,
                error: reason.to_string(),
            }),
            description: None,
        };
    }

    AutopkgtestResult {
        offset: Some(i + 1),
        testname: last_test,
        problem: Some(Problem::AutopkgtestTestbedFailure {
            reason: reason.to_string(),
        }),
        description: None,
    }
}

/// Classify a summary `FAIL ... stderr: <output>` entry
fn stderr_failure(
    output: &str,
    testname: &str,
    summary_position: usize,
    test_output: &HashMap<FieldKey, Vec<String>>,
    test_output_offset: &HashMap<FieldKey, usize>,
) -> AutopkgtestResult {
    let key = FieldKey::Test {
        name: testname.to_string(),
        field: "stderr".to_string(),
    };
    let stderr_lines = test_output.get(&key);
    let stderr_offset = test_output_offset.get(&key).copied();

    let (mut offset, description, problem) = match stderr_lines {
        Some(stderr_lines) if !stderr_lines.is_empty() => {
            let scan = find_apt_get_failure(stderr_lines);
            let offset = match (scan.offset, stderr_offset) {
                (Some(scan_offset), Some(base)) => Some(scan_offset + base - 1),
                _ => None,
            };
            (offset, scan.line, scan.problem)
        },
        _ => {
            let scan = find_apt_get_failure(std::slice::from_ref(&output.to_string()));
            (None, scan.line, scan.problem)
        },
    };
    if offset.is_none() {
        offset = Some(summary_position);
    }
    let problem = problem.unwrap_or_else(|| Problem::AutopkgtestStderrFailure {
        stderr_line: output.to_string(),
    });
    let description = description.unwrap_or_else(|| {
        format!("Test {testname} failed due to unauthorized stderr output: {output}")
    });
    AutopkgtestResult {
        offset: offset.map(|o| o + 1),
        testname: Some(testname.to_string()),
        problem: Some(problem),
        description: Some(description),
    }
}

/// Classify a summary `FAIL badpkg` entry
fn badpkg_failure(
    entry: &SummaryEntry,
    summary_offset: usize,
    test_output: &HashMap<FieldKey, Vec<String>>,
    test_output_offset: &HashMap<FieldKey, usize>,
) -> AutopkgtestResult {
    let key = FieldKey::Test {
        name: entry.name.clone(),
        field: "prepare testbed".to_string(),
    };
    if let (Some(output), Some(base)) = (test_output.get(&key), test_output_offset.get(&key)) {
        let scan = find_apt_get_failure(output);
        if let (Some(problem), Some(offset)) = (scan.problem, scan.offset) {
            return AutopkgtestResult {
                offset: Some(offset + base + 1),
                testname: Some(entry.name.clone()),
                problem: Some(problem),
                description: None,
            };
        }
    }

    let mut badpkg = None;
    let mut blame = None;
    for line in &entry.extra {
        if let Some(rest) = line.strip_prefix("badpkg: ") {
            badpkg = Some(rest.to_string());
        }
        if line.starts_with("blame: ") {
            blame = Some(line.clone());
        }
    }
    let description = badpkg.map_or_else(
        || format!("Test {} failed", entry.name),
        |badpkg| format!("Test {} failed: {}", entry.name, badpkg.trim_end_matches('\n')),
    );
    let problem = blame.map_or(
        Problem::AutopkgtestDepsUnsatisfiable { args: Vec::new() },
        |blame| Problem::from_blame_line(&blame),
    );
    AutopkgtestResult {
        offset: Some(summary_offset + entry.offset + 1),
        testname: Some(entry.name.clone()),
        problem: Some(problem),
        description: Some(description),
    }
}

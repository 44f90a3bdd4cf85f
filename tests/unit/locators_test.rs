//! Tests for the section-level failure locators

use buildlog_triage::apt::{
    find_apt_get_update_failure, find_install_deps_failure, AnalysisError,
};
use buildlog_triage::problems::Problem;
use buildlog_triage::sections::SectionedLog;

fn lines(items: &[&str]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

fn log(sections: Vec<(Option<&str>, Vec<String>)>) -> SectionedLog {
    sections
        .into_iter()
        .map(|(title, lines)| (title.map(ToString::to_string), lines))
        .collect()
}

const DOSE3_SECTION: &str = "install dose3 build dependencies (aspcud-based resolver)";

const BROKEN_CUDF: &[&str] = &[
    "output-version: 1.2",
    "native-architecture: amd64",
    "report:",
    " - package: sbuild-build-depends-main-dummy",
    "   version: 0.invalid.0",
    "   architecture: amd64",
    "   status: broken",
    "   reasons:",
    "    - missing:",
    "        pkg:",
    "          package: sbuild-build-depends-main-dummy",
    "          unsat-dependency: librust-foo-dev (>= 1.0)",
];

#[test]
fn test_update_failure_in_update_section() {
    let log = log(vec![
        (None, lines(&["preamble"])),
        (
            Some("update chroot"),
            lines(&[
                "Get:1 http://deb.example sid InRelease",
                "E: Failed to fetch http://deb.example/InRelease  Connection failed",
            ]),
        ),
    ]);

    let result = find_apt_get_update_failure(&log);
    assert_eq!(result.section.as_deref(), Some("update chroot"));
    assert_eq!(result.offset, Some(2));
    assert_eq!(
        result.problem,
        Some(Problem::AptFetchFailure {
            url: Some("http://deb.example/InRelease".to_string()),
            error: "Connection failed".to_string(),
        })
    );
}

#[test]
fn test_update_failure_section_absent() {
    let log = log(vec![(Some("build"), lines(&["gcc -o foo foo.c"]))]);

    let result = find_apt_get_update_failure(&log);
    assert_eq!(result.section.as_deref(), Some("update chroot"));
    assert_eq!(result.offset, None);
    assert_eq!(result.problem, None);
}

#[test]
fn test_install_deps_scanner_classification() {
    let log = log(vec![(
        Some("install package build dependencies (apt-based resolver)"),
        lines(&[
            "Reading package lists...",
            "E: Unable to locate package librust-foo-dev",
        ]),
    )]);

    let result = find_install_deps_failure(&log).expect("no fatal fault");
    assert_eq!(
        result.section.as_deref(),
        Some("install package build dependencies (apt-based resolver)")
    );
    assert_eq!(result.offset, Some(2));
    assert_eq!(
        result.problem,
        Some(Problem::AptPackageUnknown {
            package: "librust-foo-dev".to_string()
        })
    );
}

#[test]
fn test_install_deps_dose3_problem_takes_precedence() {
    // The scanner locates the failure line in the aspcud section, but the
    // decoded resolver report provides the richer classification.
    let mut dose3_lines = lines(BROKEN_CUDF);
    dose3_lines.extend(lines(&[
        "",
        " sbuild-build-depends-main-dummy : Depends: librust-foo-dev (>= 1.0)",
        "E: Unable to correct problems, you have held broken packages.",
    ]));
    let log = log(vec![(Some(DOSE3_SECTION), dose3_lines)]);

    let result = find_install_deps_failure(&log).expect("no fatal fault");
    assert_eq!(result.section.as_deref(), Some(DOSE3_SECTION));
    assert!(result.offset.is_some());
    let problem = result.problem.expect("classified");
    assert_eq!(problem.kind(), "unsatisfied-dependencies");
    assert_eq!(
        problem.to_string(),
        "Unsatisfied dependencies: librust-foo-dev (>= 1.0)"
    );
}

#[test]
fn test_install_deps_first_located_section_wins() {
    let log = log(vec![
        (
            Some("install core build dependencies (apt-based resolver)"),
            lines(&["E: Unable to locate package libfirst-dev"]),
        ),
        (
            Some("install extra build dependencies (apt-based resolver)"),
            lines(&["E: Unable to locate package libsecond-dev"]),
        ),
    ]);

    let result = find_install_deps_failure(&log).expect("no fatal fault");
    assert_eq!(
        result.section.as_deref(),
        Some("install core build dependencies (apt-based resolver)")
    );
    assert_eq!(
        result.problem,
        Some(Problem::AptPackageUnknown {
            package: "libfirst-dev".to_string()
        })
    );
}

#[test]
fn test_install_deps_nothing_located_reports_last_section() {
    let log = log(vec![
        (
            Some("install package build dependencies (apt-based resolver)"),
            lines(&["all fine here"]),
        ),
        (Some("build"), lines(&["gcc -o foo foo.c"])),
    ]);

    let result = find_install_deps_failure(&log).expect("no fatal fault");
    assert_eq!(result.section.as_deref(), Some("build"));
    assert_eq!(result.offset, None);
    assert_eq!(result.problem, None);
}

#[test]
fn test_install_deps_dose3_candidate_survives_without_location() {
    // A broken resolver report with no locatable apt failure line still
    // yields the classification, just without a position.
    let log = log(vec![(Some(DOSE3_SECTION), lines(BROKEN_CUDF))]);

    let result = find_install_deps_failure(&log).expect("no fatal fault");
    assert_eq!(result.offset, None);
    let problem = result.problem.expect("classified");
    assert_eq!(problem.kind(), "unsatisfied-dependencies");
}

#[test]
fn test_install_deps_unexpected_dose3_report_is_fatal() {
    let log = log(vec![(
        Some(DOSE3_SECTION),
        lines(&[
            "output-version: 1.2",
            "report:",
            " - package: some-other-package",
            "   status: broken",
        ]),
    )]);

    let err = find_install_deps_failure(&log).expect_err("must fault");
    let AnalysisError::UnexpectedDose3Report { packages } = err;
    assert_eq!(packages, vec!["some-other-package".to_string()]);
}

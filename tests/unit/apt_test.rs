//! Tests for the apt/dpkg line scanner

use buildlog_triage::apt::find_apt_get_failure;
use buildlog_triage::problems::Problem;

fn lines(items: &[&str]) -> Vec<String> {
    items.iter().map(ToString::to_string).collect()
}

#[test]
fn test_package_unknown() {
    let buffer = lines(&[
        "Reading package lists...",
        "Building dependency tree...",
        "E: Unable to locate package foo",
    ]);
    let scan = find_apt_get_failure(&buffer);
    assert_eq!(scan.offset, Some(3));
    assert_eq!(scan.line.as_deref(), Some("E: Unable to locate package foo"));
    assert_eq!(
        scan.problem,
        Some(Problem::AptPackageUnknown {
            package: "foo".to_string()
        })
    );
}

#[test]
fn test_fetch_failure() {
    let buffer = lines(&[
        "E: Failed to fetch http://deb.example/pool/f_1.deb  404  Not Found [IP: 2620::10 80]",
    ]);
    let scan = find_apt_get_failure(&buffer);
    assert_eq!(scan.offset, Some(1));
    assert_eq!(
        scan.problem,
        Some(Problem::AptFetchFailure {
            url: Some("http://deb.example/pool/f_1.deb".to_string()),
            error: "404  Not Found [IP: 2620::10 80]".to_string(),
        })
    );
}

#[test]
fn test_fetch_failure_unparseable_still_stops() {
    // Prefix matches but the url/error shape does not: the boundary is
    // still reported, unclassified.
    let buffer = lines(&["E: Failed to fetch something-without-two-spaces"]);
    let scan = find_apt_get_failure(&buffer);
    assert_eq!(scan.offset, Some(1));
    assert!(scan.problem.is_none());
    assert!(scan.line.is_some());
}

#[test]
fn test_broken_packages_reports_preceding_line() {
    let buffer = lines(&["some context", "E: Broken packages"]);
    let scan = find_apt_get_failure(&buffer);
    assert_eq!(scan.offset, Some(1));
    assert_eq!(scan.line.as_deref(), Some("some context"));
    assert_eq!(
        scan.problem,
        Some(Problem::AptBrokenPackages {
            description: "some context".to_string()
        })
    );
}

#[test]
fn test_held_broken_packages() {
    let buffer = lines(&[
        " libfoo-dev : Depends: libfoo1 (= 1.0) but 2.0 is to be installed",
        "E: Unable to correct problems, you have held broken packages.",
    ]);
    let scan = find_apt_get_failure(&buffer);
    assert_eq!(scan.offset, Some(1));
    assert_eq!(
        scan.problem,
        Some(Problem::AptBrokenPackages {
            description: "libfoo-dev : Depends: libfoo1 (= 1.0) but 2.0 is to be installed"
                .to_string()
        })
    );
}

#[test]
fn test_missing_release_file() {
    let buffer = lines(&[
        "E: The repository 'http://deb.example/unstable sid Release' does not have a Release file.",
    ]);
    let scan = find_apt_get_failure(&buffer);
    assert_eq!(
        scan.problem,
        Some(Problem::AptMissingReleaseFile {
            url: "http://deb.example/unstable sid Release".to_string()
        })
    );
}

#[test]
fn test_dpkg_error_no_space_is_not_dpkg_error() {
    let buffer = lines(&["dpkg: error: /var/foo: No space left on device"]);
    let scan = find_apt_get_failure(&buffer);
    assert_eq!(scan.problem, Some(Problem::NoSpaceOnDevice));
}

#[test]
fn test_dpkg_error() {
    let buffer = lines(&["dpkg: error: cannot scan updates directory"]);
    let scan = find_apt_get_failure(&buffer);
    assert_eq!(scan.offset, Some(1));
    assert_eq!(
        scan.problem,
        Some(Problem::DpkgError {
            error: "cannot scan updates directory".to_string()
        })
    );
}

#[test]
fn test_dpkg_deb_write_failure_is_no_space() {
    let buffer = lines(&[
        "dpkg-deb: error: unable to write file '/tmp/apt-dpkg-install/01-foo.deb': No space left on device",
    ]);
    let scan = find_apt_get_failure(&buffer);
    assert_eq!(scan.problem, Some(Problem::NoSpaceOnDevice));
}

#[test]
fn test_not_enough_free_space() {
    let buffer = lines(&["E: You don't have enough free space in /var/cache/apt/archives/."]);
    let scan = find_apt_get_failure(&buffer);
    assert_eq!(scan.problem, Some(Problem::NoSpaceOnDevice));
}

#[test]
fn test_processing_package_reports_detail_line() {
    let buffer = lines(&[
        "dpkg: error processing package foo (--configure):",
        "  detail message",
    ]);
    let scan = find_apt_get_failure(&buffer);
    assert_eq!(scan.offset, Some(2));
    assert_eq!(scan.line.as_deref(), Some("detail message"));
    assert_eq!(
        scan.problem,
        Some(Problem::DpkgError {
            error: "processing package foo (--configure)".to_string()
        })
    );
}

#[test]
fn test_processing_package_without_detail_line() {
    let buffer = lines(&["dpkg: error processing package foo (--configure):"]);
    let scan = find_apt_get_failure(&buffer);
    assert_eq!(scan.offset, Some(1));
    assert_eq!(
        scan.problem,
        Some(Problem::DpkgError {
            error: "processing package foo (--configure)".to_string()
        })
    );
}

#[test]
fn test_generic_error_line_is_fallback_only() {
    let buffer = lines(&["E: something nonspecific went wrong", "ordinary output"]);
    let scan = find_apt_get_failure(&buffer);
    assert_eq!(scan.offset, Some(1));
    assert_eq!(scan.line.as_deref(), Some("E: something nonspecific went wrong"));
    assert!(scan.problem.is_none());
}

#[test]
fn test_fallback_does_not_shadow_priority_match() {
    // The generic E: line appears later in the buffer (scanned first), but
    // the scan keeps going and the dpkg error wins.
    let buffer = lines(&[
        "dpkg: error: cannot scan updates directory",
        "E: something nonspecific went wrong",
    ]);
    let scan = find_apt_get_failure(&buffer);
    assert_eq!(scan.offset, Some(1));
    assert_eq!(
        scan.problem,
        Some(Problem::DpkgError {
            error: "cannot scan updates directory".to_string()
        })
    );
}

#[test]
fn test_forward_pass_finds_no_space_outside_window() {
    let mut items = vec![" disk.img: No space left on device"];
    let filler: Vec<String> = (0..60).map(|i| format!("neutral line {i}")).collect();
    items.extend(filler.iter().map(String::as_str));
    let buffer = lines(&items);

    let scan = find_apt_get_failure(&buffer);
    assert_eq!(scan.offset, Some(1));
    assert_eq!(scan.problem, Some(Problem::NoSpaceOnDevice));
}

#[test]
fn test_forward_pass_copy_extract_pattern() {
    let buffer = lines(&[
        " cannot copy extracted data for './usr/lib/foo.so' to '/usr/lib/foo.so.dpkg-new': failed to write (No space left on device)",
    ]);
    let scan = find_apt_get_failure(&buffer);
    assert_eq!(scan.problem, Some(Problem::NoSpaceOnDevice));
}

#[test]
fn test_window_excludes_old_lines() {
    let mut items: Vec<String> = vec!["E: Unable to locate package foo".to_string()];
    items.extend((0..60).map(|i| format!("neutral line {i}")));
    let buffer = items;

    // The recognizable line is more than 49 lines from the end, and the
    // forward pass only looks for disk-space complaints.
    let scan = find_apt_get_failure(&buffer);
    assert_eq!(scan.offset, None);
    assert_eq!(scan.line, None);
    assert_eq!(scan.problem, None);
}

#[test]
fn test_empty_buffer() {
    let scan = find_apt_get_failure(&[]);
    assert!(!scan.is_located());
    assert!(scan.problem.is_none());
}

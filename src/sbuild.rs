//! Sbuild log segmentation
//!
//! Splits a raw sbuild transcript into named sections. Sbuild marks each
//! build step with a banner:
//!
//! ```text
//! +------------------------------------------------------------------+
//! | Update chroot                                                    |
//! +------------------------------------------------------------------+
//! ```
//!
//! The banner title, trimmed and lowercased, becomes the section key.
//! Content before the first banner belongs to the unnamed section.

use std::sync::LazyLock;

use regex::Regex;

use crate::sections::{Section, SectionedLog};

static BANNER_RULE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+-+\+$").expect("valid pattern"));
static BANNER_TITLE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\|\s*(.*?)\s*\|$").expect("valid pattern"));

/// Split an sbuild transcript into ordered, named sections
#[must_use]
pub fn parse_sbuild_log(lines: &[String]) -> SectionedLog {
    let mut log = SectionedLog::new();
    let mut title: Option<String> = None;
    let mut body: Vec<String> = Vec::new();
    let mut i = 0;

    while i < lines.len() {
        if let Some(next_title) = banner_title_at(lines, i) {
            log.push(Section::new(title.take(), std::mem::take(&mut body)));
            title = Some(next_title);
            i += 3;
            continue;
        }
        body.push(lines[i].trim_end_matches('\n').to_string());
        i += 1;
    }
    log.push(Section::new(title, body));
    log
}

/// Recognize a three-line section banner starting at `i`
fn banner_title_at(lines: &[String], i: usize) -> Option<String> {
    if i + 2 >= lines.len() {
        return None;
    }
    if !BANNER_RULE_RE.is_match(lines[i].trim_end())
        || !BANNER_RULE_RE.is_match(lines[i + 2].trim_end())
    {
        return None;
    }
    BANNER_TITLE_RE
        .captures(lines[i + 1].trim_end())
        .map(|caps| caps[1].to_lowercase())
}

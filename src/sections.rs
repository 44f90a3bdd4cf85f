//! Ordered section map for segmented build logs
//!
//! A build log arrives already split into named sections (one per build
//! step), each holding an ordered list of newline-stripped lines. Section
//! order is significant: locators scan candidate sections in the order they
//! appear in the transcript.

/// A named, ordered slice of a build-log transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    /// Section title, or `None` for content before the first header
    pub title: Option<String>,
    /// Raw log lines, newline-stripped
    pub lines: Vec<String>,
}

impl Section {
    /// Create a new section
    #[must_use]
    pub const fn new(title: Option<String>, lines: Vec<String>) -> Self {
        Self { title, lines }
    }
}

/// An ordered collection of log sections
///
/// Titles are not required to be unique; lookups return the first section
/// with a matching title. Iteration preserves transcript order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SectionedLog {
    sections: Vec<Section>,
}

impl SectionedLog {
    /// Create an empty log
    #[must_use]
    pub const fn new() -> Self {
        Self {
            sections: Vec::new(),
        }
    }

    /// Append a section, preserving order
    pub fn push(&mut self, section: Section) {
        self.sections.push(section);
    }

    /// Get the lines of the first section with the given title
    #[must_use]
    pub fn lines(&self, title: &str) -> Option<&[String]> {
        self.sections
            .iter()
            .find(|s| s.title.as_deref() == Some(title))
            .map(|s| s.lines.as_slice())
    }

    /// Iterate sections in transcript order
    #[must_use]
    pub fn iter(&self) -> std::slice::Iter<'_, Section> {
        self.sections.iter()
    }

    /// Number of sections
    #[must_use]
    pub fn len(&self) -> usize {
        self.sections.len()
    }

    /// Whether the log has no sections
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }
}

impl<'a> IntoIterator for &'a SectionedLog {
    type Item = &'a Section;
    type IntoIter = std::slice::Iter<'a, Section>;

    fn into_iter(self) -> Self::IntoIter {
        self.sections.iter()
    }
}

impl FromIterator<(Option<String>, Vec<String>)> for SectionedLog {
    fn from_iter<T: IntoIterator<Item = (Option<String>, Vec<String>)>>(iter: T) -> Self {
        Self {
            sections: iter.into_iter().map(|(title, lines)| Section::new(title, lines)).collect(),
        }
    }
}

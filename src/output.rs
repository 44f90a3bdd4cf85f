//! Output formatting for human and JSON modes
//!
//! This module provides structured output that can be rendered either as
//! human-readable text or machine-parseable JSON.

use serde::Serialize;

use crate::problems::Problem;

/// Output mode for the CLI
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Human-readable output (default)
    #[default]
    Human,
    /// JSON output (machine-readable)
    Json,
}

/// Result of analyzing one transcript
#[derive(Debug, Serialize)]
pub struct AnalysisReport {
    /// Section the failure was located in, if any
    pub section: Option<String>,
    /// Test the failure is attributed to (autopkgtest logs only)
    pub testname: Option<String>,
    /// 1-based line offset of the key failure line
    pub offset: Option<usize>,
    /// Text of the key failure line
    pub line: Option<String>,
    /// Stable kind tag of the classified problem
    pub kind: Option<&'static str>,
    /// The classified problem
    pub problem: Option<Problem>,
    /// Human-oriented description
    pub description: Option<String>,
}

impl AnalysisReport {
    /// Render the report based on output mode
    pub fn render(&self, mode: OutputMode) {
        match mode {
            OutputMode::Human => self.render_human(),
            OutputMode::Json => self.render_json(),
        }
    }

    fn render_human(&self) {
        if self.offset.is_none() && self.problem.is_none() {
            println!("No recognizable failure found.");
            return;
        }

        if let Some(section) = &self.section {
            println!("Section: {section}");
        }
        if let Some(testname) = &self.testname {
            println!("Test: {testname}");
        }
        if let (Some(offset), Some(line)) = (self.offset, &self.line) {
            println!("Line {offset}: {line}");
        }
        match &self.problem {
            Some(problem) => {
                println!("Problem [{}]: {problem}", problem.kind());
            },
            None => println!("Problem: unclassified"),
        }
        if let Some(description) = &self.description {
            println!("Description: {description}");
        }
    }

    fn render_json(&self) {
        println!("{}", serde_json::to_string_pretty(self).unwrap_or_default());
    }
}

//! Debian package-relation grammar
//!
//! Parses and formats dependency/conflict expressions of the form
//! `foo (>= 1.2) | bar:any, baz`: comma-separated groups of `|`-separated
//! alternatives, each naming a package with an optional version constraint
//! and an optional architecture qualifier.
//!
//! Parsing is lenient in the same way the Debian tooling is: an atom that
//! does not fit the grammar is kept whole as a package name so that no
//! information is dropped from resolver output.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

static RELATION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?x)^\s*
          (?P<name>[a-zA-Z0-9.+\-~]+)
          (?: : (?P<archqual>[a-zA-Z0-9][a-zA-Z0-9-]*) )?
          (?: \s* \( \s* (?P<op>[><=]+) \s* (?P<version>[^\s)]+) \s* \) )?
          \s*$",
    )
    .expect("relation pattern is valid")
});

/// A version constraint operator in a package relation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum VersionConstraint {
    /// `>=`
    GreaterThanEqual,
    /// `<=`
    LessThanEqual,
    /// `=`
    Equal,
    /// `>>` (strictly greater; `>` is accepted as a legacy spelling)
    GreaterThan,
    /// `<<` (strictly less; `<` is accepted as a legacy spelling)
    LessThan,
}

impl VersionConstraint {
    /// Parse a constraint operator as it appears in relation text
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        match text {
            ">=" => Some(Self::GreaterThanEqual),
            "<=" => Some(Self::LessThanEqual),
            "=" => Some(Self::Equal),
            ">>" | ">" => Some(Self::GreaterThan),
            "<<" | "<" => Some(Self::LessThan),
            _ => None,
        }
    }

    /// Canonical spelling of the operator
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GreaterThanEqual => ">=",
            Self::LessThanEqual => "<=",
            Self::Equal => "=",
            Self::GreaterThan => ">>",
            Self::LessThan => "<<",
        }
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single relation atom: package name plus optional constraints
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Relation {
    /// Package name
    pub name: String,
    /// Architecture qualifier (the `any` in `foo:any`), if present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archqual: Option<String>,
    /// Version constraint and version string, if present
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<(VersionConstraint, String)>,
}

impl Relation {
    /// Create a relation with just a package name
    #[must_use]
    pub fn simple(name: &str) -> Self {
        Self {
            name: name.to_string(),
            archqual: None,
            version: None,
        }
    }

    /// Parse a single relation atom
    ///
    /// An atom that does not fit the grammar is kept whole as a name, with
    /// a warning, rather than being dropped.
    #[must_use]
    pub fn parse(text: &str) -> Self {
        let Some(caps) = RELATION_RE.captures(text) else {
            log::warn!("cannot parse package relationship {text:?}, returning it raw");
            return Self {
                name: text.to_string(),
                archqual: None,
                version: None,
            };
        };
        let version = match (caps.name("op"), caps.name("version")) {
            (Some(op), Some(version)) => match VersionConstraint::parse(op.as_str()) {
                Some(constraint) => Some((constraint, version.as_str().to_string())),
                None => {
                    log::warn!("cannot parse package relationship {text:?}, returning it raw");
                    return Self {
                        name: text.to_string(),
                        archqual: None,
                        version: None,
                    };
                },
            },
            _ => None,
        };
        Self {
            name: caps["name"].to_string(),
            archqual: caps.name("archqual").map(|m| m.as_str().to_string()),
            version,
        }
    }
}

impl fmt::Display for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)?;
        if let Some(archqual) = &self.archqual {
            write!(f, ":{archqual}")?;
        }
        if let Some((constraint, version)) = &self.version {
            write!(f, " ({constraint} {version})")?;
        }
        Ok(())
    }
}

/// A group of OR-alternatives: one of these relations must hold
pub type RelationGroup = Vec<Relation>;

/// Parse a full relation field into AND-groups of OR-alternatives
#[must_use]
pub fn parse_relations(text: &str) -> Vec<RelationGroup> {
    text.split(',')
        .map(str::trim)
        .filter(|group| !group.is_empty())
        .map(|group| group.split('|').map(|atom| Relation::parse(atom.trim())).collect())
        .collect()
}

/// Format AND-groups of OR-alternatives back into relation text
#[must_use]
pub fn format_relations(relations: &[RelationGroup]) -> String {
    relations
        .iter()
        .map(|group| {
            group.iter().map(ToString::to_string).collect::<Vec<_>>().join(" | ")
        })
        .collect::<Vec<_>>()
        .join(", ")
}

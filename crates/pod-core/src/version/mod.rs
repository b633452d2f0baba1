//! Semantic version types.
//!
//! Provides the Version type following the semantic versioning
//! specification, plus the VersionConstraint interval algebra used by
//! the solver.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{PodError, PodResult};

mod constraint;

pub use constraint::{VersionConstraint, VersionRange};

/// Semantic version (major.minor.patch-prerelease+build)
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Version {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
    pub pre: Vec<Identifier>,
    pub build: Vec<Identifier>,
}

/// A dot-separated pre-release or build identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Identifier {
    /// Purely numeric identifier, compared numerically
    Numeric(u64),
    /// Alphanumeric identifier, compared lexically
    AlphaNumeric(String),
}

impl Version {
    /// Create a new release version
    pub fn new(major: u64, minor: u64, patch: u64) -> Self {
        Self {
            major,
            minor,
            patch,
            pre: Vec::new(),
            build: Vec::new(),
        }
    }

    /// Check if this is a pre-release version
    pub fn is_pre_release(&self) -> bool {
        !self.pre.is_empty()
    }

    /// The smallest version that is a breaking change from this one:
    /// the first non-zero component is incremented (`^` semantics).
    pub fn next_breaking(&self) -> Version {
        if self.major > 0 {
            Version::new(self.major + 1, 0, 0)
        } else if self.minor > 0 {
            Version::new(0, self.minor + 1, 0)
        } else {
            Version::new(0, 0, self.patch + 1)
        }
    }

    /// Precedence comparison per semver: build metadata is ignored and
    /// a pre-release sorts below its release.
    fn precedence_cmp(&self, other: &Self) -> Ordering {
        match (self.major, self.minor, self.patch).cmp(&(other.major, other.minor, other.patch)) {
            Ordering::Equal => match (self.pre.is_empty(), other.pre.is_empty()) {
                (true, true) => Ordering::Equal,
                (false, true) => Ordering::Less,
                (true, false) => Ordering::Greater,
                (false, false) => compare_identifiers(&self.pre, &other.pre),
            },
            other => other,
        }
    }
}

/// Compare identifier lists per semver: element-wise, numeric below
/// alphanumeric, and a shorter list of equal elements sorts first.
fn compare_identifiers(a: &[Identifier], b: &[Identifier]) -> Ordering {
    for (left, right) in a.iter().zip(b.iter()) {
        let ordering = match (left, right) {
            (Identifier::Numeric(l), Identifier::Numeric(r)) => l.cmp(r),
            (Identifier::Numeric(_), Identifier::AlphaNumeric(_)) => Ordering::Less,
            (Identifier::AlphaNumeric(_), Identifier::Numeric(_)) => Ordering::Greater,
            (Identifier::AlphaNumeric(l), Identifier::AlphaNumeric(r)) => l.cmp(r),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    a.len().cmp(&b.len())
}

fn parse_identifiers(text: &str, what: &str) -> PodResult<Vec<Identifier>> {
    text.split('.')
        .map(|part| {
            if part.is_empty() {
                return Err(PodError::parse(format!("empty {what} identifier in version")));
            }
            if !part.bytes().all(|b| b.is_ascii_alphanumeric() || b == b'-') {
                return Err(PodError::parse(format!(
                    "invalid {what} identifier \"{part}\""
                )));
            }
            if part.bytes().all(|b| b.is_ascii_digit()) {
                if part.len() > 1 && part.starts_with('0') {
                    return Err(PodError::parse(format!(
                        "{what} identifier \"{part}\" has a leading zero"
                    )));
                }
                Ok(Identifier::Numeric(part.parse().map_err(|_| {
                    PodError::parse(format!("{what} identifier \"{part}\" is out of range"))
                })?))
            } else {
                Ok(Identifier::AlphaNumeric(part.to_string()))
            }
        })
        .collect()
}

impl FromStr for Version {
    type Err = PodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();

        // Split off build metadata, then the pre-release suffix
        let (version_part, build) = match input.split_once('+') {
            Some((v, b)) => (v, parse_identifiers(b, "build")?),
            None => (input, Vec::new()),
        };
        let (core_part, pre) = match version_part.split_once('-') {
            Some((c, p)) => (c, parse_identifiers(p, "pre-release")?),
            None => (version_part, Vec::new()),
        };

        let parts: Vec<&str> = core_part.split('.').collect();
        if parts.len() != 3 {
            return Err(PodError::parse(format!("invalid version \"{input}\"")));
        }
        let component = |text: &str| -> PodResult<u64> {
            text.parse()
                .map_err(|_| PodError::parse(format!("invalid version component \"{text}\"")))
        };

        Ok(Version {
            major: component(parts[0])?,
            minor: component(parts[1])?,
            patch: component(parts[2])?,
            pre,
            build,
        })
    }
}

impl TryFrom<String> for Version {
    type Error = PodError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Version> for String {
    fn from(version: Version) -> String {
        version.to_string()
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Numeric(n) => write!(f, "{n}"),
            Identifier::AlphaNumeric(s) => write!(f, "{s}"),
        }
    }
}

fn write_identifiers(f: &mut fmt::Formatter<'_>, ids: &[Identifier]) -> fmt::Result {
    for (i, id) in ids.iter().enumerate() {
        if i > 0 {
            write!(f, ".")?;
        }
        write!(f, "{id}")?;
    }
    Ok(())
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)?;
        if !self.pre.is_empty() {
            write!(f, "-")?;
            write_identifiers(f, &self.pre)?;
        }
        if !self.build.is_empty() {
            write!(f, "+")?;
            write_identifiers(f, &self.build)?;
        }
        Ok(())
    }
}

// Equality and ordering ignore build metadata per semver precedence.
impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.precedence_cmp(other) == Ordering::Equal
    }
}

impl Hash for Version {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.major.hash(state);
        self.minor.hash(state);
        self.patch.hash(state);
        self.pre.hash(state);
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.precedence_cmp(other)
    }
}

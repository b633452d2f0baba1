//! Version constraint interval algebra.
//!
//! A constraint is a union of disjoint version ranges. The solver leans
//! on two facts: `intersect` is total, and narrowing a constraint never
//! allows a previously disallowed version.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use crate::error::{PodError, PodResult};
use crate::version::Version;

/// An interval of versions, unbounded in either direction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRange {
    pub min: Option<Version>,
    pub max: Option<Version>,
    pub include_min: bool,
    pub include_max: bool,
}

/// A set of allowed versions: anything, nothing, one range, or a
/// normalized union of disjoint ranges
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VersionConstraint {
    Any,
    Empty,
    Range(VersionRange),
    Union(Vec<VersionRange>),
}

impl VersionRange {
    /// The unbounded range
    pub fn any() -> Self {
        Self {
            min: None,
            max: None,
            include_min: false,
            include_max: false,
        }
    }

    /// The range containing exactly one version
    pub fn exact(version: Version) -> Self {
        Self {
            min: Some(version.clone()),
            max: Some(version),
            include_min: true,
            include_max: true,
        }
    }

    pub fn is_empty(&self) -> bool {
        match (&self.min, &self.max) {
            (Some(min), Some(max)) => match min.cmp(max) {
                Ordering::Greater => true,
                Ordering::Equal => !(self.include_min && self.include_max),
                Ordering::Less => false,
            },
            _ => false,
        }
    }

    pub fn allows(&self, version: &Version) -> bool {
        if let Some(min) = &self.min {
            match version.cmp(min) {
                Ordering::Less => return false,
                Ordering::Equal if !self.include_min => return false,
                _ => {}
            }
        }
        if let Some(max) = &self.max {
            match version.cmp(max) {
                Ordering::Greater => return false,
                Ordering::Equal if !self.include_max => return false,
                _ => {}
            }
        }
        true
    }

    /// Intersection of two ranges, or None when they are disjoint
    pub fn intersect(&self, other: &VersionRange) -> Option<VersionRange> {
        let (min, include_min) =
            match lower_cmp(&self.min, self.include_min, &other.min, other.include_min) {
                Ordering::Less => (other.min.clone(), other.include_min),
                _ => (self.min.clone(), self.include_min),
            };
        let (max, include_max) =
            match upper_cmp(&self.max, self.include_max, &other.max, other.include_max) {
                Ordering::Greater => (other.max.clone(), other.include_max),
                _ => (self.max.clone(), self.include_max),
            };
        let range = VersionRange {
            min,
            max,
            include_min,
            include_max,
        };
        if range.is_empty() {
            None
        } else {
            Some(range)
        }
    }
}

/// Order two lower bounds; `None` is negative infinity and an inclusive
/// bound sits below the exclusive bound on the same version.
fn lower_cmp(a: &Option<Version>, a_inc: bool, b: &Option<Version>, b_inc: bool) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(va), Some(vb)) => va.cmp(vb).then(match (a_inc, b_inc) {
            (true, false) => Ordering::Less,
            (false, true) => Ordering::Greater,
            _ => Ordering::Equal,
        }),
    }
}

/// Order two upper bounds; `None` is positive infinity and an exclusive
/// bound sits below the inclusive bound on the same version.
fn upper_cmp(a: &Option<Version>, a_inc: bool, b: &Option<Version>, b_inc: bool) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(va), Some(vb)) => va.cmp(vb).then(match (a_inc, b_inc) {
            (false, true) => Ordering::Less,
            (true, false) => Ordering::Greater,
            _ => Ordering::Equal,
        }),
    }
}

/// Whether a range ending at `upper` connects to one starting at
/// `lower` (they overlap, or touch with at least one inclusive end)
fn bounds_connect(
    upper: &Option<Version>,
    upper_inc: bool,
    lower: &Option<Version>,
    lower_inc: bool,
) -> bool {
    match (upper, lower) {
        (None, _) | (_, None) => true,
        (Some(u), Some(l)) => match u.cmp(l) {
            Ordering::Greater => true,
            Ordering::Equal => upper_inc || lower_inc,
            Ordering::Less => false,
        },
    }
}

impl VersionConstraint {
    /// Parse a constraint: `any`, a bare version, `^x.y.z`, or
    /// space-separated comparison operators (`>=a.b.c <d.e.f`).
    pub fn parse(text: &str) -> PodResult<VersionConstraint> {
        let text = text.trim();
        if text.is_empty() || text == "any" {
            return Ok(VersionConstraint::Any);
        }
        let mut constraint = VersionConstraint::Any;
        for word in text.split_whitespace() {
            constraint = constraint.intersect(&parse_primary(word)?);
        }
        Ok(constraint)
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, VersionConstraint::Empty)
    }

    pub fn allows(&self, version: &Version) -> bool {
        match self {
            VersionConstraint::Any => true,
            VersionConstraint::Empty => false,
            VersionConstraint::Range(range) => range.allows(version),
            VersionConstraint::Union(ranges) => ranges.iter().any(|r| r.allows(version)),
        }
    }

    pub fn intersect(&self, other: &VersionConstraint) -> VersionConstraint {
        let mut pieces = Vec::new();
        for a in &self.ranges() {
            for b in &other.ranges() {
                if let Some(piece) = a.intersect(b) {
                    pieces.push(piece);
                }
            }
        }
        normalize(pieces)
    }

    pub fn union(&self, other: &VersionConstraint) -> VersionConstraint {
        let mut pieces = self.ranges();
        pieces.extend(other.ranges());
        normalize(pieces)
    }

    fn ranges(&self) -> Vec<VersionRange> {
        match self {
            VersionConstraint::Any => vec![VersionRange::any()],
            VersionConstraint::Empty => Vec::new(),
            VersionConstraint::Range(range) => vec![range.clone()],
            VersionConstraint::Union(ranges) => ranges.clone(),
        }
    }
}

/// Sort, merge, and collapse a list of ranges into canonical form
fn normalize(mut ranges: Vec<VersionRange>) -> VersionConstraint {
    ranges.retain(|r| !r.is_empty());
    if ranges.is_empty() {
        return VersionConstraint::Empty;
    }
    ranges.sort_by(|a, b| {
        lower_cmp(&a.min, a.include_min, &b.min, b.include_min)
            .then_with(|| upper_cmp(&a.max, a.include_max, &b.max, b.include_max))
    });

    let mut merged: Vec<VersionRange> = Vec::with_capacity(ranges.len());
    for range in ranges {
        match merged.last_mut() {
            Some(last)
                if bounds_connect(&last.max, last.include_max, &range.min, range.include_min) =>
            {
                if upper_cmp(&last.max, last.include_max, &range.max, range.include_max)
                    == Ordering::Less
                {
                    last.max = range.max;
                    last.include_max = range.include_max;
                }
            }
            _ => merged.push(range),
        }
    }

    if merged.len() == 1 {
        let only = merged.into_iter().next().unwrap();
        if only.min.is_none() && only.max.is_none() {
            VersionConstraint::Any
        } else {
            VersionConstraint::Range(only)
        }
    } else {
        VersionConstraint::Union(merged)
    }
}

fn parse_primary(word: &str) -> PodResult<VersionConstraint> {
    let range = if let Some(rest) = word.strip_prefix('^') {
        let version: Version = rest.parse()?;
        VersionRange {
            max: Some(version.next_breaking()),
            min: Some(version),
            include_min: true,
            include_max: false,
        }
    } else if let Some(rest) = word.strip_prefix(">=") {
        VersionRange {
            min: Some(rest.parse()?),
            max: None,
            include_min: true,
            include_max: false,
        }
    } else if let Some(rest) = word.strip_prefix("<=") {
        VersionRange {
            min: None,
            max: Some(rest.parse()?),
            include_min: false,
            include_max: true,
        }
    } else if let Some(rest) = word.strip_prefix('>') {
        VersionRange {
            min: Some(rest.parse()?),
            max: None,
            include_min: false,
            include_max: false,
        }
    } else if let Some(rest) = word.strip_prefix('<') {
        VersionRange {
            min: None,
            max: Some(rest.parse()?),
            include_min: false,
            include_max: false,
        }
    } else if let Some(rest) = word.strip_prefix('=') {
        VersionRange::exact(rest.parse()?)
    } else {
        VersionRange::exact(word.parse()?)
    };
    if range.is_empty() {
        return Ok(VersionConstraint::Empty);
    }
    Ok(VersionConstraint::Range(range))
}

impl FromStr for VersionConstraint {
    type Err = PodError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VersionConstraint::parse(s)
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let (Some(min), Some(max)) = (&self.min, &self.max) {
            if min == max && self.include_min && self.include_max {
                return write!(f, "{min}");
            }
        }
        let mut wrote = false;
        if let Some(min) = &self.min {
            write!(f, "{}{min}", if self.include_min { ">=" } else { ">" })?;
            wrote = true;
        }
        if let Some(max) = &self.max {
            if wrote {
                write!(f, " ")?;
            }
            write!(f, "{}{max}", if self.include_max { "<=" } else { "<" })?;
            wrote = true;
        }
        if !wrote {
            write!(f, "any")?;
        }
        Ok(())
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VersionConstraint::Any => write!(f, "any"),
            VersionConstraint::Empty => write!(f, "<empty>"),
            VersionConstraint::Range(range) => write!(f, "{range}"),
            VersionConstraint::Union(ranges) => {
                for (i, range) in ranges.iter().enumerate() {
                    if i > 0 {
                        write!(f, " or ")?;
                    }
                    write!(f, "{range}")?;
                }
                Ok(())
            }
        }
    }
}

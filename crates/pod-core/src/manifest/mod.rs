//! The `pubspec.toml` manifest document.
//!
//! A pubspec names the package, optionally pins the SDK, and declares
//! runtime and dev dependencies. A dependency is either a bare
//! constraint string (implying the default hosted source) or a table
//! keyed by the source name with an optional `version` entry.

use std::collections::BTreeMap;

use camino::Utf8Path;
use serde::Deserialize;

use crate::error::{PodError, PodResult};
use crate::package::{Description, PackageRef, DEFAULT_HOSTED_URL};
use crate::version::{Version, VersionConstraint};

/// The manifest file name inside a package directory
pub const PUBSPEC_FILE: &str = "pubspec.toml";

const SOURCE_KEYS: [&str; 3] = ["hosted", "git", "path"];

/// A single dependency declaration: what to fetch and which versions
/// are acceptable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependency {
    pub target: PackageRef,
    pub constraint: VersionConstraint,
}

impl Dependency {
    pub fn new(target: PackageRef, constraint: VersionConstraint) -> Self {
        Self { target, constraint }
    }

    pub fn name(&self) -> &str {
        &self.target.name
    }
}

/// A parsed package manifest
#[derive(Debug, Clone)]
pub struct Pubspec {
    pub name: String,
    pub version: Option<Version>,
    pub sdk_constraint: Option<VersionConstraint>,
    pub dependencies: Vec<Dependency>,
    /// Consulted only when this package is the root of the solve
    pub dev_dependencies: Vec<Dependency>,
}

#[derive(Deserialize)]
struct RawPubspec {
    name: String,
    version: Option<String>,
    sdk: Option<String>,
    #[serde(default)]
    dependencies: BTreeMap<String, toml::Value>,
    #[serde(default)]
    dev_dependencies: BTreeMap<String, toml::Value>,
}

impl Pubspec {
    /// Parse a manifest; relative path dependencies resolve against
    /// `containing`
    pub fn parse(text: &str, containing: &Utf8Path) -> PodResult<Pubspec> {
        let raw: RawPubspec = toml::from_str(text)
            .map_err(|e| PodError::parse(format!("failed to parse pubspec: {}", e.message())))?;
        Self::from_raw(raw, containing)
    }

    /// Build a manifest from an already-decoded document (hosted index
    /// payloads arrive this way)
    pub fn from_value(value: toml::Value, containing: &Utf8Path) -> PodResult<Pubspec> {
        let raw: RawPubspec = value
            .try_into()
            .map_err(|e: toml::de::Error| {
                PodError::parse(format!("failed to parse pubspec: {}", e.message()))
            })?;
        Self::from_raw(raw, containing)
    }

    /// Read `pubspec.toml` from a package directory
    pub fn load(dir: &Utf8Path) -> PodResult<Pubspec> {
        let path = dir.join(PUBSPEC_FILE);
        let text = std::fs::read_to_string(&path)
            .map_err(|e| PodError::io(format!("failed to read {path}"), e))?;
        Self::parse(&text, dir)
    }

    fn from_raw(raw: RawPubspec, containing: &Utf8Path) -> PodResult<Pubspec> {
        if !is_valid_name(&raw.name) {
            return Err(PodError::parse(format!(
                "\"{}\" is not a valid package name",
                raw.name
            )));
        }
        let version = raw.version.as_deref().map(str::parse).transpose()?;
        let sdk_constraint = raw
            .sdk
            .as_deref()
            .map(VersionConstraint::parse)
            .transpose()?;

        let dependencies = parse_dependencies(&raw.dependencies, containing)?;
        let dev_dependencies = parse_dependencies(&raw.dev_dependencies, containing)?;
        for dep in &dev_dependencies {
            if dependencies.iter().any(|d| d.name() == dep.name()) {
                return Err(PodError::parse(format!(
                    "\"{}\" appears in both dependencies and dev_dependencies",
                    dep.name()
                )));
            }
        }

        Ok(Pubspec {
            name: raw.name,
            version,
            sdk_constraint,
            dependencies,
            dev_dependencies,
        })
    }

    /// The version a sourceless lookup reports for this package
    pub fn pseudo_version(&self) -> Version {
        self.version.clone().unwrap_or_else(|| Version::new(0, 0, 0))
    }
}

fn parse_dependencies(
    raw: &BTreeMap<String, toml::Value>,
    containing: &Utf8Path,
) -> PodResult<Vec<Dependency>> {
    raw.iter()
        .map(|(name, spec)| parse_dependency(name, spec, containing))
        .collect()
}

fn parse_dependency(
    name: &str,
    spec: &toml::Value,
    containing: &Utf8Path,
) -> PodResult<Dependency> {
    if !is_valid_name(name) {
        return Err(PodError::parse(format!(
            "\"{name}\" is not a valid dependency name"
        )));
    }
    match spec {
        // Bare constraint string: the default hosted source
        toml::Value::String(constraint) => Ok(Dependency::new(
            PackageRef::new(
                name,
                Description::Hosted {
                    url: DEFAULT_HOSTED_URL.to_string(),
                    name: name.to_string(),
                },
            ),
            VersionConstraint::parse(constraint)?,
        )),
        toml::Value::Table(table) => {
            let mut source: Option<(&str, &toml::Value)> = None;
            let mut constraint = VersionConstraint::Any;
            for (key, value) in table {
                if key == "version" {
                    let text = value.as_str().ok_or_else(|| {
                        PodError::parse(format!("version of \"{name}\" must be a string"))
                    })?;
                    constraint = VersionConstraint::parse(text)?;
                } else if SOURCE_KEYS.contains(&key.as_str()) {
                    if source.is_some() {
                        return Err(PodError::parse(format!(
                            "dependency \"{name}\" declares more than one source"
                        )));
                    }
                    source = Some((key, value));
                } else {
                    return Err(PodError::parse(format!(
                        "dependency \"{name}\" has unsupported key \"{key}\""
                    )));
                }
            }
            let (source_name, raw_description) = source.ok_or_else(|| {
                PodError::parse(format!("dependency \"{name}\" declares no source"))
            })?;
            let description =
                Description::parse(source_name, raw_description, containing, false)?;
            Ok(Dependency::new(
                PackageRef::new(name, description),
                constraint,
            ))
        }
        _ => Err(PodError::parse(format!(
            "dependency \"{name}\" must be a version string or a table"
        ))),
    }
}

/// Package names are identifiers: leading letter or underscore, then
/// letters, digits and underscores
fn is_valid_name(name: &str) -> bool {
    let mut bytes = name.bytes();
    match bytes.next() {
        Some(b) if b.is_ascii_alphabetic() || b == b'_' => {}
        _ => return false,
    }
    bytes.all(|b| b.is_ascii_alphanumeric() || b == b'_')
}

impl Default for Pubspec {
    fn default() -> Self {
        Pubspec {
            name: "_unnamed".to_string(),
            version: None,
            sdk_constraint: None,
            dependencies: Vec::new(),
            dev_dependencies: Vec::new(),
        }
    }
}

//! The `pubspec.lock` document.
//!
//! A lockfile maps every non-root package of the last successful solve
//! to its resolved id. The format is TOML ordered by package name so
//! diffs stay readable. Loading is strict: an unknown source or a
//! malformed entry corrupts the whole file.

use std::collections::BTreeMap;

use camino::Utf8Path;

use crate::error::{PodError, PodResult};
use crate::package::{Description, PackageId};
use crate::version::VersionConstraint;

const HEADER: &str = "# Generated by pod. Do not edit by hand.\n";

/// The persisted selection from the last successful resolve
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LockFile {
    pub packages: BTreeMap<String, PackageId>,
    pub sdk_constraint: Option<VersionConstraint>,
}

impl LockFile {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&PackageId> {
        self.packages.get(name)
    }

    /// Parse a lockfile; path descriptions resolve against `containing`
    pub fn parse(text: &str, containing: &Utf8Path) -> PodResult<LockFile> {
        let value: toml::Value = text.parse().map_err(|e: toml::de::Error| {
            PodError::LockFileCorrupt {
                message: e.message().to_string(),
            }
        })?;
        let root = value
            .as_table()
            .ok_or_else(|| corrupt("document is not a table"))?;

        let mut packages = BTreeMap::new();
        if let Some(section) = root.get("packages") {
            let section = section
                .as_table()
                .ok_or_else(|| corrupt("\"packages\" is not a table"))?;
            for (name, entry) in section {
                let id = parse_entry(name, entry, containing)?;
                packages.insert(name.clone(), id);
            }
        }

        let sdk_constraint = match root.get("sdk") {
            Some(sdk) => {
                let table = sdk
                    .as_table()
                    .ok_or_else(|| corrupt("\"sdk\" is not a table"))?;
                let text = table
                    .get("constraint")
                    .and_then(toml::Value::as_str)
                    .ok_or_else(|| corrupt("sdk section is missing \"constraint\""))?;
                Some(
                    VersionConstraint::parse(text)
                        .map_err(|e| corrupt(format!("invalid sdk constraint: {e}")))?,
                )
            }
            None => None,
        };

        Ok(LockFile {
            packages,
            sdk_constraint,
        })
    }

    /// Serialize to the stable on-disk form, ordered by name
    pub fn serialize(&self, containing: &Utf8Path) -> String {
        let mut packages = toml::map::Map::new();
        for (name, id) in &self.packages {
            let mut entry = toml::map::Map::new();
            entry.insert(
                "source".to_string(),
                toml::Value::String(id.source_name().to_string()),
            );
            entry.insert(
                "version".to_string(),
                toml::Value::String(id.version.to_string()),
            );
            entry.insert(
                "description".to_string(),
                id.description.serialize(containing),
            );
            packages.insert(name.clone(), toml::Value::Table(entry));
        }

        let mut root = toml::map::Map::new();
        root.insert("packages".to_string(), toml::Value::Table(packages));
        if let Some(constraint) = &self.sdk_constraint {
            let mut sdk = toml::map::Map::new();
            sdk.insert(
                "constraint".to_string(),
                toml::Value::String(constraint.to_string()),
            );
            root.insert("sdk".to_string(), toml::Value::Table(sdk));
        }

        let body = toml::to_string_pretty(&toml::Value::Table(root))
            .expect("lockfile serialization cannot fail");
        format!("{HEADER}\n{body}")
    }

    /// Load the lockfile at `path`, treating a missing file as empty
    pub fn load(path: &Utf8Path) -> PodResult<LockFile> {
        if !path.exists() {
            return Ok(LockFile::empty());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| PodError::io(format!("failed to read {path}"), e))?;
        let containing = path.parent().unwrap_or_else(|| Utf8Path::new("."));
        Self::parse(&text, containing)
    }

    /// Atomically write the lockfile: staging file in the same
    /// directory, then rename into place
    pub fn save(&self, path: &Utf8Path) -> PodResult<()> {
        let dir = path.parent().unwrap_or_else(|| Utf8Path::new("."));
        let text = self.serialize(dir);
        let staging = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| PodError::io(format!("failed to stage lockfile in {dir}"), e))?;
        std::fs::write(staging.path(), text.as_bytes())
            .map_err(|e| PodError::io("failed to write staged lockfile".to_string(), e))?;
        staging
            .persist(path)
            .map_err(|e| PodError::io(format!("failed to replace {path}"), e.error))?;
        Ok(())
    }
}

fn corrupt(message: impl Into<String>) -> PodError {
    PodError::LockFileCorrupt {
        message: message.into(),
    }
}

fn parse_entry(name: &str, entry: &toml::Value, containing: &Utf8Path) -> PodResult<PackageId> {
    let table = entry
        .as_table()
        .ok_or_else(|| corrupt(format!("entry for \"{name}\" is not a table")))?;
    let source = table
        .get("source")
        .and_then(toml::Value::as_str)
        .ok_or_else(|| corrupt(format!("entry for \"{name}\" is missing \"source\"")))?;
    let version = table
        .get("version")
        .and_then(toml::Value::as_str)
        .ok_or_else(|| corrupt(format!("entry for \"{name}\" is missing \"version\"")))?
        .parse()
        .map_err(|e| corrupt(format!("entry for \"{name}\" has a bad version: {e}")))?;
    let raw_description = table
        .get("description")
        .ok_or_else(|| corrupt(format!("entry for \"{name}\" is missing \"description\"")))?;
    let description = Description::parse(source, raw_description, containing, true)
        .map_err(|e| corrupt(format!("entry for \"{name}\": {e}")))?;

    Ok(PackageId {
        name: name.to_string(),
        description,
        version,
    })
}

//! Change report: what a solve did to the locked selection.

use std::collections::BTreeMap;

use pod_core::lockfile::LockFile;
use pod_core::package::PackageId;
use pod_core::version::Version;

/// How one package moved relative to the previous lockfile
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Added,
    Removed { previous: Version },
    Upgraded { previous: Version },
    Downgraded { previous: Version },
    Unchanged,
}

/// Diff of a solve result against the previous lockfile
#[derive(Debug, Clone)]
pub struct ChangeReport {
    entries: BTreeMap<String, (Option<Version>, Change)>,
}

impl ChangeReport {
    pub fn new(previous: &LockFile, result: &[PackageId]) -> Self {
        let mut entries = BTreeMap::new();
        for id in result {
            let change = match previous.get(&id.name) {
                None => Change::Added,
                Some(old) => match id.version.cmp(&old.version) {
                    std::cmp::Ordering::Greater => Change::Upgraded {
                        previous: old.version.clone(),
                    },
                    std::cmp::Ordering::Less => Change::Downgraded {
                        previous: old.version.clone(),
                    },
                    std::cmp::Ordering::Equal => Change::Unchanged,
                },
            };
            entries.insert(id.name.clone(), (Some(id.version.clone()), change));
        }
        for (name, old) in &previous.packages {
            if !entries.contains_key(name) {
                entries.insert(
                    name.clone(),
                    (
                        None,
                        Change::Removed {
                            previous: old.version.clone(),
                        },
                    ),
                );
            }
        }
        Self { entries }
    }

    /// Number of packages that moved
    pub fn changed(&self) -> usize {
        self.entries
            .values()
            .filter(|(_, change)| !matches!(change, Change::Unchanged))
            .count()
    }

    /// One line per changed package, ordered by name
    pub fn lines(&self) -> Vec<String> {
        self.entries
            .iter()
            .filter_map(|(name, (version, change))| match (version, change) {
                (Some(v), Change::Added) => Some(format!("+ {name} {v}")),
                (Some(v), Change::Upgraded { previous }) => {
                    Some(format!("> {name} {previous} -> {v}"))
                }
                (Some(v), Change::Downgraded { previous }) => {
                    Some(format!("< {name} {previous} -> {v}"))
                }
                (None, Change::Removed { previous }) => Some(format!("- {name} {previous}")),
                _ => None,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pod_core::package::{Description, PackageRef, DEFAULT_HOSTED_URL};

    fn hosted(name: &str, version: &str) -> PackageId {
        PackageRef::new(
            name,
            Description::Hosted {
                url: DEFAULT_HOSTED_URL.to_string(),
                name: name.to_string(),
            },
        )
        .at_version(version.parse().unwrap())
    }

    fn lockfile(pairs: &[(&str, &str)]) -> LockFile {
        let mut lockfile = LockFile::empty();
        for (name, version) in pairs {
            lockfile
                .packages
                .insert(name.to_string(), hosted(name, version));
        }
        lockfile
    }

    #[test]
    fn test_classification() {
        let previous = lockfile(&[
            ("kept", "1.0.0"),
            ("bumped", "1.0.0"),
            ("dropped", "1.0.0"),
            ("rolled", "2.0.0"),
        ]);
        let result = vec![
            hosted("kept", "1.0.0"),
            hosted("bumped", "1.2.0"),
            hosted("rolled", "1.9.0"),
            hosted("fresh", "0.1.0"),
        ];

        let report = ChangeReport::new(&previous, &result);
        assert_eq!(report.changed(), 4);

        let lines = report.lines();
        assert!(lines.contains(&"+ fresh 0.1.0".to_string()));
        assert!(lines.contains(&"> bumped 1.0.0 -> 1.2.0".to_string()));
        assert!(lines.contains(&"< rolled 2.0.0 -> 1.9.0".to_string()));
        assert!(lines.contains(&"- dropped 1.0.0".to_string()));
        assert!(!lines.iter().any(|l| l.contains("kept")));
    }

    #[test]
    fn test_unchanged_selection_reports_zero() {
        let previous = lockfile(&[("foo", "1.0.0")]);
        let result = vec![hosted("foo", "1.0.0")];
        let report = ChangeReport::new(&previous, &result);
        assert_eq!(report.changed(), 0);
        assert!(report.lines().is_empty());
    }

    #[test]
    fn test_single_upgrade_counts_one() {
        let previous = lockfile(&[("foo", "1.0.0")]);
        let result = vec![hosted("foo", "1.1.0")];
        let report = ChangeReport::new(&previous, &result);
        assert_eq!(report.changed(), 1);
    }
}

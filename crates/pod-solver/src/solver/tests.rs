//! Unit tests for the version solver, run against a canned provider

use super::*;

use async_trait::async_trait;
use camino::Utf8PathBuf;
use pod_core::manifest::Pubspec;
use pod_core::package::{Description, DEFAULT_HOSTED_URL};

/// Provider serving a frozen universe of packages, keyed by name
struct StubProvider {
    packages: HashMap<String, Vec<(Version, Pubspec)>>,
}

impl StubProvider {
    fn new() -> Self {
        Self {
            packages: HashMap::new(),
        }
    }

    fn add(mut self, name: &str, version: &str, deps: &[(&str, &str)]) -> Self {
        let version: Version = version.parse().unwrap();
        let pubspec = Pubspec {
            name: name.to_string(),
            version: Some(version.clone()),
            sdk_constraint: None,
            dependencies: hosted_deps(deps),
            dev_dependencies: Vec::new(),
        };
        self.packages
            .entry(name.to_string())
            .or_default()
            .push((version, pubspec));
        self
    }

    fn add_with_sdk(mut self, name: &str, version: &str, sdk: &str) -> Self {
        let version: Version = version.parse().unwrap();
        let pubspec = Pubspec {
            name: name.to_string(),
            version: Some(version.clone()),
            sdk_constraint: Some(VersionConstraint::parse(sdk).unwrap()),
            dependencies: Vec::new(),
            dev_dependencies: Vec::new(),
        };
        self.packages
            .entry(name.to_string())
            .or_default()
            .push((version, pubspec));
        self
    }
}

#[async_trait]
impl PackageProvider for StubProvider {
    async fn versions(&self, target: &PackageRef) -> PodResult<Vec<Version>> {
        match self.packages.get(&target.name) {
            Some(entries) => Ok(entries.iter().map(|(v, _)| v.clone()).collect()),
            None => Err(PodError::PackageNotFound {
                name: target.name.clone(),
                location: "stub".to_string(),
            }),
        }
    }

    async fn describe(&self, id: &PackageId) -> PodResult<Pubspec> {
        self.packages
            .get(&id.name)
            .and_then(|entries| {
                entries
                    .iter()
                    .find(|(v, _)| *v == id.version)
                    .map(|(_, p)| p.clone())
            })
            .ok_or_else(|| PodError::PackageNotFound {
                name: format!("{} {}", id.name, id.version),
                location: "stub".to_string(),
            })
    }
}

fn hosted_ref(name: &str) -> PackageRef {
    PackageRef::new(
        name,
        Description::Hosted {
            url: DEFAULT_HOSTED_URL.to_string(),
            name: name.to_string(),
        },
    )
}

fn hosted_deps(pairs: &[(&str, &str)]) -> Vec<Dependency> {
    pairs
        .iter()
        .map(|(name, constraint)| {
            Dependency::new(hosted_ref(name), VersionConstraint::parse(constraint).unwrap())
        })
        .collect()
}

fn root_with(deps: &[(&str, &str)]) -> Package {
    let pubspec = Pubspec {
        name: "myapp".to_string(),
        version: Some(Version::new(1, 0, 0)),
        sdk_constraint: None,
        dependencies: hosted_deps(deps),
        dev_dependencies: Vec::new(),
    };
    let dir = Utf8PathBuf::from("/project");
    Package::new(
        PackageId::root("myapp", Version::new(1, 0, 0), &dir),
        dir,
        pubspec,
    )
}

fn locked(pairs: &[(&str, &str)]) -> LockFile {
    let mut lockfile = LockFile::empty();
    for (name, version) in pairs {
        lockfile.packages.insert(
            name.to_string(),
            hosted_ref(name).at_version(version.parse().unwrap()),
        );
    }
    lockfile
}

fn selected<'a>(result: &'a SolveResult, name: &str) -> &'a PackageId {
    result
        .packages
        .iter()
        .find(|id| id.name == name)
        .unwrap_or_else(|| panic!("{name} missing from result"))
}

async fn run(
    provider: &StubProvider,
    root: &Package,
    lockfile: &LockFile,
    use_latest: &[String],
    upgrade_all: bool,
) -> PodResult<SolveResult> {
    solve(
        provider,
        root,
        lockfile,
        use_latest,
        upgrade_all,
        &Version::new(0, 1, 0),
    )
    .await
}

#[tokio::test]
async fn test_trivial_solve_picks_newest_allowed() {
    let provider = StubProvider::new()
        .add("foo", "1.0.0", &[])
        .add("foo", "1.1.0", &[])
        .add("foo", "2.0.0", &[]);
    let root = root_with(&[("foo", "^1.0.0")]);

    let result = run(&provider, &root, &LockFile::empty(), &[], false)
        .await
        .unwrap();
    assert_eq!(result.packages.len(), 1);
    assert_eq!(selected(&result, "foo").version, Version::new(1, 1, 0));
}

#[tokio::test]
async fn test_backtracking_discards_incompatible_newest() {
    // foo 2.0.0 wants baz ^2, but bar forces baz ^1, so foo must fall
    // back to 1.0.0.
    let provider = StubProvider::new()
        .add("foo", "1.0.0", &[("baz", "^1.0.0")])
        .add("foo", "2.0.0", &[("baz", "^2.0.0")])
        .add("bar", "1.0.0", &[("baz", "^1.0.0")])
        .add("baz", "1.0.0", &[])
        .add("baz", "2.0.0", &[]);
    let root = root_with(&[("foo", "any"), ("bar", "any")]);

    let result = run(&provider, &root, &LockFile::empty(), &[], false)
        .await
        .unwrap();
    assert_eq!(selected(&result, "foo").version, Version::new(1, 0, 0));
    assert_eq!(selected(&result, "bar").version, Version::new(1, 0, 0));
    assert_eq!(selected(&result, "baz").version, Version::new(1, 0, 0));
    assert!(result.attempted > 1);
}

#[tokio::test]
async fn test_unsolvable_graph_names_the_contested_package() {
    let provider = StubProvider::new()
        .add("foo", "1.0.0", &[("baz", "^1.0.0")])
        .add("bar", "1.0.0", &[("baz", "^2.0.0")])
        .add("baz", "1.0.0", &[])
        .add("baz", "2.0.0", &[]);
    let root = root_with(&[("foo", "any"), ("bar", "any")]);

    let result = run(&provider, &root, &LockFile::empty(), &[], false).await;
    match result {
        Err(PodError::NoVersionAvailable { package, chain, .. }) => {
            assert_eq!(package, "baz");
            assert!(!chain.is_empty());
        }
        other => panic!("expected NoVersionAvailable, got {other:?}"),
    }
}

#[tokio::test]
async fn test_locked_version_is_preserved() {
    let provider = StubProvider::new()
        .add("foo", "1.0.0", &[])
        .add("foo", "1.1.0", &[]);
    let root = root_with(&[("foo", "^1.0.0")]);
    let lockfile = locked(&[("foo", "1.0.0")]);

    let result = run(&provider, &root, &lockfile, &[], false).await.unwrap();
    assert_eq!(selected(&result, "foo").version, Version::new(1, 0, 0));
}

#[tokio::test]
async fn test_upgrade_all_ignores_the_lock() {
    let provider = StubProvider::new()
        .add("foo", "1.0.0", &[])
        .add("foo", "1.1.0", &[]);
    let root = root_with(&[("foo", "^1.0.0")]);
    let lockfile = locked(&[("foo", "1.0.0")]);

    let result = run(&provider, &root, &lockfile, &[], true).await.unwrap();
    assert_eq!(selected(&result, "foo").version, Version::new(1, 1, 0));
}

#[tokio::test]
async fn test_use_latest_upgrades_only_the_named_package() {
    let provider = StubProvider::new()
        .add("foo", "1.0.0", &[])
        .add("foo", "1.1.0", &[])
        .add("bar", "1.0.0", &[])
        .add("bar", "1.1.0", &[]);
    let root = root_with(&[("foo", "^1.0.0"), ("bar", "^1.0.0")]);
    let lockfile = locked(&[("foo", "1.0.0"), ("bar", "1.0.0")]);

    let result = run(&provider, &root, &lockfile, &["foo".to_string()], false)
        .await
        .unwrap();
    assert_eq!(selected(&result, "foo").version, Version::new(1, 1, 0));
    assert_eq!(selected(&result, "bar").version, Version::new(1, 0, 0));
}

#[tokio::test]
async fn test_stale_lock_entry_is_ignored() {
    // The locked version no longer satisfies the constraint.
    let provider = StubProvider::new()
        .add("foo", "1.0.0", &[])
        .add("foo", "2.0.0", &[]);
    let root = root_with(&[("foo", "^2.0.0")]);
    let lockfile = locked(&[("foo", "1.0.0")]);

    let result = run(&provider, &root, &lockfile, &[], false).await.unwrap();
    assert_eq!(selected(&result, "foo").version, Version::new(2, 0, 0));
}

#[tokio::test]
async fn test_root_dev_dependencies_participate() {
    let provider = StubProvider::new()
        .add("tool", "1.0.0", &[])
        .add("foo", "1.0.0", &[]);
    let mut root = root_with(&[("foo", "any")]);
    root.pubspec.dev_dependencies = hosted_deps(&[("tool", "^1.0.0")]);

    let result = run(&provider, &root, &LockFile::empty(), &[], false)
        .await
        .unwrap();
    assert_eq!(selected(&result, "tool").version, Version::new(1, 0, 0));
}

#[tokio::test]
async fn test_transitive_dev_dependencies_are_ignored() {
    // foo's dev deps must not pull in "tool", which does not even
    // exist in this universe.
    let provider = {
        let mut provider = StubProvider::new().add("foo", "1.0.0", &[]);
        let entry = provider.packages.get_mut("foo").unwrap();
        entry[0].1.dev_dependencies = hosted_deps(&[("tool", "^1.0.0")]);
        provider
    };
    let root = root_with(&[("foo", "any")]);

    let result = run(&provider, &root, &LockFile::empty(), &[], false)
        .await
        .unwrap();
    assert_eq!(result.packages.len(), 1);
}

#[tokio::test]
async fn test_sdk_incompatible_candidate_is_skipped() {
    let provider = StubProvider::new()
        .add_with_sdk("foo", "2.0.0", ">=9.0.0")
        .add("foo", "1.0.0", &[]);
    let root = root_with(&[("foo", "any")]);

    let result = run(&provider, &root, &LockFile::empty(), &[], false)
        .await
        .unwrap();
    assert_eq!(selected(&result, "foo").version, Version::new(1, 0, 0));
}

#[tokio::test]
async fn test_root_sdk_mismatch_fails_fast() {
    let provider = StubProvider::new();
    let mut root = root_with(&[]);
    root.pubspec.sdk_constraint = Some(VersionConstraint::parse(">=9.0.0").unwrap());

    let result = run(&provider, &root, &LockFile::empty(), &[], false).await;
    assert!(matches!(result, Err(PodError::SdkMismatch { .. })));
}

#[tokio::test]
async fn test_mutual_dependencies_resolve() {
    // a and b depend on each other; traversal must not loop.
    let provider = StubProvider::new()
        .add("a", "1.0.0", &[("b", "^1.0.0")])
        .add("b", "1.0.0", &[("a", "^1.0.0")]);
    let root = root_with(&[("a", "any")]);

    let result = run(&provider, &root, &LockFile::empty(), &[], false)
        .await
        .unwrap();
    assert_eq!(result.packages.len(), 2);
}

#[tokio::test]
async fn test_deep_backtracking_across_levels() {
    // Only the oldest pair (foo 1.0.0, shared 1.0.0) is consistent.
    let provider = StubProvider::new()
        .add("foo", "1.0.0", &[("shared", "^1.0.0")])
        .add("foo", "2.0.0", &[("shared", "^2.0.0")])
        .add("shared", "1.0.0", &[("base", "^1.0.0")])
        .add("shared", "2.0.0", &[("base", "^2.0.0")])
        .add("base", "1.0.0", &[])
        .add("bar", "1.0.0", &[("base", "^1.0.0")]);
    let root = root_with(&[("foo", "any"), ("bar", "any")]);

    let result = run(&provider, &root, &LockFile::empty(), &[], false)
        .await
        .unwrap();
    assert_eq!(selected(&result, "foo").version, Version::new(1, 0, 0));
    assert_eq!(selected(&result, "shared").version, Version::new(1, 0, 0));
    assert_eq!(selected(&result, "base").version, Version::new(1, 0, 0));
}

#[tokio::test]
async fn test_repeated_runs_are_deterministic() {
    let provider = StubProvider::new()
        .add("foo", "1.0.0", &[("baz", "^1.0.0")])
        .add("foo", "2.0.0", &[("baz", "^2.0.0")])
        .add("bar", "1.0.0", &[("baz", "^1.0.0")])
        .add("baz", "1.0.0", &[])
        .add("baz", "1.5.0", &[])
        .add("baz", "2.0.0", &[]);
    let root = root_with(&[("foo", "any"), ("bar", "any")]);

    let first = run(&provider, &root, &LockFile::empty(), &[], false)
        .await
        .unwrap();
    let second = run(&provider, &root, &LockFile::empty(), &[], false)
        .await
        .unwrap();
    assert_eq!(first.packages, second.packages);
    assert_eq!(first.attempted, second.attempted);
}

#[tokio::test]
async fn test_solution_satisfies_every_constraint() {
    // Solver soundness on a small tangled universe.
    let provider = StubProvider::new()
        .add("a", "1.0.0", &[("c", ">=1.0.0")])
        .add("a", "1.1.0", &[("c", "^1.2.0")])
        .add("b", "1.0.0", &[("c", "<1.5.0")])
        .add("c", "1.0.0", &[])
        .add("c", "1.2.0", &[])
        .add("c", "1.6.0", &[]);
    let root = root_with(&[("a", "any"), ("b", "any")]);

    let result = run(&provider, &root, &LockFile::empty(), &[], false)
        .await
        .unwrap();
    for id in &result.packages {
        let pubspec = provider.describe(id).await.unwrap();
        for dep in &pubspec.dependencies {
            let chosen = selected(&result, dep.name());
            assert!(
                dep.constraint.allows(&chosen.version),
                "{} {} requires {} {} but {} was chosen",
                id.name,
                id.version,
                dep.name(),
                dep.constraint,
                chosen.version
            );
        }
    }
}

//! End-to-end pipeline tests against a mock hosted index.

use std::sync::Arc;

use camino::Utf8PathBuf;
use flate2::write::GzEncoder;
use flate2::Compression;
use pod_cache::SystemCache;
use pod_cli::entrypoint::Entrypoint;
use pod_core::error::PodError;
use pod_core::lockfile::LockFile;
use pod_core::package::{Description, PackageRef};
use pod_core::version::Version;
use pod_source::SourceRegistry;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn sdk() -> Version {
    Version::new(0, 1, 0)
}

/// Listing JSON for one package; dependencies point back at the mock
/// index so the solver stays inside the test universe.
fn listing_json(base: &str, name: &str, versions: &[(&str, &[(&str, &str)])]) -> serde_json::Value {
    let versions: Vec<serde_json::Value> = versions
        .iter()
        .map(|(version, deps)| {
            let deps: serde_json::Map<String, serde_json::Value> = deps
                .iter()
                .map(|(dep, constraint)| {
                    (
                        dep.to_string(),
                        serde_json::json!({
                            "hosted": { "url": base, "name": dep },
                            "version": constraint,
                        }),
                    )
                })
                .collect();
            serde_json::json!({
                "version": version,
                "pubspec": {
                    "name": name,
                    "version": version,
                    "dependencies": deps,
                },
            })
        })
        .collect();
    serde_json::json!({ "name": name, "versions": versions })
}

fn archive_bytes(name: &str, version: &str) -> Vec<u8> {
    let mut data = Vec::new();
    {
        let gz = GzEncoder::new(&mut data, Compression::default());
        let mut builder = tar::Builder::new(gz);
        let files = [
            (
                format!("{name}-{version}/pubspec.toml"),
                format!("name = \"{name}\"\nversion = \"{version}\"\n"),
            ),
            (
                format!("{name}-{version}/lib/{name}.txt"),
                format!("{name} {version}"),
            ),
        ];
        for (file_path, contents) in &files {
            let mut header = tar::Header::new_gnu();
            header.set_path(file_path).unwrap();
            header.set_size(contents.len() as u64);
            header.set_mode(0o644);
            header.set_cksum();
            builder.append(&header, contents.as_bytes()).unwrap();
        }
        builder.finish().unwrap();
    }
    data
}

async fn mount_package(
    server: &MockServer,
    name: &str,
    versions: &[(&str, &[(&str, &str)])],
) {
    let base = server.uri();
    Mock::given(method("GET"))
        .and(path(format!("/api/packages/{name}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(listing_json(&base, name, versions)))
        .mount(server)
        .await;
    for (version, _) in versions {
        Mock::given(method("GET"))
            .and(path(format!(
                "/api/packages/{name}/versions/{version}/archive"
            )))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(archive_bytes(name, version)))
            .mount(server)
            .await;
    }
}

struct TestProject {
    _temp: tempfile::TempDir,
    dir: Utf8PathBuf,
    cache: Arc<SystemCache>,
    registry: Arc<SourceRegistry>,
}

impl TestProject {
    fn new(base: &str, deps: &[(&str, &str)]) -> Self {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let dir = root.join("project");
        std::fs::create_dir_all(dir.join("lib")).unwrap();

        let mut pubspec = String::from("name = \"myapp\"\nversion = \"1.0.0\"\n\n[dependencies]\n");
        for (name, constraint) in deps {
            pubspec.push_str(&format!(
                "{name} = {{ hosted = {{ url = \"{base}\", name = \"{name}\" }}, version = \"{constraint}\" }}\n"
            ));
        }
        std::fs::write(dir.join("pubspec.toml"), pubspec).unwrap();

        let cache = Arc::new(SystemCache::new(root.join("cache")).unwrap());
        let registry = Arc::new(SourceRegistry::with_defaults().unwrap());
        Self {
            _temp: temp,
            dir,
            cache,
            registry,
        }
    }

    fn entrypoint(&self) -> Entrypoint {
        Entrypoint::load(&self.dir, self.cache.clone(), self.registry.clone(), sdk()).unwrap()
    }

    fn lockfile(&self) -> LockFile {
        LockFile::load(&self.dir.join("pubspec.lock")).unwrap()
    }

    fn lockfile_bytes(&self) -> String {
        std::fs::read_to_string(self.dir.join("pubspec.lock")).unwrap()
    }

    fn packages_listing(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .dir
            .join("packages")
            .read_dir_utf8()
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string())
            .collect();
        names.sort();
        names
    }

    fn write_lock(&self, base: &str, pairs: &[(&str, &str)]) {
        let mut lockfile = LockFile::empty();
        for (name, version) in pairs {
            let id = PackageRef::new(
                *name,
                Description::Hosted {
                    url: base.trim_end_matches('/').to_string(),
                    name: name.to_string(),
                },
            )
            .at_version(version.parse().unwrap());
            lockfile.packages.insert(name.to_string(), id);
        }
        lockfile.save(&self.dir.join("pubspec.lock")).unwrap();
    }
}

#[tokio::test]
async fn test_trivial_solve_locks_and_links() {
    let server = MockServer::start().await;
    mount_package(
        &server,
        "foo",
        &[("1.0.0", &[]), ("1.1.0", &[]), ("2.0.0", &[])],
    )
    .await;

    let project = TestProject::new(&server.uri(), &[("foo", "^1.0.0")]);
    let report = project
        .entrypoint()
        .acquire_dependencies(&[], false)
        .await
        .unwrap();
    assert_eq!(report.changed(), 1);

    let lockfile = project.lockfile();
    assert_eq!(lockfile.packages["foo"].version, Version::new(1, 1, 0));

    // foo links into the cache, and the project links to itself.
    assert_eq!(project.packages_listing(), vec!["foo", "myapp"]);
    let link = project.dir.join("packages/foo");
    let target = link.read_link_utf8().unwrap();
    assert!(target.as_str().contains("hosted"));
    assert!(target.ends_with("foo-1.1.0/lib"));
    assert!(link.join("foo.txt").exists());
}

#[tokio::test]
async fn test_backtracking_end_to_end() {
    let server = MockServer::start().await;
    mount_package(
        &server,
        "foo",
        &[
            ("1.0.0", &[("baz", "^1.0.0")]),
            ("2.0.0", &[("baz", "^2.0.0")]),
        ],
    )
    .await;
    mount_package(&server, "bar", &[("1.0.0", &[("baz", "^1.0.0")])]).await;
    mount_package(&server, "baz", &[("1.0.0", &[]), ("2.0.0", &[])]).await;

    let project = TestProject::new(&server.uri(), &[("foo", "any"), ("bar", "any")]);
    project
        .entrypoint()
        .acquire_dependencies(&[], false)
        .await
        .unwrap();

    let lockfile = project.lockfile();
    assert_eq!(lockfile.packages["foo"].version, Version::new(1, 0, 0));
    assert_eq!(lockfile.packages["bar"].version, Version::new(1, 0, 0));
    assert_eq!(lockfile.packages["baz"].version, Version::new(1, 0, 0));
}

#[tokio::test]
async fn test_unsolvable_graph_surfaces_the_solver_error() {
    let server = MockServer::start().await;
    mount_package(&server, "foo", &[("1.0.0", &[("baz", "^1.0.0")])]).await;
    mount_package(&server, "bar", &[("1.0.0", &[("baz", "^2.0.0")])]).await;
    mount_package(&server, "baz", &[("1.0.0", &[]), ("2.0.0", &[])]).await;

    let project = TestProject::new(&server.uri(), &[("foo", "any"), ("bar", "any")]);
    let result = project.entrypoint().acquire_dependencies(&[], false).await;
    match result {
        Err(PodError::NoVersionAvailable { package, .. }) => assert_eq!(package, "baz"),
        other => panic!("expected NoVersionAvailable, got {other:?}"),
    }
    // A failed solve must not write a lockfile.
    assert!(!project.dir.join("pubspec.lock").exists());
}

#[tokio::test]
async fn test_lock_preservation_and_upgrade() {
    let server = MockServer::start().await;
    mount_package(&server, "foo", &[("1.0.0", &[]), ("1.1.0", &[])]).await;

    let project = TestProject::new(&server.uri(), &[("foo", "^1.0.0")]);
    project.write_lock(&server.uri(), &[("foo", "1.0.0")]);

    // A plain get keeps the locked version even though newer exists.
    let report = project
        .entrypoint()
        .acquire_dependencies(&[], false)
        .await
        .unwrap();
    assert_eq!(report.changed(), 0);
    assert_eq!(
        project.lockfile().packages["foo"].version,
        Version::new(1, 0, 0)
    );

    // Upgrading ignores the lock and reports one change.
    let report = project
        .entrypoint()
        .acquire_dependencies(&[], true)
        .await
        .unwrap();
    assert_eq!(report.changed(), 1);
    assert_eq!(
        project.lockfile().packages["foo"].version,
        Version::new(1, 1, 0)
    );
}

#[tokio::test]
async fn test_pipeline_is_idempotent() {
    let server = MockServer::start().await;
    mount_package(&server, "foo", &[("1.0.0", &[("bar", "^1.0.0")])]).await;
    mount_package(&server, "bar", &[("1.0.0", &[])]).await;

    let project = TestProject::new(&server.uri(), &[("foo", "any")]);
    let entrypoint = project.entrypoint();

    entrypoint.acquire_dependencies(&[], false).await.unwrap();
    let first_lock = project.lockfile_bytes();
    let first_packages = project.packages_listing();

    entrypoint.acquire_dependencies(&[], false).await.unwrap();
    assert_eq!(project.lockfile_bytes(), first_lock);
    assert_eq!(project.packages_listing(), first_packages);
}

#[tokio::test]
async fn test_path_dependency_installs_directly() {
    let server = MockServer::start().await;

    let project = TestProject::new(&server.uri(), &[]);
    let local_dir = project.dir.parent().unwrap().join("local");
    std::fs::create_dir_all(local_dir.join("lib")).unwrap();
    std::fs::write(
        local_dir.join("pubspec.toml"),
        "name = \"local\"\nversion = \"0.5.0\"\n",
    )
    .unwrap();
    std::fs::write(local_dir.join("lib/local.txt"), "local").unwrap();

    std::fs::write(
        project.dir.join("pubspec.toml"),
        "name = \"myapp\"\nversion = \"1.0.0\"\n\n[dependencies]\nlocal = { path = \"../local\" }\n",
    )
    .unwrap();

    project
        .entrypoint()
        .acquire_dependencies(&[], false)
        .await
        .unwrap();

    let lockfile = project.lockfile();
    assert_eq!(lockfile.packages["local"].source_name(), "path");
    assert_eq!(lockfile.packages["local"].version, Version::new(0, 5, 0));

    let link = project.dir.join("packages/local");
    assert!(link.join("local.txt").exists());
}

#[tokio::test]
async fn test_ensure_up_to_date_short_circuits() {
    let server = MockServer::start().await;
    mount_package(&server, "foo", &[("1.0.0", &[])]).await;

    let project = TestProject::new(&server.uri(), &[("foo", "^1.0.0")]);
    let entrypoint = project.entrypoint();
    entrypoint.acquire_dependencies(&[], false).await.unwrap();

    // Everything is in place: nothing to do.
    assert!(entrypoint.ensure_up_to_date().await.unwrap().is_none());

    // Wipe the materialized packages; ensure runs the pipeline again.
    std::fs::remove_dir_all(project.dir.join("packages")).unwrap();
    assert!(entrypoint.ensure_up_to_date().await.unwrap().is_some());
    assert!(project.dir.join("packages/foo").exists());
}

#[tokio::test]
async fn test_concurrent_acquires_share_downloads() {
    let server = MockServer::start().await;
    let base = server.uri();
    Mock::given(method("GET"))
        .and(path("/api/packages/foo"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(listing_json(&base, "foo", &[("1.0.0", &[])])),
        )
        .mount(&server)
        .await;
    // The archive may be fetched exactly once across both projects.
    Mock::given(method("GET"))
        .and(path("/api/packages/foo/versions/1.0.0/archive"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_bytes(archive_bytes("foo", "1.0.0"))
                .set_delay(std::time::Duration::from_millis(100)),
        )
        .expect(1)
        .mount(&server)
        .await;

    // Two projects with the same graph, one shared cache and registry.
    let left = TestProject::new(&base, &[("foo", "^1.0.0")]);
    let right_temp = tempfile::tempdir().unwrap();
    let right_root = Utf8PathBuf::from_path_buf(right_temp.path().to_path_buf()).unwrap();
    let right_dir = right_root.join("project");
    std::fs::create_dir_all(right_dir.join("lib")).unwrap();
    std::fs::write(
        right_dir.join("pubspec.toml"),
        format!(
            "name = \"myapp\"\nversion = \"1.0.0\"\n\n[dependencies]\nfoo = {{ hosted = {{ url = \"{base}\", name = \"foo\" }}, version = \"^1.0.0\" }}\n"
        ),
    )
    .unwrap();

    let left_entry = left.entrypoint();
    let right_entry = Entrypoint::load(
        &right_dir,
        left.cache.clone(),
        left.registry.clone(),
        sdk(),
    )
    .unwrap();

    let (a, b) = tokio::join!(
        left_entry.acquire_dependencies(&[], false),
        right_entry.acquire_dependencies(&[], false),
    );
    a.unwrap();
    b.unwrap();

    assert!(left.dir.join("packages/foo").exists());
    assert!(right_dir.join("packages/foo").exists());
    // The mock's expect(1) verifies the shared fetch on drop.
}

#[tokio::test]
async fn test_self_link_points_at_project_lib() {
    let server = MockServer::start().await;
    let project = TestProject::new(&server.uri(), &[]);
    std::fs::write(project.dir.join("lib/app.txt"), "app").unwrap();

    project
        .entrypoint()
        .acquire_dependencies(&[], false)
        .await
        .unwrap();

    let link = project.dir.join("packages/myapp");
    assert!(link.join("app.txt").exists());
    let target = link.read_link_utf8().unwrap();
    assert_eq!(target, project.dir.join("lib"));
}

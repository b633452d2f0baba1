//! The dependency acquisition pipeline.
//!
//! An entrypoint is a root project plus the process-wide handles it
//! works with: the system cache, the source registry, and the active
//! SDK version. `acquire_dependencies` runs the whole load -> solve ->
//! fetch -> materialize -> lock sequence; `ensure_up_to_date` skips it
//! when the lockfile still matches the manifest and everything it
//! names is materialized.

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use pod_cache::SystemCache;
use pod_core::error::{PodError, PodResult};
use pod_core::lockfile::LockFile;
use pod_core::manifest::Dependency;
use pod_core::package::{Package, PackageId};
use pod_core::version::Version;
use pod_solver::{solve, ChangeReport, PackageGraph};
use pod_source::{symlink_dir, RegistryProvider, SourceRegistry};
use tracing::{debug, info};

/// The directory materialized packages are linked into
pub const PACKAGES_DIR: &str = "packages";

/// The lockfile name inside a project
pub const LOCKFILE_NAME: &str = "pubspec.lock";

/// A root project and the handles the pipeline needs
pub struct Entrypoint {
    root: Package,
    cache: Arc<SystemCache>,
    registry: Arc<SourceRegistry>,
    sdk_version: Version,
}

impl Entrypoint {
    /// Load the project rooted at `root_dir`
    pub fn load(
        root_dir: &Utf8Path,
        cache: Arc<SystemCache>,
        registry: Arc<SourceRegistry>,
        sdk_version: Version,
    ) -> PodResult<Self> {
        let root_dir = root_dir
            .canonicalize_utf8()
            .map_err(|e| PodError::io(format!("failed to open project at {root_dir}"), e))?;
        let pubspec = pod_core::manifest::Pubspec::load(&root_dir)?;
        let id = PackageId::root(
            pubspec.name.clone(),
            pubspec.pseudo_version(),
            &root_dir,
        );
        Ok(Self {
            root: Package::new(id, root_dir, pubspec),
            cache,
            registry,
            sdk_version,
        })
    }

    pub fn root(&self) -> &Package {
        &self.root
    }

    pub fn lockfile_path(&self) -> Utf8PathBuf {
        self.root.dir.join(LOCKFILE_NAME)
    }

    pub fn packages_dir(&self) -> Utf8PathBuf {
        self.root.dir.join(PACKAGES_DIR)
    }

    /// Run the full pipeline and return the change report
    pub async fn acquire_dependencies(
        &self,
        use_latest: &[String],
        upgrade_all: bool,
    ) -> PodResult<ChangeReport> {
        let previous = LockFile::load(&self.lockfile_path())?;
        info!(project = %self.root.pubspec.name, "resolving dependencies");

        let provider = RegistryProvider::new(&self.registry, &self.cache);
        let result = solve(
            &provider,
            &self.root,
            &previous,
            use_latest,
            upgrade_all,
            &self.sdk_version,
        )
        .await?;
        debug!(
            packages = result.packages.len(),
            attempted = result.attempted,
            "solve finished"
        );

        let report = ChangeReport::new(&previous, &result.packages);

        self.reset_packages_dir()?;
        for id in &result.packages {
            self.materialize(id).await?;
        }

        // Resolve ids last so the lock records the commit that was
        // actually fetched.
        let mut lockfile = LockFile {
            packages: Default::default(),
            sdk_constraint: self.root.pubspec.sdk_constraint.clone(),
        };
        for id in &result.packages {
            let resolved = self.registry.resolve_id(id, &self.cache).await?;
            lockfile.packages.insert(resolved.name.clone(), resolved);
        }
        lockfile.save(&self.lockfile_path())?;

        self.link_self()?;
        Ok(report)
    }

    /// Skip the pipeline when the lockfile already matches the manifest
    /// and everything it names is materialized. Returns the report when
    /// a full run was needed.
    pub async fn ensure_up_to_date(&self) -> PodResult<Option<ChangeReport>> {
        match LockFile::load(&self.lockfile_path()) {
            Ok(lockfile) if self.lockfile_is_current(&lockfile)? => {
                debug!("lockfile is up to date");
                Ok(None)
            }
            // Missing, stale, or corrupt: run the pipeline.
            _ => self.acquire_dependencies(&[], false).await.map(Some),
        }
    }

    fn lockfile_is_current(&self, lockfile: &LockFile) -> PodResult<bool> {
        let deps: Vec<&Dependency> = self
            .root
            .pubspec
            .dependencies
            .iter()
            .chain(self.root.pubspec.dev_dependencies.iter())
            .collect();
        for dep in deps {
            let Some(locked) = lockfile.get(dep.name()) else {
                return Ok(false);
            };
            if locked.source_name() != dep.target.source_name() {
                return Ok(false);
            }
            if !dep.constraint.allows(&locked.version) {
                return Ok(false);
            }
            let source = self.registry.source_of(&dep.target.description)?;
            if !source.descriptions_equal(&dep.target.description, &locked.description) {
                return Ok(false);
            }
        }
        for id in lockfile.packages.values() {
            if !self.is_materialized(id)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    fn is_materialized(&self, id: &PackageId) -> PodResult<bool> {
        let link = self.packages_dir().join(&id.name);
        if link.symlink_metadata().is_ok() {
            return Ok(true);
        }
        // A package without a lib directory has nothing to link; its
        // cache entry (or path target) being present is enough.
        let dir = self.registry.directory(id, &self.cache)?;
        Ok(dir.is_dir() && !dir.join("lib").is_dir())
    }

    fn reset_packages_dir(&self) -> PodResult<()> {
        let dir = self.packages_dir();
        if dir.exists() {
            std::fs::remove_dir_all(&dir)
                .map_err(|e| PodError::io(format!("failed to clear {dir}"), e))?;
        }
        std::fs::create_dir_all(&dir)
            .map_err(|e| PodError::io(format!("failed to create {dir}"), e))?;
        Ok(())
    }

    async fn materialize(&self, id: &PackageId) -> PodResult<()> {
        let source = self.registry.source_of(&id.description)?;
        let link = self.packages_dir().join(&id.name);
        if source.should_cache() {
            let package = self.registry.download(id, &self.cache).await?;
            let lib = package.dir.join("lib");
            if lib.is_dir() {
                symlink_dir(&lib, &link)?;
            } else {
                debug!(package = %id, "no lib directory, skipping link");
            }
        } else if !source.install(id, &link).await? {
            return Err(PodError::PackageNotFound {
                name: id.name.clone(),
                location: self.registry.directory(id, &self.cache)?.to_string(),
            });
        }
        Ok(())
    }

    /// Link the project's own lib directory into `packages/`
    fn link_self(&self) -> PodResult<()> {
        let lib = self.root.dir.join("lib");
        if lib.is_dir() {
            symlink_dir(&lib, &self.packages_dir().join(&self.root.pubspec.name))?;
        }
        Ok(())
    }

    /// Load the solved set for downstream consumers
    pub async fn load_package_graph(&self) -> PodResult<PackageGraph> {
        let lockfile = LockFile::load(&self.lockfile_path())?;
        let mut members = vec![self.root.clone()];
        for id in lockfile.packages.values() {
            let dir = self.registry.directory(id, &self.cache)?;
            members.push(Package::load(id.clone(), dir)?);
        }
        Ok(PackageGraph::new(&self.root.pubspec.name, members))
    }
}

//! The Source capability surface.
//!
//! Sources share no implementation, so dispatch is a tagged enum with
//! one arm per provider rather than a trait object.

use camino::{Utf8Path, Utf8PathBuf};
use pod_cache::SystemCache;
use pod_core::error::{PodError, PodResult};
use pod_core::manifest::Pubspec;
use pod_core::package::{Description, Package, PackageId, PackageRef};
use pod_core::version::Version;

use crate::git::GitSource;
use crate::hosted::HostedSource;
use crate::path::PathSource;

/// A pluggable provider of package metadata and content
#[derive(Debug)]
pub enum Source {
    Hosted(HostedSource),
    Git(GitSource),
    Path(PathSource),
}

impl Source {
    /// Stable identifier used in lockfiles
    pub fn name(&self) -> &'static str {
        match self {
            Source::Hosted(_) => "hosted",
            Source::Git(_) => "git",
            Source::Path(_) => "path",
        }
    }

    /// Whether resolved packages are materialized into the system cache
    pub fn should_cache(&self) -> bool {
        !matches!(self, Source::Path(_))
    }

    /// Validate and normalize a raw description for this source
    pub fn parse_description(
        &self,
        containing: &Utf8Path,
        raw: &toml::Value,
        from_lockfile: bool,
    ) -> PodResult<Description> {
        Description::parse(self.name(), raw, containing, from_lockfile)
    }

    /// Inverse of [`Source::parse_description`], canonical map form
    pub fn serialize_description(
        &self,
        containing: &Utf8Path,
        description: &Description,
    ) -> toml::Value {
        description.serialize(containing)
    }

    /// Source-defined description equivalence
    pub fn descriptions_equal(&self, a: &Description, b: &Description) -> bool {
        match self {
            // Resolve symlinks before comparing so two spellings of one
            // directory unify.
            Source::Path(source) => source.descriptions_equal(a, b),
            _ => a == b,
        }
    }

    /// Fetch the manifest for `id` without materializing the package
    /// where the source allows it
    pub async fn describe(&self, id: &PackageId, cache: &SystemCache) -> PodResult<Pubspec> {
        match self {
            Source::Hosted(source) => source.describe(id, cache).await,
            Source::Git(source) => source.describe(id, cache).await,
            Source::Path(source) => source.describe(id).await,
        }
    }

    /// Enumerate candidate versions for the solver
    pub async fn get_versions(
        &self,
        target: &PackageRef,
        cache: &SystemCache,
    ) -> PodResult<Vec<Version>> {
        match self {
            Source::Hosted(source) => source.get_versions(target).await,
            Source::Git(source) => source.get_versions(target, cache).await,
            Source::Path(source) => source.get_versions(target).await,
        }
    }

    /// Materialize `id` into the system cache (cacheable sources only)
    pub async fn download_to_cache(
        &self,
        id: &PackageId,
        cache: &SystemCache,
    ) -> PodResult<Package> {
        match self {
            Source::Hosted(source) => source.download(id, cache).await,
            Source::Git(source) => source.download(id, cache).await,
            Source::Path(_) => Err(PodError::InvalidArgument {
                message: format!("packages from source \"{}\" are not cached", self.name()),
            }),
        }
    }

    /// Install `id` directly at `dest` (non-caching sources only).
    /// `Ok(false)` means the package was not where its description says.
    pub async fn install(&self, id: &PackageId, dest: &Utf8Path) -> PodResult<bool> {
        match self {
            Source::Path(source) => source.install(id, dest).await,
            _ => Err(PodError::InvalidArgument {
                message: format!("packages from source \"{}\" install via the cache", self.name()),
            }),
        }
    }

    /// Where a package for `id` lives once materialized
    pub fn directory(&self, id: &PackageId, cache: &SystemCache) -> PodResult<Utf8PathBuf> {
        match self {
            Source::Hosted(source) => source.directory(id, cache),
            Source::Git(source) => source.directory(id, cache),
            Source::Path(source) => source.directory(id),
        }
    }

    /// Attach disambiguating data (the git commit) before locking
    pub async fn resolve_id(&self, id: &PackageId, cache: &SystemCache) -> PodResult<PackageId> {
        match self {
            Source::Git(source) => source.resolve_id(id, cache).await,
            _ => Ok(id.clone()),
        }
    }
}

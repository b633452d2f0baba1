//! Source registry and the solver-facing provider.
//!
//! The registry maps source names to sources and fronts every package
//! fetch: downloads of cacheable packages funnel through the system
//! cache's single-flight map, and metadata lookups are memoized per
//! process so the solver can re-ask freely.

use std::collections::BTreeMap;

use async_trait::async_trait;
use camino::Utf8PathBuf;
use dashmap::DashMap;
use pod_cache::SystemCache;
use pod_core::error::{PodError, PodResult};
use pod_core::manifest::Pubspec;
use pod_core::package::{Description, Package, PackageId, PackageRef};
use pod_core::version::Version;

use crate::git::GitSource;
use crate::hosted::HostedSource;
use crate::path::PathSource;
use crate::source::Source;

/// Maps source names to sources, with a configurable default
#[derive(Debug)]
pub struct SourceRegistry {
    sources: BTreeMap<String, Source>,
    default_name: String,
}

impl SourceRegistry {
    /// An empty registry; register sources before use
    pub fn new() -> Self {
        Self {
            sources: BTreeMap::new(),
            default_name: String::new(),
        }
    }

    /// The standard registry: hosted, git, and path, defaulting to
    /// hosted
    pub fn with_defaults() -> PodResult<Self> {
        let mut registry = Self::new();
        registry.register(Source::Hosted(HostedSource::new()?))?;
        registry.register(Source::Git(GitSource::new()?))?;
        registry.register(Source::Path(PathSource::new()))?;
        registry.set_default("hosted")?;
        Ok(registry)
    }

    /// Register a source. Registering a name twice is a bug.
    pub fn register(&mut self, source: Source) -> PodResult<()> {
        let name = source.name().to_string();
        if self.sources.contains_key(&name) {
            return Err(PodError::InvalidArgument {
                message: format!("source \"{name}\" is already registered"),
            });
        }
        self.sources.insert(name, source);
        Ok(())
    }

    pub fn set_default(&mut self, name: &str) -> PodResult<()> {
        if !self.sources.contains_key(name) {
            return Err(PodError::InvalidArgument {
                message: format!("cannot default to unregistered source \"{name}\""),
            });
        }
        self.default_name = name.to_string();
        Ok(())
    }

    pub fn default_source(&self) -> Option<&Source> {
        self.sources.get(&self.default_name)
    }

    pub fn get(&self, name: &str) -> Option<&Source> {
        self.sources.get(name)
    }

    /// The source responsible for a description
    pub fn source_of(&self, description: &Description) -> PodResult<&Source> {
        self.get(description.source_name())
            .ok_or_else(|| PodError::InvalidArgument {
                message: format!(
                    "no source registered for \"{}\"",
                    description.source_name()
                ),
            })
    }

    /// Download `id` into the system cache, single-flight per id.
    /// Asking for an uncacheable package here is a misuse.
    pub async fn download(&self, id: &PackageId, cache: &SystemCache) -> PodResult<Package> {
        let source = self.source_of(&id.description)?;
        if !source.should_cache() {
            return Err(PodError::InvalidArgument {
                message: format!(
                    "packages from source \"{}\" cannot be downloaded to the cache",
                    source.name()
                ),
            });
        }
        cache
            .download(id, || source.download_to_cache(id, cache))
            .await
    }

    /// Where `id` lives (or will live) on disk
    pub fn directory(&self, id: &PackageId, cache: &SystemCache) -> PodResult<Utf8PathBuf> {
        self.source_of(&id.description)?.directory(id, cache)
    }

    /// Attach disambiguating data before locking
    pub async fn resolve_id(&self, id: &PackageId, cache: &SystemCache) -> PodResult<PackageId> {
        self.source_of(&id.description)?.resolve_id(id, cache).await
    }
}

impl Default for SourceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The metadata operations the solver needs from the outside world
#[async_trait]
pub trait PackageProvider: Send + Sync {
    /// Enumerate candidate versions of a package
    async fn versions(&self, target: &PackageRef) -> PodResult<Vec<Version>>;

    /// Fetch the manifest of a specific package version
    async fn describe(&self, id: &PackageId) -> PodResult<Pubspec>;
}

/// [`PackageProvider`] over the registry and cache, memoizing lookups
/// so repeated solver queries are free
pub struct RegistryProvider<'a> {
    registry: &'a SourceRegistry,
    cache: &'a SystemCache,
    versions_memo: DashMap<PackageRef, Vec<Version>>,
    pubspec_memo: DashMap<PackageId, Pubspec>,
}

impl<'a> RegistryProvider<'a> {
    pub fn new(registry: &'a SourceRegistry, cache: &'a SystemCache) -> Self {
        Self {
            registry,
            cache,
            versions_memo: DashMap::new(),
            pubspec_memo: DashMap::new(),
        }
    }
}

#[async_trait]
impl PackageProvider for RegistryProvider<'_> {
    async fn versions(&self, target: &PackageRef) -> PodResult<Vec<Version>> {
        if let Some(memoized) = self.versions_memo.get(target) {
            return Ok(memoized.clone());
        }
        let source = self.registry.source_of(&target.description)?;
        let versions = source.get_versions(target, self.cache).await?;
        self.versions_memo.insert(target.clone(), versions.clone());
        Ok(versions)
    }

    async fn describe(&self, id: &PackageId) -> PodResult<Pubspec> {
        if let Some(memoized) = self.pubspec_memo.get(id) {
            return Ok(memoized.clone());
        }
        let source = self.registry.source_of(&id.description)?;
        let pubspec = source.describe(id, self.cache).await?;
        self.pubspec_memo.insert(id.clone(), pubspec.clone());
        Ok(pubspec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = SourceRegistry::new();
        registry.register(Source::Path(PathSource::new())).unwrap();
        let result = registry.register(Source::Path(PathSource::new()));
        assert!(matches!(result, Err(PodError::InvalidArgument { .. })));
    }

    #[test]
    fn test_default_must_be_registered() {
        let mut registry = SourceRegistry::new();
        assert!(registry.set_default("hosted").is_err());
        registry.register(Source::Path(PathSource::new())).unwrap();
        registry.set_default("path").unwrap();
        assert_eq!(registry.default_source().unwrap().name(), "path");
    }

    #[tokio::test]
    async fn test_download_of_uncacheable_source_is_misuse() {
        let registry = SourceRegistry::with_defaults().unwrap();
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().join("cache")).unwrap();
        let cache = SystemCache::new(root).unwrap();

        let id = PackageId {
            name: "local".to_string(),
            description: Description::Path {
                path: Utf8PathBuf::from("/somewhere/local"),
                relative: false,
            },
            version: Version::new(1, 0, 0),
        };
        let result = registry.download(&id, &cache).await;
        assert!(matches!(result, Err(PodError::InvalidArgument { .. })));
    }

    #[test]
    fn test_source_lookup_by_description() {
        let registry = SourceRegistry::with_defaults().unwrap();
        let desc = Description::Git {
            url: "https://github.com/x/web".to_string(),
            reference: "main".to_string(),
            resolved_ref: None,
        };
        assert_eq!(registry.source_of(&desc).unwrap().name(), "git");
    }
}

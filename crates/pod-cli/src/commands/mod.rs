//! Command implementations and shared context.

use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use pod_cache::SystemCache;
use pod_core::error::{PodError, PodResult};
use pod_core::{sdk, Version};
use pod_source::SourceRegistry;

use crate::entrypoint::Entrypoint;
use crate::output::OutputHandler;

mod clean;
mod deps;
mod get;
mod upgrade;

pub use clean::execute as clean;
pub use deps::execute as deps;
pub use get::execute as get;
pub use upgrade::execute as upgrade;

/// Shared state for command execution
pub struct CommandContext {
    pub cwd: Utf8PathBuf,
    pub cache_root: Utf8PathBuf,
    pub output: OutputHandler,
    pub sdk_version: Version,
}

impl CommandContext {
    pub fn new() -> PodResult<Self> {
        let cwd = std::env::current_dir()
            .map_err(|e| PodError::io("failed to determine working directory".to_string(), e))?;
        let cwd = Utf8PathBuf::from_path_buf(cwd)
            .map_err(|p| PodError::internal(format!("non-UTF-8 working directory {}", p.display())))?;
        let cache_root = default_cache_root()?;
        Ok(Self {
            cwd,
            cache_root,
            output: OutputHandler::new(),
            sdk_version: sdk::active_version()?,
        })
    }

    /// Open the cache, registry, and project for a pipeline command
    pub fn entrypoint(&self) -> PodResult<Entrypoint> {
        let cache = Arc::new(SystemCache::new(self.cache_root.clone())?);
        let registry = Arc::new(SourceRegistry::with_defaults()?);
        Entrypoint::load(
            Utf8Path::new(&self.cwd),
            cache,
            registry,
            self.sdk_version.clone(),
        )
    }
}

/// `POD_CACHE` when set, otherwise `~/.pod`
fn default_cache_root() -> PodResult<Utf8PathBuf> {
    if let Ok(root) = std::env::var("POD_CACHE") {
        return Ok(Utf8PathBuf::from(root));
    }
    let home = dirs::home_dir().ok_or_else(|| {
        PodError::internal("could not determine a home directory for the cache")
    })?;
    let home = Utf8PathBuf::from_path_buf(home)
        .map_err(|p| PodError::internal(format!("non-UTF-8 home directory {}", p.display())))?;
    Ok(home.join(".pod"))
}

//! Package sources for pod.
//!
//! A source is a pluggable provider of package metadata and content.
//! Three are built in: the hosted HTTPS index, git repositories, and
//! local filesystem paths. The registry maps source names to sources
//! and fronts the system cache's single-flight downloads.

pub mod git;
pub mod hosted;
pub mod path;
mod registry;
mod source;

pub use registry::{PackageProvider, RegistryProvider, SourceRegistry};
pub use source::Source;

use camino::Utf8Path;
use pod_core::error::{PodError, PodResult};

/// Create a directory symlink, replacing whatever was at `link`
pub fn symlink_dir(target: &Utf8Path, link: &Utf8Path) -> PodResult<()> {
    if link.symlink_metadata().is_ok() {
        std::fs::remove_file(link)
            .or_else(|_| std::fs::remove_dir_all(link))
            .map_err(|e| PodError::io(format!("failed to remove {link}"), e))?;
    }
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(target, link)
            .map_err(|e| PodError::io(format!("failed to link {link} -> {target}"), e))
    }
    #[cfg(windows)]
    {
        std::os::windows::fs::symlink_dir(target, link)
            .map_err(|e| PodError::io(format!("failed to link {link} -> {target}"), e))
    }
}

//! The filesystem path source.
//!
//! Path packages are never copied into the system cache; they are used
//! where they live and installed as symlinks. A path dependency
//! contributes exactly one candidate version, the one its own pubspec
//! declares.

use camino::{Utf8Path, Utf8PathBuf};
use pod_core::error::{PodError, PodResult};
use pod_core::manifest::Pubspec;
use pod_core::package::{Description, PackageId, PackageRef};
use pod_core::version::Version;
use tracing::debug;

use crate::symlink_dir;

/// Source backed by local directories
#[derive(Debug, Default)]
pub struct PathSource;

impl PathSource {
    pub fn new() -> Self {
        Self
    }

    fn path_of(description: &Description) -> PodResult<&Utf8Path> {
        match description {
            Description::Path { path, .. } => Ok(path),
            other => Err(PodError::internal(format!(
                "path source got a {} description",
                other.source_name()
            ))),
        }
    }

    fn load_pubspec(name: &str, dir: &Utf8Path) -> PodResult<Pubspec> {
        if !dir.is_dir() {
            return Err(PodError::PackageNotFound {
                name: name.to_string(),
                location: dir.to_string(),
            });
        }
        Pubspec::load(dir)
    }

    pub async fn get_versions(&self, target: &PackageRef) -> PodResult<Vec<Version>> {
        let dir = Self::path_of(&target.description)?;
        let pubspec = Self::load_pubspec(&target.name, dir)?;
        Ok(vec![pubspec.pseudo_version()])
    }

    pub async fn describe(&self, id: &PackageId) -> PodResult<Pubspec> {
        let dir = Self::path_of(&id.description)?;
        Self::load_pubspec(&id.name, dir)
    }

    /// Install by linking `dest` to the package's `lib/` directory.
    /// A package without `lib/` is skipped silently; a package that is
    /// not where the description says reports `false`.
    pub async fn install(&self, id: &PackageId, dest: &Utf8Path) -> PodResult<bool> {
        let dir = Self::path_of(&id.description)?;
        if !dir.is_dir() {
            return Ok(false);
        }
        let lib = dir.join("lib");
        if !lib.is_dir() {
            debug!(package = %id, "no lib directory, skipping link");
            return Ok(true);
        }
        symlink_dir(&lib, dest)?;
        Ok(true)
    }

    pub fn directory(&self, id: &PackageId) -> PodResult<Utf8PathBuf> {
        Self::path_of(&id.description).map(Utf8Path::to_path_buf)
    }

    /// Path equivalence resolves symlinks before comparing
    pub fn descriptions_equal(&self, a: &Description, b: &Description) -> bool {
        match (Self::path_of(a), Self::path_of(b)) {
            (Ok(a), Ok(b)) => canonical(a) == canonical(b),
            _ => false,
        }
    }
}

fn canonical(path: &Utf8Path) -> Utf8PathBuf {
    path.canonicalize_utf8()
        .unwrap_or_else(|_| path.to_path_buf())
}

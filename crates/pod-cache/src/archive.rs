//! Tarball extraction.
//!
//! Extraction validates every entry path so a hostile archive cannot
//! write outside its destination, and strips the single top-level
//! directory most archive producers add.

use std::fs;
use std::io::Read;
use std::path::{Component, Path, PathBuf};

use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::GzDecoder;
use pod_core::error::{PodError, PodResult};
use tar::Archive;

/// Extract a gzipped tarball into `dest_dir`
pub fn extract_tar_gz<R: Read>(reader: R, dest_dir: &Path) -> PodResult<()> {
    let gz_decoder = GzDecoder::new(reader);
    let mut archive = Archive::new(gz_decoder);

    fs::create_dir_all(dest_dir)
        .map_err(|e| PodError::io(format!("failed to create {}", dest_dir.display()), e))?;

    let entries = archive
        .entries()
        .map_err(|e| PodError::io("failed to read archive".to_string(), e))?;
    for entry_result in entries {
        let mut entry =
            entry_result.map_err(|e| PodError::io("failed to read archive entry".to_string(), e))?;
        let entry_path = entry
            .path()
            .map_err(|e| PodError::io("archive entry has a bad path".to_string(), e))?
            .into_owned();
        let safe_path = validate_extract_path(&entry_path, dest_dir)?;

        match entry.header().entry_type() {
            tar::EntryType::Regular => {
                if let Some(parent) = safe_path.parent() {
                    fs::create_dir_all(parent).map_err(|e| {
                        PodError::io(format!("failed to create {}", parent.display()), e)
                    })?;
                }
                let mut file = fs::File::create(&safe_path).map_err(|e| {
                    PodError::io(format!("failed to create {}", safe_path.display()), e)
                })?;
                std::io::copy(&mut entry, &mut file)
                    .map_err(|e| PodError::io("failed to extract file".to_string(), e))?;
                #[cfg(unix)]
                if let Ok(mode) = entry.header().mode() {
                    use std::os::unix::fs::PermissionsExt;
                    let _ = fs::set_permissions(&safe_path, fs::Permissions::from_mode(mode));
                }
            }
            tar::EntryType::Directory => {
                fs::create_dir_all(&safe_path).map_err(|e| {
                    PodError::io(format!("failed to create {}", safe_path.display()), e)
                })?;
            }
            // Other entry types (devices, fifos, links) are skipped;
            // package archives carry plain trees.
            _ => continue,
        }
    }

    Ok(())
}

/// Validate an entry path: no absolute paths, no traversal out of the
/// destination
fn validate_extract_path(entry_path: &Path, dest_dir: &Path) -> PodResult<PathBuf> {
    let mut safe_path = dest_dir.to_path_buf();
    for component in entry_path.components() {
        match component {
            Component::Normal(name) => safe_path.push(name),
            Component::ParentDir => {
                return Err(PodError::InvalidArgument {
                    message: format!(
                        "archive entry escapes its destination: {}",
                        entry_path.display()
                    ),
                });
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(PodError::InvalidArgument {
                    message: format!(
                        "archive entry has an absolute path: {}",
                        entry_path.display()
                    ),
                });
            }
            Component::CurDir => continue,
        }
    }
    if !safe_path.starts_with(dest_dir) {
        return Err(PodError::InvalidArgument {
            message: format!(
                "archive entry escapes its destination: {}",
                entry_path.display()
            ),
        });
    }
    Ok(safe_path)
}

/// The real root of an unpacked tree: when the archive wrapped its
/// contents in a single top-level directory, that directory; otherwise
/// `dir` itself.
pub fn unpacked_root(dir: &Utf8Path) -> PodResult<Utf8PathBuf> {
    let mut entries = Vec::new();
    let listing = dir
        .read_dir_utf8()
        .map_err(|e| PodError::io(format!("failed to list {dir}"), e))?;
    for entry in listing {
        let entry = entry.map_err(|e| PodError::io(format!("failed to list {dir}"), e))?;
        entries.push(entry);
    }
    if entries.len() == 1 && entries[0].file_type().map(|t| t.is_dir()).unwrap_or(false) {
        Ok(entries[0].path().to_path_buf())
    } else {
        Ok(dir.to_path_buf())
    }
}

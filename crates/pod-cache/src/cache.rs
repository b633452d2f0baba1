//! The system cache.
//!
//! A directory tree keyed by (source, package, version-or-revision)
//! with write-once entries: downloads land in a staging directory on
//! the same volume and are renamed into place. An in-memory pending map
//! guarantees at most one in-flight download per package id across the
//! process; late arrivals share the leader's result.

use std::future::Future;
use std::sync::Arc;

use camino::{Utf8Path, Utf8PathBuf};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use pod_core::error::{PodError, PodResult};
use pod_core::package::{Package, PackageId};
use sha1::{Digest, Sha1};
use tokio::sync::{broadcast, Semaphore, SemaphorePermit};
use tracing::debug;

/// Cap on simultaneous descriptor-consuming operations
pub const IO_POOL_SIZE: usize = 32;

type SharedResult = Result<Package, Arc<PodError>>;

/// The on-disk package store plus its in-memory download coordination
#[derive(Debug)]
pub struct SystemCache {
    root: Utf8PathBuf,
    io_pool: Semaphore,
    pending: DashMap<PackageId, broadcast::Sender<SharedResult>>,
}

impl SystemCache {
    /// Open (creating if needed) the cache rooted at `root`. Leftover
    /// staging directories from crashed runs are discarded.
    pub fn new(root: impl Into<Utf8PathBuf>) -> PodResult<Self> {
        let root = root.into();
        for dir in [
            root.clone(),
            root.join("hosted"),
            root.join("git"),
            root.join("git").join("cache"),
        ] {
            std::fs::create_dir_all(&dir)
                .map_err(|e| PodError::io(format!("failed to create cache directory {dir}"), e))?;
        }
        let cache = Self {
            root,
            io_pool: Semaphore::new(IO_POOL_SIZE),
            pending: DashMap::new(),
        };
        cache.clean_temp()?;
        Ok(cache)
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    /// Where a hosted package from `url` is (or will be) expanded
    pub fn hosted_package_dir(&self, url: &str, name: &str, version: &str) -> Utf8PathBuf {
        self.root
            .join("hosted")
            .join(sanitize_host(url))
            .join(format!("{name}-{version}"))
    }

    /// The bare mirror clone for a git repository URL
    pub fn git_mirror_dir(&self, name: &str, url: &str) -> Utf8PathBuf {
        let mut hasher = Sha1::new();
        hasher.update(url.as_bytes());
        let digest = format!("{:x}", hasher.finalize());
        self.root
            .join("git")
            .join("cache")
            .join(format!("{name}-{digest}"))
    }

    /// The working tree checked out at a specific commit
    pub fn git_revision_dir(&self, name: &str, commit: &str) -> Utf8PathBuf {
        self.root.join("git").join(format!("{name}-{commit}"))
    }

    fn temp_root(&self) -> Utf8PathBuf {
        self.root.join("temp")
    }

    /// Remove everything under the staging area
    pub fn clean_temp(&self) -> PodResult<()> {
        let temp = self.temp_root();
        if temp.exists() {
            std::fs::remove_dir_all(&temp)
                .map_err(|e| PodError::io(format!("failed to clean {temp}"), e))?;
        }
        std::fs::create_dir_all(&temp)
            .map_err(|e| PodError::io(format!("failed to create {temp}"), e))?;
        Ok(())
    }

    /// Create a staging directory on the cache volume, so committing a
    /// finished download is a rename
    pub fn create_staging(&self) -> PodResult<tempfile::TempDir> {
        tempfile::Builder::new()
            .prefix("download-")
            .tempdir_in(self.temp_root())
            .map_err(|e| PodError::io("failed to create staging directory".to_string(), e))
    }

    /// Move staged content into its final cache entry. Losing the race
    /// to another process is fine: entries are write-once, so the
    /// existing content is the same content.
    pub fn commit_staging(&self, staged: &Utf8Path, dest: &Utf8Path) -> PodResult<()> {
        if dest.exists() {
            let _ = std::fs::remove_dir_all(staged);
            return Ok(());
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PodError::io(format!("failed to create {parent}"), e))?;
        }
        std::fs::rename(staged, dest)
            .map_err(|e| PodError::io(format!("failed to move download into {dest}"), e))
    }

    /// Acquire a slot from the descriptor pool. Waiters queue; dropping
    /// a queued waiter abandons its place.
    pub async fn io_permit(&self) -> PodResult<SemaphorePermit<'_>> {
        self.io_pool
            .acquire()
            .await
            .map_err(|_| PodError::internal("descriptor pool closed"))
    }

    /// Run `fetch` for `id`, single-flight: while a download for the
    /// same id is in flight every additional caller waits on it and
    /// observes the same package or the same failure. The pending entry
    /// is removed on completion so a later call can retry.
    pub async fn download<F, Fut>(&self, id: &PackageId, fetch: F) -> PodResult<Package>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = PodResult<Package>>,
    {
        let mut fetch = Some(fetch);
        loop {
            let role = match self.pending.entry(id.clone()) {
                Entry::Occupied(occupied) => Role::Waiter(occupied.get().subscribe()),
                Entry::Vacant(vacant) => {
                    let (tx, _rx) = broadcast::channel(1);
                    vacant.insert(tx.clone());
                    Role::Leader(tx)
                }
            };
            match role {
                Role::Waiter(mut rx) => {
                    debug!(package = %id, "waiting on in-flight download");
                    match rx.recv().await {
                        Ok(result) => return result.map_err(PodError::from),
                        // The leader went away without completing;
                        // race to take its place.
                        Err(_) => continue,
                    }
                }
                Role::Leader(tx) => {
                    let guard = PendingGuard { cache: self, id };
                    let fetch = fetch.take().ok_or_else(|| {
                        PodError::internal("download fetch closure consumed twice")
                    })?;
                    let result = fetch().await.map_err(Arc::new);
                    drop(guard);
                    let _ = tx.send(result.clone());
                    return result.map_err(PodError::from);
                }
            }
        }
    }
}

enum Role {
    Leader(broadcast::Sender<SharedResult>),
    Waiter(broadcast::Receiver<SharedResult>),
}

/// Removes the pending entry even when the leader is cancelled
/// mid-download, so waiters can promote themselves.
struct PendingGuard<'a> {
    cache: &'a SystemCache,
    id: &'a PackageId,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.cache.pending.remove(self.id);
    }
}

/// Flatten a registry URL into a directory name
fn sanitize_host(url: &str) -> String {
    let stripped = url
        .strip_prefix("https://")
        .or_else(|| url.strip_prefix("http://"))
        .unwrap_or(url);
    stripped
        .trim_end_matches('/')
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_' {
                c
            } else {
                '%'
            }
        })
        .collect()
}

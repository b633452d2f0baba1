//! The git package source.
//!
//! Repositories are cached in two layers: one bare mirror clone per
//! URL, and one working tree per required commit, cloned from the
//! mirror so only the first fetch touches the network. When no `git`
//! binary is available, github.com repositories fall back to tarball
//! snapshots served by the GitHub API.

use std::io::Cursor;
use std::process::Stdio;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use pod_cache::{archive, SystemCache};
use pod_core::error::{PodError, PodResult};
use pod_core::manifest::{Pubspec, PUBSPEC_FILE};
use pod_core::package::{Description, Package, PackageId, PackageRef};
use pod_core::version::Version;
use reqwest::Client;
use tokio::process::Command;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Source backed by git repositories
#[derive(Debug)]
pub struct GitSource {
    client: Client,
    git_available: OnceCell<bool>,
}

impl GitSource {
    pub fn new() -> PodResult<Self> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .user_agent(concat!("pod/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PodError::Network {
                url: String::new(),
                status: None,
                message: format!("failed to create HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            git_available: OnceCell::new(),
        })
    }

    fn git_parts(description: &Description) -> PodResult<(&str, &str, Option<&str>)> {
        match description {
            Description::Git {
                url,
                reference,
                resolved_ref,
            } => Ok((url, reference, resolved_ref.as_deref())),
            other => Err(PodError::internal(format!(
                "git source got a {} description",
                other.source_name()
            ))),
        }
    }

    async fn git_available(&self) -> bool {
        *self
            .git_available
            .get_or_init(|| async {
                let found = Command::new("git")
                    .arg("--version")
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .status()
                    .await
                    .map(|status| status.success())
                    .unwrap_or(false);
                if !found {
                    warn!("git executable not found, falling back to GitHub snapshots");
                }
                found
            })
            .await
    }

    async fn run_git(&self, args: &[&str], cwd: Option<&Utf8Path>) -> PodResult<String> {
        let mut command = Command::new("git");
        command.args(args).stdin(Stdio::null());
        if let Some(dir) = cwd {
            command.current_dir(dir);
        }
        debug!(?args, "running git");
        let output = command
            .output()
            .await
            .map_err(|e| PodError::Git {
                message: format!("failed to run git {}: {e}", args.join(" ")),
            })?;
        if !output.status.success() {
            return Err(PodError::Git {
                message: format!(
                    "git {} failed: {}",
                    args.join(" "),
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }

    /// Clone (or reuse) the bare mirror for `url`
    async fn ensure_mirror(
        &self,
        cache: &SystemCache,
        name: &str,
        url: &str,
    ) -> PodResult<Utf8PathBuf> {
        let mirror = cache.git_mirror_dir(name, url);
        if mirror.exists() {
            return Ok(mirror);
        }
        let _permit = cache.io_permit().await?;
        let staging = cache.create_staging()?;
        let staged = staging_path(&staging)?.join("mirror");
        self.run_git(&["clone", "--mirror", url, staged.as_str()], None)
            .await?;
        cache.commit_staging(&staged, &mirror)?;
        Ok(mirror)
    }

    /// Resolve a symbolic ref to a commit in the mirror, fetching once
    /// if the ref is not there yet
    async fn resolve_in_mirror(&self, mirror: &Utf8Path, reference: &str) -> PodResult<String> {
        let spec = format!("{reference}^{{commit}}");
        match self.run_git(&["rev-parse", &spec], Some(mirror)).await {
            Ok(commit) => Ok(commit),
            Err(_) => {
                // A mirror clone's fetch refspec covers every ref.
                self.run_git(&["fetch", "origin"], Some(mirror)).await?;
                self.run_git(&["rev-parse", &spec], Some(mirror)).await
            }
        }
    }

    async fn resolve_commit(
        &self,
        cache: &SystemCache,
        name: &str,
        url: &str,
        reference: &str,
        resolved: Option<&str>,
    ) -> PodResult<String> {
        if let Some(commit) = resolved {
            return Ok(commit.to_string());
        }
        if self.git_available().await {
            let mirror = self.ensure_mirror(cache, name, url).await?;
            self.resolve_in_mirror(&mirror, reference).await
        } else {
            self.github_commit_sha(url, reference).await
        }
    }

    /// Read a file out of the mirror at a specific commit
    async fn show_file(&self, mirror: &Utf8Path, commit: &str, file: &str) -> PodResult<String> {
        self.run_git(&["show", &format!("{commit}:{file}")], Some(mirror))
            .await
    }

    async fn pubspec_at(
        &self,
        cache: &SystemCache,
        id_name: &str,
        url: &str,
        commit: &str,
    ) -> PodResult<Pubspec> {
        let revision_dir = cache.git_revision_dir(id_name, commit);
        if self.git_available().await {
            let mirror = self.ensure_mirror(cache, id_name, url).await?;
            let text = self.show_file(&mirror, commit, PUBSPEC_FILE).await?;
            Pubspec::parse(&text, &revision_dir)
        } else {
            // The fallback has no cheap manifest read, so materialize
            // the snapshot and read from it.
            let dir = self
                .ensure_snapshot(cache, id_name, url, commit)
                .await?;
            Pubspec::load(&dir)
        }
    }

    pub async fn get_versions(
        &self,
        target: &PackageRef,
        cache: &SystemCache,
    ) -> PodResult<Vec<Version>> {
        let (url, reference, resolved) = Self::git_parts(&target.description)?;
        let commit = self
            .resolve_commit(cache, &target.name, url, reference, resolved)
            .await?;
        let pubspec = self.pubspec_at(cache, &target.name, url, &commit).await?;
        Ok(vec![pubspec.pseudo_version()])
    }

    pub async fn describe(&self, id: &PackageId, cache: &SystemCache) -> PodResult<Pubspec> {
        let (url, reference, resolved) = Self::git_parts(&id.description)?;
        let commit = self
            .resolve_commit(cache, &id.name, url, reference, resolved)
            .await?;
        self.pubspec_at(cache, &id.name, url, &commit).await
    }

    pub async fn download(&self, id: &PackageId, cache: &SystemCache) -> PodResult<Package> {
        let (url, reference, resolved) = Self::git_parts(&id.description)?;
        let commit = self
            .resolve_commit(cache, &id.name, url, reference, resolved)
            .await?;
        let revision_dir = cache.git_revision_dir(&id.name, &commit);
        if revision_dir.exists() {
            return Package::load(id.clone(), revision_dir);
        }

        if self.git_available().await {
            let mirror = self.ensure_mirror(cache, &id.name, url).await?;
            let _permit = cache.io_permit().await?;
            let staging = cache.create_staging()?;
            let staged = staging_path(&staging)?.join("tree");
            self.run_git(&["clone", mirror.as_str(), staged.as_str()], None)
                .await?;
            self.run_git(&["checkout", "--detach", &commit], Some(&staged))
                .await?;
            cache.commit_staging(&staged, &revision_dir)?;
        } else {
            self.ensure_snapshot(cache, &id.name, url, &commit).await?;
        }
        Package::load(id.clone(), revision_dir)
    }

    pub fn directory(&self, id: &PackageId, cache: &SystemCache) -> PodResult<Utf8PathBuf> {
        let (_, reference, resolved) = Self::git_parts(&id.description)?;
        let commit = resolved.unwrap_or(reference);
        Ok(cache.git_revision_dir(&id.name, commit))
    }

    pub async fn resolve_id(&self, id: &PackageId, cache: &SystemCache) -> PodResult<PackageId> {
        let (url, reference, resolved) = Self::git_parts(&id.description)?;
        if resolved.is_some() {
            return Ok(id.clone());
        }
        let commit = self
            .resolve_commit(cache, &id.name, url, reference, None)
            .await?;
        Ok(PackageId {
            name: id.name.clone(),
            description: Description::Git {
                url: url.to_string(),
                reference: reference.to_string(),
                resolved_ref: Some(commit),
            },
            version: id.version.clone(),
        })
    }

    // GitHub fallback

    /// Resolve a ref to a commit SHA through the GitHub API
    async fn github_commit_sha(&self, url: &str, reference: &str) -> PodResult<String> {
        let (owner, repo) = github_repo(url).ok_or_else(|| PodError::Git {
            message: format!("git is not installed and {url} is not a github.com repository"),
        })?;
        let api_url = format!("https://api.github.com/repos/{owner}/{repo}/commits/{reference}");
        let response = self
            .client
            .get(&api_url)
            .header("Accept", "application/vnd.github.sha")
            .send()
            .await
            .map_err(|e| github_error(&api_url, e))?;
        if !response.status().is_success() {
            return Err(PodError::Network {
                url: api_url,
                status: Some(response.status().as_u16()),
                message: "could not resolve git reference through GitHub".to_string(),
            });
        }
        response.text().await.map_err(|e| github_error(&api_url, e))
    }

    /// Download and expand a tarball snapshot of `commit`
    async fn ensure_snapshot(
        &self,
        cache: &SystemCache,
        name: &str,
        url: &str,
        commit: &str,
    ) -> PodResult<Utf8PathBuf> {
        let revision_dir = cache.git_revision_dir(name, commit);
        if revision_dir.exists() {
            return Ok(revision_dir);
        }
        let (owner, repo) = github_repo(url).ok_or_else(|| PodError::Git {
            message: format!("git is not installed and {url} is not a github.com repository"),
        })?;
        let tarball_url = format!("https://api.github.com/repos/{owner}/{repo}/tarball/{commit}");
        debug!(%tarball_url, "downloading repository snapshot");
        let response = self
            .client
            .get(&tarball_url)
            .send()
            .await
            .map_err(|e| github_error(&tarball_url, e))?;
        if !response.status().is_success() {
            return Err(PodError::Network {
                url: tarball_url,
                status: Some(response.status().as_u16()),
                message: "could not download repository snapshot".to_string(),
            });
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| github_error(&tarball_url, e))?;

        let _permit = cache.io_permit().await?;
        let staging = cache.create_staging()?;
        let staged = staging_path(&staging)?;
        archive::extract_tar_gz(Cursor::new(bytes), staged.as_std_path())?;
        let root = archive::unpacked_root(&staged)?;
        cache.commit_staging(&root, &revision_dir)?;
        Ok(revision_dir)
    }
}

fn staging_path(staging: &tempfile::TempDir) -> PodResult<Utf8PathBuf> {
    Utf8PathBuf::from_path_buf(staging.path().to_path_buf())
        .map_err(|p| PodError::internal(format!("non-UTF-8 staging path {}", p.display())))
}

fn github_error(url: &str, error: reqwest::Error) -> PodError {
    if error.is_timeout() {
        PodError::Timeout {
            url: url.to_string(),
        }
    } else {
        PodError::Network {
            url: url.to_string(),
            status: error.status().map(|s| s.as_u16()),
            message: error.to_string(),
        }
    }
}

/// Extract (owner, repo) from a github.com URL
fn github_repo(url: &str) -> Option<(String, String)> {
    let rest = url
        .strip_prefix("https://github.com/")
        .or_else(|| url.strip_prefix("http://github.com/"))
        .or_else(|| url.strip_prefix("git@github.com:"))?;
    let rest = rest.trim_end_matches('/').trim_end_matches(".git");
    let (owner, repo) = rest.split_once('/')?;
    if owner.is_empty() || repo.is_empty() || repo.contains('/') {
        return None;
    }
    Some((owner.to_string(), repo.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_github_repo_parsing() {
        assert_eq!(
            github_repo("https://github.com/pod-pm/pod"),
            Some(("pod-pm".to_string(), "pod".to_string()))
        );
        assert_eq!(
            github_repo("https://github.com/pod-pm/pod.git"),
            Some(("pod-pm".to_string(), "pod".to_string()))
        );
        assert_eq!(
            github_repo("git@github.com:pod-pm/pod.git"),
            Some(("pod-pm".to_string(), "pod".to_string()))
        );
        assert_eq!(github_repo("https://gitlab.com/pod-pm/pod"), None);
        assert_eq!(github_repo("https://github.com/justowner"), None);
    }

    #[test]
    fn test_directory_prefers_resolved_ref() {
        let source = GitSource::new().unwrap();
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().join("cache")).unwrap();
        let cache = SystemCache::new(root).unwrap();

        let unresolved = PackageId {
            name: "web".to_string(),
            description: Description::Git {
                url: "https://github.com/x/web".to_string(),
                reference: "main".to_string(),
                resolved_ref: None,
            },
            version: Version::new(0, 1, 0),
        };
        assert!(source
            .directory(&unresolved, &cache)
            .unwrap()
            .ends_with("git/web-main"));

        let resolved = PackageId {
            description: Description::Git {
                url: "https://github.com/x/web".to_string(),
                reference: "main".to_string(),
                resolved_ref: Some("abc123".to_string()),
            },
            ..unresolved
        };
        assert!(source
            .directory(&resolved, &cache)
            .unwrap()
            .ends_with("git/web-abc123"));
    }
}

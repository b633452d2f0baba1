//! The hosted package source.
//!
//! Talks to a central HTTPS index. The client pins the API version via
//! the Accept header; a 406 means the server no longer speaks it.
//! Listings are memoized per process so the solver's repeated lookups
//! of one package hit the network once.

use std::io::Cursor;
use std::time::Duration;

use camino::Utf8PathBuf;
use dashmap::DashMap;
use pod_cache::{archive, SystemCache};
use pod_core::error::{PodError, PodResult};
use pod_core::manifest::Pubspec;
use pod_core::package::{Description, Package, PackageId, PackageRef};
use pod_core::version::Version;
use reqwest::{Client, ClientBuilder, StatusCode};
use serde::Deserialize;
use tracing::debug;

/// API version pin sent with every index request
pub const API_ACCEPT: &str = "application/vnd.pod.v1+json";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Package metadata returned by the index for one package
#[derive(Debug, Clone, Deserialize)]
pub struct VersionListing {
    pub name: String,
    pub versions: Vec<ListedVersion>,
}

/// One published version and its manifest
#[derive(Debug, Clone, Deserialize)]
pub struct ListedVersion {
    pub version: String,
    pub pubspec: serde_json::Value,
}

/// Source backed by a hosted HTTPS index
#[derive(Debug)]
pub struct HostedSource {
    client: Client,
    listings: DashMap<(String, String), VersionListing>,
}

impl HostedSource {
    pub fn new() -> PodResult<Self> {
        let client = ClientBuilder::new()
            .pool_max_idle_per_host(50)
            .pool_idle_timeout(Duration::from_secs(90))
            .timeout(REQUEST_TIMEOUT)
            .gzip(true)
            .user_agent(concat!("pod/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PodError::Network {
                url: String::new(),
                status: None,
                message: format!("failed to create HTTP client: {e}"),
            })?;
        Ok(Self {
            client,
            listings: DashMap::new(),
        })
    }

    fn hosted_parts<'a>(description: &'a Description) -> PodResult<(&'a str, &'a str)> {
        match description {
            Description::Hosted { url, name } => Ok((url, name)),
            other => Err(PodError::internal(format!(
                "hosted source got a {} description",
                other.source_name()
            ))),
        }
    }

    async fn listing(&self, url: &str, name: &str) -> PodResult<VersionListing> {
        let key = (url.to_string(), name.to_string());
        if let Some(cached) = self.listings.get(&key) {
            return Ok(cached.clone());
        }

        let request_url = format!("{url}/api/packages/{name}");
        debug!(%request_url, "fetching package listing");
        let response = self
            .client
            .get(&request_url)
            .header("Accept", API_ACCEPT)
            .send()
            .await
            .map_err(|e| request_error(&request_url, e))?;

        let listing = match response.status() {
            StatusCode::OK => response
                .json::<VersionListing>()
                .await
                .map_err(|e| request_error(&request_url, e))?,
            StatusCode::NOT_FOUND => {
                return Err(PodError::PackageNotFound {
                    name: name.to_string(),
                    location: url.to_string(),
                })
            }
            StatusCode::NOT_ACCEPTABLE => {
                return Err(PodError::Network {
                    url: request_url,
                    status: Some(406),
                    message: format!("index does not support API version {API_ACCEPT}"),
                })
            }
            status => {
                return Err(PodError::Network {
                    url: request_url,
                    status: Some(status.as_u16()),
                    message: format!("index returned status {status}"),
                })
            }
        };

        self.listings.insert(key, listing.clone());
        Ok(listing)
    }

    pub async fn get_versions(&self, target: &PackageRef) -> PodResult<Vec<Version>> {
        let (url, name) = Self::hosted_parts(&target.description)?;
        let listing = self.listing(url, name).await?;
        let mut versions = Vec::with_capacity(listing.versions.len());
        for listed in &listing.versions {
            versions.push(listed.version.parse()?);
        }
        Ok(versions)
    }

    pub async fn describe(&self, id: &PackageId, cache: &SystemCache) -> PodResult<Pubspec> {
        let (url, name) = Self::hosted_parts(&id.description)?;
        let listing = self.listing(url, name).await?;
        let listed = listing
            .versions
            .iter()
            .find(|listed| {
                listed
                    .version
                    .parse::<Version>()
                    .map(|v| v == id.version)
                    .unwrap_or(false)
            })
            .ok_or_else(|| PodError::PackageNotFound {
                name: format!("{name} {}", id.version),
                location: url.to_string(),
            })?;
        let value = toml::Value::try_from(&listed.pubspec)
            .map_err(|e| PodError::parse(format!("bad pubspec for {name}: {e}")))?;
        Pubspec::from_value(value, &self.directory(id, cache)?)
    }

    pub async fn download(&self, id: &PackageId, cache: &SystemCache) -> PodResult<Package> {
        let (url, name) = Self::hosted_parts(&id.description)?;
        let dest = self.directory(id, cache)?;
        if dest.exists() {
            return Package::load(id.clone(), dest);
        }

        let archive_url = format!("{url}/api/packages/{name}/versions/{}/archive", id.version);
        debug!(%archive_url, "downloading package archive");
        let response = self
            .client
            .get(&archive_url)
            .send()
            .await
            .map_err(|e| request_error(&archive_url, e))?;
        match response.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => {
                return Err(PodError::PackageNotFound {
                    name: format!("{name} {}", id.version),
                    location: url.to_string(),
                })
            }
            status => {
                return Err(PodError::Network {
                    url: archive_url,
                    status: Some(status.as_u16()),
                    message: format!("index returned status {status}"),
                })
            }
        }
        let bytes = response
            .bytes()
            .await
            .map_err(|e| request_error(&archive_url, e))?;

        let _permit = cache.io_permit().await?;
        let staging = cache.create_staging()?;
        let staged = Utf8PathBuf::from_path_buf(staging.path().to_path_buf())
            .map_err(|p| PodError::internal(format!("non-UTF-8 staging path {}", p.display())))?;
        archive::extract_tar_gz(Cursor::new(bytes), staged.as_std_path())?;
        let root = archive::unpacked_root(&staged)?;
        cache.commit_staging(&root, &dest)?;

        Package::load(id.clone(), dest)
    }

    pub fn directory(&self, id: &PackageId, cache: &SystemCache) -> PodResult<Utf8PathBuf> {
        let (url, name) = Self::hosted_parts(&id.description)?;
        Ok(cache.hosted_package_dir(url, name, &id.version.to_string()))
    }
}

fn request_error(url: &str, error: reqwest::Error) -> PodError {
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

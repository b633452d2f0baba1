//! Package identity types.
//!
//! A package is identified by its name, the source it comes from, and a
//! source-specific description of where the source finds it. Adding a
//! concrete version (and, for git, a resolved commit) turns a ref into
//! an id.

use std::fmt;
use std::hash::{Hash, Hasher};

use camino::{Utf8Path, Utf8PathBuf};

use crate::error::{PodError, PodResult};
use crate::manifest::Pubspec;
use crate::version::Version;

/// Default hosted index consulted for bare-constraint dependencies
pub const DEFAULT_HOSTED_URL: &str = "https://index.pod.dev";

/// Source-specific description of where a package lives.
///
/// One variant per source; the variant tag doubles as the source name
/// recorded in lockfiles.
#[derive(Debug, Clone)]
pub enum Description {
    Hosted {
        url: String,
        name: String,
    },
    Git {
        url: String,
        reference: String,
        /// Commit the symbolic ref resolved to. Takes precedence for
        /// fetches once set, but never participates in equality.
        resolved_ref: Option<String>,
    },
    Path {
        path: Utf8PathBuf,
        relative: bool,
    },
}

impl Description {
    /// The stable source name used in lockfiles
    pub fn source_name(&self) -> &'static str {
        match self {
            Description::Hosted { .. } => "hosted",
            Description::Git { .. } => "git",
            Description::Path { .. } => "path",
        }
    }

    /// Whether packages from this source are materialized into the
    /// system cache
    pub fn should_cache(&self) -> bool {
        !matches!(self, Description::Path { .. })
    }

    /// Parse and normalize a raw description for the named source.
    ///
    /// Relative paths are resolved against `containing` (the directory
    /// of the document declaring the dependency). In lockfile mode only
    /// the canonical map form is accepted.
    pub fn parse(
        source: &str,
        value: &toml::Value,
        containing: &Utf8Path,
        from_lockfile: bool,
    ) -> PodResult<Description> {
        match source {
            "hosted" => Self::parse_hosted(value, from_lockfile),
            "git" => Self::parse_git(value, from_lockfile),
            "path" => Self::parse_path(value, containing, from_lockfile),
            other => Err(PodError::parse(format!("unknown source \"{other}\""))),
        }
    }

    fn parse_hosted(value: &toml::Value, from_lockfile: bool) -> PodResult<Description> {
        match value {
            toml::Value::String(name) if !from_lockfile => Ok(Description::Hosted {
                url: DEFAULT_HOSTED_URL.to_string(),
                name: name.clone(),
            }),
            toml::Value::Table(table) => {
                let name = require_str(table, "name", "hosted description")?;
                let url = match table.get("url") {
                    Some(toml::Value::String(url)) => url.trim_end_matches('/').to_string(),
                    Some(_) => {
                        return Err(PodError::parse("hosted description \"url\" must be a string"))
                    }
                    None => DEFAULT_HOSTED_URL.to_string(),
                };
                Ok(Description::Hosted { url, name })
            }
            _ => Err(PodError::parse(
                "hosted description must be a package name or a table",
            )),
        }
    }

    fn parse_git(value: &toml::Value, from_lockfile: bool) -> PodResult<Description> {
        match value {
            toml::Value::String(url) if !from_lockfile => Ok(Description::Git {
                url: url.clone(),
                reference: "HEAD".to_string(),
                resolved_ref: None,
            }),
            toml::Value::Table(table) => {
                let url = require_str(table, "url", "git description")?;
                let reference = match table.get("ref") {
                    Some(toml::Value::String(r)) => r.clone(),
                    Some(_) => {
                        return Err(PodError::parse("git description \"ref\" must be a string"))
                    }
                    None => "HEAD".to_string(),
                };
                let resolved_ref = match table.get("resolved-ref") {
                    Some(toml::Value::String(sha)) => Some(sha.clone()),
                    Some(_) => {
                        return Err(PodError::parse(
                            "git description \"resolved-ref\" must be a string",
                        ))
                    }
                    None => None,
                };
                Ok(Description::Git {
                    url,
                    reference,
                    resolved_ref,
                })
            }
            _ => Err(PodError::parse("git description must be a URL or a table")),
        }
    }

    fn parse_path(
        value: &toml::Value,
        containing: &Utf8Path,
        from_lockfile: bool,
    ) -> PodResult<Description> {
        match value {
            toml::Value::String(raw) if !from_lockfile => {
                let relative = !Utf8Path::new(raw).is_absolute();
                Ok(Description::Path {
                    path: normalize_path(containing, raw),
                    relative,
                })
            }
            toml::Value::Table(table) => {
                let raw = require_str(table, "path", "path description")?;
                let relative = match table.get("relative") {
                    Some(toml::Value::Boolean(b)) => *b,
                    Some(_) => {
                        return Err(PodError::parse(
                            "path description \"relative\" must be a boolean",
                        ))
                    }
                    None => !Utf8Path::new(&raw).is_absolute(),
                };
                Ok(Description::Path {
                    path: normalize_path(containing, &raw),
                    relative,
                })
            }
            _ => Err(PodError::parse("path description must be a path or a table")),
        }
    }

    /// Serialize to the canonical map form stored in lockfiles
    pub fn serialize(&self, containing: &Utf8Path) -> toml::Value {
        let mut table = toml::map::Map::new();
        match self {
            Description::Hosted { url, name } => {
                table.insert("url".to_string(), toml::Value::String(url.clone()));
                table.insert("name".to_string(), toml::Value::String(name.clone()));
            }
            Description::Git {
                url,
                reference,
                resolved_ref,
            } => {
                table.insert("url".to_string(), toml::Value::String(url.clone()));
                table.insert("ref".to_string(), toml::Value::String(reference.clone()));
                if let Some(sha) = resolved_ref {
                    table.insert("resolved-ref".to_string(), toml::Value::String(sha.clone()));
                }
            }
            Description::Path { path, relative } => {
                let stored = if *relative {
                    relative_to(path, containing).unwrap_or_else(|| path.clone())
                } else {
                    path.clone()
                };
                table.insert("path".to_string(), toml::Value::String(stored.into_string()));
                table.insert("relative".to_string(), toml::Value::Boolean(*relative));
            }
        }
        toml::Value::Table(table)
    }
}

fn require_str(table: &toml::map::Map<String, toml::Value>, key: &str, what: &str) -> PodResult<String> {
    match table.get(key) {
        Some(toml::Value::String(s)) => Ok(s.clone()),
        Some(_) => Err(PodError::parse(format!("{what} \"{key}\" must be a string"))),
        None => Err(PodError::parse(format!("{what} is missing \"{key}\""))),
    }
}

/// Resolve `raw` against `containing` and canonicalize: symlinks are
/// followed when the target exists, `.` and `..` are folded otherwise.
pub fn normalize_path(containing: &Utf8Path, raw: &str) -> Utf8PathBuf {
    let joined = if Utf8Path::new(raw).is_absolute() {
        Utf8PathBuf::from(raw)
    } else {
        containing.join(raw)
    };
    match joined.canonicalize_utf8() {
        Ok(canonical) => canonical,
        Err(_) => lexical_normalize(&joined),
    }
}

fn lexical_normalize(path: &Utf8Path) -> Utf8PathBuf {
    let mut result = Utf8PathBuf::new();
    for component in path.components() {
        match component {
            camino::Utf8Component::CurDir => {}
            camino::Utf8Component::ParentDir => {
                if !result.pop() {
                    result.push("..");
                }
            }
            other => result.push(other.as_str()),
        }
    }
    result
}

fn relative_to(path: &Utf8Path, base: &Utf8Path) -> Option<Utf8PathBuf> {
    path.strip_prefix(base).ok().map(Utf8Path::to_path_buf)
}

// Equality follows the source's normalization rules: git ignores the
// resolved commit, path compares the normalized path only.
impl PartialEq for Description {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Description::Hosted { url: a_url, name: a_name },
                Description::Hosted { url: b_url, name: b_name },
            ) => a_url == b_url && a_name == b_name,
            (
                Description::Git { url: a_url, reference: a_ref, .. },
                Description::Git { url: b_url, reference: b_ref, .. },
            ) => a_url == b_url && a_ref == b_ref,
            (Description::Path { path: a, .. }, Description::Path { path: b, .. }) => a == b,
            _ => false,
        }
    }
}

impl Eq for Description {}

impl Hash for Description {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Description::Hosted { url, name } => {
                0u8.hash(state);
                url.hash(state);
                name.hash(state);
            }
            Description::Git { url, reference, .. } => {
                1u8.hash(state);
                url.hash(state);
                reference.hash(state);
            }
            Description::Path { path, .. } => {
                2u8.hash(state);
                path.hash(state);
            }
        }
    }
}

/// A package name plus where to find it, before a version is chosen
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageRef {
    pub name: String,
    pub description: Description,
}

impl PackageRef {
    pub fn new(name: impl Into<String>, description: Description) -> Self {
        Self {
            name: name.into(),
            description,
        }
    }

    pub fn source_name(&self) -> &'static str {
        self.description.source_name()
    }

    /// Attach a resolved version
    pub fn at_version(&self, version: Version) -> PackageId {
        PackageId {
            name: self.name.clone(),
            description: self.description.clone(),
            version,
        }
    }
}

impl fmt::Display for PackageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from {}", self.name, self.source_name())
    }
}

/// A package ref resolved to a concrete version
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PackageId {
    pub name: String,
    pub description: Description,
    pub version: Version,
}

impl PackageId {
    /// The id of a root project rooted at `dir`
    pub fn root(name: impl Into<String>, version: Version, dir: &Utf8Path) -> Self {
        Self {
            name: name.into(),
            description: Description::Path {
                path: dir.to_path_buf(),
                relative: false,
            },
            version,
        }
    }

    pub fn source_name(&self) -> &'static str {
        self.description.source_name()
    }

    pub fn as_ref(&self) -> PackageRef {
        PackageRef {
            name: self.name.clone(),
            description: self.description.clone(),
        }
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.name, self.version)
    }
}

/// A loaded package: its id, manifest, and filesystem location
#[derive(Debug, Clone)]
pub struct Package {
    pub id: PackageId,
    pub dir: Utf8PathBuf,
    pub pubspec: Pubspec,
}

impl Package {
    pub fn new(id: PackageId, dir: Utf8PathBuf, pubspec: Pubspec) -> Self {
        Self { id, dir, pubspec }
    }

    /// Load the package rooted at `dir`, reading its `pubspec.toml`
    pub fn load(id: PackageId, dir: Utf8PathBuf) -> PodResult<Package> {
        let pubspec = Pubspec::load(&dir)?;
        Ok(Package { id, dir, pubspec })
    }
}

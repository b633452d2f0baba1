//! # pod-core
//!
//! Core types and utilities shared across all pod crates.
//!
//! This crate provides:
//! - Version and VersionConstraint types with interval algebra
//! - PackageRef, PackageId and Description types for package identity
//! - Pubspec manifest and LockFile documents
//! - PodError enum for unified error handling
//!
//! ## Architecture
//!
//! The crate is organized into modules:
//! - `version`: Semantic versions and the constraint algebra
//! - `package`: Package identity (refs, ids, source descriptions)
//! - `manifest`: The `pubspec.toml` document
//! - `lockfile`: The `pubspec.lock` document
//! - `error`: Error types and result aliases
//! - `sdk`: Active SDK version detection

pub mod error;
pub mod lockfile;
pub mod manifest;
pub mod package;
pub mod sdk;
pub mod version;

// Re-export commonly used types
pub use error::{PodError, PodResult};
pub use lockfile::LockFile;
pub use manifest::{Dependency, Pubspec};
pub use package::{Description, Package, PackageId, PackageRef};
pub use version::{Version, VersionConstraint, VersionRange};

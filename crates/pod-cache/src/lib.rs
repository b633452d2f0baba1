//! System cache for downloaded packages.
//!
//! This crate provides the on-disk store that cacheable sources
//! materialize packages into, plus the concurrency discipline around
//! it: staging-then-rename writes, at-most-one in-flight download per
//! package id, and a bounded pool for descriptor-hungry operations.

pub mod archive;
mod cache;

pub use cache::{SystemCache, IO_POOL_SIZE};

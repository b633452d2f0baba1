//! # pod-cli
//!
//! The pod command line: project loading, the dependency acquisition
//! pipeline, and the terminal front end around it.

pub mod commands;
pub mod entrypoint;
pub mod output;

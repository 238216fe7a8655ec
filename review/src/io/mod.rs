//! I/O adapters for the review pipeline.

pub mod api;
pub mod apply;
pub mod artifacts;
pub mod bundle;
pub mod config;
pub mod git;
pub mod prompt;
pub mod wait;

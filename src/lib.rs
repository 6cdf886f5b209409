//! feedkit - package source client
//!
//! Discovers the capabilities a package source advertises, keeps
//! process-lifetime caches over local package folders and downloads package
//! archives with optional shared throttling.

pub mod cache;
pub mod cli;
pub mod config;
pub mod download;
pub mod error;
pub mod local;
pub mod packaging;
pub mod protocol;
pub mod queue;
pub mod repository;

pub use error::{FeedError, FeedResult};

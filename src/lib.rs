//! gzmirror library
//!
//! One-way incremental backup of a directory tree into per-file gzip archives

pub mod cli;
pub mod compare;
pub mod compress;
pub mod config;
pub mod copy;
pub mod error;
pub mod journal;
pub mod logger;
pub mod mirror;
pub mod reconcile;

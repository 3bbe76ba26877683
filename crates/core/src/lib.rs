//! Core types and shared functionality for the kiosk worker.
//!
//! This crate provides:
//! - Versioned cache partitions with a SQLite backend
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod config;
pub mod error;

pub use cache::{CacheDb, CachePartitions, StoredResponse};
pub use config::{AppConfig, ConfigError};
pub use error::Error;

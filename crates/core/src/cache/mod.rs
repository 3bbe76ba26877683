//! SQLite-backed cache partitions for the kiosk worker.
//!
//! This module provides persistent, versioned cache partitions using SQLite
//! with async access via tokio-rusqlite. It supports:
//!
//! - Request identity keys using SHA-256 hashing
//! - Automatic schema migrations
//! - WAL mode for concurrent access
//! - Whole-partition deletion on version changes

pub mod connection;
pub mod hash;
pub mod migrations;
pub mod partitions;

pub use crate::Error;

pub use connection::CacheDb;
#[cfg(any(test, feature = "test-util"))]
pub use connection::CacheFault;
pub use partitions::{CachePartitions, StoredResponse};

//! valkey-cachedb library
//!
//! Cluster-aware key-value cache client for Valkey/Redis with multi-host
//! failover, bounded retry and generic reply decoding.

pub mod client;
pub mod cluster;
pub mod config;
pub mod utils;

pub use client::{CacheClient, Field, Removal, Row};
pub use config::{CacheDbId, ClientConfig, TlsDomains};
pub use utils::{ClientError, Outcome, Result};

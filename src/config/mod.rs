//! Configuration module

pub mod cli;
pub mod client_config;
pub mod tls_config;

pub use cli::{CacheCommand, CliArgs};
pub use client_config::{
    tls_domains_from_cli, CacheDbId, ClientConfig, ServerAddress, DEFAULT_PORT,
};
pub use tls_config::{TlsConfig, TlsDomain, TlsDomains, TLS_DOMAIN_PARAM};

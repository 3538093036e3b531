//! Command-line argument parsing
//!
//! Connection options mirror the cache URL pieces (host list, password,
//! database, TLS domain); the subcommand picks the cache verb to run.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use super::client_config::{DEFAULT_QUERY_ATTEMPTS, DEFAULT_TIMEOUT_MS};

/// Cluster-aware Valkey/Redis cache client with multi-host failover
#[derive(Parser, Debug, Clone)]
#[command(name = "valkey-cachedb")]
#[command(version, about, long_about = None)]
pub struct CliArgs {
    // ===== Connection Options =====
    /// Comma-separated failover hosts: host[:port][,host2[:port2]...]
    #[arg(short = 'H', long = "hosts", default_value = "127.0.0.1:6379")]
    pub hosts: String,

    /// Password for AUTH command
    #[arg(short = 'a', long = "password")]
    pub password: Option<String>,

    /// Database number to SELECT (single-instance servers only)
    #[arg(long = "db")]
    pub db: Option<u32>,

    /// Connection timeout in milliseconds (0 = unbounded)
    #[arg(long = "connect-timeout", default_value_t = DEFAULT_TIMEOUT_MS)]
    pub connect_timeout_ms: u64,

    /// Query timeout in milliseconds (0 = unbounded)
    #[arg(long = "query-timeout", default_value_t = DEFAULT_TIMEOUT_MS)]
    pub query_timeout_ms: u64,

    /// Send attempts per node before failing over
    #[arg(long = "attempts", default_value_t = DEFAULT_QUERY_ATTEMPTS)]
    pub attempts: u32,

    /// Exit if the first host cannot be reached at startup
    #[arg(long = "fail-hard")]
    pub fail_hard: bool,

    // ===== TLS Options =====
    /// Enable TLS connection
    #[arg(long = "tls")]
    pub tls: bool,

    /// Name of the TLS domain used by the hosts
    #[arg(long = "tls-domain")]
    pub tls_domain: Option<String>,

    /// Skip TLS certificate verification (insecure)
    #[arg(long = "tls-skip-verify")]
    pub tls_skip_verify: bool,

    /// CA certificate file for TLS
    #[arg(long = "tls-ca-cert")]
    pub tls_ca_cert: Option<PathBuf>,

    /// Client certificate file for TLS
    #[arg(long = "tls-cert")]
    pub tls_cert: Option<PathBuf>,

    /// Client private key file for TLS
    #[arg(long = "tls-key")]
    pub tls_key: Option<PathBuf>,

    /// Server Name Indication for TLS
    #[arg(long = "tls-sni")]
    pub tls_sni: Option<String>,

    // ===== Output =====
    /// Print results as JSON
    #[arg(long = "json")]
    pub json: bool,

    /// Quiet mode (errors only)
    #[arg(short = 'q', long = "quiet")]
    pub quiet: bool,

    /// Verbose output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: CacheCommand,
}

/// Cache verb to run
#[derive(Subcommand, Debug, Clone)]
pub enum CacheCommand {
    /// Fetch a value
    Get { key: String },

    /// Store a value
    Set {
        key: String,
        value: String,
        /// Expire after this many seconds
        #[arg(long = "ttl", default_value_t = 0)]
        ttl: u32,
    },

    /// Delete a key
    Del { key: String },

    /// Increment a counter
    Incr {
        key: String,
        #[arg(default_value_t = 1, allow_hyphen_values = true)]
        delta: i32,
        #[arg(long = "ttl", default_value_t = 0)]
        ttl: u32,
    },

    /// Decrement a counter
    Decr {
        key: String,
        #[arg(default_value_t = 1, allow_hyphen_values = true)]
        delta: i32,
        #[arg(long = "ttl", default_value_t = 0)]
        ttl: u32,
    },

    /// Read a counter
    GetCounter { key: String },

    /// Run a raw command; the key must be its second word
    Raw {
        #[arg(trailing_var_arg = true, allow_hyphen_values = true, required = true)]
        query: Vec<String>,
        /// Fields per returned row
        #[arg(long = "width", default_value_t = 1)]
        width: usize,
    },
}

impl CliArgs {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_set_with_ttl() {
        let args = CliArgs::try_parse_from([
            "valkey-cachedb",
            "--hosts",
            "a:7000,b",
            "set",
            "k",
            "v",
            "--ttl",
            "30",
        ])
        .unwrap();
        assert_eq!(args.hosts, "a:7000,b");
        match args.command {
            CacheCommand::Set { key, value, ttl } => {
                assert_eq!((key.as_str(), value.as_str(), ttl), ("k", "v", 30));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_raw_query() {
        let args =
            CliArgs::try_parse_from(["valkey-cachedb", "raw", "HGETALL", "user:1"]).unwrap();
        match args.command {
            CacheCommand::Raw { query, width } => {
                assert_eq!(query, vec!["HGETALL", "user:1"]);
                assert_eq!(width, 1);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_defaults() {
        let args = CliArgs::try_parse_from(["valkey-cachedb", "get", "k"]).unwrap();
        assert_eq!(args.connect_timeout_ms, DEFAULT_TIMEOUT_MS);
        assert_eq!(args.attempts, DEFAULT_QUERY_ATTEMPTS);
        assert!(!args.tls);
    }
}

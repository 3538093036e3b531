//! Client configuration derived from CLI arguments

use std::fmt;
use std::time::Duration;

use super::cli::CliArgs;
use super::tls_config::{TlsConfig, TlsDomain, TlsDomains, TLS_DOMAIN_PARAM};
use crate::utils::{ClientError, Result};

/// Port used when a host entry has none
pub const DEFAULT_PORT: u16 = 6379;

/// Default connect and query timeout in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

/// Default number of send attempts per node
pub const DEFAULT_QUERY_ATTEMPTS: u32 = 2;

/// Resolved server address
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerAddress {
    pub host: String,
    pub port: u16,
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

impl ServerAddress {
    /// Parse `host[:port]`
    pub fn parse(s: &str) -> Result<Self> {
        let s = s.trim();
        let (host, port) = match s.split_once(':') {
            None => (s, DEFAULT_PORT),
            Some((host, port)) => {
                if port.is_empty() {
                    return Err(ClientError::Config(format!(
                        "bad/missing port in host entry {:?}",
                        s
                    )));
                }
                let port = port.parse().map_err(|_| {
                    ClientError::Config(format!("failed to parse port in host entry {:?}", s))
                })?;
                (host, port)
            }
        };

        if host.is_empty() {
            return Err(ClientError::Config(format!(
                "missing host in host entry {:?}",
                s
            )));
        }

        Ok(Self {
            host: host.to_string(),
            port,
        })
    }

    /// Parse a comma-separated list: `host[:port][,host2[:port2]...]`
    pub fn parse_list(list: &str) -> Result<Vec<Self>> {
        let addresses = list
            .split(',')
            .map(Self::parse)
            .collect::<Result<Vec<_>>>()?;
        if addresses.is_empty() {
            return Err(ClientError::Config("empty host list".to_string()));
        }
        Ok(addresses)
    }
}

/// Identity of one logical cache: its hosts and the credentials shared by all of them
#[derive(Debug, Clone)]
pub struct CacheDbId {
    pub addresses: Vec<ServerAddress>,
    pub password: Option<String>,
    /// Database index, only used against single-instance servers
    pub database: Option<u32>,
    /// Extra URL options, e.g. `tls_domain=<name>`
    pub extra_options: Option<String>,
}

impl CacheDbId {
    pub fn new(addresses: Vec<ServerAddress>) -> Self {
        Self {
            addresses,
            password: None,
            database: None,
            extra_options: None,
        }
    }

    pub fn parse(hosts: &str) -> Result<Self> {
        Ok(Self::new(ServerAddress::parse_list(hosts)?))
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    pub fn with_database(mut self, database: u32) -> Self {
        self.database = Some(database);
        self
    }

    pub fn with_extra_options(mut self, options: impl Into<String>) -> Self {
        self.extra_options = Some(options.into());
        self
    }

    pub fn from_cli(args: &CliArgs) -> Result<Self> {
        let mut id = Self::parse(&args.hosts)?;
        id.password = args.password.clone();
        id.database = args.db;
        if args.tls {
            id.extra_options = Some(format!("{}{}", TLS_DOMAIN_PARAM, cli_tls_domain(args)));
        }
        Ok(id)
    }
}

/// Settings shared by every endpoint of a client; read-only once built
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Zero means no bound (a warning is logged once)
    pub connect_timeout: Duration,
    /// Zero means no socket timeout
    pub query_timeout: Duration,
    pub use_tls: bool,
    /// Send attempts per node before giving up on an endpoint
    pub query_attempts: u32,
    /// Abort construction if the first host cannot be reached
    pub fail_hard: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            query_timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            use_tls: false,
            query_attempts: DEFAULT_QUERY_ATTEMPTS,
            fail_hard: false,
        }
    }
}

impl ClientConfig {
    pub fn from_cli(args: &CliArgs) -> Self {
        Self {
            connect_timeout: Duration::from_millis(args.connect_timeout_ms),
            query_timeout: Duration::from_millis(args.query_timeout_ms),
            use_tls: args.tls,
            query_attempts: args.attempts.max(1),
            fail_hard: args.fail_hard,
        }
    }

    /// Attempts per node, never less than one
    pub fn attempts(&self) -> u32 {
        self.query_attempts.max(1)
    }
}

/// Domain name used when `--tls` is given without `--tls-domain`
const DEFAULT_TLS_DOMAIN: &str = "default";

fn cli_tls_domain(args: &CliArgs) -> &str {
    args.tls_domain.as_deref().unwrap_or(DEFAULT_TLS_DOMAIN)
}

/// Build the TLS domain registry from CLI arguments
pub fn tls_domains_from_cli(args: &CliArgs) -> Result<TlsDomains> {
    let mut domains = TlsDomains::new();
    if !args.tls {
        return Ok(domains);
    }

    let name = cli_tls_domain(args).to_string();
    let config = TlsConfig {
        skip_verify: args.tls_skip_verify,
        ca_cert: args.tls_ca_cert.clone(),
        client_cert: args.tls_cert.clone(),
        client_key: args.tls_key.clone(),
        sni: args.tls_sni.clone(),
    };
    domains.insert(TlsDomain::new(name, config)?);
    Ok(domains)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_host_with_and_without_port() {
        assert_eq!(
            ServerAddress::parse("cache1").unwrap(),
            ServerAddress {
                host: "cache1".to_string(),
                port: DEFAULT_PORT
            }
        );
        assert_eq!(
            ServerAddress::parse(" 10.0.0.1:7000 ").unwrap(),
            ServerAddress {
                host: "10.0.0.1".to_string(),
                port: 7000
            }
        );
    }

    #[test]
    fn test_parse_host_errors() {
        assert!(matches!(
            ServerAddress::parse("cache1:"),
            Err(ClientError::Config(_))
        ));
        assert!(matches!(
            ServerAddress::parse("cache1:abc"),
            Err(ClientError::Config(_))
        ));
        assert!(matches!(
            ServerAddress::parse(":6379"),
            Err(ClientError::Config(_))
        ));
        assert!(matches!(
            ServerAddress::parse("cache1:70000"),
            Err(ClientError::Config(_))
        ));
    }

    #[test]
    fn test_parse_host_list_keeps_order() {
        let id = CacheDbId::parse("a:1,b,c:3").unwrap();
        let rendered: Vec<String> = id.addresses.iter().map(|a| a.to_string()).collect();
        assert_eq!(rendered, vec!["a:1", "b:6379", "c:3"]);

        assert!(CacheDbId::parse("a,,b").is_err());
    }

    #[test]
    fn test_attempts_never_zero() {
        let config = ClientConfig {
            query_attempts: 0,
            ..ClientConfig::default()
        };
        assert_eq!(config.attempts(), 1);
        assert_eq!(ClientConfig::default().attempts(), 2);
    }

    #[test]
    fn test_tls_flag_points_hosts_at_domain() {
        use clap::Parser;

        let args = CliArgs::try_parse_from([
            "valkey-cachedb",
            "--hosts",
            "a,b",
            "--tls",
            "--tls-skip-verify",
            "get",
            "k",
        ])
        .unwrap();
        let id = CacheDbId::from_cli(&args).unwrap();
        assert_eq!(id.extra_options.as_deref(), Some("tls_domain=default"));
        let domains = tls_domains_from_cli(&args).unwrap();
        assert!(domains.find_client_domain("default").is_some());

        let plain = CliArgs::try_parse_from(["valkey-cachedb", "get", "k"]).unwrap();
        assert!(CacheDbId::from_cli(&plain).unwrap().extra_options.is_none());
    }
}

//! TLS configuration and client TLS domains
//!
//! A TLS domain is a named, pre-built client TLS context. Endpoints refer to
//! one through their extra options (`tls_domain=<name>`); nodes keep the
//! shared handle for as long as their connection is healthy.

use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::utils::ConnectionError;

/// Extra-options prefix naming the TLS domain of an endpoint
pub const TLS_DOMAIN_PARAM: &str = "tls_domain=";

/// TLS configuration
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    pub skip_verify: bool,
    pub ca_cert: Option<PathBuf>,
    pub client_cert: Option<PathBuf>,
    pub client_key: Option<PathBuf>,
    pub sni: Option<String>,
}

/// A named client TLS context
pub struct TlsDomain {
    name: String,
    config: TlsConfig,
    #[cfg(feature = "native-tls-backend")]
    connector: native_tls::TlsConnector,
}

impl fmt::Debug for TlsDomain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TlsDomain")
            .field("name", &self.name)
            .field("config", &self.config)
            .finish()
    }
}

impl TlsDomain {
    /// Build the TLS context for a domain
    #[cfg(feature = "native-tls-backend")]
    pub fn new(name: impl Into<String>, config: TlsConfig) -> Result<Self, ConnectionError> {
        use native_tls::{Certificate, Identity, TlsConnector};

        let mut builder = TlsConnector::builder();

        if config.skip_verify {
            builder.danger_accept_invalid_certs(true);
            builder.danger_accept_invalid_hostnames(true);
        }

        if let Some(ref ca_path) = config.ca_cert {
            let ca_data = std::fs::read(ca_path).map_err(|e| {
                ConnectionError::TlsFailed(format!("Failed to read CA cert: {}", e))
            })?;
            let cert = Certificate::from_pem(&ca_data)
                .map_err(|e| ConnectionError::TlsFailed(format!("Invalid CA cert: {}", e)))?;
            builder.add_root_certificate(cert);
        }

        if let (Some(cert_path), Some(key_path)) = (&config.client_cert, &config.client_key) {
            let cert_data = std::fs::read(cert_path).map_err(|e| {
                ConnectionError::TlsFailed(format!("Failed to read client cert: {}", e))
            })?;
            let key_data = std::fs::read(key_path).map_err(|e| {
                ConnectionError::TlsFailed(format!("Failed to read client key: {}", e))
            })?;
            let identity = Identity::from_pkcs8(&cert_data, &key_data).map_err(|e| {
                ConnectionError::TlsFailed(format!("Invalid client identity: {}", e))
            })?;
            builder.identity(identity);
        }

        let connector = builder.build().map_err(|e| {
            ConnectionError::TlsFailed(format!("Failed to build TLS connector: {}", e))
        })?;

        Ok(Self {
            name: name.into(),
            config,
            connector,
        })
    }

    #[cfg(not(feature = "native-tls-backend"))]
    pub fn new(name: impl Into<String>, config: TlsConfig) -> Result<Self, ConnectionError> {
        Ok(Self {
            name: name.into(),
            config,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Server name to present, defaulting to the host being dialed
    pub fn server_name<'a>(&'a self, host: &'a str) -> &'a str {
        self.config.sni.as_deref().unwrap_or(host)
    }

    #[cfg(feature = "native-tls-backend")]
    pub fn connector(&self) -> &native_tls::TlsConnector {
        &self.connector
    }
}

/// Registry of client TLS domains, looked up by name
#[derive(Debug, Default, Clone)]
pub struct TlsDomains {
    domains: HashMap<String, Arc<TlsDomain>>,
}

impl TlsDomains {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, domain: TlsDomain) {
        self.domains
            .insert(domain.name().to_string(), Arc::new(domain));
    }

    pub fn find_client_domain(&self, name: &str) -> Option<Arc<TlsDomain>> {
        self.domains.get(name).cloned()
    }

    /// Resolve an endpoint's extra options (`tls_domain=<name>`) to a domain
    pub fn resolve(&self, extra_options: &str) -> Result<Arc<TlsDomain>, ConnectionError> {
        let name = extra_options.strip_prefix(TLS_DOMAIN_PARAM).ok_or_else(|| {
            ConnectionError::TlsFailed(format!("Invalid URL parameter: {}", extra_options))
        })?;
        if name.is_empty() {
            return Err(ConnectionError::TlsFailed(
                "Empty TLS domain name in URL".to_string(),
            ));
        }
        self.find_client_domain(name)
            .ok_or_else(|| ConnectionError::TlsFailed(format!("TLS domain {} not found", name)))
    }
}

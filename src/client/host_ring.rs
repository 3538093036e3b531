//! Host failover ring
//!
//! The configured hosts form a circle with one "current" entry, the last
//! host known to work. Commands start at the current host and walk the
//! circle at most once. Each host keeps its own topology and node
//! connections, created lazily.

use std::sync::Arc;

use tracing::{debug, warn};

use super::control_plane::{Connector, Handshake};
use crate::cluster::{ClusterNode, ClusterTopology, TopologyMode};
use crate::config::{CacheDbId, ClientConfig, ServerAddress, TlsDomain, TlsDomains};
use crate::utils::{ClientError, ClusterError, ConnectionError, Result};

/// Everything an endpoint needs to open connections; shared by all endpoints
pub struct EndpointContext {
    pub config: ClientConfig,
    pub id: CacheDbId,
    pub tls_domains: TlsDomains,
    pub connector: Box<dyn Connector + Send>,
}

impl EndpointContext {
    /// TLS domain for a connection, reusing `cached` when already resolved
    fn tls_for(
        &self,
        cached: &mut Option<Arc<TlsDomain>>,
    ) -> std::result::Result<Option<Arc<TlsDomain>>, ConnectionError> {
        if !self.config.use_tls {
            return Ok(None);
        }
        let Some(ref options) = self.id.extra_options else {
            return Ok(None);
        };
        if let Some(ref domain) = cached {
            return Ok(Some(Arc::clone(domain)));
        }
        let domain = self.tls_domains.resolve(options)?;
        *cached = Some(Arc::clone(&domain));
        Ok(Some(domain))
    }
}

/// One configured logical server and its discovered topology
#[derive(Debug)]
pub struct HostEndpoint {
    pub address: ServerAddress,
    topology: Option<ClusterTopology>,
}

impl HostEndpoint {
    pub fn new(address: ServerAddress) -> Self {
        Self {
            address,
            topology: None,
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.topology.is_some()
    }

    pub fn topology(&self) -> Option<&ClusterTopology> {
        self.topology.as_ref()
    }

    /// Connect to the configured host and discover its topology
    ///
    /// The bootstrap connection authenticates but never SELECTs, and is
    /// closed once the topology is known.
    pub fn init_topology(&mut self, ctx: &EndpointContext) -> Result<()> {
        let ServerAddress { ref host, port } = self.address;

        let mut tls = None;
        let handshake = Handshake {
            password: ctx.id.password.clone(),
            database: None,
            tls: ctx.tls_for(&mut tls)?,
        };
        let mut bootstrap = ctx.connector.connect(host, port, &handshake)?;
        let topology = ClusterTopology::discover(&mut *bootstrap, host, port)?;
        drop(bootstrap);

        debug!(
            "{} initialized in {:?} mode with {} node(s)",
            self.address,
            topology.mode(),
            topology.nodes().len()
        );
        self.topology = Some(topology);
        Ok(())
    }

    fn topology_mut(&mut self) -> std::result::Result<&mut ClusterTopology, ClusterError> {
        let address = &self.address;
        self.topology.as_mut().ok_or_else(|| {
            ClusterError::ParseFailed(format!("topology of {} not discovered", address))
        })
    }

    /// Index of the node serving `key`
    pub fn route(&mut self, key: &[u8]) -> Result<usize> {
        Ok(self.topology_mut()?.route(key)?)
    }

    pub fn node_mut(&mut self, idx: usize) -> Result<&mut ClusterNode> {
        Ok(self.topology_mut()?.node_mut(idx))
    }

    /// (Re)open the connection of node `idx`, dropping any previous one
    pub fn connect_node(&mut self, idx: usize, ctx: &EndpointContext) -> Result<()> {
        let topology = self.topology_mut()?;
        let database = match topology.mode() {
            TopologyMode::SingleInstance => ctx.id.database,
            TopologyMode::Cluster => None,
        };
        let node = topology.node_mut(idx);
        node.disconnect();

        debug!("connecting node {}", node.address());
        let result = ctx.tls_for(&mut node.tls_domain).and_then(|tls| {
            let handshake = Handshake {
                password: ctx.id.password.clone(),
                database,
                tls,
            };
            ctx.connector.connect(&node.host, node.port, &handshake)
        });

        match result {
            Ok(conn) => {
                node.connection = Some(conn);
                Ok(())
            }
            Err(e) => {
                warn!("failed to connect node {}: {}", node.address(), e);
                node.tls_domain = None;
                Err(ClientError::Connection(e))
            }
        }
    }

    /// Close all node connections, keeping the topology
    pub fn disconnect(&mut self) {
        if let Some(ref mut topology) = self.topology {
            topology.disconnect_all();
        }
    }
}

/// Circular sequence of endpoints with a current-index cursor
#[derive(Debug)]
pub struct HostRing {
    endpoints: Vec<HostEndpoint>,
    current: usize,
    /// Advances since the last `mark`
    advances: usize,
}

impl HostRing {
    pub fn new(addresses: Vec<ServerAddress>) -> Result<Self> {
        if addresses.is_empty() {
            return Err(ClientError::Config("no hosts configured".to_string()));
        }
        Ok(Self {
            endpoints: addresses.into_iter().map(HostEndpoint::new).collect(),
            current: 0,
            advances: 0,
        })
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn current_index(&self) -> usize {
        self.current
    }

    pub fn current(&self) -> &HostEndpoint {
        &self.endpoints[self.current]
    }

    pub fn current_mut(&mut self) -> &mut HostEndpoint {
        &mut self.endpoints[self.current]
    }

    pub fn endpoints_mut(&mut self) -> &mut [HostEndpoint] {
        &mut self.endpoints
    }

    /// Record the current position as the start of a walk
    pub fn mark(&mut self) -> usize {
        self.advances = 0;
        self.current
    }

    /// Move to the next endpoint, wrapping around
    pub fn advance(&mut self) {
        self.current = (self.current + 1) % self.endpoints.len();
        self.advances += 1;
    }

    /// True once the cursor is back at `start` after at least one advance since `mark`
    pub fn full_circle_from(&self, start: usize) -> bool {
        self.advances > 0 && self.current == start
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::control_plane::mock::{FakeServer, MockConnector};
    use crate::config::TlsConfig;
    use crate::utils::RespValue;

    fn addrs(list: &str) -> Vec<ServerAddress> {
        ServerAddress::parse_list(list).unwrap()
    }

    fn ctx(connector: MockConnector, id: CacheDbId) -> EndpointContext {
        EndpointContext {
            config: ClientConfig::default(),
            id,
            tls_domains: TlsDomains::new(),
            connector: Box::new(connector),
        }
    }

    fn not_cluster() -> RespValue {
        RespValue::Error("ERR This instance has cluster support disabled".to_string())
    }

    #[test]
    fn test_ring_walks_once_around() {
        let mut ring = HostRing::new(addrs("a,b,c")).unwrap();
        ring.advance();
        let start = ring.mark();
        assert_eq!(start, 1);
        assert!(!ring.full_circle_from(start));

        let mut visited = vec![ring.current().address.host.clone()];
        loop {
            ring.advance();
            if ring.full_circle_from(start) {
                break;
            }
            visited.push(ring.current().address.host.clone());
        }
        assert_eq!(visited, vec!["b", "c", "a"]);
        assert_eq!(ring.current_index(), 1);
    }

    #[test]
    fn test_single_host_ring_wraps_immediately() {
        let mut ring = HostRing::new(addrs("solo")).unwrap();
        let start = ring.mark();
        ring.advance();
        assert!(ring.full_circle_from(start));
    }

    #[test]
    fn test_empty_ring_rejected() {
        assert!(matches!(HostRing::new(Vec::new()), Err(ClientError::Config(_))));
    }

    #[test]
    fn test_init_topology_auths_without_select() {
        let connector = MockConnector::default();
        let server = connector.add(
            "cache:6379",
            FakeServer::replying([RespValue::SimpleString("OK".to_string()), not_cluster()]),
        );
        let id = CacheDbId::parse("cache")
            .unwrap()
            .with_password("pw")
            .with_database(4);
        let ctx = ctx(connector, id);

        let mut endpoint = HostEndpoint::new(ctx.id.addresses[0].clone());
        endpoint.init_topology(&ctx).unwrap();
        assert_eq!(
            endpoint.topology().unwrap().mode(),
            TopologyMode::SingleInstance
        );
        assert_eq!(server.lock().unwrap().log, vec!["AUTH pw", "CLUSTER NODES"]);
    }

    #[test]
    fn test_single_instance_node_selects_database() {
        let connector = MockConnector::default();
        let server = connector.add(
            "cache:6379",
            FakeServer::replying([not_cluster(), RespValue::SimpleString("OK".to_string())]),
        );
        let ctx = ctx(connector, CacheDbId::parse("cache").unwrap().with_database(4));

        let mut endpoint = HostEndpoint::new(ctx.id.addresses[0].clone());
        endpoint.init_topology(&ctx).unwrap();
        let idx = endpoint.route(b"anything").unwrap();
        endpoint.connect_node(idx, &ctx).unwrap();

        assert!(endpoint.node_mut(idx).unwrap().is_connected());
        assert_eq!(
            server.lock().unwrap().log,
            vec!["CLUSTER NODES", "SELECT 4"]
        );
    }

    #[test]
    fn test_cluster_nodes_never_select() {
        let connector = MockConnector::default();
        connector.add(
            "seed:7000",
            FakeServer::replying([RespValue::BulkString(
                b"n1 10.0.0.1:7000 master - 0 0 1 connected 0-16383\n".to_vec(),
            )]),
        );
        let node = connector.add("10.0.0.1:7000", FakeServer::default());
        let ctx = ctx(connector, CacheDbId::parse("seed:7000").unwrap().with_database(4));

        let mut endpoint = HostEndpoint::new(ctx.id.addresses[0].clone());
        endpoint.init_topology(&ctx).unwrap();
        endpoint.connect_node(0, &ctx).unwrap();
        assert!(node.lock().unwrap().log.is_empty());
        assert_eq!(node.lock().unwrap().connects, 1);
    }

    #[test]
    fn test_route_before_discovery_fails() {
        let mut endpoint = HostEndpoint::new(addrs("a").remove(0));
        assert!(matches!(endpoint.route(b"k"), Err(ClientError::Cluster(_))));
    }

    #[test]
    fn test_failed_node_connect_releases_tls_domain() {
        let connector = MockConnector::default();
        let server = connector.add("cache:6379", FakeServer::replying([not_cluster()]));
        let mut ctx = ctx(
            connector,
            CacheDbId::parse("cache")
                .unwrap()
                .with_extra_options("tls_domain=cache"),
        );
        ctx.config.use_tls = true;
        ctx.tls_domains
            .insert(TlsDomain::new("cache", TlsConfig::default()).unwrap());

        let mut endpoint = HostEndpoint::new(ctx.id.addresses[0].clone());
        endpoint.init_topology(&ctx).unwrap();
        endpoint.connect_node(0, &ctx).unwrap();
        {
            let node = endpoint.node_mut(0).unwrap();
            assert!(node.is_connected());
            assert_eq!(node.tls_domain.as_ref().unwrap().name(), "cache");
        }

        server.lock().unwrap().refuse_connects = 1;
        assert!(matches!(
            endpoint.connect_node(0, &ctx),
            Err(ClientError::Connection(ConnectionError::ConnectFailed { .. }))
        ));
        let node = endpoint.node_mut(0).unwrap();
        assert!(!node.is_connected());
        assert!(node.tls_domain.is_none());

        // The domain is looked up again on the next successful connect
        endpoint.connect_node(0, &ctx).unwrap();
        assert!(endpoint.node_mut(0).unwrap().tls_domain.is_some());
    }

    #[test]
    fn test_unknown_tls_domain_fails_connect() {
        let connector = MockConnector::default();
        connector.add("cache:6379", FakeServer::replying([not_cluster()]));
        let mut ctx = ctx(
            connector,
            CacheDbId::parse("cache")
                .unwrap()
                .with_extra_options("tls_domain=missing"),
        );
        ctx.config.use_tls = true;
        ctx.tls_domains
            .insert(TlsDomain::new("present", TlsConfig::default()).unwrap());

        let mut endpoint = HostEndpoint::new(ctx.id.addresses[0].clone());
        assert!(matches!(
            endpoint.init_topology(&ctx),
            Err(ClientError::Connection(ConnectionError::TlsFailed(_)))
        ));
        assert!(!endpoint.is_initialized());
    }
}

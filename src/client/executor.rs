//! Command execution with retry, reconnect and host failover
//!
//! A command runs against the current endpoint of the ring. Transport
//! failures reconnect the serving node and retry up to the configured
//! attempt count; an error-typed reply or a routing/discovery failure
//! gives up on the endpoint at once. Giving up moves the ring to the next
//! host, and a command stops after visiting every host once.

use tracing::{debug, error, info, warn};

use super::control_plane::Connector;
use super::host_ring::{EndpointContext, HostRing};
use crate::config::{CacheDbId, ClientConfig, TlsDomains};
use crate::utils::{ClientError, Command, ConnectionError, ProtocolError, RespValue, Result};

pub struct CommandExecutor {
    ring: HostRing,
    ctx: EndpointContext,
}

impl CommandExecutor {
    /// Build the ring and bring up the first host
    ///
    /// With `fail_hard` a first host that cannot be reached fails
    /// construction; otherwise it is retried on first use.
    pub fn new(
        id: CacheDbId,
        config: ClientConfig,
        tls_domains: TlsDomains,
        connector: Box<dyn Connector + Send>,
    ) -> Result<Self> {
        let mut ring = HostRing::new(id.addresses.clone())?;
        let ctx = EndpointContext {
            config,
            id,
            tls_domains,
            connector,
        };

        if let Err(e) = ring.current_mut().init_topology(&ctx) {
            if ctx.config.fail_hard {
                return Err(e);
            }
            warn!(
                "{} unavailable at startup, deferring to first query: {}",
                ring.current().address,
                e
            );
        }

        Ok(Self { ring, ctx })
    }

    pub fn ring(&self) -> &HostRing {
        &self.ring
    }

    /// Run `cmd`, routed by `key`, failing over across hosts
    pub fn execute(&mut self, key: &[u8], cmd: &Command) -> Result<RespValue> {
        let start = self.ring.mark();
        loop {
            let last = match self.execute_on_current(key, cmd) {
                Ok(reply) => return Ok(reply),
                Err(e) => e,
            };

            let failed = self.ring.current().address.clone();
            self.ring.advance();
            if self.ring.full_circle_from(start) {
                error!("{} failed on all {} host(s)", cmd.name(), self.ring.len());
                return Err(ClientError::NoReachableHost {
                    hosts: self.ring.len(),
                    last: Box::new(last),
                });
            }
            info!(
                "failing over from {} to {}",
                failed,
                self.ring.current().address
            );
        }
    }

    fn execute_on_current(&mut self, key: &[u8], cmd: &Command) -> Result<RespValue> {
        let ctx = &self.ctx;
        let endpoint = self.ring.current_mut();

        if !endpoint.is_initialized() {
            endpoint.init_topology(ctx)?;
        }
        let idx = endpoint.route(key)?;
        if !endpoint.node_mut(idx)?.is_connected() {
            endpoint.connect_node(idx, ctx)?;
        }

        let attempts = ctx.config.attempts();
        let mut failures = 0;
        loop {
            let node = endpoint.node_mut(idx)?;
            let address = node.address();
            let conn = node
                .connection
                .as_mut()
                .ok_or(ConnectionError::Closed)?;

            debug!("{} -> {}", cmd.name(), address);
            match conn.execute_command(cmd) {
                Ok(RespValue::Error(msg)) => {
                    // The connection is intact; retrying here would get the same answer
                    info!("{} rejected by {}: {}", cmd.name(), address, msg);
                    error!("giving up on query to {}", address);
                    return Err(ProtocolError::ServerError(msg).into());
                }
                Ok(reply) => {
                    if failures > 0 {
                        info!(
                            "successfully ran query on {} after {} failed attempt(s)",
                            address, failures
                        );
                    }
                    return Ok(reply);
                }
                Err(e) => {
                    failures += 1;
                    info!(
                        "{} to {} failed (attempt {}/{}): {}",
                        cmd.name(),
                        address,
                        failures,
                        attempts,
                        e
                    );
                    node.disconnect();
                    if failures >= attempts {
                        error!("giving up on query to {}", address);
                        return Err(e.into());
                    }
                    endpoint.connect_node(idx, ctx)?;
                }
            }
        }
    }

    /// Close every node connection on every host
    pub fn close(&mut self) {
        for endpoint in self.ring.endpoints_mut() {
            endpoint.disconnect();
        }
    }
}

impl Drop for CommandExecutor {
    fn drop(&mut self) {
        self.close();
    }
}

//! Client layer: wire connections, failover and the public cache verbs

pub mod cache_client;
pub mod control_plane;
pub mod executor;
pub mod host_ring;
pub mod raw_connection;
pub mod reply_decoder;

pub use cache_client::{split_query, CacheClient, Removal};
pub use control_plane::{BoxedConnection, Connector, ControlPlane, ControlPlaneExt, Handshake};
pub use executor::CommandExecutor;
pub use host_ring::{EndpointContext, HostEndpoint, HostRing};
pub use raw_connection::{ConnectionFactory, RawConnection};
pub use reply_decoder::{decode, Field, Row};

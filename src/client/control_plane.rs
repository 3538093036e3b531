//! Control Plane trait for server communication
//!
//! `ControlPlane` is the seam between the executor and a live socket: it
//! sends one command and reads back one reply. `Connector` opens such
//! connections, running the connect/TLS/AUTH/SELECT handshake.
//!
//! Both are traits so the routing and failover logic can run against
//! in-memory fakes.

use std::io;
use std::sync::Arc;

use tracing::debug;

use crate::config::TlsDomain;
use crate::utils::{ClientError, Command, ConnectionError, ProtocolError, RespValue};

/// A connected server that executes one command at a time
pub trait ControlPlane {
    /// Send a command and read its reply
    ///
    /// `Ok` carries whatever the server answered, including error-typed
    /// replies; `Err` means the connection itself is no longer usable.
    fn execute_command(&mut self, cmd: &Command) -> io::Result<RespValue>;
}

/// Owned connection handle stored inside a cluster node
pub type BoxedConnection = Box<dyn ControlPlane + Send>;

/// Handshake performed right after the socket is up
#[derive(Debug, Clone, Default)]
pub struct Handshake {
    pub password: Option<String>,
    /// SELECT target; only set for single-instance nodes
    pub database: Option<u32>,
    /// TLS context to negotiate before anything else
    pub tls: Option<Arc<TlsDomain>>,
}

/// Opens connections to server endpoints
pub trait Connector {
    fn connect(
        &self,
        host: &str,
        port: u16,
        handshake: &Handshake,
    ) -> Result<BoxedConnection, ConnectionError>;
}

/// Extension trait with the handshake and discovery commands
pub trait ControlPlaneExt: ControlPlane {
    /// Send AUTH; a rejected password is fatal for this connection
    ///
    /// A socket failure while waiting for the reply is `ConnectionError::Io`,
    /// kept apart from a rejection so it can be retried.
    fn authenticate(&mut self, password: &str) -> Result<(), ConnectionError> {
        let response = self
            .execute_command(&Command::new("AUTH").arg(password))
            .map_err(ConnectionError::Io)?;

        match response {
            RespValue::SimpleString(s) => {
                debug!("AUTH [password] - {}", s);
                Ok(())
            }
            RespValue::Error(e) => Err(ConnectionError::AuthFailed(e)),
            other => Err(ConnectionError::AuthFailed(format!(
                "Unexpected response: {:?}",
                other
            ))),
        }
    }

    /// Send SELECT
    fn select_db(&mut self, db: u32) -> Result<(), ConnectionError> {
        let response = self
            .execute_command(&Command::new("SELECT").int(i64::from(db)))
            .map_err(ConnectionError::Io)?;

        match response {
            RespValue::SimpleString(s) => {
                debug!("SELECT [{}] - {}", db, s);
                Ok(())
            }
            RespValue::Error(e) => Err(ConnectionError::SelectFailed { db, reason: e }),
            other => Err(ConnectionError::SelectFailed {
                db,
                reason: format!("Unexpected response: {:?}", other),
            }),
        }
    }

    /// Fetch the CLUSTER NODES report
    ///
    /// Returns `Ok(None)` when the server rejects the command, which means
    /// it is not running in cluster mode.
    fn cluster_nodes(&mut self) -> Result<Option<String>, ClientError> {
        match self.execute_command(&Command::new("CLUSTER").arg("NODES"))? {
            RespValue::BulkString(data) => String::from_utf8(data).map(Some).map_err(|e| {
                ProtocolError::Parse(format!("CLUSTER NODES is not UTF-8: {}", e)).into()
            }),
            RespValue::Error(e) => {
                debug!("CLUSTER NODES rejected: {}", e);
                Ok(None)
            }
            other => Err(ProtocolError::UnexpectedResponse {
                expected: "bulk string".to_string(),
                actual: other.type_name().to_string(),
            }
            .into()),
        }
    }
}

impl<T: ControlPlane + ?Sized> ControlPlaneExt for T {}

#[cfg(test)]
pub(crate) mod mock {
    //! Scripted in-memory connections shared by the unit tests

    use super::*;
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex};

    /// One scripted reaction to a command
    #[derive(Debug, Clone)]
    pub enum Step {
        Reply(RespValue),
        Fail(io::ErrorKind),
    }

    /// Shared state of a fake server: scripted replies plus a command log
    #[derive(Debug, Default)]
    pub struct FakeServer {
        pub script: VecDeque<Step>,
        /// Reply used once the script is exhausted
        pub fallback: Option<RespValue>,
        pub log: Vec<String>,
        pub connects: usize,
        /// Refuse this many upcoming connects
        pub refuse_connects: usize,
    }

    impl FakeServer {
        pub fn replying(replies: impl IntoIterator<Item = RespValue>) -> Self {
            Self {
                script: replies.into_iter().map(Step::Reply).collect(),
                ..Self::default()
            }
        }
    }

    pub type Shared = Arc<Mutex<FakeServer>>;

    pub struct MockControlPlane {
        pub server: Shared,
    }

    impl ControlPlane for MockControlPlane {
        fn execute_command(&mut self, cmd: &Command) -> io::Result<RespValue> {
            let mut server = self.server.lock().unwrap();
            server.log.push(cmd.to_string());
            match server.script.pop_front() {
                Some(Step::Reply(v)) => Ok(v),
                Some(Step::Fail(kind)) => Err(io::Error::new(kind, "scripted failure")),
                None => server
                    .fallback
                    .clone()
                    .ok_or_else(|| io::Error::new(io::ErrorKind::Other, "No more responses")),
            }
        }
    }

    /// Connector over a set of fake servers keyed by `host:port`
    #[derive(Default, Clone)]
    pub struct MockConnector {
        pub servers: Arc<Mutex<HashMap<String, Shared>>>,
    }

    impl MockConnector {
        pub fn add(&self, addr: &str, server: FakeServer) -> Shared {
            let shared = Arc::new(Mutex::new(server));
            self.servers
                .lock()
                .unwrap()
                .insert(addr.to_string(), Arc::clone(&shared));
            shared
        }
    }

    impl Connector for MockConnector {
        fn connect(
            &self,
            host: &str,
            port: u16,
            handshake: &Handshake,
        ) -> Result<BoxedConnection, ConnectionError> {
            let addr = format!("{}:{}", host, port);
            let refused = || ConnectionError::ConnectFailed {
                host: host.to_string(),
                port,
                source: io::Error::new(io::ErrorKind::ConnectionRefused, "refused"),
            };
            let server = self
                .servers
                .lock()
                .unwrap()
                .get(&addr)
                .cloned()
                .ok_or_else(refused)?;
            {
                let mut state = server.lock().unwrap();
                if state.refuse_connects > 0 {
                    state.refuse_connects -= 1;
                    return Err(refused());
                }
                state.connects += 1;
            }

            let mut conn = MockControlPlane { server };
            if let Some(ref password) = handshake.password {
                conn.authenticate(password)?;
            }
            if let Some(db) = handshake.database {
                conn.select_db(db)?;
            }
            Ok(Box::new(conn))
        }
    }
}

//! Raw TCP/TLS connection to one server endpoint
//!
//! Connections are blocking. While the handshake runs (TLS, AUTH, SELECT)
//! socket timeouts equal the connect timeout, or the query timeout when no
//! connect timeout is set; afterwards they switch to the query timeout.

use std::io::{self, BufReader, BufWriter, Write};
use std::net::{SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tracing::{debug, warn};

use super::control_plane::{
    BoxedConnection, Connector, ControlPlane, ControlPlaneExt, Handshake,
};
use crate::config::{ClientConfig, TlsDomain};
use crate::utils::{Command, ConnectionError, RespDecoder, RespEncoder, RespValue};

static WARNED_NO_CONNECT_TIMEOUT: AtomicBool = AtomicBool::new(false);

/// Raw connection wrapper (TCP or TLS)
///
/// For TCP, the stream is split into separate reader/writer halves.
/// For TLS, a single buffered stream is used since native-tls streams cannot be cloned.
pub enum RawConnection {
    Tcp {
        writer: BufWriter<TcpStream>,
        reader: BufReader<TcpStream>,
    },
    #[cfg(feature = "native-tls-backend")]
    NativeTls {
        stream: BufReader<native_tls::TlsStream<TcpStream>>,
    },
}

impl RawConnection {
    /// Open a TCP socket; a zero timeout connects without a bound
    ///
    /// `handshake_timeout` bounds every read and write until the caller
    /// applies the query timeout; zero leaves the socket blocking.
    pub fn open(
        host: &str,
        port: u16,
        connect_timeout: Duration,
        handshake_timeout: Duration,
    ) -> Result<TcpStream, ConnectionError> {
        let connect_failed = |source: io::Error| ConnectionError::ConnectFailed {
            host: host.to_string(),
            port,
            source,
        };

        let addrs: Vec<SocketAddr> = (host, port)
            .to_socket_addrs()
            .map_err(connect_failed)?
            .collect();
        if addrs.is_empty() {
            return Err(connect_failed(io::Error::new(
                io::ErrorKind::NotFound,
                "No addresses found",
            )));
        }

        let connected = if connect_timeout.is_zero() {
            if !WARNED_NO_CONNECT_TIMEOUT.swap(true, Ordering::Relaxed) {
                warn!("Connecting without a timeout might block the caller indefinitely");
            }
            TcpStream::connect(&addrs[..])
        } else {
            connect_any(&addrs, connect_timeout)
        };
        let stream = connected.map_err(connect_failed)?;

        stream.set_nodelay(true).ok();

        if !handshake_timeout.is_zero() {
            stream
                .set_read_timeout(Some(handshake_timeout))
                .map_err(connect_failed)?;
            stream
                .set_write_timeout(Some(handshake_timeout))
                .map_err(connect_failed)?;
        }

        Ok(stream)
    }

    /// Wrap a plain TCP stream
    pub fn from_tcp(stream: TcpStream) -> io::Result<Self> {
        let writer = BufWriter::with_capacity(16 * 1024, stream.try_clone()?);
        let reader = BufReader::with_capacity(16 * 1024, stream);
        Ok(RawConnection::Tcp { writer, reader })
    }

    /// Negotiate TLS on a freshly connected stream
    #[cfg(feature = "native-tls-backend")]
    pub fn upgrade_tls(
        stream: TcpStream,
        host: &str,
        domain: &TlsDomain,
    ) -> Result<Self, ConnectionError> {
        let tls_stream = domain
            .connector()
            .connect(domain.server_name(host), stream)
            .map_err(tls_handshake_error)?;
        debug!("TLS enabled for connection to {} (domain {})", host, domain.name());
        Ok(RawConnection::NativeTls {
            stream: BufReader::with_capacity(16 * 1024, tls_stream),
        })
    }

    #[cfg(not(feature = "native-tls-backend"))]
    pub fn upgrade_tls(
        _stream: TcpStream,
        _host: &str,
        _domain: &TlsDomain,
    ) -> Result<Self, ConnectionError> {
        Err(ConnectionError::TlsFailed(
            "TLS support not compiled in".to_string(),
        ))
    }

    fn tcp(&self) -> &TcpStream {
        match self {
            RawConnection::Tcp { reader, .. } => reader.get_ref(),
            #[cfg(feature = "native-tls-backend")]
            RawConnection::NativeTls { stream } => stream.get_ref().get_ref(),
        }
    }

    /// Apply the query timeout to both directions; zero disables it
    pub fn set_query_timeout(&mut self, timeout: Duration) -> io::Result<()> {
        let timeout = (!timeout.is_zero()).then_some(timeout);
        let tcp = self.tcp();
        tcp.set_read_timeout(timeout)?;
        tcp.set_write_timeout(timeout)
    }

    /// Write encoded bytes and flush
    fn send(&mut self, buf: &[u8]) -> io::Result<()> {
        match self {
            RawConnection::Tcp { writer, .. } => {
                writer.write_all(buf)?;
                writer.flush()
            }
            #[cfg(feature = "native-tls-backend")]
            RawConnection::NativeTls { stream } => {
                let tls = stream.get_mut();
                tls.write_all(buf)?;
                tls.flush()
            }
        }
    }

    fn read_response(&mut self) -> io::Result<RespValue> {
        match self {
            RawConnection::Tcp { reader, .. } => RespDecoder::new(reader).decode(),
            #[cfg(feature = "native-tls-backend")]
            RawConnection::NativeTls { stream } => RespDecoder::new(stream).decode(),
        }
    }

    /// Send an encoded command and receive its reply
    pub fn execute_encoded(&mut self, encoder: &RespEncoder) -> io::Result<RespValue> {
        self.send(encoder.as_bytes())?;
        self.read_response()
    }
}

impl ControlPlane for RawConnection {
    fn execute_command(&mut self, cmd: &Command) -> io::Result<RespValue> {
        let mut encoder = RespEncoder::with_capacity(64);
        cmd.encode(&mut encoder);
        self.execute_encoded(&encoder)
    }
}

/// Socket failures during the TLS handshake stay I/O errors; only
/// negotiation failures (certificates, protocol) are `TlsFailed`
#[cfg(feature = "native-tls-backend")]
fn tls_handshake_error(err: native_tls::HandshakeError<TcpStream>) -> ConnectionError {
    use std::error::Error as _;

    let err = match err {
        // A blocking socket only stalls mid-handshake when its timeout fired
        native_tls::HandshakeError::WouldBlock(_) => {
            return ConnectionError::Io(io::Error::new(
                io::ErrorKind::TimedOut,
                "TLS handshake timed out",
            ))
        }
        native_tls::HandshakeError::Failure(e) => e,
    };

    let mut source = err.source();
    while let Some(cause) = source {
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            return ConnectionError::Io(io::Error::new(io_err.kind(), err.to_string()));
        }
        source = cause.source();
    }
    ConnectionError::TlsFailed(err.to_string())
}

/// Try each resolved address in turn with a bounded connect
fn connect_any(addrs: &[SocketAddr], timeout: Duration) -> io::Result<TcpStream> {
    let mut last_err = None;
    for addr in addrs {
        match TcpStream::connect_timeout(addr, timeout) {
            Ok(stream) => return Ok(stream),
            Err(e) => last_err = Some(e),
        }
    }
    Err(last_err
        .unwrap_or_else(|| io::Error::new(io::ErrorKind::NotFound, "No addresses found")))
}

/// Connection factory for creating connections with common config
#[derive(Debug, Clone)]
pub struct ConnectionFactory {
    pub connect_timeout: Duration,
    pub query_timeout: Duration,
}

impl ConnectionFactory {
    pub fn from_config(config: &ClientConfig) -> Self {
        Self {
            connect_timeout: config.connect_timeout,
            query_timeout: config.query_timeout,
        }
    }

    /// Handshake bound: the connect timeout, else the query timeout
    pub fn handshake_timeout(&self) -> Duration {
        if self.connect_timeout.is_zero() {
            self.query_timeout
        } else {
            self.connect_timeout
        }
    }

    /// Connect and run the handshake, returning the concrete connection
    pub fn create(
        &self,
        host: &str,
        port: u16,
        handshake: &Handshake,
    ) -> Result<RawConnection, ConnectionError> {
        let stream =
            RawConnection::open(host, port, self.connect_timeout, self.handshake_timeout())?;

        let mut conn = match handshake.tls {
            Some(ref domain) => RawConnection::upgrade_tls(stream, host, domain)?,
            None => RawConnection::from_tcp(stream).map_err(|e| {
                ConnectionError::ConnectFailed {
                    host: host.to_string(),
                    port,
                    source: e,
                }
            })?,
        };

        if let Some(ref password) = handshake.password {
            conn.authenticate(password)?;
        }

        if let Some(db) = handshake.database {
            conn.select_db(db)?;
        }

        conn.set_query_timeout(self.query_timeout)
            .map_err(|e| ConnectionError::ConnectFailed {
                host: host.to_string(),
                port,
                source: e,
            })?;

        Ok(conn)
    }
}

impl Connector for ConnectionFactory {
    fn connect(
        &self,
        host: &str,
        port: u16,
        handshake: &Handshake,
    ) -> Result<BoxedConnection, ConnectionError> {
        Ok(Box::new(self.create(host, port, handshake)?))
    }
}

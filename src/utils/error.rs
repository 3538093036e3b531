//! Error types for valkey-cachedb

use std::collections::TryReserveError;
use std::io;

use serde::Serialize;
use thiserror::Error;

/// Top-level client error
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Cluster error: {0}")]
    Cluster(#[from] ClusterError),

    #[error("Transport error: {0}")]
    Transport(#[from] io::Error),

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    #[error("Value is not a counter: {0:?}")]
    NotACounter(String),

    #[error("Malformed raw query: {0:?}")]
    MalformedQuery(String),

    #[error("No reachable host after trying {hosts} host(s), last error: {last}")]
    NoReachableHost { hosts: usize, last: Box<ClientError> },
}

/// Connection-related errors
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Failed to connect to {host}:{port}: {source}")]
    ConnectFailed {
        host: String,
        port: u16,
        source: io::Error,
    },

    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    #[error("Failed to select database {db}: {reason}")]
    SelectFailed { db: u32, reason: String },

    #[error("TLS handshake failed: {0}")]
    TlsFailed(String),

    /// Socket failure or timeout while the handshake was running
    #[error("I/O error during handshake: {0}")]
    Io(#[source] io::Error),

    #[error("Connection closed unexpectedly")]
    Closed,
}

/// RESP protocol errors
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Unexpected response: expected {expected}, got {actual}")]
    UnexpectedResponse { expected: String, actual: String },

    #[error("Parse error: {0}")]
    Parse(String),
}

/// Cluster-related errors
#[derive(Error, Debug)]
pub enum ClusterError {
    #[error("Failed to parse CLUSTER NODES response: {0}")]
    ParseFailed(String),

    #[error("Slot {0} is claimed by more than one node")]
    OverlappingSlot(u16),

    #[error("Bad cluster configuration: slot {0} has no assigned node")]
    UnassignedSlot(u16),
}

/// Reply decoding errors
#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Unsupported reply type: {0}")]
    UnsupportedType(&'static str),

    #[error("Out of memory while building rows: {0}")]
    Allocation(#[from] TryReserveError),
}

/// Closed set of outcomes reported to the cache layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Call succeeded and produced a value
    Value,
    /// Call succeeded without a value
    Done,
    /// Key absent
    NotFound,
    /// Worth retrying later (hosts unreachable, timeouts)
    TransientFailure,
    /// Retrying will not help
    PermanentFailure,
}

impl Outcome {
    /// Classify a verb result where `None` means not-found
    pub fn of<T>(result: &Result<Option<T>>) -> Self {
        match result {
            Ok(Some(_)) => Outcome::Value,
            Ok(None) => Outcome::NotFound,
            Err(e) => e.outcome(),
        }
    }
}

impl ClientError {
    /// Whether a later attempt could succeed without any change on the caller side
    pub fn is_transient(&self) -> bool {
        match self {
            ClientError::Connection(ConnectionError::ConnectFailed { .. })
            | ClientError::Connection(ConnectionError::Io(_))
            | ClientError::Connection(ConnectionError::Closed)
            | ClientError::Transport(_) => true,
            ClientError::NoReachableHost { last, .. } => last.is_transient(),
            _ => false,
        }
    }

    /// The error behind any `NoReachableHost` wrapping
    pub fn root_cause(&self) -> &ClientError {
        match self {
            ClientError::NoReachableHost { last, .. } => last.root_cause(),
            other => other,
        }
    }

    /// Map onto the outcome set
    pub fn outcome(&self) -> Outcome {
        if self.is_transient() {
            Outcome::TransientFailure
        } else {
            Outcome::PermanentFailure
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;

//! Public cache verbs on top of the command executor
//!
//! Each verb builds its command, routes it by key and extracts the typed
//! result. Absent keys are `Ok(None)` (or `Removal::AlreadyAbsent`), never
//! an error.

use tracing::debug;

use super::control_plane::Connector;
use super::executor::CommandExecutor;
use super::raw_connection::ConnectionFactory;
use super::reply_decoder::{self, Row};
use crate::config::{CacheDbId, ClientConfig, TlsDomains};
use crate::utils::{ClientError, Command, ProtocolError, RespValue, Result};

/// Result of a `remove`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Removal {
    Removed,
    AlreadyAbsent,
}

/// Key-value cache client over one or more failover hosts
pub struct CacheClient {
    executor: CommandExecutor,
}

impl CacheClient {
    /// Client over real sockets
    pub fn new(id: CacheDbId, config: ClientConfig, tls_domains: TlsDomains) -> Result<Self> {
        let factory = ConnectionFactory::from_config(&config);
        Self::with_connector(id, config, tls_domains, Box::new(factory))
    }

    pub fn with_connector(
        id: CacheDbId,
        config: ClientConfig,
        tls_domains: TlsDomains,
        connector: Box<dyn Connector + Send>,
    ) -> Result<Self> {
        Ok(Self {
            executor: CommandExecutor::new(id, config, tls_domains, connector)?,
        })
    }

    /// GET; an empty string is a present, empty value
    pub fn get(&mut self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        match self.executor.execute(key, &Command::new("GET").arg(key))? {
            RespValue::BulkString(value) => Ok(Some(value)),
            RespValue::Null => Ok(None),
            other => Err(unexpected("string", &other)),
        }
    }

    /// SET, then EXPIRE when `ttl` is non-zero
    pub fn set(&mut self, key: &[u8], value: &[u8], ttl: u32) -> Result<()> {
        match self
            .executor
            .execute(key, &Command::new("SET").arg(key).arg(value))?
        {
            RespValue::SimpleString(_) => {}
            other => return Err(unexpected("status", &other)),
        }
        self.expire(key, ttl)
    }

    /// DEL
    pub fn remove(&mut self, key: &[u8]) -> Result<Removal> {
        match self.executor.execute(key, &Command::new("DEL").arg(key))? {
            RespValue::Integer(0) => Ok(Removal::AlreadyAbsent),
            RespValue::Integer(_) => Ok(Removal::Removed),
            other => Err(unexpected("integer", &other)),
        }
    }

    /// INCRBY; returns the new counter value
    pub fn add(&mut self, key: &[u8], delta: i32, ttl: u32) -> Result<i64> {
        self.counter_op("INCRBY", key, delta, ttl)
    }

    /// DECRBY; returns the new counter value
    pub fn sub(&mut self, key: &[u8], delta: i32, ttl: u32) -> Result<i64> {
        self.counter_op("DECRBY", key, delta, ttl)
    }

    /// GET interpreted as a 32-bit counter; nil and empty values are absent
    pub fn get_counter(&mut self, key: &[u8]) -> Result<Option<i32>> {
        let Some(value) = self.get(key)? else {
            return Ok(None);
        };
        if value.is_empty() {
            return Ok(None);
        }
        parse_counter(&value).map(Some)
    }

    /// Run a command given as text, decoding the reply into rows
    ///
    /// The key used for routing is the second token of the command, which
    /// holds for single-key commands (`GET k`, `HGETALL k`, `LRANGE k 0 -1`).
    /// Multi-key commands are routed by their first key only.
    pub fn raw_query(&mut self, query: &str, row_width: usize) -> Result<Option<Vec<Row>>> {
        let tokens = split_query(query);
        if tokens.len() < 2 {
            return Err(ClientError::MalformedQuery(query.to_string()));
        }
        let Some(cmd) = Command::from_tokens(&tokens) else {
            return Err(ClientError::MalformedQuery(query.to_string()));
        };

        match self.executor.execute(tokens[1].as_bytes(), &cmd)? {
            RespValue::Null => Ok(None),
            RespValue::SimpleString(status) => {
                debug!("{} -> {}", cmd.name(), status);
                Ok(Some(Vec::new()))
            }
            reply => Ok(Some(reply_decoder::decode(reply, row_width)?)),
        }
    }

    /// Close every connection; the client reconnects lazily on next use
    pub fn close(&mut self) {
        self.executor.close();
    }

    fn counter_op(&mut self, verb: &str, key: &[u8], delta: i32, ttl: u32) -> Result<i64> {
        let cmd = Command::new(verb).arg(key).int(i64::from(delta));
        let value = match self.executor.execute(key, &cmd) {
            Ok(RespValue::Integer(n)) => n,
            Ok(other) => return Err(unexpected("integer", &other)),
            Err(e) => return Err(not_a_counter(e)),
        };
        self.expire(key, ttl)?;
        Ok(value)
    }

    fn expire(&mut self, key: &[u8], ttl: u32) -> Result<()> {
        if ttl == 0 {
            return Ok(());
        }
        let cmd = Command::new("EXPIRE").arg(key).int(i64::from(ttl));
        match self.executor.execute(key, &cmd)? {
            RespValue::Integer(_) => Ok(()),
            other => Err(unexpected("integer", &other)),
        }
    }
}

fn unexpected(expected: &str, actual: &RespValue) -> ClientError {
    ProtocolError::UnexpectedResponse {
        expected: expected.to_string(),
        actual: actual.type_name().to_string(),
    }
    .into()
}

/// Map the server's "not an integer" rejection onto `NotACounter`
fn not_a_counter(err: ClientError) -> ClientError {
    let rejected = match err.root_cause() {
        ClientError::Protocol(ProtocolError::ServerError(msg)) if msg.contains("not an integer") => {
            Some(msg.clone())
        }
        _ => None,
    };
    rejected.map_or(err, ClientError::NotACounter)
}

fn parse_counter(value: &[u8]) -> Result<i32> {
    std::str::from_utf8(value)
        .ok()
        .and_then(|s| s.parse::<i32>().ok())
        .ok_or_else(|| ClientError::NotACounter(String::from_utf8_lossy(value).into_owned()))
}

/// Split command text into arguments
///
/// Whitespace separates tokens except inside single or double quotes; a
/// backslash outside single quotes escapes the next character.
pub fn split_query(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut in_single_quote = false;
    let mut in_double_quote = false;
    let mut escape_next = false;

    for ch in line.chars() {
        if escape_next {
            current.push(ch);
            escape_next = false;
            continue;
        }

        match ch {
            '\\' if !in_single_quote => escape_next = true,
            '\'' if !in_double_quote => in_single_quote = !in_single_quote,
            '"' if !in_single_quote => in_double_quote = !in_double_quote,
            c if c.is_whitespace() && !in_single_quote && !in_double_quote => {
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }

    if !current.is_empty() {
        args.push(current);
    }
    args
}

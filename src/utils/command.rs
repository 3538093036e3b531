//! Typed command builder
//!
//! A command is a name plus an ordered list of byte-string or integer
//! arguments. There is no format string: every argument is sent as its own
//! bulk string, so keys and values may contain spaces or binary data.

use std::fmt;

use super::resp::RespEncoder;

/// One command argument
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Bytes(Vec<u8>),
    Int(i64),
}

/// A command ready to be encoded
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    name: String,
    args: Vec<Arg>,
}

impl Command {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            args: Vec::new(),
        }
    }

    /// Append a byte-string argument
    pub fn arg(mut self, value: impl AsRef<[u8]>) -> Self {
        self.args.push(Arg::Bytes(value.as_ref().to_vec()));
        self
    }

    /// Append an integer argument
    pub fn int(mut self, value: i64) -> Self {
        self.args.push(Arg::Int(value));
        self
    }

    /// Build a command from already tokenized text (raw queries)
    pub fn from_tokens<S: AsRef<str>>(tokens: &[S]) -> Option<Self> {
        let (name, rest) = tokens.split_first()?;
        Some(rest.iter().fold(Command::new(name.as_ref()), |cmd, t| {
            cmd.arg(t.as_ref())
        }))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn args(&self) -> &[Arg] {
        &self.args
    }

    /// Encode as a RESP array of bulk strings
    pub fn encode(&self, encoder: &mut RespEncoder) {
        encoder.begin_array(self.args.len() + 1);
        encoder.bulk(self.name.as_bytes());
        for arg in &self.args {
            match arg {
                Arg::Bytes(b) => encoder.bulk(b),
                Arg::Int(n) => encoder.bulk_int(*n),
            }
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for arg in &self.args {
            match arg {
                Arg::Bytes(b) => write!(f, " {}", String::from_utf8_lossy(b))?,
                Arg::Int(n) => write!(f, " {}", n)?,
            }
        }
        Ok(())
    }
}

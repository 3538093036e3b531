//! Utility modules

pub mod command;
pub mod error;
pub mod resp;

pub use command::{Arg, Command};
pub use error::{
    ClientError, ClusterError, ConnectionError, DecodeError, Outcome, ProtocolError, Result,
};
pub use resp::{RespDecoder, RespEncoder, RespValue};

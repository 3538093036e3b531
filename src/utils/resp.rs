//! RESP (Redis Serialization Protocol) encoder and decoder
//!
//! Requests are always sent as arrays of bulk strings. Replies are read
//! one at a time from a buffered stream into [`RespValue`].

use std::io::{self, BufRead, Read};

/// Largest bulk string or array header accepted from a server (512 MiB)
const MAX_FRAME_LEN: i64 = 512 * 1024 * 1024;

/// Deepest array nesting accepted in one reply
pub const MAX_NESTING: usize = 32;

/// Longest header line (type byte through CRLF) accepted from a server
pub const MAX_LINE_LEN: usize = 64 * 1024;

/// RESP reply
#[derive(Debug, Clone, PartialEq)]
pub enum RespValue {
    /// Status reply (+OK\r\n)
    SimpleString(String),
    /// Error reply (-ERR message\r\n)
    Error(String),
    /// Integer (:1000\r\n)
    Integer(i64),
    /// Bulk string ($6\r\nfoobar\r\n)
    BulkString(Vec<u8>),
    /// Nil bulk string or nil array ($-1\r\n, *-1\r\n)
    Null,
    /// Array (*2\r\n...)
    Array(Vec<RespValue>),
}

impl RespValue {
    /// Short name of the reply type, for logs and errors
    pub fn type_name(&self) -> &'static str {
        match self {
            RespValue::SimpleString(_) => "status",
            RespValue::Error(_) => "error",
            RespValue::Integer(_) => "integer",
            RespValue::BulkString(_) => "string",
            RespValue::Null => "nil",
            RespValue::Array(_) => "array",
        }
    }
}

/// RESP request encoder with a reusable buffer
pub struct RespEncoder {
    buf: Vec<u8>,
}

impl RespEncoder {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Start a request of `count` arguments: *<count>\r\n
    pub fn begin_array(&mut self, count: usize) {
        self.buf.push(b'*');
        self.write_int(count as i64);
        self.buf.extend_from_slice(b"\r\n");
    }

    /// Append one argument: $<len>\r\n<data>\r\n
    pub fn bulk(&mut self, data: &[u8]) {
        self.buf.push(b'$');
        self.write_int(data.len() as i64);
        self.buf.extend_from_slice(b"\r\n");
        self.buf.extend_from_slice(data);
        self.buf.extend_from_slice(b"\r\n");
    }

    /// Append an integer argument as its decimal bulk string
    pub fn bulk_int(&mut self, value: i64) {
        let mut digits = itoa::Buffer::new();
        self.bulk(digits.format(value).as_bytes());
    }

    #[inline]
    fn write_int(&mut self, value: i64) {
        let mut buffer = itoa::Buffer::new();
        self.buf.extend_from_slice(buffer.format(value).as_bytes());
    }
}

/// RESP decoder for streaming reads
pub struct RespDecoder<R> {
    reader: R,
    line_buf: Vec<u8>,
}

impl<R: BufRead> RespDecoder<R> {
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            line_buf: Vec::with_capacity(128),
        }
    }

    /// Decode next RESP value from stream
    pub fn decode(&mut self) -> io::Result<RespValue> {
        self.decode_at(0)
    }

    /// Decode a value found `depth` arrays deep
    fn decode_at(&mut self, depth: usize) -> io::Result<RespValue> {
        self.read_line()?;

        let type_byte = self.line_buf[0];
        let content = std::str::from_utf8(&self.line_buf[1..])
            .map_err(|_| invalid_data("Non UTF-8 RESP header"))?;

        match type_byte {
            b'+' => Ok(RespValue::SimpleString(content.to_string())),
            b'-' => Ok(RespValue::Error(content.to_string())),
            b':' => content
                .parse()
                .map(RespValue::Integer)
                .map_err(|_| invalid_data("Invalid integer")),
            b'$' => {
                let len = parse_len(content, "bulk string")?;
                let Some(len) = len else {
                    return Ok(RespValue::Null);
                };

                let mut data = vec![0u8; len];
                self.reader.read_exact(&mut data)?;

                let mut crlf = [0u8; 2];
                self.reader.read_exact(&mut crlf)?;
                if &crlf != b"\r\n" {
                    return Err(invalid_data("Bulk string not terminated by CRLF"));
                }

                Ok(RespValue::BulkString(data))
            }
            b'*' => {
                let count = parse_len(content, "array")?;
                let Some(count) = count else {
                    return Ok(RespValue::Null);
                };
                if depth >= MAX_NESTING {
                    return Err(invalid_data(format!(
                        "Arrays nested deeper than {} levels",
                        MAX_NESTING
                    )));
                }

                let mut elements = Vec::with_capacity(count.min(1024));
                for _ in 0..count {
                    elements.push(self.decode_at(depth + 1)?);
                }

                Ok(RespValue::Array(elements))
            }
            _ => Err(invalid_data(format!(
                "Invalid RESP type byte: {:?}",
                type_byte as char
            ))),
        }
    }

    /// Read one CRLF-terminated header line into `line_buf`, without the terminator
    ///
    /// At most `MAX_LINE_LEN` bytes are buffered; a longer line is rejected
    /// without reading the rest of it.
    fn read_line(&mut self) -> io::Result<()> {
        self.line_buf.clear();
        let n = (&mut self.reader)
            .take(MAX_LINE_LEN as u64 + 1)
            .read_until(b'\n', &mut self.line_buf)?;
        if n == 0 {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Connection closed",
            ));
        }
        if self.line_buf.last() != Some(&b'\n') {
            if n > MAX_LINE_LEN {
                return Err(invalid_data(format!(
                    "RESP header longer than {} bytes",
                    MAX_LINE_LEN
                )));
            }
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "Connection closed mid-line",
            ));
        }

        while matches!(self.line_buf.last(), Some(b'\n' | b'\r')) {
            self.line_buf.pop();
        }
        if self.line_buf.is_empty() {
            return Err(invalid_data("Empty RESP line"));
        }
        Ok(())
    }
}

/// Parse a length header; negative means nil
fn parse_len(content: &str, what: &str) -> io::Result<Option<usize>> {
    let len: i64 = content
        .parse()
        .map_err(|_| invalid_data(format!("Invalid {} length", what)))?;
    if len < 0 {
        return Ok(None);
    }
    if len > MAX_FRAME_LEN {
        return Err(invalid_data(format!("{} length {} too large", what, len)));
    }
    Ok(Some(len as usize))
}

fn invalid_data(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn decode_one(data: &[u8]) -> io::Result<RespValue> {
        RespDecoder::new(Cursor::new(data)).decode()
    }

    #[test]
    fn test_encode_binary_safe_arguments() {
        let mut encoder = RespEncoder::with_capacity(64);
        encoder.begin_array(3);
        for arg in [&b"SET"[..], b"k y", b"a\r\nb"] {
            encoder.bulk(arg);
        }
        assert_eq!(
            encoder.as_bytes(),
            b"*3\r\n$3\r\nSET\r\n$3\r\nk y\r\n$4\r\na\r\nb\r\n"
        );
    }

    #[test]
    fn test_encode_integer_argument() {
        let mut encoder = RespEncoder::with_capacity(64);
        encoder.begin_array(3);
        encoder.bulk(b"INCRBY");
        encoder.bulk(b"counter");
        encoder.bulk_int(-5);
        assert_eq!(
            encoder.as_bytes(),
            b"*3\r\n$6\r\nINCRBY\r\n$7\r\ncounter\r\n$2\r\n-5\r\n"
        );
    }

    #[test]
    fn test_decode_scalars() {
        assert_eq!(
            decode_one(b"+OK\r\n").unwrap(),
            RespValue::SimpleString("OK".to_string())
        );
        assert_eq!(
            decode_one(b"-ERR unknown command\r\n").unwrap(),
            RespValue::Error("ERR unknown command".to_string())
        );
        assert_eq!(decode_one(b":-42\r\n").unwrap(), RespValue::Integer(-42));
        assert_eq!(decode_one(b"$-1\r\n").unwrap(), RespValue::Null);
        assert_eq!(decode_one(b"*-1\r\n").unwrap(), RespValue::Null);
    }

    #[test]
    fn test_decode_bulk_string_with_crlf_inside() {
        assert_eq!(
            decode_one(b"$4\r\na\r\nb\r\n").unwrap(),
            RespValue::BulkString(b"a\r\nb".to_vec())
        );
        assert_eq!(
            decode_one(b"$0\r\n\r\n").unwrap(),
            RespValue::BulkString(Vec::new())
        );
    }

    #[test]
    fn test_decode_nested_array() {
        let value = decode_one(b"*3\r\n$1\r\na\r\n*1\r\n:1\r\n$-1\r\n").unwrap();
        assert_eq!(
            value,
            RespValue::Array(vec![
                RespValue::BulkString(b"a".to_vec()),
                RespValue::Array(vec![RespValue::Integer(1)]),
                RespValue::Null,
            ])
        );
    }

    #[test]
    fn test_decode_consecutive_replies() {
        let mut decoder = RespDecoder::new(Cursor::new(&b"+OK\r\n:7\r\n"[..]));
        assert!(matches!(decoder.decode().unwrap(), RespValue::SimpleString(_)));
        assert_eq!(decoder.decode().unwrap(), RespValue::Integer(7));
        let eof = decoder.decode().unwrap_err();
        assert_eq!(eof.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert_eq!(
            decode_one(b"?what\r\n").unwrap_err().kind(),
            io::ErrorKind::InvalidData
        );
        assert_eq!(
            decode_one(b"$3\r\nabcXY").unwrap_err().kind(),
            io::ErrorKind::InvalidData
        );
        assert_eq!(
            decode_one(b":12a\r\n").unwrap_err().kind(),
            io::ErrorKind::InvalidData
        );
    }

    #[test]
    fn test_nesting_limit() {
        let nested = |levels: usize| {
            let mut data = b"*1\r\n".repeat(levels);
            data.extend_from_slice(b":1\r\n");
            data
        };

        let mut value = decode_one(&nested(MAX_NESTING)).unwrap();
        for _ in 0..MAX_NESTING {
            value = match value {
                RespValue::Array(mut items) => items.remove(0),
                other => panic!("expected array, got {:?}", other),
            };
        }
        assert_eq!(value, RespValue::Integer(1));

        let err = decode_one(&nested(MAX_NESTING + 1)).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn test_oversized_header_line_rejected() {
        let mut data = b"+".to_vec();
        data.extend(std::iter::repeat(b'x').take(MAX_LINE_LEN + 10));
        data.extend_from_slice(b"\r\n");
        let err = decode_one(&data).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);

        let mut data = b"+".to_vec();
        data.extend(std::iter::repeat(b'x').take(MAX_LINE_LEN - 3));
        data.extend_from_slice(b"\r\n");
        assert!(matches!(
            decode_one(&data).unwrap(),
            RespValue::SimpleString(s) if s.len() == MAX_LINE_LEN - 3
        ));
    }

    #[test]
    fn test_truncated_header_is_eof() {
        assert_eq!(
            decode_one(b":12").unwrap_err().kind(),
            io::ErrorKind::UnexpectedEof
        );
    }

    #[test]
    fn test_type_names() {
        assert_eq!(RespValue::Null.type_name(), "nil");
        assert_eq!(RespValue::Array(vec![]).type_name(), "array");
        assert_eq!(RespValue::SimpleString("OK".to_string()).type_name(), "status");
    }
}

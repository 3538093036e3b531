//! Generic reply to row decoding for raw queries
//!
//! Every supported value becomes one row whose first field holds the
//! value; the remaining fields up to the row width are null. Integers that
//! do not fit 32 bits are kept as their decimal text. Row storage is
//! reserved with `try_reserve` so running out of memory is reported as a
//! decode error, and a failed decode drops everything built so far.

use serde::{Serialize, Serializer};
use tracing::debug;

use crate::utils::{DecodeError, RespValue};

/// One decoded value
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    Str(Vec<u8>),
    Int32(i32),
    Null,
}

impl Serialize for Field {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Field::Str(bytes) => serializer.serialize_str(&String::from_utf8_lossy(bytes)),
            Field::Int32(n) => serializer.serialize_i32(*n),
            Field::Null => serializer.serialize_none(),
        }
    }
}

pub type Row = Vec<Field>;

/// Decode a reply into rows of `row_width` fields (at least one)
///
/// Scalars give one row. Arrays give one row per string, integer or nil
/// element; nested arrays and status/error elements are skipped. Any other
/// top-level reply is `UnsupportedType`.
pub fn decode(reply: RespValue, row_width: usize) -> Result<Vec<Row>, DecodeError> {
    let width = row_width.max(1);

    match reply {
        RespValue::Array(items) => {
            let mut rows = Vec::new();
            rows.try_reserve_exact(items.len())?;
            for item in items {
                let kind = item.type_name();
                match field(item)? {
                    Some(value) => rows.push(row(value, width)?),
                    None => debug!("skipping nested {} element", kind),
                }
            }
            Ok(rows)
        }
        other => {
            let kind = other.type_name();
            let value = field(other)?.ok_or(DecodeError::UnsupportedType(kind))?;
            let mut rows = Vec::new();
            rows.try_reserve_exact(1)?;
            rows.push(row(value, width)?);
            Ok(rows)
        }
    }
}

fn field(value: RespValue) -> Result<Option<Field>, DecodeError> {
    match value {
        RespValue::BulkString(bytes) => Ok(Some(Field::Str(bytes))),
        RespValue::Integer(n) => Ok(Some(match i32::try_from(n) {
            Ok(n) => Field::Int32(n),
            Err(_) => Field::Str(itoa::Buffer::new().format(n).as_bytes().to_vec()),
        })),
        RespValue::Null => Ok(Some(Field::Null)),
        RespValue::SimpleString(_) | RespValue::Error(_) | RespValue::Array(_) => Ok(None),
    }
}

fn row(first: Field, width: usize) -> Result<Row, DecodeError> {
    let mut row = Vec::new();
    row.try_reserve_exact(width)?;
    row.push(first);
    row.resize(width, Field::Null);
    Ok(row)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bulk(s: &str) -> RespValue {
        RespValue::BulkString(s.as_bytes().to_vec())
    }

    #[test]
    fn test_mixed_array_keeps_order_and_types() {
        let reply = RespValue::Array(vec![bulk("a"), RespValue::Integer(1), RespValue::Null, bulk("b")]);
        let rows = decode(reply, 1).unwrap();
        assert_eq!(
            rows,
            vec![
                vec![Field::Str(b"a".to_vec())],
                vec![Field::Int32(1)],
                vec![Field::Null],
                vec![Field::Str(b"b".to_vec())],
            ]
        );
    }

    #[test]
    fn test_scalars_give_one_row() {
        assert_eq!(decode(bulk("v"), 1).unwrap(), vec![vec![Field::Str(b"v".to_vec())]]);
        assert_eq!(decode(RespValue::Integer(-3), 1).unwrap(), vec![vec![Field::Int32(-3)]]);
        assert_eq!(decode(RespValue::Null, 1).unwrap(), vec![vec![Field::Null]]);
    }

    #[test]
    fn test_unsupported_elements_are_skipped() {
        let reply = RespValue::Array(vec![
            bulk("x"),
            RespValue::Array(vec![bulk("nested")]),
            RespValue::SimpleString("OK".to_string()),
            RespValue::Integer(9),
        ]);
        let rows = decode(reply, 1).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1], vec![Field::Int32(9)]);

        assert!(decode(RespValue::Array(Vec::new()), 1).unwrap().is_empty());
    }

    #[test]
    fn test_rows_padded_to_width() {
        let rows = decode(RespValue::Array(vec![bulk("a"), bulk("b")]), 3).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], vec![Field::Str(b"a".to_vec()), Field::Null, Field::Null]);

        // Zero width still yields the value
        assert_eq!(decode(bulk("a"), 0).unwrap()[0].len(), 1);
    }

    #[test]
    fn test_unsupported_top_level_reply() {
        assert!(matches!(
            decode(RespValue::SimpleString("OK".to_string()), 1),
            Err(DecodeError::UnsupportedType("status"))
        ));
        assert!(matches!(
            decode(RespValue::Error("ERR".to_string()), 1),
            Err(DecodeError::UnsupportedType("error"))
        ));
    }

    #[test]
    fn test_wide_integers_kept_as_text() {
        // PTTL of a 30 day key
        let reply = RespValue::Array(vec![
            bulk("a"),
            RespValue::Integer(2_592_000_000),
            RespValue::Integer(i64::MIN),
            RespValue::Integer(i64::from(i32::MIN)),
        ]);
        let rows = decode(reply, 1).unwrap();
        assert_eq!(
            rows,
            vec![
                vec![Field::Str(b"a".to_vec())],
                vec![Field::Str(b"2592000000".to_vec())],
                vec![Field::Str(b"-9223372036854775808".to_vec())],
                vec![Field::Int32(i32::MIN)],
            ]
        );
        assert_eq!(
            decode(RespValue::Integer(i64::MAX), 2).unwrap(),
            vec![vec![Field::Str(b"9223372036854775807".to_vec()), Field::Null]]
        );
    }

    #[test]
    fn test_fields_serialize_as_json_scalars() {
        let row = vec![Field::Str(b"a".to_vec()), Field::Int32(1), Field::Null];
        assert_eq!(serde_json::to_string(&row).unwrap(), r#"["a",1,null]"#);
    }
}

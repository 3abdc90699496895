//! Binary field encoding/decoding
//!
//! HTSP field format:
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │ Byte 0:     Type tag (1=map, 2=int, 3=str, 4=bin, 5=list)       │
//! │ Byte 1:     Name length (uint8)                                 │
//! │ Byte 2-5:   Payload length (uint32 big-endian, excludes name)   │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ Name bytes                                                      │
//! ├─────────────────────────────────────────────────────────────────┤
//! │ Payload                                                         │
//! │   map/list: concatenated sub-fields filling the payload length  │
//! │   int:      minimal-width little-endian (zero = empty payload)  │
//! │   str/bin:  raw bytes                                           │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Sizing and serialization are two passes over the same rules: `calc`
//! functions compute exactly the number of bytes the corresponding `encode`
//! functions write, so a message buffer can be allocated once up front.

use crate::value::{List, Map, Value};
use crate::{Error, Result};
use bytes::{BufMut, Bytes, BytesMut};

/// Fixed per-field header size (tag + name length + payload length)
pub const FIELD_HEADER_SIZE: usize = 6;

/// Minimal encoded width of an integer's 64-bit pattern.
///
/// Trailing high-order zero bytes are omitted; zero itself encodes to an
/// empty payload. Negative values always occupy the full 8 bytes.
fn int_width(v: i64) -> usize {
    let mut u = v as u64;
    let mut width = 0;
    while u != 0 {
        width += 1;
        u >>= 8;
    }
    width
}

fn payload_size(value: &Value) -> usize {
    match value {
        Value::Map(map) => map.iter().map(|(n, v)| field_size(n, v)).sum(),
        Value::List(list) => list.iter().map(|v| field_size("", v)).sum(),
        Value::S64(v) => int_width(*v),
        Value::Str(s) => s.len(),
        Value::Bin(b) => b.len(),
    }
}

/// Total encoded size of one field, header and name included
pub fn field_size(name: &str, value: &Value) -> usize {
    FIELD_HEADER_SIZE + name.len() + payload_size(value)
}

/// Encoded size of a message body: a root map's children, no root header
pub fn body_size(root: &Map) -> usize {
    root.iter().map(|(n, v)| field_size(n, v)).sum()
}

/// Encode one field into `buf`
pub fn encode_field(buf: &mut BytesMut, name: &str, value: &Value) -> Result<()> {
    if name.len() > u8::MAX as usize {
        return Err(Error::NameTooLong(name.len()));
    }

    buf.put_u8(value.tag());
    buf.put_u8(name.len() as u8);
    buf.put_u32(payload_size(value) as u32);
    buf.put_slice(name.as_bytes());

    match value {
        Value::Map(map) => {
            for (n, v) in map.iter() {
                encode_field(buf, n, v)?;
            }
        }
        Value::List(list) => {
            for v in list.iter() {
                encode_field(buf, "", v)?;
            }
        }
        Value::S64(v) => {
            let width = int_width(*v);
            if width > 0 {
                buf.put_uint_le(*v as u64, width);
            }
        }
        Value::Str(s) => buf.put_slice(s.as_bytes()),
        Value::Bin(b) => buf.put_slice(b),
    }

    Ok(())
}

/// Encode a message body: the root map's children in sequence
pub fn encode_body(root: &Map) -> Result<BytesMut> {
    let mut buf = BytesMut::with_capacity(body_size(root));
    for (n, v) in root.iter() {
        encode_field(&mut buf, n, v)?;
    }
    Ok(buf)
}

/// Decode one field from the front of `buf`; returns the field and the
/// number of bytes consumed
fn decode_field(buf: &[u8]) -> Result<(String, Value, usize)> {
    if buf.len() < FIELD_HEADER_SIZE {
        return Err(Error::Truncated {
            needed: FIELD_HEADER_SIZE,
            have: buf.len(),
        });
    }

    let tag = buf[0];
    let name_len = buf[1] as usize;
    let payload_len = u32::from_be_bytes([buf[2], buf[3], buf[4], buf[5]]) as usize;
    let total = FIELD_HEADER_SIZE + name_len + payload_len;

    if buf.len() < total {
        return Err(Error::Overrun {
            declared: total,
            remaining: buf.len(),
        });
    }

    let name = std::str::from_utf8(&buf[FIELD_HEADER_SIZE..FIELD_HEADER_SIZE + name_len])?;
    let payload = &buf[FIELD_HEADER_SIZE + name_len..total];

    let value = match tag {
        1 => Value::Map(decode_body(payload)?),
        2 => Value::S64(decode_int(payload)),
        3 => Value::Str(std::str::from_utf8(payload)?.to_string()),
        4 => Value::Bin(Bytes::copy_from_slice(payload)),
        5 => Value::List(decode_list(payload)?),
        other => return Err(Error::UnknownTag(other)),
    };

    Ok((name.to_string(), value, total))
}

/// Zero-extend a minimal little-endian payload back to the 64-bit pattern.
/// Payloads longer than 8 bytes keep the low 8.
fn decode_int(payload: &[u8]) -> i64 {
    let mut raw = [0u8; 8];
    let width = payload.len().min(8);
    raw[..width].copy_from_slice(&payload[..width]);
    i64::from_le_bytes(raw)
}

/// Decode a concatenation of fields into a map, last write winning on
/// duplicate names
pub fn decode_body(mut buf: &[u8]) -> Result<Map> {
    let mut map = Map::new();
    while !buf.is_empty() {
        let (name, value, consumed) = decode_field(buf)?;
        map.set(name, value);
        buf = &buf[consumed..];
    }
    Ok(map)
}

fn decode_list(mut buf: &[u8]) -> Result<List> {
    let mut list = List::new();
    while !buf.is_empty() {
        let (_, value, consumed) = decode_field(buf)?;
        list.push(value);
        buf = &buf[consumed..];
    }
    Ok(list)
}

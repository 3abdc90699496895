//! Wire messages
//!
//! A message is a root map framed by a 4-byte big-endian length prefix. The
//! prefix counts the body only (the concatenated root fields); the root map
//! contributes no header of its own.

use crate::codec;
use crate::method::Method;
use crate::value::Map;
use crate::Result;
use bytes::{BufMut, Bytes, BytesMut};

/// Length-prefix size preceding every message body
pub const LENGTH_PREFIX_SIZE: usize = 4;

/// One HTSP message: a named method plus its fields
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Message {
    root: Map,
}

impl Message {
    pub fn new(root: Map) -> Self {
        Self { root }
    }

    /// Start a request for the given method
    pub fn request(method: Method) -> Self {
        let mut root = Map::new();
        root.set("method", method.as_str());
        Self { root }
    }

    pub fn root(&self) -> &Map {
        &self.root
    }

    pub fn root_mut(&mut self) -> &mut Map {
        &mut self.root
    }

    pub fn into_root(self) -> Map {
        self.root
    }

    /// Parsed method field; [`Method::Unknown`] for unrecognized names,
    /// including the empty string when the field is absent
    pub fn method(&self) -> Method {
        Method::from_name(self.root.get_str("method"))
    }

    /// Encode with the 4-byte big-endian length prefix
    pub fn encode(&self) -> Result<Bytes> {
        let body_size = codec::body_size(&self.root);
        let mut buf = BytesMut::with_capacity(LENGTH_PREFIX_SIZE + body_size);
        buf.put_u32(body_size as u32);
        for (n, v) in self.root.iter() {
            codec::encode_field(&mut buf, n, v)?;
        }
        Ok(buf.freeze())
    }

    /// Decode a message body (the bytes following the length prefix).
    /// An empty body is a valid, empty message.
    pub fn decode(body: &[u8]) -> Result<Self> {
        Ok(Self {
            root: codec::decode_body(body)?,
        })
    }
}

impl std::ops::Deref for Message {
    type Target = Map;

    fn deref(&self) -> &Map {
        &self.root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_counts_body_only() {
        let mut root = Map::new();
        root.set("seq", 1u32);
        let msg = Message::new(root);

        let encoded = msg.encode().unwrap();
        let declared = u32::from_be_bytes([encoded[0], encoded[1], encoded[2], encoded[3]]);
        assert_eq!(declared as usize, encoded.len() - LENGTH_PREFIX_SIZE);
    }

    #[test]
    fn test_empty_body_is_valid() {
        let msg = Message::decode(&[]).unwrap();
        assert!(msg.root().is_empty());
        assert!(matches!(msg.method(), Method::Unknown(_)));
    }
}

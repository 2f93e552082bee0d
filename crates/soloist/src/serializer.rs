//! # Serializers
//!
//! Turn call arguments and return values into opaque byte payloads and back.
//!
//! Each positional and keyword argument is serialized on its own, so the
//! wire carries a list of payloads rather than one blob. A serializer is a
//! stateless strategy shared by the proxy and the server-side entry.
//!
//! - `JsonSerializer`: `serde_json::Value` as JSON text. The default.
//! - `PackSerializer`: `serde_json::Value` in the compact solowire binary format.
//! - `Passthrough`: no serialization; values already are byte payloads.

use std::fmt;

use solowire::Decoder;
use solowire::Encoder;
use solowire::Tag;

use crate::arguments::Arguments;

/// Values nested deeper than this are rejected by `PackSerializer`.
pub const MAX_DEPTH: usize = 64;

/// A value could not be encoded or decoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SerializationError {
    Encode(String),
    Decode(String),
    /// The value nests deeper than `MAX_DEPTH`.
    DepthExceeded(usize),
    /// A handler asked for an argument the caller did not pass.
    MissingArgument(String),
    /// The singleton failed to (de)serialize on its side.
    Remote(String),
}

impl fmt::Display for SerializationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Encode(msg) => write!(f, "Encoding failed: {}", msg),
            Self::Decode(msg) => write!(f, "Decoding failed: {}", msg),
            Self::DepthExceeded(max) => write!(f, "Value nests deeper than {} levels", max),
            Self::MissingArgument(name) => write!(f, "Missing argument {}", name),
            Self::Remote(msg) => write!(f, "Singleton serialization failure: {}", msg),
        }
    }
}

impl std::error::Error for SerializationError {}

pub type Result<T> = std::result::Result<T, SerializationError>;

/// Encodes and decodes the values exchanged by a proxy and its handler.
///
/// Implementors provide the per-value pair; the call and result operations
/// are derived from it. `decode_result` maps an empty payload to `None`
/// ("no value") rather than failing.
pub trait Serializer: Send + Sync + 'static {
    /// The application-level value type handlers and callers work with.
    type Value: Send + 'static;

    fn encode_value(&self, value: &Self::Value) -> Result<Vec<u8>>;

    fn decode_value(&self, bytes: &[u8]) -> Result<Self::Value>;

    fn encode_call(&self, args: &Arguments<Self::Value>) -> Result<Arguments<Vec<u8>>> {
        args.try_map_ref(|value| self.encode_value(value))
    }

    fn decode_call(&self, args: Arguments<Vec<u8>>) -> Result<Arguments<Self::Value>> {
        args.try_map(|bytes| self.decode_value(&bytes))
    }

    fn encode_result(&self, value: &Self::Value) -> Result<Vec<u8>> {
        self.encode_value(value)
    }

    fn decode_result(&self, bytes: &[u8]) -> Result<Option<Self::Value>> {
        if bytes.is_empty() {
            return Ok(None);
        }
        self.decode_value(bytes).map(Some)
    }
}

/// JSON text via `serde_json`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    type Value = serde_json::Value;

    fn encode_value(&self, value: &serde_json::Value) -> Result<Vec<u8>> {
        serde_json::to_vec(value).map_err(|e| SerializationError::Encode(e.to_string()))
    }

    fn decode_value(&self, bytes: &[u8]) -> Result<serde_json::Value> {
        serde_json::from_slice(bytes).map_err(|e| SerializationError::Decode(e.to_string()))
    }
}

/// The "no serializer" strategy: byte payloads cross the wire untouched.
///
/// Unlike the other serializers an empty payload is a value here, the empty
/// byte string; only a handler returning `None` yields "no value".
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl Serializer for Passthrough {
    type Value = Vec<u8>;

    fn encode_value(&self, value: &Vec<u8>) -> Result<Vec<u8>> {
        Ok(value.clone())
    }

    fn decode_value(&self, bytes: &[u8]) -> Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }

    fn encode_call(&self, args: &Arguments<Vec<u8>>) -> Result<Arguments<Vec<u8>>> {
        Ok(args.clone())
    }

    fn decode_call(&self, args: Arguments<Vec<u8>>) -> Result<Arguments<Vec<u8>>> {
        Ok(args)
    }

    fn decode_result(&self, bytes: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(Some(bytes.to_vec()))
    }
}

/// `serde_json::Value` in the solowire TLV format.
///
/// Numbers keep their JSON flavour: unsigned, signed and float map to
/// distinct tags so they decode back to the same `serde_json::Number`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PackSerializer;

impl Serializer for PackSerializer {
    type Value = serde_json::Value;

    fn encode_value(&self, value: &serde_json::Value) -> Result<Vec<u8>> {
        let mut enc = Encoder::new();
        encode_json(&mut enc, value, 0)?;
        enc.into_bytes().map_err(encode_error)
    }

    fn decode_value(&self, bytes: &[u8]) -> Result<serde_json::Value> {
        let mut dec = Decoder::new(bytes);
        let value = decode_json(&mut dec, 0)?;
        dec.finish().map_err(decode_error)?;
        Ok(value)
    }
}

fn encode_error(e: solowire::Error) -> SerializationError {
    SerializationError::Encode(e.to_string())
}

fn decode_error(e: solowire::Error) -> SerializationError {
    SerializationError::Decode(e.to_string())
}

fn encode_json(enc: &mut Encoder, value: &serde_json::Value, depth: usize) -> Result<()> {
    use serde_json::Value;

    if depth > MAX_DEPTH {
        return Err(SerializationError::DepthExceeded(MAX_DEPTH));
    }

    match value {
        Value::Null => enc.unit(),
        Value::Bool(b) => enc.bool(*b),
        Value::Number(n) => {
            if let Some(u) = n.as_u64() {
                enc.u64(u)
            } else if let Some(i) = n.as_i64() {
                enc.s64(i)
            } else if let Some(f) = n.as_f64() {
                enc.f64(f)
            } else {
                return Err(SerializationError::Encode(format!("Unrepresentable number: {}", n)));
            }
        }
        Value::String(s) => enc.str(s),
        Value::Array(items) => {
            enc.list_begin().map_err(encode_error)?;
            for item in items {
                encode_json(enc, item, depth + 1)?;
            }
            enc.list_end()
        }
        Value::Object(fields) => {
            enc.map_begin().map_err(encode_error)?;
            for (key, item) in fields {
                enc.variant_begin(key).map_err(encode_error)?;
                encode_json(enc, item, depth + 1)?;
                enc.variant_end().map_err(encode_error)?;
            }
            enc.map_end()
        }
    }
    .map_err(encode_error)
}

fn decode_json(dec: &mut Decoder<'_>, depth: usize) -> Result<serde_json::Value> {
    use serde_json::Value;

    if depth > MAX_DEPTH {
        return Err(SerializationError::DepthExceeded(MAX_DEPTH));
    }

    let tag = dec.peek_tag().map_err(decode_error)?;
    let value = match tag {
        Tag::Unit => {
            dec.unit().map_err(decode_error)?;
            Value::Null
        }
        Tag::BoolTrue | Tag::BoolFalse => Value::Bool(dec.bool().map_err(decode_error)?),
        Tag::U64 => Value::from(dec.u64().map_err(decode_error)?),
        Tag::S64 => Value::from(dec.s64().map_err(decode_error)?),
        Tag::F64 => {
            let f = dec.f64().map_err(decode_error)?;
            serde_json::Number::from_f64(f)
                .map(Value::Number)
                .ok_or_else(|| SerializationError::Decode(format!("Non-finite float: {}", f)))?
        }
        Tag::String => Value::String(dec.str().map_err(decode_error)?.to_string()),
        Tag::List => {
            let mut items = dec.list().map_err(decode_error)?;
            let mut out = Vec::new();
            while let Some(mut item) = items.next().map_err(decode_error)? {
                out.push(decode_json(&mut item, depth + 1)?);
                item.finish().map_err(decode_error)?;
            }
            Value::Array(out)
        }
        Tag::Map => {
            let mut entries = dec.map().map_err(decode_error)?;
            let mut out = serde_json::Map::new();
            while let Some((key, mut item)) = entries.next().map_err(decode_error)? {
                out.insert(key.to_string(), decode_json(&mut item, depth + 1)?);
                item.finish().map_err(decode_error)?;
            }
            Value::Object(out)
        }
        Tag::Bytes | Tag::Variant => {
            return Err(SerializationError::Decode(format!("Unexpected {:?} in JSON value", tag)));
        }
    };
    Ok(value)
}

//! # Protocol Frames
//!
//! The envelope of one remote call: a `Call` travels from proxy to server,
//! a `Reply` travels back, and the connection is then closed.
//!
//! ## Invariants
//! - **Panic Safety**: All decoding paths return `Result`.
//! - **Forward Compatibility**: Unknown map fields are skipped.
//! - **Exact Payloads**: Every field holds exactly one item; extra items are rejected.
//! - **Tri-state Replies**: "no value" (`Empty`) is its own reply, never
//!   confused with a failure or with an empty payload.

use std::collections::BTreeMap;

use crate::error::Error;
use crate::error::Result;
use crate::pack::Decoder;
use crate::pack::Encoder;

/// A request to run the function registered under `name`.
///
/// Arguments are already serialized; the frame treats them as opaque bytes.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CallFrame {
    pub name: String,
    pub args: Vec<Vec<u8>>,
    pub kwargs: BTreeMap<String, Vec<u8>>,
}

impl CallFrame {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Self::default() }
    }

    pub fn encode(&self, enc: &mut Encoder) -> Result<()> {
        enc.variant_begin("Call")?;
        enc.map_begin()?;

        enc.variant_begin("name")?;
        enc.str(&self.name)?;
        enc.variant_end()?;

        enc.variant_begin("args")?;
        enc.list_begin()?;
        for arg in &self.args {
            enc.bytes(arg)?;
        }
        enc.list_end()?;
        enc.variant_end()?;

        enc.variant_begin("kwargs")?;
        enc.map_begin()?;
        for (key, value) in &self.kwargs {
            enc.variant_begin(key)?;
            enc.bytes(value)?;
            enc.variant_end()?;
        }
        enc.map_end()?;
        enc.variant_end()?;

        enc.map_end()?;
        enc.variant_end()?;
        Ok(())
    }

    /// Decodes the body of a `Call` variant.
    fn decode_body(mut body: Decoder<'_>) -> Result<Self> {
        let mut map = body.map()?;
        let mut name = None;
        let mut args = None;
        let mut kwargs = None;

        while let Some((key, mut val)) = map.next()? {
            match key {
                "name" => {
                    name = Some(val.str()?.to_string());
                    val.finish()?;
                }
                "args" => {
                    let mut items = val.list()?;
                    let mut out = Vec::new();
                    while let Some(mut item) = items.next()? {
                        out.push(item.bytes()?.to_vec());
                        item.finish()?;
                    }
                    val.finish()?;
                    args = Some(out);
                }
                "kwargs" => {
                    let mut entries = val.map()?;
                    let mut out = BTreeMap::new();
                    while let Some((k, mut v)) = entries.next()? {
                        out.insert(k.to_string(), v.bytes()?.to_vec());
                        v.finish()?;
                    }
                    val.finish()?;
                    kwargs = Some(out);
                }
                _ => val.skip()?,
            }
        }
        body.finish()?;

        Ok(CallFrame {
            name: name.ok_or(Error::MissingField("name"))?,
            args: args.ok_or(Error::MissingField("args"))?,
            kwargs: kwargs.unwrap_or_default(),
        })
    }
}

/// Why a call failed on the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// No function is registered under the requested name.
    UnknownFunction,
    /// The handler returned an error or panicked.
    Execution,
    /// Arguments could not be decoded or the result could not be encoded.
    Serialization,
    /// The request frame was malformed.
    Protocol,
}

impl FailureKind {
    pub fn as_tag(&self) -> &'static str {
        match self {
            Self::UnknownFunction => "NoFunction",
            Self::Execution => "Execution",
            Self::Serialization => "Serialization",
            Self::Protocol => "Protocol",
        }
    }

    pub fn from_tag(tag: &str) -> Result<Self> {
        match tag {
            "NoFunction" => Ok(Self::UnknownFunction),
            "Execution" => Ok(Self::Execution),
            "Serialization" => Ok(Self::Serialization),
            "Protocol" => Ok(Self::Protocol),
            other => Err(Error::UnknownVariant(format!("Failure kind: {}", other))),
        }
    }
}

/// A failed call: the kind plus a human-readable description of the cause.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

impl Failure {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }
}

/// The server's answer to a `CallFrame`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReplyFrame {
    /// The handler produced a value, serialized into these bytes.
    Value(Vec<u8>),
    /// The handler completed without a value.
    Empty,
    Failed(Failure),
}

impl ReplyFrame {
    pub fn encode(&self, enc: &mut Encoder) -> Result<()> {
        enc.variant_begin("Reply")?;
        match self {
            Self::Value(bytes) => {
                enc.variant_begin("Value")?;
                enc.bytes(bytes)?;
                enc.variant_end()?;
            }
            Self::Empty => {
                enc.variant_begin("Empty")?;
                enc.unit()?;
                enc.variant_end()?;
            }
            Self::Failed(failure) => {
                enc.variant_begin("Failed")?;
                enc.map_begin()?;

                enc.variant_begin("kind")?;
                enc.variant_begin(failure.kind.as_tag())?;
                enc.unit()?;
                enc.variant_end()?;
                enc.variant_end()?;

                enc.variant_begin("message")?;
                enc.str(&failure.message)?;
                enc.variant_end()?;

                enc.map_end()?;
                enc.variant_end()?;
            }
        }
        enc.variant_end()?;
        Ok(())
    }

    fn decode_body(mut body: Decoder<'_>) -> Result<Self> {
        let (status, mut payload) = body.variant()?;
        body.finish()?;
        match status {
            "Value" => {
                let bytes = payload.bytes()?.to_vec();
                payload.finish()?;
                Ok(Self::Value(bytes))
            }
            "Empty" => {
                payload.unit()?;
                payload.finish()?;
                Ok(Self::Empty)
            }
            "Failed" => {
                let mut map = payload.map()?;
                let mut kind = None;
                let mut message = None;

                while let Some((key, mut val)) = map.next()? {
                    match key {
                        "kind" => {
                            let (tag, mut unit) = val.variant()?;
                            unit.unit()?;
                            unit.finish()?;
                            kind = Some(FailureKind::from_tag(tag)?);
                        }
                        "message" => message = Some(val.str()?.to_string()),
                        _ => val.skip()?,
                    }
                    val.finish()?;
                }
                payload.finish()?;

                Ok(Self::Failed(Failure {
                    kind: kind.ok_or(Error::MissingField("kind"))?,
                    message: message.unwrap_or_default(),
                }))
            }
            other => Err(Error::UnknownVariant(format!("Reply status: {}", other))),
        }
    }
}

/// Top-level frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Call(CallFrame),
    Reply(ReplyFrame),
}

impl Frame {
    pub fn encode(&self, enc: &mut Encoder) -> Result<()> {
        match self {
            Self::Call(call) => call.encode(enc),
            Self::Reply(reply) => reply.encode(enc),
        }
    }

    pub fn decode(dec: &mut Decoder<'_>) -> Result<Self> {
        let (frame_type, body) = dec.variant()?;
        match frame_type {
            "Call" => Ok(Self::Call(CallFrame::decode_body(body)?)),
            "Reply" => Ok(Self::Reply(ReplyFrame::decode_body(body)?)),
            other => Err(Error::UnknownVariant(format!("Top-level frame: {}", other))),
        }
    }

    /// Encodes a standalone frame document.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut enc = Encoder::new();
        self.encode(&mut enc)?;
        enc.into_bytes()
    }

    /// Decodes a standalone frame document, rejecting trailing bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let mut dec = Decoder::new(bytes);
        let frame = Self::decode(&mut dec)?;
        dec.finish()?;
        Ok(frame)
    }
}

impl From<CallFrame> for Frame {
    fn from(call: CallFrame) -> Self {
        Self::Call(call)
    }
}

impl From<ReplyFrame> for Frame {
    fn from(reply: ReplyFrame) -> Self {
        Self::Reply(reply)
    }
}

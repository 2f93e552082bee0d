//! # Solowire
//!
//! The wire format spoken between a soloist proxy and the singleton server.
//!
//! ## Layers
//!
//! - **Pack**: a bounded, schema-agnostic TLV encoding (`Encoder`/`Decoder`).
//! - **Frames**: the `Call`/`Reply` envelopes built on top of pack.
//!
//! Framing of documents on a byte stream (length prefixes, sockets) is left
//! to the transport; this crate only turns frames into bytes and back.

pub mod error;
pub mod frame;
pub mod pack;

pub use error::Error;
pub use error::Result;
pub use frame::CallFrame;
pub use frame::Failure;
pub use frame::FailureKind;
pub use frame::Frame;
pub use frame::ReplyFrame;
pub use pack::Decoder;
pub use pack::Encoder;
pub use pack::Tag;

#[cfg(test)]
mod tests;

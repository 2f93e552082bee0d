//! # Proxy
//!
//! The client-side stand-in for a function hosted by the singleton.
//!
//! A call encodes its arguments, opens a fresh connection, exchanges exactly
//! one `Call`/`Reply` pair and closes the connection again, whatever the
//! outcome.
//!
//! ## Invariants
//!
//! - A `Reply::Empty` is returned as `Ok(None)`, never as an error.
//! - Every `Reply::Failed` maps to a distinct `CallError` variant.
//! - Only reply frames are accepted; a call frame coming back is a protocol
//!   violation.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use solowire::CallFrame;
use solowire::FailureKind;
use solowire::Frame;
use solowire::ReplyFrame;
use tracing::debug;

use crate::arguments::Arguments;
use crate::arguments::from_value;
use crate::endpoint::Endpoint;
use crate::serializer::SerializationError;
use crate::serializer::Serializer;
use crate::transport::ConnectionError;
use crate::transport::Transport;

/// Why a remote call did not produce a result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    /// The singleton could not be reached or the exchange broke off.
    Connection(ConnectionError),
    /// Arguments or result could not be (de)serialized, on either side.
    Serialization(SerializationError),
    /// The singleton has no function under this name.
    RemoteDispatch { name: String },
    /// The function ran on the singleton and failed.
    RemoteExecution { name: String, message: String },
    /// The exchange did not follow the call/reply protocol.
    Protocol(String),
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(e) => write!(f, "Connection failure: {}", e),
            Self::Serialization(e) => write!(f, "Serialization failure: {}", e),
            Self::RemoteDispatch { name } => write!(f, "Singleton has no function named '{}'", name),
            Self::RemoteExecution { name, message } => write!(f, "Function '{}' failed: {}", name, message),
            Self::Protocol(msg) => write!(f, "Protocol violation: {}", msg),
        }
    }
}

impl std::error::Error for CallError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Connection(e) => Some(e),
            Self::Serialization(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConnectionError> for CallError {
    fn from(e: ConnectionError) -> Self {
        Self::Connection(e)
    }
}

impl From<SerializationError> for CallError {
    fn from(e: SerializationError) -> Self {
        Self::Serialization(e)
    }
}

impl From<solowire::Error> for CallError {
    fn from(e: solowire::Error) -> Self {
        Self::Protocol(e.to_string())
    }
}

/// Calls one named function on the singleton.
pub struct Proxy<S: Serializer> {
    name: String,
    endpoint: Endpoint,
    serializer: Arc<S>,
    transport: Arc<dyn Transport>,
}

impl<S: Serializer> Clone for Proxy<S> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            endpoint: self.endpoint.clone(),
            serializer: Arc::clone(&self.serializer),
            transport: Arc::clone(&self.transport),
        }
    }
}

impl<S: Serializer> fmt::Debug for Proxy<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Proxy")
            .field("name", &self.name)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

impl<S: Serializer> Proxy<S> {
    pub fn new(name: String, endpoint: Endpoint, serializer: Arc<S>, transport: Arc<dyn Transport>) -> Self {
        Self { name, endpoint, serializer, transport }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Runs the function on the singleton and returns its result, or `None`
    /// if it returned nothing.
    pub async fn call(&self, args: Arguments<S::Value>) -> Result<Option<S::Value>, CallError> {
        let encoded = self.serializer.encode_call(&args)?;
        let request = Frame::Call(CallFrame {
            name: self.name.clone(),
            args: encoded.positional,
            kwargs: encoded.keyword,
        })
        .to_bytes()?;

        let mut conn = self.transport.connect(&self.endpoint).await?;
        let exchanged = conn.exchange(&request).await;
        if let Err(e) = conn.close().await {
            debug!(function = %self.name, error = %e, "closing connection failed");
        }
        let response = exchanged?;

        match Frame::from_bytes(&response)? {
            Frame::Reply(reply) => self.finish(reply),
            Frame::Call(_) => Err(CallError::Protocol("Expected a reply frame, received a call".to_string())),
        }
    }

    fn finish(&self, reply: ReplyFrame) -> Result<Option<S::Value>, CallError> {
        match reply {
            ReplyFrame::Value(bytes) => Ok(self.serializer.decode_result(&bytes)?),
            ReplyFrame::Empty => Ok(None),
            ReplyFrame::Failed(failure) => Err(match failure.kind {
                FailureKind::UnknownFunction => CallError::RemoteDispatch { name: self.name.clone() },
                FailureKind::Execution => CallError::RemoteExecution {
                    name: self.name.clone(),
                    message: failure.message,
                },
                FailureKind::Serialization => {
                    CallError::Serialization(SerializationError::Remote(failure.message))
                }
                FailureKind::Protocol => CallError::Protocol(failure.message),
            }),
        }
    }
}

impl<S> Proxy<S>
where
    S: Serializer<Value = serde_json::Value>,
{
    /// Like `call`, deserializing the result into `R`.
    ///
    /// A function that returned nothing yields `None`.
    pub async fn invoke<R: DeserializeOwned>(&self, args: Arguments<serde_json::Value>) -> Result<Option<R>, CallError> {
        match self.call(args).await? {
            Some(value) => Ok(Some(from_value(&value)?)),
            None => Ok(None),
        }
    }
}

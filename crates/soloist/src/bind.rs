//! # Remote Binder
//!
//! Turns an ordinary handler into a pair of cooperating stubs:
//!
//! - **Entry**: an `ExposedFunction` for the singleton's registry that
//!   decodes the arguments, runs the handler and encodes its result.
//! - **Proxy**: a client-side `Proxy` that encodes arguments, reaches the
//!   singleton through the transport and decodes what comes back.
//!
//! Both halves share one serializer, so whatever the proxy encodes the entry
//! can decode. `bind` hands back both halves and leaves installing the entry
//! to the caller; `Singleton::run_on` does both in one step.

use std::fmt;
use std::sync::Arc;

use solowire::Failure;
use solowire::FailureKind;
use tracing::warn;

use crate::arguments::Arguments;
use crate::endpoint::Endpoint;
use crate::proxy::Proxy;
use crate::registry::ExposedFunction;
use crate::registry::Outcome;
use crate::registry::ServiceRegistry;
use crate::serializer::JsonSerializer;
use crate::serializer::Serializer;
use crate::transport::SocketTransport;
use crate::transport::Transport;

/// Produces entries and proxies for one endpoint and serializer.
pub struct Binder<S: Serializer = JsonSerializer> {
    endpoint: Endpoint,
    serializer: Arc<S>,
    transport: Arc<dyn Transport>,
}

impl<S: Serializer> Clone for Binder<S> {
    fn clone(&self) -> Self {
        Self {
            endpoint: self.endpoint.clone(),
            serializer: Arc::clone(&self.serializer),
            transport: Arc::clone(&self.transport),
        }
    }
}

impl<S: Serializer> fmt::Debug for Binder<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Binder").field("endpoint", &self.endpoint).finish_non_exhaustive()
    }
}

impl Binder<JsonSerializer> {
    /// A binder using JSON and the socket transport.
    pub fn new(endpoint: Endpoint) -> Self {
        Self::with_serializer(endpoint, JsonSerializer)
    }
}

impl<S: Serializer> Binder<S> {
    pub fn with_serializer(endpoint: Endpoint, serializer: S) -> Self {
        Self {
            endpoint,
            serializer: Arc::new(serializer),
            transport: Arc::new(SocketTransport::new()),
        }
    }

    /// Replaces the transport used by proxies created from now on.
    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = transport;
        self
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn serializer(&self) -> &S {
        &self.serializer
    }

    /// Creates both halves for `handler` under `name`.
    pub fn bind<F>(&self, name: impl Into<String>, handler: F) -> Binding<S>
    where
        F: Fn(Arguments<S::Value>) -> anyhow::Result<Option<S::Value>> + Send + Sync + 'static,
    {
        let name = name.into();
        Binding {
            entry: self.entry(name.clone(), handler),
            proxy: self.proxy(name),
        }
    }

    /// Only the client half, for processes that never host `name`.
    pub fn proxy(&self, name: impl Into<String>) -> Proxy<S> {
        Proxy::new(
            name.into(),
            self.endpoint.clone(),
            Arc::clone(&self.serializer),
            Arc::clone(&self.transport),
        )
    }

    /// Only the server half.
    pub fn entry<F>(&self, name: impl Into<String>, handler: F) -> ExposedFunction
    where
        F: Fn(Arguments<S::Value>) -> anyhow::Result<Option<S::Value>> + Send + Sync + 'static,
    {
        let name = name.into();
        let serializer = Arc::clone(&self.serializer);
        let label = name.clone();
        ExposedFunction::new(name, move |raw| run_handler(&label, serializer.as_ref(), &handler, raw))
    }
}

fn run_handler<S, F>(name: &str, serializer: &S, handler: &F, raw: Arguments<Vec<u8>>) -> Outcome
where
    S: Serializer,
    F: Fn(Arguments<S::Value>) -> anyhow::Result<Option<S::Value>>,
{
    let args = match serializer.decode_call(raw) {
        Ok(args) => args,
        Err(e) => {
            warn!(function = %name, error = %e, "cannot decode arguments");
            return Outcome::Failed(Failure::new(FailureKind::Serialization, e.to_string()));
        }
    };

    let value = match handler(args) {
        Ok(Some(value)) => value,
        Ok(None) => return Outcome::Empty,
        Err(e) => {
            let message = format!("{:#}", e);
            warn!(function = %name, error = %message, "function failed");
            return Outcome::Failed(Failure::new(FailureKind::Execution, message));
        }
    };

    match serializer.encode_result(&value) {
        Ok(bytes) => Outcome::Value(bytes),
        Err(e) => {
            warn!(function = %name, error = %e, "cannot encode result");
            Outcome::Failed(Failure::new(FailureKind::Serialization, e.to_string()))
        }
    }
}

/// The two halves produced by `Binder::bind`.
#[derive(Debug)]
pub struct Binding<S: Serializer = JsonSerializer> {
    pub entry: ExposedFunction,
    pub proxy: Proxy<S>,
}

impl<S: Serializer> Binding<S> {
    /// Registers the entry and returns the proxy.
    pub fn install(self, registry: &ServiceRegistry) -> Proxy<S> {
        registry.register(self.entry);
        self.proxy
    }

    pub fn into_parts(self) -> (ExposedFunction, Proxy<S>) {
        (self.entry, self.proxy)
    }
}

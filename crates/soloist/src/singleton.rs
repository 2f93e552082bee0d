//! # Singleton
//!
//! One place to declare singleton-only functions and to host them.
//!
//! Every process builds the same `Singleton` and declares the same functions
//! with `run_on`, getting back proxies it can call. Exactly one of those
//! processes also calls `start`, which makes it the host that runs them.

use std::sync::Arc;

use crate::arguments::Arguments;
use crate::bind::Binder;
use crate::endpoint::Endpoint;
use crate::proxy::Proxy;
use crate::registry::ServiceRegistry;
use crate::serializer::JsonSerializer;
use crate::serializer::Serializer;
use crate::server::ServerError;
use crate::server::ServerHandle;
use crate::server::SingletonServer;
use crate::transport::Transport;

#[derive(Debug)]
pub struct Singleton<S: Serializer = JsonSerializer> {
    binder: Binder<S>,
    registry: Arc<ServiceRegistry>,
}

impl Singleton<JsonSerializer> {
    pub fn new(endpoint: Endpoint) -> Self {
        Self::with_serializer(endpoint, JsonSerializer)
    }
}

impl Default for Singleton<JsonSerializer> {
    /// The Unix socket `manager.sock` in the working directory.
    fn default() -> Self {
        Self::new(Endpoint::default())
    }
}

impl<S: Serializer> Singleton<S> {
    pub fn with_serializer(endpoint: Endpoint, serializer: S) -> Self {
        Self {
            binder: Binder::with_serializer(endpoint, serializer),
            registry: Arc::new(ServiceRegistry::new()),
        }
    }

    pub fn with_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.binder = self.binder.with_transport(transport);
        self
    }

    /// Declares `handler` as singleton-only under `name`.
    ///
    /// The handler is registered for when this process hosts the singleton;
    /// the returned proxy runs it wherever the singleton is.
    pub fn run_on<F>(&self, name: impl Into<String>, handler: F) -> Proxy<S>
    where
        F: Fn(Arguments<S::Value>) -> anyhow::Result<Option<S::Value>> + Send + Sync + 'static,
    {
        self.binder.bind(name, handler).install(&self.registry)
    }

    pub fn binder(&self) -> &Binder<S> {
        &self.binder
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    pub fn endpoint(&self) -> &Endpoint {
        self.binder.endpoint()
    }

    /// A server for this singleton's endpoint and registry.
    ///
    /// Functions declared after the server starts are still served.
    pub fn server(&self) -> SingletonServer {
        SingletonServer::with_registry(self.endpoint().clone(), Arc::clone(&self.registry))
    }

    /// Hosts the singleton on the current task. Only returns if binding fails.
    pub async fn start(&self) -> Result<(), ServerError> {
        self.server().start().await
    }

    /// Hosts the singleton on a background task.
    pub async fn spawn(&self) -> Result<ServerHandle, ServerError> {
        Ok(self.server().bind().await?.spawn())
    }
}

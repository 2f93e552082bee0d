//! # Singleton Server
//!
//! Owns the service registry, listens on the endpoint and dispatches
//! incoming calls. Only the process that starts it hosts the functions.
//!
//! ## Lifecycle
//!
//! `SingletonServer` (idle) --`bind()`--> `ListeningServer` --`serve()`--> forever.
//!
//! Binding first runs `prepare_endpoint`, which removes a stale socket file
//! left behind by a previous server on the same path.
//!
//! ## Invariants
//!
//! - **One Task per Connection**: Every accepted connection runs in its own
//!   tokio task and carries exactly one call.
//! - **Isolated Handlers**: Entries run on the blocking pool; a slow entry
//!   only delays its own reply and a panicking entry becomes an execution
//!   failure for its caller.
//! - **Always Reply**: Every well-formed request receives a reply frame,
//!   including unknown names and malformed arguments.

use std::any::Any;
use std::fmt;
use std::io;
use std::sync::Arc;

use solowire::Failure;
use solowire::FailureKind;
use solowire::Frame;
use solowire::ReplyFrame;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tracing::debug;
use tracing::error;
use tracing::info;
use tracing::warn;

use crate::arguments::Arguments;
use crate::endpoint::Endpoint;
use crate::registry::Outcome;
use crate::registry::ServiceRegistry;
use crate::transport::Connection;
use crate::transport::ConnectionError;
use crate::transport::MAX_FRAME_LEN;

#[derive(Debug)]
pub enum ServerError {
    /// A stale socket file exists but could not be removed.
    PrepareEndpoint { endpoint: Endpoint, source: io::Error },
    /// The listener could not be bound.
    Bind { endpoint: Endpoint, source: io::Error },
    /// Accepting a connection failed.
    Accept(io::Error),
}

impl fmt::Display for ServerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PrepareEndpoint { endpoint, source } => {
                write!(f, "Cannot remove stale socket at {}: {}", endpoint, source)
            }
            Self::Bind { endpoint, source } => write!(f, "Cannot listen on {}: {}", endpoint, source),
            Self::Accept(e) => write!(f, "Accept failed: {}", e),
        }
    }
}

impl std::error::Error for ServerError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::PrepareEndpoint { source, .. } => Some(source),
            Self::Bind { source, .. } => Some(source),
            Self::Accept(e) => Some(e),
        }
    }
}

/// Makes the endpoint ready to bind.
///
/// For Unix endpoints any existing file at the socket path is removed; a
/// missing file is fine. TCP endpoints need no preparation.
pub fn prepare_endpoint(endpoint: &Endpoint) -> Result<(), ServerError> {
    let Some(path) = endpoint.socket_path() else {
        return Ok(());
    };
    match std::fs::remove_file(path) {
        Ok(()) => {
            debug!(%endpoint, "removed stale socket file");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(ServerError::PrepareEndpoint { endpoint: endpoint.clone(), source }),
    }
}

/// A singleton server that has not started listening yet.
#[derive(Debug)]
pub struct SingletonServer {
    endpoint: Endpoint,
    registry: Arc<ServiceRegistry>,
}

impl SingletonServer {
    pub fn new(endpoint: Endpoint) -> Self {
        Self::with_registry(endpoint, Arc::new(ServiceRegistry::new()))
    }

    /// Serves the entries of an existing registry.
    pub fn with_registry(endpoint: Endpoint, registry: Arc<ServiceRegistry>) -> Self {
        Self { endpoint, registry }
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    /// Prepares the endpoint and starts listening.
    pub async fn bind(self) -> Result<ListeningServer, ServerError> {
        prepare_endpoint(&self.endpoint)?;
        let (listener, local_endpoint) = Listener::bind(&self.endpoint).await?;
        info!(endpoint = %local_endpoint, functions = self.registry.len(), "singleton listening");
        Ok(ListeningServer { listener, local_endpoint, registry: self.registry })
    }

    /// Binds and serves on the current task. Only returns if binding fails.
    pub async fn start(self) -> Result<(), ServerError> {
        self.bind().await?.serve().await;
        Ok(())
    }
}

enum Listener {
    #[cfg(unix)]
    Unix(tokio::net::UnixListener),
    Tcp(TcpListener),
}

impl Listener {
    async fn bind(endpoint: &Endpoint) -> Result<(Self, Endpoint), ServerError> {
        let bind_error = |source: io::Error| ServerError::Bind { endpoint: endpoint.clone(), source };
        match endpoint {
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                let listener = tokio::net::UnixListener::bind(path).map_err(bind_error)?;
                Ok((Self::Unix(listener), endpoint.clone()))
            }
            #[cfg(not(unix))]
            Endpoint::Unix(_) => Err(bind_error(io::Error::new(
                io::ErrorKind::Unsupported,
                "Unix domain sockets are not available",
            ))),
            Endpoint::Tcp { host, port } => {
                let listener = TcpListener::bind((host.as_str(), *port)).await.map_err(bind_error)?;
                let port = listener.local_addr().map_err(bind_error)?.port();
                Ok((Self::Tcp(listener), Endpoint::tcp(host.clone(), port)))
            }
        }
    }

    async fn accept(&self) -> Result<Connection, ServerError> {
        match self {
            #[cfg(unix)]
            Self::Unix(listener) => {
                let (stream, _) = listener.accept().await.map_err(ServerError::Accept)?;
                Ok(Connection::new(stream))
            }
            Self::Tcp(listener) => {
                let (stream, peer) = listener.accept().await.map_err(ServerError::Accept)?;
                stream.set_nodelay(true).map_err(ServerError::Accept)?;
                debug!(%peer, "accepted tcp connection");
                Ok(Connection::new(stream))
            }
        }
    }
}

/// A bound server, ready to accept calls.
pub struct ListeningServer {
    listener: Listener,
    local_endpoint: Endpoint,
    registry: Arc<ServiceRegistry>,
}

impl fmt::Debug for ListeningServer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListeningServer")
            .field("local_endpoint", &self.local_endpoint)
            .field("registry", &self.registry)
            .finish_non_exhaustive()
    }
}

impl ListeningServer {
    /// The address actually bound. A TCP port of 0 is resolved to the real port.
    pub fn local_endpoint(&self) -> &Endpoint {
        &self.local_endpoint
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    /// Accepts connections forever, handling each on its own task.
    pub async fn serve(self) {
        loop {
            let conn = match self.listener.accept().await {
                Ok(conn) => conn,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    // back off on persistent errors such as EMFILE
                    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
                    continue;
                }
            };

            let registry = Arc::clone(&self.registry);
            tokio::spawn(async move {
                if let Err(e) = serve_connection(conn, &registry).await {
                    debug!(error = %e, "connection ended without a reply");
                }
            });
        }
    }

    /// Runs `serve` on a background task.
    pub fn spawn(self) -> ServerHandle {
        let endpoint = self.local_endpoint.clone();
        let task = tokio::spawn(self.serve());
        ServerHandle { endpoint, task }
    }
}

/// Handle to a server running on a background task.
#[derive(Debug)]
pub struct ServerHandle {
    endpoint: Endpoint,
    task: JoinHandle<()>,
}

impl ServerHandle {
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Stops accepting new connections. Calls already dispatched still finish.
    pub fn abort(&self) {
        self.task.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Aborts the accept loop and waits until it has stopped.
    pub async fn stop(self) {
        self.task.abort();
        let _ = self.task.await;
    }
}

/// Handles one connection: a single call followed by its reply.
pub async fn serve_connection(mut conn: Connection, registry: &ServiceRegistry) -> Result<(), ConnectionError> {
    let request = conn.recv().await?;
    let outcome = dispatch(&request, registry).await;
    let reply = encode_reply(outcome.into())?;
    conn.send(&reply).await?;
    conn.close().await
}

/// Decodes a request document and runs the named entry.
pub async fn dispatch(request: &[u8], registry: &ServiceRegistry) -> Outcome {
    let call = match Frame::from_bytes(request) {
        Ok(Frame::Call(call)) => call,
        Ok(Frame::Reply(_)) => {
            return failed(FailureKind::Protocol, "Expected a call frame, received a reply");
        }
        Err(e) => return failed(FailureKind::Protocol, format!("Malformed call frame: {}", e)),
    };

    let Some(entry) = registry.get(&call.name) else {
        debug!(function = %call.name, "call to unknown function");
        return failed(FailureKind::UnknownFunction, format!("No function named '{}'", call.name));
    };

    debug!(function = %call.name, args = call.args.len(), kwargs = call.kwargs.len(), "dispatching call");
    let args = Arguments { positional: call.args, keyword: call.kwargs };
    match tokio::task::spawn_blocking(move || entry.call(args)).await {
        Ok(outcome) => outcome,
        Err(e) if e.is_panic() => {
            let message = panic_message(e.into_panic());
            warn!(function = %call.name, %message, "function panicked");
            failed(FailureKind::Execution, format!("Function panicked: {}", message))
        }
        Err(e) => failed(FailureKind::Execution, e.to_string()),
    }
}

fn failed(kind: FailureKind, message: impl Into<String>) -> Outcome {
    Outcome::Failed(Failure::new(kind, message))
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

fn encode_reply(reply: ReplyFrame) -> Result<Vec<u8>, ConnectionError> {
    let encoded = Frame::Reply(reply).to_bytes();
    match encoded {
        Ok(bytes) if bytes.len() <= MAX_FRAME_LEN => Ok(bytes),
        Ok(bytes) => {
            let failure = Failure::new(
                FailureKind::Serialization,
                format!("Result of {} bytes exceeds the {} byte frame limit", bytes.len(), MAX_FRAME_LEN),
            );
            Frame::Reply(ReplyFrame::Failed(failure))
                .to_bytes()
                .map_err(|e| ConnectionError::Io(format!("Cannot encode reply: {}", e)))
        }
        Err(e) => Err(ConnectionError::Io(format!("Cannot encode reply: {}", e))),
    }
}

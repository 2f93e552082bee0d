//! # Transport
//!
//! Locates the singleton and moves frames over a byte stream.
//!
//! ## Philosophy
//!
//! - **Byte-Oriented**: A `Connection` knows nothing about calls or values.
//!   It moves opaque, length-prefixed documents.
//! - **One Exchange per Connection**: A proxy connects, sends one request,
//!   reads one reply and closes. Connections are never pooled.
//! - **Distinct Absence**: A singleton that is not running is reported as
//!   `ConnectionError::NotRunning`, never as a generic I/O error, so callers
//!   can retry or back off.

use std::fmt;
use std::io;
use std::time::Duration;

use tokio::io::AsyncRead;
use tokio::io::AsyncReadExt;
use tokio::io::AsyncWrite;
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tracing::debug;

use crate::endpoint::Endpoint;

/// Largest document accepted on a connection.
pub const MAX_FRAME_LEN: usize = 64 * 1024 * 1024;

/// Errors that occur while reaching or talking to the singleton.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Nothing is listening at the endpoint (missing socket file or refused connection).
    NotRunning { endpoint: Endpoint },
    /// A configured connect or I/O timeout expired.
    Timeout,
    /// A document exceeded `MAX_FRAME_LEN`.
    FrameTooLarge(usize),
    /// The peer closed the connection before a full document arrived.
    Closed,
    Io(String),
}

impl fmt::Display for ConnectionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotRunning { endpoint } => write!(f, "Singleton not running at {}", endpoint),
            Self::Timeout => write!(f, "Timed out talking to the singleton"),
            Self::FrameTooLarge(len) => {
                write!(f, "Frame of {} bytes exceeds the {} byte limit", len, MAX_FRAME_LEN)
            }
            Self::Closed => write!(f, "Connection closed by peer"),
            Self::Io(msg) => write!(f, "I/O error: {}", msg),
        }
    }
}

impl std::error::Error for ConnectionError {}

impl From<io::Error> for ConnectionError {
    fn from(e: io::Error) -> Self {
        match e.kind() {
            io::ErrorKind::UnexpectedEof => Self::Closed,
            _ => Self::Io(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ConnectionError>;

/// Any bidirectional byte stream a `Connection` can run over.
pub trait Stream: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

impl<T> Stream for T where T: AsyncRead + AsyncWrite + Unpin + Send + 'static {}

/// One live connection to (or from) the singleton.
///
/// Documents are prefixed by their length as a 4-byte little-endian integer.
pub struct Connection {
    stream: Box<dyn Stream>,
    io_timeout: Option<Duration>,
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection").field("io_timeout", &self.io_timeout).finish_non_exhaustive()
    }
}

impl Connection {
    pub fn new(stream: impl Stream) -> Self {
        Self { stream: Box::new(stream), io_timeout: None }
    }

    /// Bounds every subsequent `send`/`recv` by `timeout`.
    pub fn with_io_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.io_timeout = timeout;
        self
    }

    /// Writes one document.
    pub async fn send(&mut self, payload: &[u8]) -> Result<()> {
        if payload.len() > MAX_FRAME_LEN {
            return Err(ConnectionError::FrameTooLarge(payload.len()));
        }
        let io_timeout = self.io_timeout;
        let stream = &mut self.stream;
        with_timeout(io_timeout, async move {
            stream.write_all(&(payload.len() as u32).to_le_bytes()).await?;
            stream.write_all(payload).await?;
            stream.flush().await?;
            Ok::<(), ConnectionError>(())
        })
        .await
    }

    /// Reads one document.
    pub async fn recv(&mut self) -> Result<Vec<u8>> {
        let io_timeout = self.io_timeout;
        let stream = &mut self.stream;
        with_timeout(io_timeout, async move {
            let mut prefix = [0u8; 4];
            stream.read_exact(&mut prefix).await?;
            let len = u32::from_le_bytes(prefix) as usize;
            if len > MAX_FRAME_LEN {
                return Err(ConnectionError::FrameTooLarge(len));
            }
            // grows with the bytes actually received, not the announced length
            let mut body = Vec::new();
            (&mut *stream).take(len as u64).read_to_end(&mut body).await?;
            if body.len() < len {
                return Err(ConnectionError::Closed);
            }
            Ok::<Vec<u8>, ConnectionError>(body)
        })
        .await
    }

    /// Sends a request and waits for its reply.
    pub async fn exchange(&mut self, request: &[u8]) -> Result<Vec<u8>> {
        self.send(request).await?;
        self.recv().await
    }

    /// Shuts down the write half and releases the connection.
    pub async fn close(mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

/// Bounds `fut` by `timeout`, mapping expiry to `ConnectionError::Timeout`.
pub(crate) async fn with_timeout<T, F>(timeout: Option<Duration>, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match timeout {
        Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|_| ConnectionError::Timeout)?,
        None => fut.await,
    }
}

/// Locates the singleton behind an endpoint.
///
/// This trait is object-safe (`Arc<dyn Transport>`).
#[async_trait::async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Opens a fresh connection to `endpoint`.
    ///
    /// # Invariants
    /// - Must return `ConnectionError::NotRunning` when nothing listens there.
    /// - Must not reuse a connection handed out earlier.
    async fn connect(&self, endpoint: &Endpoint) -> Result<Connection>;
}

/// Timeouts applied by `SocketTransport`. `None` waits indefinitely.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TransportOptions {
    pub connect_timeout: Option<Duration>,
    pub io_timeout: Option<Duration>,
}

/// Connects over Unix domain sockets or TCP, as the endpoint dictates.
#[derive(Debug, Clone, Default)]
pub struct SocketTransport {
    options: TransportOptions,
}

impl SocketTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: TransportOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &TransportOptions {
        &self.options
    }
}

#[async_trait::async_trait]
impl Transport for SocketTransport {
    async fn connect(&self, endpoint: &Endpoint) -> Result<Connection> {
        let attempt = async { open_stream(endpoint).await.map_err(|e| classify_connect_error(endpoint, e)) };
        let conn = with_timeout(self.options.connect_timeout, attempt).await?;
        debug!(%endpoint, "connected to singleton");
        Ok(conn.with_io_timeout(self.options.io_timeout))
    }
}

async fn open_stream(endpoint: &Endpoint) -> io::Result<Connection> {
    match endpoint {
        Endpoint::Unix(path) => connect_unix(path).await,
        Endpoint::Tcp { host, port } => {
            let stream = TcpStream::connect((host.as_str(), *port)).await?;
            stream.set_nodelay(true)?;
            Ok(Connection::new(stream))
        }
    }
}

#[cfg(unix)]
async fn connect_unix(path: &std::path::Path) -> io::Result<Connection> {
    let stream = tokio::net::UnixStream::connect(path).await?;
    Ok(Connection::new(stream))
}

#[cfg(not(unix))]
async fn connect_unix(_path: &std::path::Path) -> io::Result<Connection> {
    Err(io::Error::new(io::ErrorKind::Unsupported, "Unix domain sockets are not available"))
}

fn classify_connect_error(endpoint: &Endpoint, e: io::Error) -> ConnectionError {
    match e.kind() {
        io::ErrorKind::NotFound | io::ErrorKind::ConnectionRefused => {
            ConnectionError::NotRunning { endpoint: endpoint.clone() }
        }
        _ => ConnectionError::Io(e.to_string()),
    }
}

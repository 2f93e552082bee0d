//! # Endpoints
//!
//! Where the singleton listens and where proxies connect: a Unix domain
//! socket path, or a TCP host and port.
//!
//! An `Endpoint` holds exactly one of the two forms. Loose configuration
//! (`EndpointConfig`, which may name both) is resolved with the socket path
//! taking precedence.

use std::fmt;
use std::path::Path;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;

/// Socket file used when nothing else is configured.
pub const DEFAULT_SOCKET_PATH: &str = "manager.sock";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// Neither a socket path nor a host was configured.
    MissingHost,
    /// A host was configured without a port.
    MissingPort,
    InvalidPort(String),
    /// An endpoint string could not be parsed.
    Parse(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingHost => write!(f, "Endpoint needs either a socket path or a host and port"),
            Self::MissingPort => write!(f, "Endpoint host given without a port"),
            Self::InvalidPort(port) => write!(f, "Invalid port: {}", port),
            Self::Parse(input) => write!(f, "Cannot parse endpoint: '{}'", input),
        }
    }
}

impl std::error::Error for ConfigError {}

/// The address of the singleton server.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    /// A Unix domain stream socket at this filesystem path.
    Unix(PathBuf),
    /// A TCP listener.
    Tcp { host: String, port: u16 },
}

impl Endpoint {
    pub fn unix(path: impl Into<PathBuf>) -> Self {
        Self::Unix(path.into())
    }

    pub fn tcp(host: impl Into<String>, port: u16) -> Self {
        Self::Tcp { host: host.into(), port }
    }

    /// Returns the socket path for Unix endpoints.
    pub fn socket_path(&self) -> Option<&Path> {
        match self {
            Self::Unix(path) => Some(path),
            Self::Tcp { .. } => None,
        }
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self::Unix(PathBuf::from(DEFAULT_SOCKET_PATH))
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unix(path) => write!(f, "unix:{}", path.display()),
            Self::Tcp { host, port } if host.contains(':') => write!(f, "[{}]:{}", host, port),
            Self::Tcp { host, port } => write!(f, "{}:{}", host, port),
        }
    }
}

/// Parses `unix:<path>`, `tcp://<host>:<port>`, `<host>:<port>`, or a bare
/// socket path (anything containing `/` or ending in `.sock`).
impl FromStr for Endpoint {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let input = s.trim();
        if input.is_empty() {
            return Err(ConfigError::Parse(s.to_string()));
        }

        if let Some(path) = input.strip_prefix("unix:") {
            if path.is_empty() {
                return Err(ConfigError::Parse(s.to_string()));
            }
            return Ok(Self::unix(path));
        }

        if let Some(addr) = input.strip_prefix("tcp://") {
            return parse_host_port(addr).unwrap_or_else(|| Err(ConfigError::Parse(s.to_string())));
        }

        if input.contains('/') || input.ends_with(".sock") {
            return Ok(Self::unix(input));
        }

        parse_host_port(input).unwrap_or_else(|| Err(ConfigError::Parse(s.to_string())))
    }
}

fn parse_host_port(addr: &str) -> Option<Result<Endpoint, ConfigError>> {
    let (host, port) = addr.rsplit_once(':')?;
    let host = host.strip_prefix('[').and_then(|h| h.strip_suffix(']')).unwrap_or(host);
    if host.is_empty() {
        return None;
    }
    Some(
        port.parse::<u16>()
            .map(|port| Endpoint::tcp(host, port))
            .map_err(|_| ConfigError::InvalidPort(port.to_string())),
    )
}

/// Endpoint settings as they appear in configuration files.
///
/// `socket_path` and `hostname` are accepted as aliases.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(default, alias = "socket_path", skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    #[serde(default, alias = "hostname", skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl EndpointConfig {
    /// Reads `<PREFIX>_SOCKET_PATH`, `<PREFIX>_HOST` and `<PREFIX>_PORT` from
    /// the process environment.
    pub fn from_env(prefix: &str) -> Result<Self, ConfigError> {
        Self::from_lookup(prefix, |key| std::env::var(key).ok())
    }

    /// Like `from_env`, reading variables through `lookup`.
    pub fn from_lookup<F>(prefix: &str, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |suffix: &str| lookup(&format!("{}_{}", prefix, suffix)).filter(|v| !v.is_empty());

        let port = match var("PORT") {
            Some(raw) => Some(raw.trim().parse::<u16>().map_err(|_| ConfigError::InvalidPort(raw.clone()))?),
            None => None,
        };

        Ok(Self {
            path: var("SOCKET_PATH").map(PathBuf::from),
            host: var("HOST"),
            port,
        })
    }
}

impl From<&Endpoint> for EndpointConfig {
    fn from(endpoint: &Endpoint) -> Self {
        match endpoint {
            Endpoint::Unix(path) => Self { path: Some(path.clone()), ..Self::default() },
            Endpoint::Tcp { host, port } => Self {
                host: Some(host.clone()),
                port: Some(*port),
                ..Self::default()
            },
        }
    }
}

impl TryFrom<EndpointConfig> for Endpoint {
    type Error = ConfigError;

    fn try_from(config: EndpointConfig) -> Result<Self, Self::Error> {
        if let Some(path) = config.path {
            return Ok(Self::Unix(path));
        }
        let host = config.host.ok_or(ConfigError::MissingHost)?;
        let port = config.port.ok_or(ConfigError::MissingPort)?;
        Ok(Self::Tcp { host, port })
    }
}

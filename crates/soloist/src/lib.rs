//! # Soloist
//!
//! Singleton-only functions: whichever process calls one, it runs in exactly
//! one host process (the singleton) and the caller gets the result back as
//! if the call were local.
//!
//! ## Components
//!
//! - **Serializer** (`serializer`): arguments and results to byte payloads.
//! - **Transport** (`transport`): reaches the singleton over a Unix socket or TCP.
//! - **Registry** (`registry`): the functions the singleton can run.
//! - **Binder** (`bind`, `proxy`): turns a handler into a registry entry and a proxy.
//! - **Server** (`server`): hosts the registry on the endpoint.
//!
//! `Singleton` bundles all of them:
//!
//! ```no_run
//! use serde_json::json;
//! use soloist::{Arguments, Endpoint, Singleton};
//!
//! # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
//! let singleton = Singleton::new(Endpoint::unix("/tmp/manager.sock"));
//! let add = singleton.run_on("add", |args: Arguments<serde_json::Value>| {
//!     let sum = args.typed::<i64>(0)? + args.typed::<i64>(1)?;
//!     Ok(Some(sum.into()))
//! });
//!
//! let _server = singleton.spawn().await?;
//! let sum: Option<i64> = add.invoke(Arguments::positional([json!(2), json!(3)])).await?;
//! assert_eq!(sum, Some(5));
//! # Ok(())
//! # }
//! ```

pub mod arguments;
pub mod bind;
pub mod endpoint;
pub mod proxy;
pub mod registry;
pub mod serializer;
pub mod server;
pub mod singleton;
pub mod transport;

pub use arguments::Arguments;
pub use bind::Binder;
pub use bind::Binding;
pub use endpoint::ConfigError;
pub use endpoint::Endpoint;
pub use endpoint::EndpointConfig;
pub use proxy::CallError;
pub use proxy::Proxy;
pub use registry::ExposedFunction;
pub use registry::Outcome;
pub use registry::ServiceRegistry;
pub use serializer::JsonSerializer;
pub use serializer::PackSerializer;
pub use serializer::Passthrough;
pub use serializer::SerializationError;
pub use serializer::Serializer;
pub use server::ListeningServer;
pub use server::ServerError;
pub use server::ServerHandle;
pub use server::SingletonServer;
pub use singleton::Singleton;
pub use transport::Connection;
pub use transport::ConnectionError;
pub use transport::SocketTransport;
pub use transport::Transport;
pub use transport::TransportOptions;

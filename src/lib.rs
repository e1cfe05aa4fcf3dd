//! # tds-client-core
//!
//! Wire-level core of a SQL Server (TDS) client driver.
//!
//! This crate sits below the token-stream parser. It moves packets, not
//! rows: it frames outgoing messages into TDS packets, reassembles incoming
//! ones, multiplexes sessions over one connection with SMP (MARS), and
//! hands authentication and enclave-session state to the layers above.
//!
//! ## Architecture
//!
//! - **Transport**: managed (tokio) or native (blocking connect) backend,
//!   chosen once per process from a configuration switch
//! - **Session**: one TDS conversation; direct writes or a batching writer
//!   task, optionally carried inside an SMP session
//! - **Auth**: provider registry, deadline-bounded token acquisition and the
//!   AD login timeout-retry state
//! - **Enclave**: cache of attestation sessions keyed by server and URL
//!
//! ## Example
//!
//! ```ignore
//! use tds_client_core::{DriverConfig, DriverContext, Endpoint, protocol::packet_type};
//!
//! #[tokio::main]
//! async fn main() -> tds_client_core::Result<()> {
//!     let context = DriverContext::new(DriverConfig::default().with_env_overrides())?;
//!     let parser = context.parser("db.example.com");
//!
//!     let mut session = context.session_factory().create_session(&parser);
//!     session
//!         .connect(&Endpoint::tcp("db.example.com", 1433), context.config().connection_timeout)
//!         .await?;
//!     session.send_message(packet_type::SQL_BATCH, &batch).await?;
//!     let reply = session.read_message().await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod codec;
pub mod config;
pub mod context;
pub mod enclave;
pub mod error;
pub mod protocol;
pub mod session;
pub mod stream;
pub mod transport;
pub mod writer;

pub use config::DriverConfig;
pub use context::{DriverContext, DriverContextBuilder};
pub use error::{Result, TdsError};
pub use session::{ProtocolSession, SessionFactory, TdsParser};
pub use stream::TdsOutputStream;
pub use transport::{Endpoint, NetworkingBackend};

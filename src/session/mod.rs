//! Session module - protocol sessions and their construction.
//!
//! - [`TdsParser`]: per-connection parser settings a session is created for
//! - [`ProtocolSession`]: packet I/O for one TDS conversation
//! - [`MarsConnection`] / [`MarsSession`]: SMP multiplexing
//! - [`SessionFactory`]: binds new sessions to the selected backend

mod factory;
mod mars;
mod protocol;

use uuid::Uuid;

use crate::protocol::DEFAULT_PACKET_SIZE;

pub use factory::SessionFactory;
pub use mars::{MarsConnection, MarsSession};
pub use protocol::ProtocolSession;

/// Parser handle: the connection-level settings sessions are created from.
#[derive(Debug, Clone)]
pub struct TdsParser {
    /// Server name, used for logging.
    pub server: String,
    /// Requested packet size; clamped when a session is created.
    pub packet_size: usize,
    /// Multiplex sessions over the physical connection.
    pub mars_enabled: bool,
    /// Physical session writes through the writer task.
    pub async_write: bool,
    /// Client connection id, carried into logs and token requests.
    pub connection_id: Uuid,
}

impl TdsParser {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            server: server.into(),
            packet_size: DEFAULT_PACKET_SIZE,
            mars_enabled: false,
            async_write: false,
            connection_id: Uuid::new_v4(),
        }
    }

    pub fn with_packet_size(mut self, packet_size: usize) -> Self {
        self.packet_size = packet_size;
        self
    }

    pub fn with_mars(mut self, enabled: bool) -> Self {
        self.mars_enabled = enabled;
        self
    }

    pub fn with_async_write(mut self, enabled: bool) -> Self {
        self.async_write = enabled;
        self
    }
}

//! Session factory.
//!
//! Every session is bound to the backend the selector reports at creation
//! time. Since the selector never changes its answer, all sessions created
//! by one factory share a backend.

use std::sync::Arc;

use super::{ProtocolSession, TdsParser};
use crate::error::{Result, TdsError};
use crate::transport::{BackendSelector, NetworkingBackend};
use crate::writer::WriterConfig;

/// Creates protocol sessions bound to the selected networking backend.
#[derive(Debug, Clone)]
pub struct SessionFactory {
    selector: Arc<BackendSelector>,
    writer_config: WriterConfig,
}

impl SessionFactory {
    pub fn new(selector: Arc<BackendSelector>, writer_config: WriterConfig) -> Self {
        Self {
            selector,
            writer_config,
        }
    }

    /// Backend new sessions will use.
    pub fn backend(&self) -> NetworkingBackend {
        self.selector.current()
    }

    /// Create an unconnected physical session. Performs no I/O.
    pub fn create_session(&self, parser: &TdsParser) -> ProtocolSession {
        ProtocolSession::new(
            self.selector.backend(),
            parser.clone(),
            parser.async_write,
            self.writer_config.clone(),
        )
    }

    /// Create a child session multiplexed over `parent`'s connection.
    ///
    /// # Errors
    ///
    /// Fails if `parent` is not a connected MARS session. Failures opening the
    /// logical session propagate unchanged.
    pub async fn create_mars_session(
        &self,
        parser: &TdsParser,
        parent: &ProtocolSession,
        async_write: bool,
    ) -> Result<ProtocolSession> {
        if !parser.mars_enabled {
            return Err(TdsError::Protocol(
                "MARS is not enabled for this connection".into(),
            ));
        }
        let connection = parent.mars_connection().ok_or_else(|| {
            TdsError::Protocol("Parent session has no MARS connection".into())
        })?;

        let mars = connection.open_session().await?;
        let mut session = ProtocolSession::new(
            self.selector.backend(),
            parser.clone(),
            async_write,
            self.writer_config.clone(),
        );
        session.attach_mars(mars);
        Ok(session)
    }
}

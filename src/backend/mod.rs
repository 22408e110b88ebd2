//! Access to the authoritative drawing state.

pub mod http;
pub mod simulated;

use async_trait::async_trait;

use crate::domain::{DrawCommand, SessionId, Snapshot};

pub use http::{HttpBackendConfig, HttpDrawingBackend};
pub use simulated::SimulatedBackend;

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid endpoint: {0}")]
    Endpoint(#[from] url::ParseError),
    #[error("backend returned {status}: {message}")]
    Status { status: u16, message: String },
    #[error("drawing {0} not found")]
    NotFound(SessionId),
    #[error("{command} rejected: {reason}")]
    Rejected {
        command: DrawCommand,
        reason: String,
    },
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

impl BackendError {
    pub fn rejected(command: DrawCommand, reason: impl Into<String>) -> Self {
        Self::Rejected {
            command,
            reason: reason.into(),
        }
    }
}

/// Server side of a drawing: a snapshot query plus the three commands.
///
/// Every command answers with the snapshot as it stands after the command.
#[async_trait]
pub trait DrawingBackend: Send + Sync {
    async fn drawing_state(&self, session: SessionId) -> Result<Snapshot, BackendError>;

    async fn start_drawing(&self, session: SessionId) -> Result<Snapshot, BackendError>;

    async fn reveal_next(&self, session: SessionId) -> Result<Snapshot, BackendError>;

    async fn reset_drawing(&self, session: SessionId) -> Result<Snapshot, BackendError>;

    async fn execute(
        &self,
        session: SessionId,
        command: DrawCommand,
    ) -> Result<Snapshot, BackendError> {
        match command {
            DrawCommand::Start => self.start_drawing(session).await,
            DrawCommand::RevealNext => self.reveal_next(session).await,
            DrawCommand::Reset => self.reset_drawing(session).await,
        }
    }
}

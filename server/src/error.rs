use crate::players::RegistryError;
use crate::world::WorldError;
use protocol::ProtocolError;
use thiserror::Error;

/// Why a session ended.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("connection error: {0}")]
    Io(#[from] std::io::Error),
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("authentication failed for {username}")]
    AuthenticationFailed { username: String },
    #[error("admission refused: {0}")]
    Registry(#[from] RegistryError),
    #[error("kicked: {0}")]
    Kicked(String),
    #[error("timed out")]
    TimedOut,
    #[error("world error: {0}")]
    World(#[from] WorldError),
}

impl SessionError {
    /// The text sent to the peer in a disconnect packet, if the failure
    /// leaves a usable connection to send it on.
    pub fn disconnect_reason(&self) -> Option<String> {
        match self {
            SessionError::AuthenticationFailed { .. } => {
                Some("Invalid Mppass. Please authenticate.".to_string())
            }
            SessionError::Registry(RegistryError::Full) => Some("Server is full!".to_string()),
            SessionError::Registry(RegistryError::AlreadyJoined(_)) => {
                Some("Already logged in!".to_string())
            }
            SessionError::Kicked(reason) => Some(reason.clone()),
            SessionError::World(_) => Some("Could not send the level".to_string()),
            SessionError::Io(_) | SessionError::Protocol(_) | SessionError::TimedOut => None,
        }
    }
}

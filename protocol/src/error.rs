use thiserror::Error;

/// Failures raised while reading packets off the wire.
#[derive(Debug, Error)]
pub enum ProtocolError {
    /// The stream was closed or reset mid-packet.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// A packet id with no known body layout was read.
    #[error("unknown packet id {0:#04x}")]
    UnknownPacket(u8),

    /// A specific packet was mandatory at this point of the exchange.
    #[error("expected packet {expected:#04x}, got {found:#04x}")]
    UnexpectedPacket { expected: u8, found: u8 },

    #[error("unsupported protocol version {0:#04x}")]
    UnsupportedVersion(u8),

    #[error("invalid identification trailer byte {0:#04x}")]
    InvalidMagic(u8),

    #[error("invalid extension count {0}")]
    InvalidExtensionCount(i16),
}

impl ProtocolError {
    /// True when the failure came from the transport rather than the peer's bytes.
    pub fn is_io(&self) -> bool {
        matches!(self, ProtocolError::Io(_))
    }
}

pub type ProtocolResult<T> = Result<T, ProtocolError>;

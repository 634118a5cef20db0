use framelink_port::PortError;

/// Errors that can occur during frame encoding, sending and receiving.
///
/// Corrupt frames never show up here: the decoder skips them and keeps
/// scanning.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The payload does not fit the one-byte length field (or the configured cap).
    #[error("invalid payload size ({size} bytes, max {max})")]
    InvalidPayloadSize { size: usize, max: usize },

    /// Send or receive was attempted on a port that is not open.
    #[error("port {port} is closed")]
    PortClosed { port: String },

    /// The underlying port failed.
    #[error("port error: {0}")]
    Port(#[from] PortError),

    /// An I/O error occurred on a plain reader.
    #[error("frame I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, FrameError>;

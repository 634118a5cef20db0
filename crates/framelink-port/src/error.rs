/// Errors that can occur in port operations.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    /// Failed to open the port.
    #[error("failed to open {port}: {source}")]
    Open {
        port: String,
        source: std::io::Error,
    },

    /// An operation was attempted on a port that is not open.
    #[error("port {port} is not open")]
    NotOpen { port: String },

    /// The requested baud rate has no termios equivalent on this platform.
    #[error("unsupported baud rate {baud} for {port}")]
    UnsupportedBaud { port: String, baud: u32 },

    /// An I/O error occurred on an open port.
    #[error("I/O error on {port}: {source}")]
    Io {
        port: String,
        source: std::io::Error,
    },

    /// The remote side hung up.
    #[error("port {port} disconnected")]
    Disconnected { port: String },

    /// A port spec string could not be parsed.
    #[error("invalid port spec {spec:?}: {reason}")]
    InvalidSpec { spec: String, reason: &'static str },
}

impl PortError {
    pub(crate) fn io(port: &str, source: std::io::Error) -> Self {
        Self::Io {
            port: port.to_string(),
            source,
        }
    }

    pub(crate) fn not_open(port: &str) -> Self {
        Self::NotOpen {
            port: port.to_string(),
        }
    }

    /// Name of the port this error refers to, if any.
    pub fn port(&self) -> Option<&str> {
        match self {
            Self::Open { port, .. }
            | Self::NotOpen { port }
            | Self::UnsupportedBaud { port, .. }
            | Self::Io { port, .. }
            | Self::Disconnected { port } => Some(port),
            Self::InvalidSpec { .. } => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PortError>;

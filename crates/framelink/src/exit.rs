use std::fmt;
use std::io;

use framelink_bridge::BridgeError;
use framelink_frame::FrameError;
use framelink_port::PortError;

pub const SUCCESS: i32 = 0;
pub const FAILURE: i32 = 1;
pub const TRANSPORT_ERROR: i32 = 3;
pub const PERMISSION_DENIED: i32 = 50;
pub const DATA_INVALID: i32 = 60;
pub const USAGE: i32 = 64;
pub const TIMEOUT: i32 = 124;
pub const INTERNAL: i32 = 125;

pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug)]
pub struct CliError {
    pub code: i32,
    pub message: String,
}

impl CliError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for CliError {}

pub fn io_error(context: &str, err: io::Error) -> CliError {
    let code = match err.kind() {
        io::ErrorKind::PermissionDenied => PERMISSION_DENIED,
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock => TIMEOUT,
        io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionRefused => FAILURE,
        _ => INTERNAL,
    };
    CliError::new(code, format!("{context}: {err}"))
}

pub fn port_error(context: &str, err: PortError) -> CliError {
    match err {
        PortError::Open { ref source, .. } if source.kind() == io::ErrorKind::PermissionDenied => {
            CliError::new(PERMISSION_DENIED, format!("{context}: {err}"))
        }
        PortError::Open { .. } => CliError::new(TRANSPORT_ERROR, format!("{context}: {err}")),
        PortError::UnsupportedBaud { .. } | PortError::InvalidSpec { .. } => {
            CliError::new(USAGE, format!("{context}: {err}"))
        }
        PortError::NotOpen { .. } | PortError::Disconnected { .. } => {
            CliError::new(FAILURE, format!("{context}: {err}"))
        }
        PortError::Io { port, source } => io_error(&format!("{context} ({port})"), source),
    }
}

pub fn frame_error(context: &str, err: FrameError) -> CliError {
    match err {
        FrameError::Port(err) => port_error(context, err),
        FrameError::Io(source) => io_error(context, source),
        FrameError::InvalidPayloadSize { .. } => {
            CliError::new(DATA_INVALID, format!("{context}: {err}"))
        }
        FrameError::PortClosed { .. } => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

pub fn bridge_error(context: &str, err: BridgeError) -> CliError {
    match err {
        BridgeError::ConnectFailed { .. } => {
            CliError::new(TRANSPORT_ERROR, format!("{context}: {err}"))
        }
        BridgeError::NoSecondaries => CliError::new(USAGE, format!("{context}: {err}")),
        BridgeError::CloseFailed { .. } => CliError::new(FAILURE, format!("{context}: {err}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn open_failures_map_to_transport_error() {
        let err = port_error(
            "open failed",
            PortError::Open {
                port: "/dev/ttyACM9".to_string(),
                source: io::Error::from(io::ErrorKind::NotFound),
            },
        );
        assert_eq!(err.code, TRANSPORT_ERROR);
        assert!(err.message.starts_with("open failed: "));
    }

    #[test]
    fn oversized_payload_is_data_invalid() {
        let err = frame_error(
            "send failed",
            FrameError::InvalidPayloadSize { size: 300, max: 255 },
        );
        assert_eq!(err.code, DATA_INVALID);
    }

    #[test]
    fn nested_port_errors_keep_their_code() {
        let err = frame_error(
            "send failed",
            FrameError::Port(PortError::UnsupportedBaud {
                port: "x".to_string(),
                baud: 7,
            }),
        );
        assert_eq!(err.code, USAGE);

        let err = bridge_error(
            "bridge failed",
            BridgeError::ConnectFailed {
                endpoint: "p".to_string(),
                attempts: 3,
                source: PortError::NotOpen {
                    port: "p".to_string(),
                },
            },
        );
        assert_eq!(err.code, TRANSPORT_ERROR);
    }

    #[test]
    fn bridge_lifecycle_errors_have_distinct_codes() {
        assert_eq!(
            bridge_error("bridge setup failed", BridgeError::NoSecondaries).code,
            USAGE
        );
        let err = bridge_error(
            "bridge shutdown incomplete",
            BridgeError::CloseFailed {
                endpoints: vec!["s1".to_string(), "s2".to_string()],
            },
        );
        assert_eq!(err.code, FAILURE);
        assert!(err.message.ends_with("s1, s2"));
    }

    #[test]
    fn io_timeouts_map_to_timeout() {
        let err = io_error("read", io::Error::from(io::ErrorKind::TimedOut));
        assert_eq!(err.code, TIMEOUT);
    }
}

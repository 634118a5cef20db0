use framelink_port::PortError;

/// Errors that can occur while starting, running or stopping a bridge.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// An endpoint could not be opened within the retry budget.
    #[error("could not open {endpoint} after {attempts} attempt(s): {source}")]
    ConnectFailed {
        endpoint: String,
        attempts: u32,
        source: PortError,
    },

    /// A bridge needs something to mirror to.
    #[error("bridge requires at least one secondary endpoint")]
    NoSecondaries,

    /// One or more endpoints reported an error while closing.
    #[error("failed to close endpoint(s): {}", .endpoints.join(", "))]
    CloseFailed { endpoints: Vec<String> },
}

pub type Result<T> = std::result::Result<T, BridgeError>;

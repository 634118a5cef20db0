//! Transparent byte relay between one primary serial endpoint and any
//! number of secondaries.
//!
//! The bridge never looks inside the bytes it moves: whatever the primary
//! sends reaches every secondary, and whatever a secondary sends reaches the
//! primary. Ports are opened with bounded retries and closed exactly once on
//! every exit path.

pub mod bridge;
pub mod control;
pub mod endpoint;
pub mod error;
pub mod retry;

pub use bridge::{
    Bridge, BridgeConfig, BridgeStats, CycleReport, DEFAULT_CHUNK_SIZE, DEFAULT_ERROR_PAUSE,
    DEFAULT_IDLE_INTERVAL, DEFAULT_POLL_READ_TIMEOUT,
};
pub use control::{Sleeper, StopSignal, StopToken, ThreadSleeper};
pub use endpoint::{Endpoint, Role};
pub use error::{BridgeError, Result};
pub use retry::{connect_with_retry, RetryPolicy, DEFAULT_BACKOFF, DEFAULT_MAX_ATTEMPTS};

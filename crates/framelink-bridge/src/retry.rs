use std::time::Duration;

use framelink_port::StreamPort;
use tracing::{info, warn};

use crate::control::Sleeper;
use crate::error::{BridgeError, Result};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF: Duration = Duration::from_secs(1);

/// How hard to try when opening an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct RetryPolicy {
    /// Total open attempts; zero is treated as one.
    pub max_attempts: u32,
    /// Pause between consecutive failed attempts.
    #[serde(with = "duration_ms")]
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Duration) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }

    fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Open `port`, retrying per `policy`.
///
/// Returns the number of attempts used. After a successful open any stale
/// input is discarded; a failure to do so is logged and otherwise ignored.
pub fn connect_with_retry<P, S>(port: &mut P, policy: &RetryPolicy, sleeper: &mut S) -> Result<u32>
where
    P: StreamPort + ?Sized,
    S: Sleeper + ?Sized,
{
    let max = policy.attempts();
    let mut attempt = 1;
    loop {
        match port.open() {
            Ok(()) => {
                info!(port = %port.name(), baud = port.settings().baud, attempt, "opened endpoint");
                if let Err(err) = port.clear_input() {
                    warn!(port = %port.name(), error = %err, "failed to clear stale input");
                }
                return Ok(attempt);
            }
            Err(err) if attempt < max => {
                warn!(port = %port.name(), attempt, max, error = %err, "open failed, retrying");
                sleeper.sleep(policy.backoff);
                attempt += 1;
            }
            Err(err) => {
                warn!(port = %port.name(), attempt, max, error = %err, "open failed, giving up");
                return Err(BridgeError::ConnectFailed {
                    endpoint: port.name().to_string(),
                    attempts: attempt,
                    source: err,
                });
            }
        }
    }
}

pub(crate) mod duration_ms {
    use std::time::Duration;

    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis().min(u128::from(u64::MAX)) as u64)
    }
}

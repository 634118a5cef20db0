use framelink_port::{BoxedPort, PortError, StreamPort};
use tracing::{debug, warn};

use crate::control::Sleeper;
use crate::error::{BridgeError, Result};
use crate::retry::{connect_with_retry, RetryPolicy};

/// Which side of the bridge an endpoint sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Primary,
    Secondary,
}

/// One bridged port plus the lifecycle bookkeeping around it.
///
/// An endpoint is closed at most once per successful open, either through
/// [`Endpoint::close`] or when it is dropped.
pub struct Endpoint {
    port: BoxedPort,
    role: Role,
    opened: bool,
    open_attempts: u32,
}

impl Endpoint {
    pub fn new(port: BoxedPort, role: Role) -> Self {
        Self {
            port,
            role,
            opened: false,
            open_attempts: 0,
        }
    }

    pub fn name(&self) -> &str {
        self.port.name()
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn baud(&self) -> u32 {
        self.port.settings().baud
    }

    /// Whether this endpoint was opened and has not been closed since.
    pub fn is_open(&self) -> bool {
        self.opened
    }

    /// Attempts spent by the most recent [`Endpoint::connect`].
    pub fn open_attempts(&self) -> u32 {
        self.open_attempts
    }

    /// Open the port with retries. A no-op if already open.
    pub fn connect<S: Sleeper + ?Sized>(&mut self, policy: &RetryPolicy, sleeper: &mut S) -> Result<()> {
        if self.opened {
            return Ok(());
        }
        match connect_with_retry(self.port.as_mut(), policy, sleeper) {
            Ok(attempts) => {
                self.open_attempts = attempts;
                self.opened = true;
                Ok(())
            }
            Err(err) => {
                if let BridgeError::ConnectFailed { attempts, .. } = &err {
                    self.open_attempts = *attempts;
                }
                Err(err)
            }
        }
    }

    /// Close the port if this endpoint opened it.
    pub fn close(&mut self) -> std::result::Result<(), PortError> {
        if !self.opened {
            return Ok(());
        }
        self.opened = false;
        debug!(port = %self.name(), role = ?self.role, "closing endpoint");
        self.port.close()
    }

    pub(crate) fn port_mut(&mut self) -> &mut dyn StreamPort {
        self.port.as_mut()
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("name", &self.name())
            .field("role", &self.role)
            .field("opened", &self.opened)
            .finish()
    }
}

impl Drop for Endpoint {
    fn drop(&mut self) {
        if let Err(err) = self.close() {
            warn!(error = %err, "failed to close endpoint on drop");
        }
    }
}

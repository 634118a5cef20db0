use std::fmt;
use std::str::FromStr;

use crate::error::PortError;
use crate::memory::MemoryPort;
use crate::traits::{BoxedPort, PortSettings};

/// Where a port lives, parsed from a command-line style string.
///
/// - `unix:<path>`: Unix domain socket endpoint
/// - `mem:<name>`: detached in-memory port (dry runs)
/// - anything else: serial device path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortSpec {
    Device(String),
    UnixSocket(String),
    Memory(String),
}

impl PortSpec {
    /// The identity portion of the spec (path or name).
    pub fn name(&self) -> &str {
        match self {
            Self::Device(name) | Self::UnixSocket(name) | Self::Memory(name) => name,
        }
    }

    /// Build a closed port for this spec.
    pub fn into_port(self, baud: u32) -> BoxedPort {
        match self {
            #[cfg(unix)]
            Self::Device(path) => Box::new(crate::tty::TtyPort::new(PortSettings::new(path, baud))),
            #[cfg(unix)]
            Self::UnixSocket(path) => Box::new(crate::uds::UnixSocketPort::new(PortSettings::new(
                path, baud,
            ))),
            #[cfg(not(unix))]
            Self::Device(name) | Self::UnixSocket(name) => {
                let (port, _handle) = MemoryPort::with_settings(PortSettings::new(name, baud));
                Box::new(port)
            }
            Self::Memory(name) => {
                let (port, _handle) = MemoryPort::with_settings(PortSettings::new(name, baud));
                Box::new(port)
            }
        }
    }
}

impl FromStr for PortSpec {
    type Err = PortError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason| PortError::InvalidSpec {
            spec: s.to_string(),
            reason,
        };

        if s.trim().is_empty() {
            return Err(invalid("empty port spec"));
        }
        if let Some(path) = s.strip_prefix("unix:") {
            if path.is_empty() {
                return Err(invalid("missing socket path after unix:"));
            }
            return Ok(Self::UnixSocket(path.to_string()));
        }
        if let Some(name) = s.strip_prefix("mem:") {
            if name.is_empty() {
                return Err(invalid("missing name after mem:"));
            }
            return Ok(Self::Memory(name.to_string()));
        }
        Ok(Self::Device(s.to_string()))
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device(path) => write!(f, "{path}"),
            Self::UnixSocket(path) => write!(f, "unix:{path}"),
            Self::Memory(name) => write!(f, "mem:{name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::traits::StreamPort;

    #[test]
    fn parses_each_kind() {
        assert_eq!(
            "/dev/ttyACM0".parse::<PortSpec>().unwrap(),
            PortSpec::Device("/dev/ttyACM0".to_string())
        );
        assert_eq!(
            "unix:/tmp/v1.sock".parse::<PortSpec>().unwrap(),
            PortSpec::UnixSocket("/tmp/v1.sock".to_string())
        );
        assert_eq!(
            "mem:loop".parse::<PortSpec>().unwrap(),
            PortSpec::Memory("loop".to_string())
        );
    }

    #[test]
    fn rejects_empty_specs() {
        assert!(matches!(
            "".parse::<PortSpec>(),
            Err(PortError::InvalidSpec { .. })
        ));
        assert!(matches!(
            "unix:".parse::<PortSpec>(),
            Err(PortError::InvalidSpec { .. })
        ));
        assert!(matches!(
            "mem:".parse::<PortSpec>(),
            Err(PortError::InvalidSpec { .. })
        ));
    }

    #[test]
    fn display_round_trips() {
        for raw in ["/dev/ttyUSB1", "unix:/tmp/a.sock", "mem:x"] {
            assert_eq!(raw.parse::<PortSpec>().unwrap().to_string(), raw);
        }
    }

    #[test]
    fn built_port_is_closed_and_named() {
        let port = "mem:probe".parse::<PortSpec>().unwrap().into_port(115200);
        assert!(!port.is_open());
        assert_eq!(port.name(), "probe");
        assert_eq!(port.settings().baud, 115200);
    }
}

//! Byte-stream port abstraction.
//!
//! Provides a uniform, pollable interface over the connections framelink
//! relays and frames:
//! - Serial devices (`TtyPort`, Unix only)
//! - Unix domain socket endpoints (`UnixSocketPort`)
//! - In-memory ports for tests (`MemoryPort`)
//!
//! This is the lowest layer of framelink. The frame codec and the bridge
//! only ever talk to a [`StreamPort`].

pub mod error;
pub mod memory;
pub mod spec;
pub mod traits;

#[cfg(unix)]
mod sys;
#[cfg(unix)]
pub mod tty;
#[cfg(unix)]
pub mod uds;

pub use error::{PortError, Result};
pub use memory::{MemoryPort, MemoryPortHandle};
pub use spec::PortSpec;
pub use traits::{BoxedPort, PortSettings, StreamPort, DEFAULT_BAUD};

#[cfg(unix)]
pub use tty::TtyPort;
#[cfg(unix)]
pub use uds::UnixSocketPort;

//! Checksummed serial framing and a transparent serial port bridge.
//!
//! # Crate Structure
//!
//! - [`port`]: byte-stream port abstraction (serial devices, Unix sockets, in-memory)
//! - [`frame`]: `AA | len | payload | xor` framing with resynchronizing decode
//! - [`bridge`]: one-to-many raw byte relay between ports

/// Re-export port types.
pub mod port {
    pub use framelink_port::*;
}

/// Re-export frame types.
pub mod frame {
    pub use framelink_frame::*;
}

/// Re-export bridge types.
pub mod bridge {
    pub use framelink_bridge::*;
}

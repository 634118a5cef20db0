use std::collections::VecDeque;
use std::io::ErrorKind;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use crate::error::{PortError, Result};
use crate::traits::{PortSettings, StreamPort};

#[derive(Debug, Default)]
struct State {
    open: bool,
    inbound: VecDeque<u8>,
    outbound: Vec<u8>,
    open_failures: u32,
    io_failures: u32,
    close_failures: u32,
    opens: u32,
    open_attempts: u32,
    closes: u32,
    flushes: u32,
}

/// In-memory port for tests and dry runs.
///
/// Reads drain bytes injected through a [`MemoryPortHandle`]; writes are
/// collected for the handle to inspect. A read with nothing queued returns
/// immediately as if its timeout had elapsed.
#[derive(Debug)]
pub struct MemoryPort {
    settings: PortSettings,
    state: Arc<Mutex<State>>,
}

/// Remote-side control of a [`MemoryPort`].
#[derive(Debug, Clone)]
pub struct MemoryPortHandle {
    state: Arc<Mutex<State>>,
}

impl MemoryPort {
    /// Create a closed in-memory port and the handle that drives it.
    pub fn new(name: impl Into<String>) -> (Self, MemoryPortHandle) {
        Self::with_settings(PortSettings::new(name, crate::DEFAULT_BAUD))
    }

    /// Like [`MemoryPort::new`] with explicit settings.
    pub fn with_settings(settings: PortSettings) -> (Self, MemoryPortHandle) {
        let state = Arc::new(Mutex::new(State::default()));
        let handle = MemoryPortHandle {
            state: Arc::clone(&state),
        };
        (Self { settings, state }, handle)
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        lock(&self.state)
    }

    fn open_state(&self) -> Result<MutexGuard<'_, State>> {
        let state = self.lock();
        if !state.open {
            return Err(PortError::not_open(&self.settings.name));
        }
        Ok(state)
    }

    fn injected_failure(&self, state: &mut State) -> Result<()> {
        if state.io_failures > 0 {
            state.io_failures -= 1;
            return Err(PortError::io(
                &self.settings.name,
                std::io::Error::other("injected I/O failure"),
            ));
        }
        Ok(())
    }
}

impl StreamPort for MemoryPort {
    fn settings(&self) -> &PortSettings {
        &self.settings
    }

    fn is_open(&self) -> bool {
        self.lock().open
    }

    fn open(&mut self) -> Result<()> {
        let mut state = self.lock();
        if state.open {
            return Ok(());
        }
        state.open_attempts += 1;
        if state.open_failures > 0 {
            state.open_failures -= 1;
            return Err(PortError::Open {
                port: self.settings.name.clone(),
                source: std::io::Error::new(ErrorKind::NotFound, "injected open failure"),
            });
        }
        state.open = true;
        state.opens += 1;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        let mut state = self.lock();
        if !state.open {
            return Ok(());
        }
        state.open = false;
        state.closes += 1;
        if state.close_failures > 0 {
            state.close_failures -= 1;
            return Err(PortError::io(
                &self.settings.name,
                std::io::Error::other("injected close failure"),
            ));
        }
        Ok(())
    }

    fn bytes_available(&mut self) -> Result<usize> {
        let mut state = self.open_state()?;
        self.injected_failure(&mut state)?;
        Ok(state.inbound.len())
    }

    fn read(&mut self, buf: &mut [u8], _timeout: Duration) -> Result<usize> {
        let mut state = self.open_state()?;
        self.injected_failure(&mut state)?;
        let n = buf.len().min(state.inbound.len());
        for (slot, byte) in buf.iter_mut().zip(state.inbound.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }

    fn write(&mut self, data: &[u8]) -> Result<()> {
        let mut state = self.open_state()?;
        self.injected_failure(&mut state)?;
        state.outbound.extend_from_slice(data);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        let mut state = self.open_state()?;
        state.flushes += 1;
        Ok(())
    }

    fn clear_input(&mut self) -> Result<()> {
        let mut state = self.open_state()?;
        state.inbound.clear();
        Ok(())
    }
}

impl MemoryPortHandle {
    /// Queue bytes for the port to read.
    pub fn push_inbound(&self, bytes: &[u8]) {
        lock(&self.state).inbound.extend(bytes.iter().copied());
    }

    /// Take everything written to the port so far.
    pub fn take_outbound(&self) -> Vec<u8> {
        std::mem::take(&mut lock(&self.state).outbound)
    }

    /// Bytes queued but not yet read.
    pub fn pending_inbound(&self) -> usize {
        lock(&self.state).inbound.len()
    }

    /// Make the next `count` open attempts fail.
    pub fn fail_next_opens(&self, count: u32) {
        lock(&self.state).open_failures = count;
    }

    /// Make the next `count` read/write/poll calls fail.
    pub fn fail_next_io(&self, count: u32) {
        lock(&self.state).io_failures = count;
    }

    /// Make the next `count` closes report an error (the port still closes).
    pub fn fail_next_closes(&self, count: u32) {
        lock(&self.state).close_failures = count;
    }

    pub fn is_open(&self) -> bool {
        lock(&self.state).open
    }

    /// Successful opens.
    pub fn opens(&self) -> u32 {
        lock(&self.state).opens
    }

    /// All open attempts, failed or not.
    pub fn open_attempts(&self) -> u32 {
        lock(&self.state).open_attempts
    }

    /// Closes of an open port.
    pub fn closes(&self) -> u32 {
        lock(&self.state).closes
    }

    pub fn flushes(&self) -> u32 {
        lock(&self.state).flushes
    }
}

fn lock(state: &Mutex<State>) -> MutexGuard<'_, State> {
    // A panicked test thread must not hide the port state from the others.
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loopback_through_handle() {
        let (mut port, handle) = MemoryPort::new("mem0");
        port.open().unwrap();

        handle.push_inbound(b"abc");
        assert_eq!(port.bytes_available().unwrap(), 3);

        let mut buf = [0u8; 2];
        assert_eq!(port.read(&mut buf, Duration::ZERO).unwrap(), 2);
        assert_eq!(&buf, b"ab");
        assert_eq!(handle.pending_inbound(), 1);

        port.write(b"xyz").unwrap();
        port.flush().unwrap();
        assert_eq!(handle.take_outbound(), b"xyz");
        assert!(handle.take_outbound().is_empty());
        assert_eq!(handle.flushes(), 1);
    }

    #[test]
    fn closed_port_rejects_io() {
        let (mut port, _handle) = MemoryPort::new("mem0");
        assert!(matches!(port.write(b"x"), Err(PortError::NotOpen { .. })));
        assert!(matches!(
            port.bytes_available(),
            Err(PortError::NotOpen { .. })
        ));
    }

    #[test]
    fn injected_open_failures_are_consumed() {
        let (mut port, handle) = MemoryPort::new("mem0");
        handle.fail_next_opens(2);

        assert!(port.open().is_err());
        assert!(port.open().is_err());
        port.open().unwrap();
        assert_eq!(handle.open_attempts(), 3);
        assert_eq!(handle.opens(), 1);
    }

    #[test]
    fn close_counts_only_real_closes() {
        let (mut port, handle) = MemoryPort::new("mem0");
        port.close().unwrap();
        port.open().unwrap();
        port.close().unwrap();
        port.close().unwrap();
        assert_eq!(handle.closes(), 1);
    }

    #[test]
    fn injected_io_failure_then_recovers() {
        let (mut port, handle) = MemoryPort::new("mem0");
        port.open().unwrap();
        handle.fail_next_io(1);

        assert!(matches!(port.write(b"x"), Err(PortError::Io { .. })));
        port.write(b"y").unwrap();
        assert_eq!(handle.take_outbound(), b"y");
    }
}

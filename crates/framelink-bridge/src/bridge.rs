use std::time::Duration;

use framelink_port::{BoxedPort, PortError, StreamPort};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::control::{Sleeper, StopSignal, ThreadSleeper};
use crate::endpoint::{Endpoint, Role};
use crate::error::{BridgeError, Result};
use crate::retry::{duration_ms, RetryPolicy};

pub const DEFAULT_CHUNK_SIZE: usize = 1024;
pub const DEFAULT_IDLE_INTERVAL: Duration = Duration::from_millis(10);
pub const DEFAULT_ERROR_PAUSE: Duration = Duration::from_secs(1);
pub const DEFAULT_POLL_READ_TIMEOUT: Duration = Duration::from_millis(100);

/// Bytes of each chunk shown in debug logs.
const PREVIEW_LEN: usize = 32;

/// Bridge tuning knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BridgeConfig {
    /// Upper bound on bytes moved from one endpoint per cycle.
    pub chunk_size: usize,
    /// Sleep after a cycle that moved nothing.
    #[serde(with = "duration_ms")]
    pub idle_interval: Duration,
    /// Sleep after a cycle in which any endpoint failed.
    #[serde(with = "duration_ms")]
    pub error_pause: Duration,
    /// Cap on a single read of bytes already reported as available.
    #[serde(with = "duration_ms")]
    pub read_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            idle_interval: DEFAULT_IDLE_INTERVAL,
            error_pause: DEFAULT_ERROR_PAUSE,
            read_timeout: DEFAULT_POLL_READ_TIMEOUT,
            retry: RetryPolicy::default(),
        }
    }
}

/// What a single poll cycle did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleReport {
    /// Bytes read from the primary and fanned out.
    pub downstream: usize,
    /// Bytes read from secondaries and forwarded to the primary.
    pub upstream: usize,
    /// Endpoint operations that failed during the cycle.
    pub failures: usize,
}

impl CycleReport {
    pub fn is_idle(&self) -> bool {
        self.downstream == 0 && self.upstream == 0 && self.failures == 0
    }
}

/// Running totals across the life of a bridge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BridgeStats {
    pub cycles: u64,
    pub idle_cycles: u64,
    pub bytes_downstream: u64,
    pub bytes_upstream: u64,
    pub transient_errors: u64,
}

impl BridgeStats {
    fn record(&mut self, report: &CycleReport) {
        self.cycles += 1;
        if report.is_idle() {
            self.idle_cycles += 1;
        }
        self.bytes_downstream += report.downstream as u64;
        self.bytes_upstream += report.upstream as u64;
        self.transient_errors += report.failures as u64;
    }
}

/// Transparent relay between one primary port and one or more secondaries.
///
/// Every cycle first copies whatever the primary has pending to each
/// secondary in order, then copies each secondary's pending bytes to the
/// primary. Bytes are never inspected, and data from one secondary is never
/// delivered to another.
pub struct Bridge<S = ThreadSleeper> {
    primary: Endpoint,
    secondaries: Vec<Endpoint>,
    config: BridgeConfig,
    sleeper: S,
    buf: Vec<u8>,
    stats: BridgeStats,
}

impl Bridge<ThreadSleeper> {
    /// Build a bridge over closed ports. Nothing is opened until
    /// [`Bridge::connect`] or [`Bridge::run`].
    pub fn new(primary: BoxedPort, secondaries: Vec<BoxedPort>, config: BridgeConfig) -> Result<Self> {
        if secondaries.is_empty() {
            return Err(BridgeError::NoSecondaries);
        }
        let chunk = config.chunk_size.max(1);
        Ok(Self {
            primary: Endpoint::new(primary, Role::Primary),
            secondaries: secondaries
                .into_iter()
                .map(|port| Endpoint::new(port, Role::Secondary))
                .collect(),
            config,
            sleeper: ThreadSleeper,
            buf: vec![0u8; chunk],
            stats: BridgeStats::default(),
        })
    }
}

impl<S: Sleeper> Bridge<S> {
    /// Replace the sleeper used for backoff, idle and error pauses.
    pub fn with_sleeper<T: Sleeper>(self, sleeper: T) -> Bridge<T> {
        Bridge {
            primary: self.primary,
            secondaries: self.secondaries,
            config: self.config,
            sleeper,
            buf: self.buf,
            stats: self.stats,
        }
    }

    pub fn config(&self) -> &BridgeConfig {
        &self.config
    }

    pub fn stats(&self) -> &BridgeStats {
        &self.stats
    }

    pub fn sleeper(&self) -> &S {
        &self.sleeper
    }

    pub fn primary(&self) -> &Endpoint {
        &self.primary
    }

    pub fn secondaries(&self) -> &[Endpoint] {
        &self.secondaries
    }

    /// Open the primary, then every secondary in order, each with retries.
    /// Endpoints that are already open are left alone.
    ///
    /// If any endpoint exhausts its attempts, everything already opened is
    /// closed again before the error is returned.
    pub fn connect(&mut self) -> Result<()> {
        let policy = self.config.retry;
        self.primary.connect(&policy, &mut self.sleeper)?;
        for idx in 0..self.secondaries.len() {
            if let Err(err) = self.secondaries[idx].connect(&policy, &mut self.sleeper) {
                warn!(error = %err, "bridge startup failed, closing opened endpoints");
                if let Err(close_err) = self.shutdown() {
                    warn!(error = %close_err, "cleanup after failed startup was incomplete");
                }
                return Err(err);
            }
        }

        info!(
            primary = %self.primary.name(),
            secondaries = ?self.secondaries.iter().map(Endpoint::name).collect::<Vec<_>>(),
            "bridge connected"
        );
        Ok(())
    }

    /// Run one forwarding cycle without sleeping.
    ///
    /// Failures are isolated to the endpoint that raised them: they are
    /// logged, counted in the report and the rest of the cycle proceeds.
    /// Bytes that could not be delivered are dropped.
    pub fn poll_once(&mut self) -> CycleReport {
        let mut report = CycleReport::default();
        let timeout = self.config.read_timeout;

        match read_available(&mut self.primary, &mut self.buf, timeout) {
            Ok(0) => {}
            Ok(n) => {
                let chunk = &self.buf[..n];
                debug!(from = %self.primary.name(), bytes = n, data = %preview(chunk), "primary -> secondaries");
                report.downstream = n;
                for secondary in &mut self.secondaries {
                    if let Err(err) = deliver(secondary, chunk) {
                        warn!(to = %secondary.name(), bytes = n, error = %err, "dropped chunk for secondary");
                        report.failures += 1;
                    }
                }
            }
            Err(err) => {
                warn!(port = %self.primary.name(), error = %err, "read from primary failed");
                report.failures += 1;
            }
        }

        for secondary in &mut self.secondaries {
            match read_available(secondary, &mut self.buf, timeout) {
                Ok(0) => {}
                Ok(n) => {
                    let chunk = &self.buf[..n];
                    debug!(from = %secondary.name(), bytes = n, data = %preview(chunk), "secondary -> primary");
                    report.upstream += n;
                    if let Err(err) = deliver(&mut self.primary, chunk) {
                        warn!(from = %secondary.name(), bytes = n, error = %err, "dropped chunk for primary");
                        report.failures += 1;
                    }
                }
                Err(err) => {
                    warn!(port = %secondary.name(), error = %err, "read from secondary failed");
                    report.failures += 1;
                }
            }
        }

        self.stats.record(&report);
        report
    }

    /// Connect, forward until `stop` fires, then close every endpoint.
    ///
    /// The stop signal is checked once before each cycle.
    pub fn run<T: StopSignal + ?Sized>(&mut self, stop: &T) -> Result<BridgeStats> {
        self.connect()?;

        while !stop.should_stop() {
            let report = self.poll_once();
            if report.failures > 0 {
                self.sleeper.sleep(self.config.error_pause);
            } else if report.is_idle() {
                self.sleeper.sleep(self.config.idle_interval);
            }
        }

        info!(
            cycles = self.stats.cycles,
            downstream = self.stats.bytes_downstream,
            upstream = self.stats.bytes_upstream,
            errors = self.stats.transient_errors,
            "bridge stopping"
        );
        self.shutdown()?;
        Ok(self.stats.clone())
    }

    /// Close every open endpoint. Safe to call more than once.
    ///
    /// A failing close does not stop the remaining endpoints from closing;
    /// all failures are reported together.
    pub fn shutdown(&mut self) -> Result<()> {
        let mut failed = Vec::new();
        for endpoint in std::iter::once(&mut self.primary).chain(self.secondaries.iter_mut()) {
            if let Err(err) = endpoint.close() {
                warn!(port = %endpoint.name(), error = %err, "close failed");
                failed.push(endpoint.name().to_string());
            }
        }
        if failed.is_empty() {
            Ok(())
        } else {
            Err(BridgeError::CloseFailed { endpoints: failed })
        }
    }
}

impl<S> std::fmt::Debug for Bridge<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bridge")
            .field("primary", &self.primary)
            .field("secondaries", &self.secondaries)
            .field("config", &self.config)
            .field("stats", &self.stats)
            .finish()
    }
}

/// Read what `endpoint` already has pending, up to the buffer size.
fn read_available(
    endpoint: &mut Endpoint,
    buf: &mut [u8],
    timeout: Duration,
) -> std::result::Result<usize, PortError> {
    let port = endpoint.port_mut();
    let pending = port.bytes_available()?;
    if pending == 0 {
        return Ok(0);
    }
    let want = pending.min(buf.len());
    port.read(&mut buf[..want], timeout)
}

fn deliver(endpoint: &mut Endpoint, data: &[u8]) -> std::result::Result<(), PortError> {
    let port = endpoint.port_mut();
    port.write(data)?;
    port.flush()
}

fn preview(data: &[u8]) -> String {
    let shown = &data[..data.len().min(PREVIEW_LEN)];
    let mut out = shown
        .iter()
        .map(|b| format!("{b:02x}"))
        .collect::<Vec<_>>()
        .join(" ");
    if data.len() > PREVIEW_LEN {
        out.push_str(" ..");
    }
    out
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use framelink_port::{MemoryPort, MemoryPortHandle, PortSettings};

    use super::*;
    use crate::control::StopToken;
    use crate::testing::{RecordingSleeper, StopAfter};

    struct Rig {
        bridge: Bridge<RecordingSleeper>,
        primary: MemoryPortHandle,
        secondaries: Vec<MemoryPortHandle>,
    }

    fn rig(secondaries: usize, config: BridgeConfig) -> Rig {
        let (primary, primary_handle) = MemoryPort::new("primary");
        let mut ports: Vec<BoxedPort> = Vec::new();
        let mut handles = Vec::new();
        for idx in 0..secondaries {
            let (port, handle) = MemoryPort::new(format!("s{}", idx + 1));
            ports.push(Box::new(port));
            handles.push(handle);
        }
        let bridge = Bridge::new(Box::new(primary), ports, config)
            .unwrap()
            .with_sleeper(RecordingSleeper::default());
        Rig {
            bridge,
            primary: primary_handle,
            secondaries: handles,
        }
    }

    fn connected(secondaries: usize) -> Rig {
        let mut rig = rig(secondaries, BridgeConfig::default());
        rig.bridge.connect().unwrap();
        rig
    }

    #[test]
    fn requires_a_secondary() {
        let (primary, _handle) = MemoryPort::new("primary");
        let err = Bridge::new(Box::new(primary), Vec::new(), BridgeConfig::default()).unwrap_err();
        assert!(matches!(err, BridgeError::NoSecondaries));
    }

    #[test]
    fn primary_bytes_fan_out_to_every_secondary() {
        let mut rig = connected(2);
        rig.primary.push_inbound(b"hello");

        let report = rig.bridge.poll_once();
        assert_eq!(report.downstream, 5);
        assert_eq!(report.failures, 0);
        for handle in &rig.secondaries {
            assert_eq!(handle.take_outbound(), b"hello");
            assert_eq!(handle.flushes(), 1);
        }
        assert!(rig.primary.take_outbound().is_empty());
    }

    #[test]
    fn secondary_bytes_go_only_to_primary() {
        let mut rig = connected(2);
        rig.secondaries[0].push_inbound(b"A");
        rig.secondaries[1].push_inbound(b"B");

        let report = rig.bridge.poll_once();
        assert_eq!(report.upstream, 2);
        assert_eq!(rig.primary.take_outbound(), b"AB");
        assert!(rig.secondaries[0].take_outbound().is_empty());
        assert!(rig.secondaries[1].take_outbound().is_empty());
    }

    #[test]
    fn downstream_is_written_before_upstream_in_a_cycle() {
        struct LoggedPort {
            inner: MemoryPort,
            log: Arc<Mutex<Vec<String>>>,
        }

        impl StreamPort for LoggedPort {
            fn settings(&self) -> &PortSettings {
                self.inner.settings()
            }
            fn is_open(&self) -> bool {
                self.inner.is_open()
            }
            fn open(&mut self) -> framelink_port::Result<()> {
                self.inner.open()
            }
            fn close(&mut self) -> framelink_port::Result<()> {
                self.inner.close()
            }
            fn bytes_available(&mut self) -> framelink_port::Result<usize> {
                self.inner.bytes_available()
            }
            fn read(&mut self, buf: &mut [u8], timeout: Duration) -> framelink_port::Result<usize> {
                self.inner.read(buf, timeout)
            }
            fn write(&mut self, data: &[u8]) -> framelink_port::Result<()> {
                self.log
                    .lock()
                    .unwrap()
                    .push(format!("{}:{}", self.name(), String::from_utf8_lossy(data)));
                self.inner.write(data)
            }
            fn flush(&mut self) -> framelink_port::Result<()> {
                self.inner.flush()
            }
        }

        let log = Arc::new(Mutex::new(Vec::new()));
        let logged = |name: &str| {
            let (inner, handle) = MemoryPort::new(name);
            let port: BoxedPort = Box::new(LoggedPort {
                inner,
                log: Arc::clone(&log),
            });
            (port, handle)
        };
        let (primary, primary_handle) = logged("p");
        let (s1, s1_handle) = logged("s1");
        let (s2, _s2_handle) = logged("s2");

        let mut bridge = Bridge::new(primary, vec![s1, s2], BridgeConfig::default())
            .unwrap()
            .with_sleeper(RecordingSleeper::default());
        bridge.connect().unwrap();

        primary_handle.push_inbound(b"down");
        s1_handle.push_inbound(b"up");
        bridge.poll_once();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["s1:down".to_string(), "s2:down".to_string(), "p:up".to_string()]
        );
    }

    #[test]
    fn reads_are_bounded_by_chunk_size() {
        let config = BridgeConfig {
            chunk_size: 4,
            ..BridgeConfig::default()
        };
        let mut rig = rig(1, config);
        rig.bridge.connect().unwrap();
        rig.primary.push_inbound(b"0123456789");

        assert_eq!(rig.bridge.poll_once().downstream, 4);
        assert_eq!(rig.bridge.poll_once().downstream, 4);
        assert_eq!(rig.bridge.poll_once().downstream, 2);
        assert_eq!(rig.secondaries[0].take_outbound(), b"0123456789");
    }

    #[test]
    fn idle_cycle_reports_nothing() {
        let mut rig = connected(1);
        let report = rig.bridge.poll_once();
        assert!(report.is_idle());
        assert_eq!(rig.bridge.stats().idle_cycles, 1);
    }

    #[test]
    fn write_failure_only_affects_that_secondary() {
        let mut rig = connected(2);
        rig.secondaries[0].fail_next_io(1);
        rig.primary.push_inbound(b"xyz");

        let report = rig.bridge.poll_once();
        assert_eq!(report.failures, 1);
        assert!(rig.secondaries[0].take_outbound().is_empty());
        assert_eq!(rig.secondaries[1].take_outbound(), b"xyz");

        // The failed chunk is not replayed on the next cycle.
        rig.primary.push_inbound(b"next");
        let report = rig.bridge.poll_once();
        assert_eq!(report.failures, 0);
        assert_eq!(rig.secondaries[0].take_outbound(), b"next");
    }

    #[test]
    fn read_failure_does_not_block_other_secondaries() {
        let mut rig = connected(2);
        rig.secondaries[0].fail_next_io(1);
        rig.secondaries[1].push_inbound(b"ok");

        let report = rig.bridge.poll_once();
        assert_eq!(report.failures, 1);
        assert_eq!(rig.primary.take_outbound(), b"ok");
    }

    #[test]
    #[cfg(unix)]
    fn hung_up_socket_secondary_fails_every_cycle() {
        use std::io::{Read, Write};
        use std::os::unix::net::UnixStream;

        use framelink_port::UnixSocketPort;

        let socket_port = |name: &str, stream| -> BoxedPort {
            Box::new(UnixSocketPort::from_stream(PortSettings::new(name, 9600), stream).unwrap())
        };
        let (primary_local, mut primary_remote) = UnixStream::pair().unwrap();
        let (dead_local, dead_remote) = UnixStream::pair().unwrap();
        let (live_local, mut live_remote) = UnixStream::pair().unwrap();

        let mut bridge = Bridge::new(
            socket_port("primary", primary_local),
            vec![socket_port("dead", dead_local), socket_port("live", live_local)],
            BridgeConfig::default(),
        )
        .unwrap()
        .with_sleeper(RecordingSleeper::default());
        bridge.connect().unwrap();
        drop(dead_remote);

        for _ in 0..3 {
            let report = bridge.poll_once();
            assert!(report.failures >= 1);
            assert!(!report.is_idle());
        }
        assert_eq!(bridge.stats().idle_cycles, 0);
        assert!(bridge.stats().transient_errors >= 3);

        // The live secondary keeps relaying alongside the dead one.
        live_remote.write_all(b"ok").unwrap();
        bridge.poll_once();
        primary_remote
            .set_read_timeout(Some(Duration::from_secs(1)))
            .unwrap();
        let mut got = [0u8; 2];
        primary_remote.read_exact(&mut got).unwrap();
        assert_eq!(&got, b"ok");
    }

    #[test]
    fn connect_retries_each_endpoint() {
        let mut rig = rig(1, BridgeConfig::default());
        rig.primary.fail_next_opens(2);

        rig.bridge.connect().unwrap();
        assert_eq!(rig.bridge.primary().open_attempts(), 3);
        assert_eq!(rig.bridge.secondaries()[0].open_attempts(), 1);
        assert_eq!(rig.bridge.sleeper().naps, vec![Duration::from_secs(1); 2]);
    }

    #[test]
    fn failed_startup_closes_what_was_opened() {
        let mut rig = rig(3, BridgeConfig::default());
        rig.secondaries[1].fail_next_opens(10);

        let err = rig.bridge.connect().unwrap_err();
        match err {
            BridgeError::ConnectFailed {
                endpoint, attempts, ..
            } => {
                assert_eq!(endpoint, "s2");
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {other}"),
        }

        assert_eq!(rig.primary.closes(), 1);
        assert_eq!(rig.secondaries[0].closes(), 1);
        assert_eq!(rig.secondaries[1].opens(), 0);
        // Never reached.
        assert_eq!(rig.secondaries[2].open_attempts(), 0);

        drop(rig.bridge);
        assert_eq!(rig.primary.closes(), 1);
        assert_eq!(rig.secondaries[0].closes(), 1);
    }

    #[test]
    fn run_stops_and_closes_everything_once() {
        let mut rig = connected(2);
        rig.primary.push_inbound(b"ping");

        let stats = rig.bridge.run(&StopAfter::new(3)).unwrap();
        assert_eq!(stats.cycles, 3);
        assert_eq!(stats.bytes_downstream, 4);
        assert_eq!(stats.idle_cycles, 2);

        assert!(!rig.primary.is_open());
        assert_eq!(rig.primary.opens(), 1);
        assert_eq!(rig.primary.closes(), 1);
        for handle in &rig.secondaries {
            assert_eq!(handle.closes(), 1);
            assert_eq!(handle.take_outbound(), b"ping");
        }

        rig.bridge.shutdown().unwrap();
        drop(rig.bridge);
        assert_eq!(rig.primary.closes(), 1);
    }

    #[test]
    fn run_sleeps_idle_interval_and_error_pause() {
        let config = BridgeConfig {
            idle_interval: Duration::from_millis(10),
            error_pause: Duration::from_millis(500),
            ..BridgeConfig::default()
        };
        let mut rig = rig(1, config);
        rig.bridge.connect().unwrap();
        rig.primary.push_inbound(b"x");
        rig.secondaries[0].fail_next_io(1);

        let stats = rig.bridge.run(&StopAfter::new(2)).unwrap();
        assert_eq!(stats.transient_errors, 1);
        assert_eq!(
            rig.bridge.sleeper().naps,
            vec![Duration::from_millis(500), Duration::from_millis(10)]
        );
    }

    #[test]
    fn pre_set_stop_runs_no_cycles() {
        let mut rig = rig(1, BridgeConfig::default());
        let token = StopToken::new();
        token.stop();

        let stats = rig.bridge.run(&token).unwrap();
        assert_eq!(stats.cycles, 0);
        assert_eq!(rig.primary.opens(), 1);
        assert_eq!(rig.primary.closes(), 1);
    }

    #[test]
    fn shutdown_reports_failures_but_closes_the_rest() {
        let mut rig = connected(2);
        rig.secondaries[0].fail_next_closes(1);

        let err = rig.bridge.shutdown().unwrap_err();
        match err {
            BridgeError::CloseFailed { endpoints } => assert_eq!(endpoints, vec!["s1".to_string()]),
            other => panic!("unexpected error: {other}"),
        }
        assert!(!rig.primary.is_open());
        assert!(!rig.secondaries[1].is_open());
        assert_eq!(rig.secondaries[1].closes(), 1);

        rig.bridge.shutdown().unwrap();
    }

    #[test]
    fn drop_closes_connected_bridge() {
        let rig = connected(2);
        let Rig {
            bridge,
            primary,
            secondaries,
        } = rig;
        drop(bridge);
        assert_eq!(primary.closes(), 1);
        assert!(secondaries.iter().all(|h| h.closes() == 1));
    }

    #[test]
    fn stats_serialize() {
        let mut rig = connected(1);
        rig.primary.push_inbound(b"ab");
        rig.bridge.poll_once();

        let json = serde_json::to_value(rig.bridge.stats()).unwrap();
        assert_eq!(json["cycles"], 1);
        assert_eq!(json["bytes_downstream"], 2);

        let config = serde_json::to_value(rig.bridge.config()).unwrap();
        assert_eq!(config["chunk_size"], 1024);
        assert_eq!(config["idle_interval"], 10);
    }

    #[test]
    fn preview_truncates_long_chunks() {
        assert_eq!(preview(&[0xAA, 0x01]), "aa 01");
        assert!(preview(&[0u8; 40]).ends_with(" .."));
    }
}

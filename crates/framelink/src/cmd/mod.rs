use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::{ArgGroup, Args, Subcommand};
use framelink_bridge::{
    StopToken, DEFAULT_BACKOFF, DEFAULT_CHUNK_SIZE, DEFAULT_MAX_ATTEMPTS,
};
use framelink_frame::{Frame, FrameConfig, FrameTransceiver, MAX_PAYLOAD};
use framelink_port::{BoxedPort, PortSpec, DEFAULT_BAUD};

use crate::exit::{frame_error, CliError, CliResult, DATA_INVALID, INTERNAL, USAGE};
use crate::output::OutputFormat;

pub mod bridge;
pub mod console;
pub mod echo;
pub mod listen;
pub mod send;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Relay raw bytes between a primary port and one or more secondaries.
    Bridge(BridgeArgs),
    /// Send a single frame.
    Send(SendArgs),
    /// Print received frames.
    Listen(ListenArgs),
    /// Send every received frame straight back.
    Echo(EchoArgs),
    /// Interactive mode: each stdin line is sent as a frame.
    Console(ConsoleArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Bridge(args) => bridge::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Listen(args) => listen::run(args, format),
        Command::Echo(args) => echo::run(args, format),
        Command::Console(args) => console::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

/// Port selection and framing options shared by the frame commands.
#[derive(Args, Debug)]
pub struct PortArgs {
    /// Port: serial device path, `unix:<socket path>` or `mem:<name>`.
    pub port: PortSpec,
    /// Line rate in bits per second.
    #[arg(long, env = "FRAMELINK_BAUD", default_value_t = DEFAULT_BAUD)]
    pub baud: u32,
    /// How long a single read waits for the next byte (e.g. 1s, 200ms).
    #[arg(long, env = "FRAMELINK_READ_TIMEOUT", default_value = "1s")]
    pub read_timeout: String,
    /// Largest payload accepted in either direction (at most 255).
    #[arg(long, env = "FRAMELINK_MAX_PAYLOAD", default_value_t = MAX_PAYLOAD)]
    pub max_payload: usize,
}

#[derive(Args, Debug)]
pub struct BridgeArgs {
    /// Primary port (the one wired to the device).
    pub primary: PortSpec,
    /// Secondary ports that mirror the primary.
    #[arg(required = true, num_args = 1..)]
    pub secondaries: Vec<PortSpec>,
    /// Line rate applied to every port.
    #[arg(long, env = "FRAMELINK_BAUD", default_value_t = DEFAULT_BAUD)]
    pub baud: u32,
    /// Maximum bytes moved from one port per cycle.
    #[arg(long, env = "FRAMELINK_CHUNK_SIZE", default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,
    /// Sleep after a cycle with no traffic.
    #[arg(long, env = "FRAMELINK_IDLE_INTERVAL", default_value = "10ms")]
    pub idle_interval: String,
    /// Pause after a cycle in which a port failed.
    #[arg(long, env = "FRAMELINK_ERROR_PAUSE", default_value = "1s")]
    pub error_pause: String,
    /// Open attempts per port before giving up.
    #[arg(long, env = "FRAMELINK_OPEN_ATTEMPTS", default_value_t = DEFAULT_MAX_ATTEMPTS)]
    pub open_attempts: u32,
    /// Wait between failed open attempts.
    #[arg(long, env = "FRAMELINK_OPEN_BACKOFF", default_value_t = format_duration(DEFAULT_BACKOFF))]
    pub open_backoff: String,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("payload").required(true).args(["data", "hex", "file"])))]
pub struct SendArgs {
    #[command(flatten)]
    pub port: PortArgs,
    /// Text payload.
    #[arg(long)]
    pub data: Option<String>,
    /// Hex payload, e.g. "68 69" or "6869".
    #[arg(long)]
    pub hex: Option<String>,
    /// Read payload from file.
    #[arg(long)]
    pub file: Option<PathBuf>,
    /// Wait for one reply frame and print it.
    #[arg(long)]
    pub wait: bool,
    /// Maximum time to wait for the reply when --wait is set (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct ListenArgs {
    #[command(flatten)]
    pub port: PortArgs,
    /// Exit after receiving N frames.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    #[command(flatten)]
    pub port: PortArgs,
    /// Exit after echoing N frames.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct ConsoleArgs {
    #[command(flatten)]
    pub port: PortArgs,
    /// How long to wait for each reply (e.g. 2s, 500ms).
    #[arg(long, default_value = "2s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub(crate) type Transceiver = FrameTransceiver<BoxedPort>;

/// Build and open a transceiver for the port described by `args`.
pub(crate) fn open_transceiver(args: &PortArgs) -> CliResult<Transceiver> {
    if args.max_payload > MAX_PAYLOAD {
        return Err(CliError::new(
            USAGE,
            format!("--max-payload must be at most {MAX_PAYLOAD}"),
        ));
    }
    let config = FrameConfig {
        max_payload_size: args.max_payload,
        read_timeout: parse_duration(&args.read_timeout)?,
    };
    let port = args.port.clone().into_port(args.baud);
    let mut txrx = FrameTransceiver::with_config(port, config);
    txrx.open().map_err(|err| frame_error("open failed", err))?;
    tracing::info!(port = %args.port, baud = args.baud, "port open");
    Ok(txrx)
}

/// Reject payloads that could never be framed before touching the port.
pub(crate) fn check_payload_size(payload: &[u8], args: &PortArgs) -> CliResult<()> {
    let max = args.max_payload.min(MAX_PAYLOAD);
    if payload.len() > max {
        return Err(CliError::new(
            DATA_INVALID,
            format!("payload is {} bytes, max {max}", payload.len()),
        ));
    }
    Ok(())
}

/// Receive frames until one arrives or `timeout` elapses.
pub(crate) fn wait_for_frame(txrx: &mut Transceiver, timeout: Duration) -> CliResult<Option<Frame>> {
    let per_read = txrx.config().read_timeout;
    let deadline = Instant::now() + timeout;
    let result = loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            break Ok(None);
        }
        txrx.set_read_timeout(per_read.min(remaining));
        match txrx.recv() {
            Ok(Some(payload)) => break Ok(Some(Frame::new(payload))),
            Ok(None) => continue,
            Err(err) => break Err(frame_error("receive failed", err)),
        }
    };
    txrx.set_read_timeout(per_read);
    result
}

pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, unit) = if let Some(num) = input.strip_suffix("ms") {
        (num, "ms")
    } else if let Some(num) = input.strip_suffix('s') {
        (num, "s")
    } else {
        (input, "s")
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;

    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        _ => Ok(Duration::from_secs(value)),
    }
}

fn format_duration(duration: Duration) -> String {
    if duration.subsec_millis() == 0 {
        format!("{}s", duration.as_secs())
    } else {
        format!("{}ms", duration.as_millis())
    }
}

/// Ctrl-C requests a cooperative stop instead of killing the process.
pub(crate) fn install_ctrlc_handler() -> CliResult<StopToken> {
    let token = StopToken::new();
    let handler_token = token.clone();
    ctrlc::set_handler(move || handler_token.stop()).map_err(|err| {
        CliError::new(INTERNAL, format!("signal handler setup failed: {err}"))
    })?;
    Ok(token)
}

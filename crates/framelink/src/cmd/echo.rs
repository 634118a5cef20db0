use framelink_bridge::StopSignal;
use framelink_frame::FrameError;
use framelink_port::PortError;

use crate::cmd::{install_ctrlc_handler, open_transceiver, EchoArgs};
use crate::exit::{frame_error, CliResult, SUCCESS};
use crate::output::OutputFormat;

pub fn run(args: EchoArgs, _format: OutputFormat) -> CliResult<i32> {
    let mut txrx = open_transceiver(&args.port)?;
    let stop = install_ctrlc_handler()?;

    let mut echoed = 0usize;

    while !stop.should_stop() {
        let payload = match txrx.recv() {
            Ok(Some(payload)) => payload,
            Ok(None) => continue,
            Err(FrameError::Port(PortError::Disconnected { .. })) => break,
            Err(err) => return Err(frame_error("receive failed", err)),
        };

        tracing::info!(size = payload.len(), "echoing frame");
        txrx.send(&payload)
            .map_err(|err| frame_error("echo send failed", err))?;
        echoed = echoed.saturating_add(1);

        if let Some(count) = args.count {
            if echoed >= count {
                break;
            }
        }
    }

    txrx.close().map_err(|err| frame_error("close failed", err))?;
    Ok(SUCCESS)
}

use framelink_bridge::StopSignal;
use framelink_frame::FrameError;
use framelink_port::PortError;

use crate::cmd::{install_ctrlc_handler, open_transceiver, ListenArgs};
use crate::exit::{frame_error, CliResult, SUCCESS};
use crate::output::{print_frame, OutputFormat};

pub fn run(args: ListenArgs, format: OutputFormat) -> CliResult<i32> {
    let mut txrx = open_transceiver(&args.port)?;
    let stop = install_ctrlc_handler()?;
    let port = args.port.port.to_string();

    let mut printed = 0usize;

    while !stop.should_stop() {
        let payload = match txrx.recv() {
            Ok(Some(payload)) => payload,
            Ok(None) => continue,
            Err(FrameError::Port(PortError::Disconnected { .. })) => {
                tracing::info!(port = %port, "port disconnected");
                break;
            }
            Err(err) => return Err(frame_error("receive failed", err)),
        };

        print_frame(&payload, &port, format);
        printed = printed.saturating_add(1);

        if let Some(count) = args.count {
            if printed >= count {
                break;
            }
        }
    }

    txrx.close().map_err(|err| frame_error("close failed", err))?;
    Ok(SUCCESS)
}

use std::fs;

use crate::cmd::{check_payload_size, open_transceiver, parse_duration, wait_for_frame, SendArgs};
use crate::exit::{frame_error, io_error, CliError, CliResult, SUCCESS, TIMEOUT, USAGE};
use crate::output::{print_frame, OutputFormat};

pub fn run(args: SendArgs, format: OutputFormat) -> CliResult<i32> {
    let payload = resolve_payload(&args)?;
    check_payload_size(&payload, &args.port)?;
    let wait_timeout = parse_duration(&args.timeout)?;

    let mut txrx = open_transceiver(&args.port)?;
    txrx.send(&payload)
        .map_err(|err| frame_error("send failed", err))?;

    if args.wait {
        let port = args.port.port.to_string();
        match wait_for_frame(&mut txrx, wait_timeout)? {
            Some(frame) => print_frame(&frame.payload, &port, format),
            None => {
                return Err(CliError::new(
                    TIMEOUT,
                    format!("no reply from {port} within {}", args.timeout),
                ))
            }
        }
    }

    txrx.close().map_err(|err| frame_error("close failed", err))?;
    Ok(SUCCESS)
}

fn resolve_payload(args: &SendArgs) -> CliResult<Vec<u8>> {
    if let Some(data) = &args.data {
        return Ok(data.as_bytes().to_vec());
    }
    if let Some(hex) = &args.hex {
        return parse_hex(hex);
    }
    if let Some(path) = &args.file {
        return fs::read(path)
            .map_err(|err| io_error(&format!("failed reading {}", path.display()), err));
    }
    Ok(Vec::new())
}

/// Accepts "6869", "68 69", "68:69" and an optional "0x" prefix.
fn parse_hex(input: &str) -> CliResult<Vec<u8>> {
    let digits: String = input
        .trim()
        .trim_start_matches("0x")
        .chars()
        .filter(|c| !c.is_whitespace() && *c != ':' && *c != ',')
        .collect();

    if let Some(bad) = digits.chars().find(|c| !c.is_ascii_hexdigit()) {
        return Err(CliError::new(
            USAGE,
            format!("--hex has a non-hex character: {bad:?}"),
        ));
    }
    if digits.len() % 2 != 0 {
        return Err(CliError::new(USAGE, "--hex needs an even number of digits"));
    }

    Ok(digits
        .as_bytes()
        .chunks(2)
        .map(|pair| (nibble(pair[0]) << 4) | nibble(pair[1]))
        .collect())
}

/// Value of one ASCII hex digit (already validated).
fn nibble(digit: u8) -> u8 {
    (digit as char).to_digit(16).unwrap_or(0) as u8
}

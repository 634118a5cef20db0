use std::io::{self, BufRead, Write};

use crate::cmd::{check_payload_size, open_transceiver, parse_duration, wait_for_frame, ConsoleArgs};
use crate::exit::{frame_error, io_error, CliResult, SUCCESS};
use crate::output::{print_frame, OutputFormat};

const QUIT: &str = "exit";

pub fn run(args: ConsoleArgs, format: OutputFormat) -> CliResult<i32> {
    let reply_timeout = parse_duration(&args.timeout)?;
    let mut txrx = open_transceiver(&args.port)?;
    let port = args.port.port.to_string();

    let stdin = io::stdin();
    let mut lines = stdin.lock().lines();
    loop {
        prompt();
        let Some(line) = lines.next() else {
            break;
        };
        let line = line.map_err(|err| io_error("failed reading stdin", err))?;
        let payload = match classify_line(&line) {
            LineAction::Quit => break,
            LineAction::Skip => continue,
            LineAction::Send(payload) => payload,
        };

        if let Err(err) = check_payload_size(payload.as_bytes(), &args.port) {
            eprintln!("{err}");
            continue;
        }
        txrx.send(payload.as_bytes())
            .map_err(|err| frame_error("send failed", err))?;

        match wait_for_frame(&mut txrx, reply_timeout)? {
            Some(frame) => print_frame(&frame.payload, &port, format),
            None => eprintln!("no reply within {}", args.timeout),
        }
    }

    txrx.close().map_err(|err| frame_error("close failed", err))?;
    Ok(SUCCESS)
}

#[derive(Debug, PartialEq, Eq)]
enum LineAction<'a> {
    Quit,
    Skip,
    Send(&'a str),
}

/// Surrounding whitespace is never sent; blank lines send nothing.
fn classify_line(line: &str) -> LineAction<'_> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        LineAction::Skip
    } else if trimmed.eq_ignore_ascii_case(QUIT) {
        LineAction::Quit
    } else {
        LineAction::Send(trimmed)
    }
}

fn prompt() {
    let mut err = io::stderr();
    let _ = write!(err, "> ");
    let _ = err.flush();
}

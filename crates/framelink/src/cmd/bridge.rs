use framelink_bridge::{Bridge, BridgeConfig, BridgeError, RetryPolicy, DEFAULT_POLL_READ_TIMEOUT};
use framelink_port::BoxedPort;

use crate::cmd::{install_ctrlc_handler, parse_duration, BridgeArgs};
use crate::exit::{bridge_error, CliError, CliResult, SUCCESS, USAGE};
use crate::output::{print_stats, OutputFormat};

pub fn run(args: BridgeArgs, format: OutputFormat) -> CliResult<i32> {
    let config = bridge_config(&args)?;

    let primary_name = args.primary.to_string();
    let secondary_names: Vec<String> = args.secondaries.iter().map(ToString::to_string).collect();

    let primary = args.primary.into_port(args.baud);
    let secondaries: Vec<BoxedPort> = args
        .secondaries
        .into_iter()
        .map(|spec| spec.into_port(args.baud))
        .collect();

    let mut bridge =
        Bridge::new(primary, secondaries, config).map_err(|err| bridge_error("bridge setup failed", err))?;
    let stop = install_ctrlc_handler()?;

    match bridge.run(&stop) {
        Ok(stats) => {
            print_stats(&stats, &primary_name, &secondary_names, format);
            Ok(SUCCESS)
        }
        Err(err @ BridgeError::CloseFailed { .. }) => {
            print_stats(bridge.stats(), &primary_name, &secondary_names, format);
            Err(bridge_error("bridge shutdown incomplete", err))
        }
        Err(err) => Err(bridge_error("bridge failed", err)),
    }
}

fn bridge_config(args: &BridgeArgs) -> CliResult<BridgeConfig> {
    if args.chunk_size == 0 {
        return Err(CliError::new(USAGE, "--chunk-size must be greater than zero"));
    }
    if args.open_attempts == 0 {
        return Err(CliError::new(USAGE, "--open-attempts must be greater than zero"));
    }
    Ok(BridgeConfig {
        chunk_size: args.chunk_size,
        idle_interval: parse_duration(&args.idle_interval)?,
        error_pause: parse_duration(&args.error_pause)?,
        read_timeout: DEFAULT_POLL_READ_TIMEOUT,
        retry: RetryPolicy::new(args.open_attempts, parse_duration(&args.open_backoff)?),
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use framelink_bridge::DEFAULT_CHUNK_SIZE;
    use framelink_port::DEFAULT_BAUD;

    use super::*;

    fn args() -> BridgeArgs {
        BridgeArgs {
            primary: "mem:p".parse().unwrap(),
            secondaries: vec!["mem:s".parse().unwrap()],
            baud: DEFAULT_BAUD,
            chunk_size: DEFAULT_CHUNK_SIZE,
            idle_interval: "10ms".to_string(),
            error_pause: "1s".to_string(),
            open_attempts: 3,
            open_backoff: "1s".to_string(),
        }
    }

    #[test]
    fn defaults_match_library_defaults() {
        assert_eq!(bridge_config(&args()).unwrap(), BridgeConfig::default());
    }

    #[test]
    fn custom_timing_is_parsed() {
        let mut args = args();
        args.idle_interval = "50ms".to_string();
        args.open_backoff = "250ms".to_string();
        args.open_attempts = 5;

        let config = bridge_config(&args).unwrap();
        assert_eq!(config.idle_interval, Duration::from_millis(50));
        assert_eq!(config.retry, RetryPolicy::new(5, Duration::from_millis(250)));
    }

    #[test]
    fn zero_chunk_is_usage_error() {
        let mut args = args();
        args.chunk_size = 0;
        assert_eq!(bridge_config(&args).unwrap_err().code, USAGE);
    }
}

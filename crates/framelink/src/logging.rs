use clap::ValueEnum;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::fmt::time;

/// Shape of diagnostic lines on stderr.
#[derive(Copy, Clone, Debug, ValueEnum)]
pub enum LogFormat {
    /// One human-readable line per event, stamped with time since start.
    Text,
    /// One flat JSON object per event, for supervisors collecting bridge logs.
    Json,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn as_filter(self) -> LevelFilter {
        match self {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }

    /// Port, frame and bridge events are told apart by target once the
    /// operator asks for per-byte detail.
    fn shows_targets(self) -> bool {
        self >= LogLevel::Debug
    }
}

/// Route port/bridge diagnostics to stderr so stdout stays clean for frames
/// and tables. The Ctrl-C handler logs from its own thread, so thread names
/// are kept.
pub fn init_logging(format: LogFormat, level: LogLevel) {
    let builder = tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(level.as_filter())
        .with_ansi(false)
        .with_thread_names(true)
        .with_target(level.shows_targets());

    match format {
        LogFormat::Text => {
            let _ = builder.with_timer(time::uptime()).try_init();
        }
        LogFormat::Json => {
            let _ = builder.json().flatten_event(true).try_init();
        }
    }
}

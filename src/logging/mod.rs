use slog::{o, Drain, Logger};
use slog_async::Async;
use slog_term::{FullFormat, TermDecorator};

/// Configuration for setting up the structured logger
#[derive(Debug, Clone, Copy)]
pub struct LoggerConfig {
    pub async_buffer_size: usize,
    pub use_color: bool,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            async_buffer_size: 1024,
            use_color: true,
        }
    }
}

/// Sets up the slog logger used by the notification feed.
///
/// Request-path logging goes through `tracing`; this logger exists for the
/// feed's key-value event records.
pub fn setup_logger(config: LoggerConfig) -> Logger {
    let decorator = {
        let builder = TermDecorator::new();
        let builder = if config.use_color {
            builder.force_color()
        } else {
            builder
        };
        builder.build()
    };

    let drain = FullFormat::new(decorator).build().fuse();

    let drain = Async::new(drain)
        .chan_size(config.async_buffer_size)
        .build()
        .fuse();

    Logger::root(drain, o!("version" => env!("CARGO_PKG_VERSION")))
}

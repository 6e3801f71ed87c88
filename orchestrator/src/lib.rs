pub mod config;
pub mod engine;
pub mod handlers;
pub mod models;
pub mod rubric_loader;
pub mod servers;
pub mod services;
pub mod submission_loader;
#[cfg(test)]
mod tests;
pub mod utils;

use tracing_appender::non_blocking::WorkerGuard;

/// Initialises the global tracing subscriber from `LoggingConfig`. Returns
/// the file-appender guard, which must be kept alive for the life of the
/// process when file logging is enabled.
pub fn init_tracing(config: &config::LoggingConfig) -> Option<WorkerGuard> {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));

    if let Some(path) = &config.file {
        let directory = std::path::Path::new(path).parent().unwrap_or_else(|| std::path::Path::new("."));
        let file_name = std::path::Path::new(path).file_name().unwrap_or_else(|| std::ffi::OsStr::new("orchestrator.log"));
        let file_appender = tracing_appender::rolling::daily(directory, file_name);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stdout))
            .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
            .init();

        Some(guard)
    } else {
        tracing_subscriber::registry().with(filter).with(fmt::layer().with_writer(std::io::stdout)).init();
        None
    }
}

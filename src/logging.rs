use crate::error::Error;
use crate::workdir::WorkingDir;
use chrono::Local;
use std::env;
use std::fmt;
use std::fs::{self, OpenOptions};
use tracing::{info, Event, Subscriber};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::{FmtContext, FormatEvent, FormatFields};
use tracing_subscriber::prelude::*;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

pub const LOG_FILE_NAME: &str = "purge.log";

/// `<timestamp>, <LEVEL> - <message>`, one event per line.
pub struct PurgeLogFormat;

impl<S, N> FormatEvent<S, N> for PurgeLogFormat
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        write!(
            writer,
            "{}, {} - ",
            Local::now().format("%Y-%m-%d %H:%M:%S"),
            event.metadata().level()
        )?;
        ctx.field_format().format_fields(writer.by_ref(), event)?;
        writeln!(writer)
    }
}

/// Log to stdout and append to `<cwd>/log/purge.log`. The returned guard
/// flushes the file writer on drop and must be kept alive by the caller.
pub fn init_logger(cwd: &WorkingDir) -> Result<WorkerGuard, Error> {
    let filter = env::var("TRACING_LEVEL").unwrap_or_else(|_| "info".to_string());
    let filter_layer = EnvFilter::new(filter);

    let log_dir = cwd.log_dir();
    let log_path = log_dir.join(LOG_FILE_NAME);
    let log_file = fs::create_dir_all(&log_dir)
        .and_then(|_| OpenOptions::new().create(true).append(true).open(&log_path))
        .map_err(|source| Error::LogFile {
            path: log_path.clone(),
            source,
        })?;
    let (non_blocking, guard) = tracing_appender::non_blocking(log_file);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .pretty()
                .with_file(false)
                .without_time()
                .with_ansi(true),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .event_format(PurgeLogFormat),
        )
        .with(filter_layer)
        .init();

    info!("Logging to {}", log_path.display());

    Ok(guard)
}

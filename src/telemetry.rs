//! Tracing setup: a registry with an env-filtered stderr layer and a
//! size-rotated log file, both driven by the `logging` settings block.
//! `RUST_LOG` overrides the configured default filter.

use std::fs::create_dir_all;
use std::path::PathBuf;
use std::sync::Mutex;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, fmt};

use crate::configuration::LoggingSettings;

pub fn init_tracing(settings: &LoggingSettings) -> crate::Result<()> {
    let directory = PathBuf::from(&settings.directory);
    create_dir_all(&directory)?;
    // The rotation library keeps the filename for the process lifetime;
    // one leak at startup covers that.
    let filename: &'static str = Box::leak(settings.filename.clone().into_boxed_str());
    let log_file = logs_wheel::LogFileInitializer {
        directory,
        filename,
        max_n_old_files: settings.keep_old_files,
        preferred_max_file_size_mib: settings.max_file_size_mib,
    }
    .init()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.default_filter));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr);
    let file_layer = fmt::layer()
        .with_writer(Mutex::new(log_file))
        .with_ansi(false);

    let subscriber = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer);
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set global default.");

    Ok(())
}

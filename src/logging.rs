use eyre::WrapErr as _;
use tracing_subscriber::{
    fmt,
    prelude::*,
    EnvFilter,
};

lazy_static::lazy_static! {
    static ref LOG_FILE: String = "ytcctl.log".to_string();
}

const DEFAULT_FILTER: &str = "info";

/// Logs go to `ytcctl.log` in the data directory, console output stays on stdout.
/// The log of the previous run is removed.
pub fn init_logging(level: Option<&str>) -> eyre::Result<()> {
    let directory = ytc_config::get_data_dir();
    std::fs::create_dir_all(&directory)
        .wrap_err_with(|| format!("Failed to create data directory {}", directory.display()))?;
    let log_path = directory.join(LOG_FILE.as_str());
    match std::fs::remove_file(&log_path) {
        Err(err) if err.kind() != std::io::ErrorKind::NotFound => {
            return Err(err).wrap_err_with(|| format!("Failed to remove old log file {}", log_path.display()));
        }
        _ => {}
    }
    let log_file = std::fs::File::create(&log_path)
        .wrap_err_with(|| format!("Failed to create log file {}", log_path.display()))?;

    let filter = match level {
        Some(level) => EnvFilter::try_new(level).wrap_err_with(|| format!("Invalid log level '{level}'"))?,
        None => EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(DEFAULT_FILTER))?,
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::sync::Mutex::new(log_file))
                .with_ansi(false)
                .with_target(true)
                .with_filter(filter),
        )
        .with(tracing_error::ErrorLayer::default())
        .try_init()
        .wrap_err("Failed to initialize tracing subscriber")?;
    debug!(path = %log_path.display(), "logging initialized");
    Ok(())
}

/// Logging initialization.
///
/// stderr via `tracing-subscriber::fmt`, plus a best-effort file layer at
/// `<data_dir>/stride.log` so logs are retrievable from the app sandbox even
/// when the host platform hides stderr.
///
/// Called once at the start of `FfiApp::new()`, before anything else.
pub fn init_logging(data_dir: &str) {
    use tracing_subscriber::prelude::*;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "stride_core=debug,info".into());

    let log_path = std::path::Path::new(data_dir).join("stride.log");
    let _ = std::fs::create_dir_all(data_dir);
    let file_layer = if let Ok(file) = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
    {
        Some(
            tracing_subscriber::fmt::layer()
                .with_writer(std::sync::Mutex::new(file))
                .with_ansi(false)
                .with_target(true),
        )
    } else {
        None
    };

    let _ = tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .try_init();
}

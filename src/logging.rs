use tracing_subscriber::EnvFilter;

const LOG_FORMAT_ENV: &str = "FWLOCATE_LOG_FORMAT";

/// Install the global tracing subscriber.
///
/// Logs go to stderr so progress lines on stdout stay clean. `RUST_LOG`
/// controls the filter (default `info`), `FWLOCATE_LOG_FORMAT=json` switches
/// to JSON lines. Calling this more than once is harmless.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let json = std::env::var(LOG_FORMAT_ENV)
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

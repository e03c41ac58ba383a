use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Installs a formatting subscriber filtered by `RUST_LOG`, defaulting to `info`.
///
/// Logs go to stderr so they never mix with the client's printed reply.
pub fn init_tracing() -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .try_init()
}

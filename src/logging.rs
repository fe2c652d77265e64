use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initializes structured logging on stderr; stdout carries the IPC
/// protocol and must stay clean. Level defaults to warn, overridable via
/// `ORALJURYD_LOG` or `RUST_LOG`.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_from_env("ORALJURYD_LOG"))
        .unwrap_or_else(|_| EnvFilter::new("oraljuryd=warn"));

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .compact()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_ansi(false),
        )
        .try_init();
}

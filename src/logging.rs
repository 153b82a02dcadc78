use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Installs the global subscriber: human-readable output on stderr, filtered
/// by `RUST_LOG` on top of a crate-level default.
///
/// Stdout stays free for piped record output.
pub fn init_logging(verbose: bool) {
    let directive = if verbose {
        "ncov_ingest=debug"
    } else {
        "ncov_ingest=info"
    };
    let filter = match directive.parse() {
        Ok(directive) => EnvFilter::from_default_env().add_directive(directive),
        Err(_) => EnvFilter::from_default_env(),
    };

    let console_layer = fmt::layer().with_writer(std::io::stderr).with_target(false);

    // try_init: a second call (tests, embedding) keeps the first subscriber
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .try_init();
}

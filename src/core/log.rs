use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const CRATE_TARGET: &str = "folio";

/// Installs the global subscriber on stderr so tables on stdout stay clean.
///
/// `verbose` shows this crate's debug events in the pretty format. Otherwise
/// `RUST_LOG` decides, defaulting to warnings from this crate only.
pub fn init_logging(verbose: bool) {
    let registry = tracing_subscriber::registry();
    let layer = fmt::layer().without_time().with_writer(std::io::stderr);

    if verbose {
        registry
            .with(EnvFilter::new(format!("{CRATE_TARGET}=debug")))
            .with(layer.pretty())
            .init();
    } else {
        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(format!("{CRATE_TARGET}=warn")));
        registry.with(filter).with(layer.compact()).init();
    }
}

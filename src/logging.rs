//! Log output for the binary.
//!
//! The library logs through the `log` macros; the subscriber installed here
//! also picks those records up. `RUST_LOG` selects the level (default `info`).

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Registry};

pub use tracing_subscriber::util::TryInitError;

pub fn init_logging() -> Result<(), TryInitError> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_level(true)
        .with_file(false)
        .with_line_number(false);

    Registry::default().with(env_filter).with(fmt_layer).try_init()
}

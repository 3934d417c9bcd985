//! Process-wide logger setup.

use env_logger::Env;

/// Install the `env_logger` backend for the `log` facade.
///
/// `RUST_LOG` overrides the default `info` filter. Calling this more than
/// once is harmless.
pub fn init() {
    let _ = env_logger::Builder::from_env(Env::default().default_filter_or("info"))
        .format_timestamp_secs()
        .format_module_path(false)
        .try_init();
}

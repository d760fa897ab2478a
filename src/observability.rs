//! Tracing setup
//!
//! `RUST_LOG` takes precedence; otherwise the level is `debug` or `info`
//! depending on the `debug` flag.

use tracing_subscriber::EnvFilter;

pub fn init_tracing(debug: bool, json: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let result = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };

    // Already installed (tests, repeated calls)
    if result.is_err() {
        tracing::debug!("Tracing subscriber already initialized");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_tracing_is_idempotent() {
        init_tracing(false, false);
        init_tracing(true, true);
    }
}

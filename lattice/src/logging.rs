//! Structured logging plumbing. Re-exports the `slog` surface the rest of
//! the crate uses and builds drains from TOML logger configuration.

pub use slog::{debug, error, info, o, trace, warn, Discard, Drain, Logger};

use sloggers::{Config, LoggerConfig};

const TERMINAL_CONFIG: &str = r#"
type = "terminal"
level = "debug"
destination = "stderr"
"#;

/// A debug-level terminal logger writing to stderr.
pub fn terminal() -> Logger {
    from_config_str(TERMINAL_CONFIG)
}

/// Builds a logger from a `sloggers` TOML configuration string.
///
/// Panics on an invalid configuration; this runs during startup where the
/// configuration is part of the deployment.
pub fn from_config_str(toml: &str) -> Logger {
    let config: LoggerConfig = serdeconv::from_toml_str(toml).expect("invalid logger configuration");

    config.build_logger().expect("logger construction failed")
}

/// A logger that drops everything; the default for components constructed
/// without a parent logger.
#[inline]
pub fn discard() -> Logger {
    Logger::root(Discard, o!())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_logger_builds() {
        let log = terminal();
        debug!(log, "logger constructed"; "context" => "test");
    }

    #[test]
    fn test_discard_logger_swallows() {
        let log = discard();
        trace!(log, "nothing to see"; "value" => 1);
    }
}

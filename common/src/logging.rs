//! JSON line logging on top of `env_logger`.

use std::env;
use std::io::Write;

use env_logger::{Builder, Target};
use serde_json::json;

/// Filter used when `LOG_LEVEL` is unset.
pub const DEFAULT_LEVEL: &str = "debug";

/// Installs the global logger, writing one JSON object per record to stderr.
///
/// The filter is read from `LOG_LEVEL` using `env_logger`'s directive syntax.
/// Calling this more than once is harmless.
pub fn init() {
    let level = env::var("LOG_LEVEL").unwrap_or_else(|_| DEFAULT_LEVEL.to_string());
    let _ = builder(&level).try_init();
}

fn builder(level: &str) -> Builder {
    let mut builder = Builder::new();
    builder
        .parse_filters(&level.to_lowercase())
        .target(Target::Stderr)
        .format(|buf, record| {
            let line = json!({
                "message": record.args().to_string(),
                "level": record.level().as_str(),
                "target": record.target(),
                "file": record.file(),
                "line": record.line(),
            });
            writeln!(buf, "{}", line)
        });
    builder
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init();
        init();
        log::info!("logger initialized");
    }

    #[test]
    fn builder_accepts_uppercase_levels() {
        let logger = builder("INFO").build();
        assert_eq!(logger.filter(), log::LevelFilter::Info);
    }
}

//! Log output for the `seofix` binary.
//!
//! Logs go to stderr; stdout carries command results only. Storage and HTTP
//! client crates are held at `warn` unless the filter names them.

use tracing::Level;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Directives appended to every default filter.
const QUIET_DEPENDENCIES: &[&str] = &["surrealdb=warn", "surrealkv=warn", "hyper=warn", "reqwest=warn"];

/// Filter from `SEOFIX_LOG`, then `RUST_LOG`, then `level` with noisy
/// dependencies held at `warn`.
pub fn log_filter(level: Level) -> EnvFilter {
    for var in ["SEOFIX_LOG", "RUST_LOG"] {
        if let Ok(filter) = EnvFilter::try_from_env(var) {
            return filter;
        }
    }
    default_filter(level)
}

fn default_filter(level: Level) -> EnvFilter {
    let mut directives = vec![level.as_str().to_ascii_lowercase()];
    directives.extend(QUIET_DEPENDENCIES.iter().map(|d| d.to_string()));
    EnvFilter::new(directives.join(","))
}

/// Install the process-wide subscriber. `json` selects one JSON object per
/// line. A second call leaves the first subscriber in place.
pub fn init_tracing(json: bool, level: Level) {
    let layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let registry = tracing_subscriber::registry().with(log_filter(level));
    let installed = if json {
        registry.with(layer.json()).try_init()
    } else {
        registry.with(layer).try_init()
    };
    if installed.is_err() {
        tracing::debug!("tracing subscriber already installed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_filter_quiets_dependencies() {
        let rendered = default_filter(Level::DEBUG).to_string();
        assert!(rendered.contains("debug"));
        assert!(rendered.contains("surrealdb=warn"));
    }

    #[test]
    fn test_second_init_keeps_first() {
        init_tracing(false, Level::WARN);
        init_tracing(true, Level::DEBUG);
    }
}

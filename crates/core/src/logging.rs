//! Logging and observability
//!
//! Structured logging for suite runs on stderr, leaving stdout for command
//! output. JSON output keeps span open/close events so CI can time each
//! setup and teardown stage.

use anyhow::Result;
use std::{io, sync::Once};
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::{
    fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer, Registry,
};

static INIT: Once = Once::new();

const DEFAULT_DIRECTIVE: &str = "info";

/// Output shape of log events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LogFormat {
    Text,
    Json,
}

impl LogFormat {
    /// Unknown names fall back to text
    fn from_name(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }

    fn span_events(self) -> FmtSpan {
        match self {
            Self::Json => FmtSpan::NEW | FmtSpan::CLOSE,
            Self::Text => FmtSpan::NONE,
        }
    }
}

/// Install the global subscriber
///
/// `format` is `"text"` or `"json"`; `None` defers to `PROVOST_LOG_FORMAT`.
/// Filter directives come from `PROVOST_LOG`, then `RUST_LOG`, then `info`.
/// Only the first call has an effect.
///
/// ```rust
/// provost_core::logging::init(None).expect("Failed to initialize logging");
/// ```
pub fn init(format: Option<&str>) -> Result<()> {
    INIT.call_once(|| {
        let env_format = std::env::var("PROVOST_LOG_FORMAT").ok();
        let format = LogFormat::from_name(format.or(env_format.as_deref()).unwrap_or("text"));
        let filter = env_filter(
            std::env::var("PROVOST_LOG").ok(),
            std::env::var("RUST_LOG").ok(),
        );

        let base = fmt::layer()
            .with_target(true)
            .with_span_events(format.span_events())
            .with_writer(io::stderr);
        let layer: Box<dyn Layer<Registry> + Send + Sync> = match format {
            LogFormat::Json => base.json().boxed(),
            LogFormat::Text => base.boxed(),
        };

        tracing_subscriber::registry().with(layer).with(filter).init();
        tracing::debug!("Logging initialized ({:?})", format);
    });

    Ok(())
}

/// Filter from `PROVOST_LOG`, falling back to `RUST_LOG`, then `info`
///
/// An unparsable `PROVOST_LOG` falls back to `info` rather than `RUST_LOG`.
fn env_filter(provost_log: Option<String>, rust_log: Option<String>) -> EnvFilter {
    match (provost_log, rust_log) {
        (Some(spec), _) => EnvFilter::try_new(&spec).unwrap_or_else(|_| {
            eprintln!("Invalid PROVOST_LOG '{}', using '{}'", spec, DEFAULT_DIRECTIVE);
            EnvFilter::new(DEFAULT_DIRECTIVE)
        }),
        (None, Some(spec)) => {
            EnvFilter::try_new(&spec).unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
        }
        (None, None) => EnvFilter::new(DEFAULT_DIRECTIVE),
    }
}

/// Check if logging has been initialized
pub fn is_initialized() -> bool {
    INIT.is_completed()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_multiple_calls_safe() {
        assert!(init(None).is_ok());
        assert!(init(Some("json")).is_ok());
        assert!(init(Some("invalid")).is_ok());
        assert!(is_initialized());
    }

    #[test]
    fn test_format_names() {
        assert_eq!(LogFormat::from_name("JSON"), LogFormat::Json);
        assert_eq!(LogFormat::from_name("text"), LogFormat::Text);
        assert_eq!(LogFormat::from_name("yaml"), LogFormat::Text);
        assert_eq!(LogFormat::Text.span_events(), FmtSpan::NONE);
        assert_eq!(LogFormat::Json.span_events(), FmtSpan::NEW | FmtSpan::CLOSE);
    }

    #[test]
    fn test_provost_log_takes_precedence() {
        let filter = env_filter(
            Some("provost_core=trace".to_string()),
            Some("warn".to_string()),
        );
        let directives = filter.to_string();
        assert!(directives.contains("provost_core=trace"));
        assert!(!directives.contains("warn"));
    }

    #[test]
    fn test_rust_log_fallback() {
        let filter = env_filter(None, Some("provost=debug".to_string()));
        assert!(filter.to_string().contains("provost=debug"));
    }

    #[test]
    fn test_invalid_or_missing_directives_use_info() {
        let filter = env_filter(Some("provost_core=loud".to_string()), None);
        assert_eq!(filter.to_string(), "info");
        assert_eq!(env_filter(None, None).to_string(), "info");
    }
}

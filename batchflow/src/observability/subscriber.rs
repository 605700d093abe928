use crate::errors::{BatchflowError, Result};
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;

/// Subscriber settings used when `RUST_LOG` is not set.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TracingConfig {
    /// Filter directives, in `RUST_LOG` syntax.
    #[serde(default = "default_filter")]
    pub filter: String,
    /// Emit JSON lines instead of human-readable output.
    #[serde(default)]
    pub json: bool,
}

fn default_filter() -> String {
    "info".to_string()
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            filter: default_filter(),
            json: false,
        }
    }
}

impl TracingConfig {
    /// Sets the fallback filter directives.
    #[must_use]
    pub fn with_filter(mut self, filter: impl Into<String>) -> Self {
        self.filter = filter.into();
        self
    }

    /// Enables JSON output.
    #[must_use]
    pub fn with_json(mut self, json: bool) -> Self {
        self.json = json;
        self
    }

    fn env_filter(&self) -> Result<EnvFilter> {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&self.filter))
            .map_err(|err| BatchflowError::Config(format!("invalid log filter '{}': {err}", self.filter)))
    }
}

/// Installs a fmt subscriber filtered by `RUST_LOG`, defaulting to `info`.
///
/// Safe to call multiple times (subsequent calls are no-ops).
pub fn init_tracing() {
    let _ = init_tracing_with(&TracingConfig::default());
}

/// Installs a fmt subscriber using `config` as the fallback filter.
///
/// Fails only if the filter directives cannot be parsed. An already
/// installed global subscriber is left in place.
pub fn init_tracing_with(config: &TracingConfig) -> Result<()> {
    let filter = config.env_filter()?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);
    let _ = if config.json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_is_repeatable() {
        init_tracing();
        init_tracing();
    }

    #[test]
    fn test_config_from_json() {
        let config: TracingConfig = serde_json::from_str(r#"{"json": true}"#).unwrap();
        assert_eq!(config, TracingConfig::default().with_json(true));
    }

    #[test]
    fn test_invalid_filter_is_config_error() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }
        let config = TracingConfig::default().with_filter("batchflow=notalevel");
        let err = init_tracing_with(&config).unwrap_err();
        assert!(matches!(err, BatchflowError::Config(_)));
    }
}

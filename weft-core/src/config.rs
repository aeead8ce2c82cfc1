//! Runtime Configuration

use serde::{Deserialize, Serialize};

/// Default cap on flush iterations before the scheduler gives up.
pub const DEFAULT_MAX_FLUSH_ITERATIONS: usize = 1000;

/// Settings for a [`Runtime`](crate::reactive::Runtime).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Strict mode. When `false` the runtime behaves in legacy mode: an
    /// effect never re-triggers itself and writes inside deriveds are not
    /// rejected.
    pub strict: bool,

    /// Number of scheduler passes a single flush may take.
    pub max_flush_iterations: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            strict: true,
            max_flush_iterations: DEFAULT_MAX_FLUSH_ITERATIONS,
        }
    }
}

impl RuntimeConfig {
    /// Legacy-mode configuration.
    pub fn legacy() -> Self {
        Self {
            strict: false,
            ..Self::default()
        }
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_strict() {
        let config = RuntimeConfig::default();
        assert!(config.strict);
        assert_eq!(config.max_flush_iterations, DEFAULT_MAX_FLUSH_ITERATIONS);
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config = RuntimeConfig::from_json(r#"{ "strict": false }"#).unwrap();
        assert_eq!(config, RuntimeConfig::legacy());
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(RuntimeConfig::from_json("{ strict: nope").is_err());
    }
}

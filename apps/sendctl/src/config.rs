//! Controller configuration.

use serde::Deserialize;

/// Controller configuration, loaded from an optional YAML file with
/// environment variable overrides, matching the speaker daemon's config
/// layering.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SenderConfig {
    /// How long to wait for a discovery announcement before giving up.
    /// Override: `FLOCKCAST_DISCOVER_TIMEOUT_MS`
    pub discover_timeout_ms: u64,
}

impl Default for SenderConfig {
    fn default() -> Self {
        Self {
            discover_timeout_ms: 10_000,
        }
    }
}

impl SenderConfig {
    /// Loads configuration from an optional YAML file, then applies
    /// environment variable overrides.
    pub fn load(path: Option<&std::path::Path>) -> anyhow::Result<Self> {
        use anyhow::Context;

        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        if let Ok(val) = std::env::var("FLOCKCAST_DISCOVER_TIMEOUT_MS") {
            if let Ok(ms) = val.parse() {
                config.discover_timeout_ms = ms;
            }
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_timeout_is_ten_seconds() {
        assert_eq!(SenderConfig::default().discover_timeout_ms, 10_000);
    }
}

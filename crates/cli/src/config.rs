//! Optional `glyph.toml` configuration: GC tuning knobs only. There is
//! no strand/thread-pool section because the core evaluator is
//! single-threaded (spec 5).

use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    pub gc: GcConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GcConfig {
    /// Bytes charged against the depletion counter before a collection
    /// is triggered. Matches `Engine::new`'s built-in default.
    pub depletion_threshold: i64,
}

impl Default for GcConfig {
    fn default() -> Self {
        GcConfig {
            depletion_threshold: 64 * 1024 * 1024,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config { gc: GcConfig::default() }
    }
}

impl Config {
    /// Load `path` if it exists; otherwise fall back to defaults. A
    /// present-but-unparseable file is an error, missing is not.
    pub fn load(path: &Path) -> Result<Config, Box<dyn std::error::Error>> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Config::default());
        }
        let text = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&text)?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }
}

//! YAML configuration for seeding edit sessions.
//!
//! # Storage layout
//!
//! ```text
//! ~/.tlbsync/
//!   config.yaml   (optional; defaults apply when absent)
//! ```
//!
//! # API pattern
//!
//! Every filesystem function has two forms:
//! - `fn_at(home: &Path, …)`: explicit home; used in tests with `TempDir`
//! - `fn(…)`: derives home from `dirs::home_dir()`, delegates to `_at`

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::DataFormat;

/// Schema a fresh session opens with.
pub const DEFAULT_SCHEMA: &str =
    "message#_ len:(## 7) { len <= 127 } text:(bits (len * 8)) = Message;";

/// Sample payload matching [`DEFAULT_SCHEMA`].
pub const DEFAULT_BINARY: &str = "te6cckEBAQEAFwAAKSioyuboQNrK5ubCzspA0txAxsrY2Whv0fw=";

/// Seed values for a new synchronizer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub schema: String,
    /// Initial payload; takes precedence over `structured` when both are set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub structured: Option<String>,
    #[serde(default)]
    pub format: DataFormat,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            schema: DEFAULT_SCHEMA.to_string(),
            binary: Some(DEFAULT_BINARY.to_string()),
            structured: None,
            format: DataFormat::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.tlbsync/config.yaml`; pure, no I/O.
pub fn config_path_at(home: &Path) -> PathBuf {
    home.join(".tlbsync").join("config.yaml")
}

/// `config_path_at` convenience wrapper.
pub fn config_path() -> Result<PathBuf, ConfigError> {
    Ok(config_path_at(&home()?))
}

// ---------------------------------------------------------------------------
// 2. Load
// ---------------------------------------------------------------------------

/// Load the config from `<home>/.tlbsync/config.yaml`.
///
/// A missing file yields [`Config::default`]. Malformed YAML yields
/// `ConfigError::Parse` with the path; a blank schema yields
/// `ConfigError::Invalid`.
pub fn load_at(home: &Path) -> Result<Config, ConfigError> {
    let path = config_path_at(home);
    if !path.exists() {
        return Ok(Config::default());
    }
    let contents = std::fs::read_to_string(&path)?;
    let config: Config = serde_yaml::from_str(&contents)
        .map_err(|e| ConfigError::Parse { path: path.clone(), source: e })?;
    if config.schema.trim().is_empty() {
        return Err(ConfigError::Invalid {
            path,
            reason: "schema must not be empty".to_string(),
        });
    }
    Ok(config)
}

/// `load_at` convenience wrapper.
pub fn load() -> Result<Config, ConfigError> {
    load_at(&home()?)
}

// ---------------------------------------------------------------------------
// 3. Save (atomic)
// ---------------------------------------------------------------------------

/// Atomically save `config` to `<home>/.tlbsync/config.yaml`.
///
/// Write flow: serialize → `.yaml.tmp` sibling → `rename`.
pub fn save_at(home: &Path, config: &Config) -> Result<PathBuf, ConfigError> {
    let path = config_path_at(home);
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let tmp_path = path.with_file_name("config.yaml.tmp");
    let yaml = serde_yaml::to_string(config)?;
    std::fs::write(&tmp_path, yaml)?;
    std::fs::rename(&tmp_path, &path)?;
    Ok(path)
}

/// `save_at` convenience wrapper.
pub fn save(config: &Config) -> Result<PathBuf, ConfigError> {
    save_at(&home()?, config)
}

fn home() -> Result<PathBuf, ConfigError> {
    dirs::home_dir().ok_or(ConfigError::HomeNotFound)
}

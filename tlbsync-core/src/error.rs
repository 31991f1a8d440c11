//! Failures while reading or writing `~/.tlbsync/config.yaml`.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    /// Creating `~/.tlbsync/`, reading the file, or the tmp-file rename failed.
    #[error("config file access failed: {0}")]
    Io(#[from] std::io::Error),

    /// The in-memory config could not be rendered as YAML.
    #[error("cannot write config as YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The file exists but is not a valid config document.
    #[error("failed to parse config at {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("cannot determine home directory; set $HOME or equivalent")]
    HomeNotFound,

    /// The file parsed, but a field cannot seed a session (a blank schema, say).
    #[error("invalid config at {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },
}

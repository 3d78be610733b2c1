use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::shared::constants::{
    CLUSTER_MIN_SCORE, CLUSTER_MIN_SIZE, CONFIG_DIR_NAME, CONFIG_FILE_NAME, DUPLICATE_TOLERANCE,
    MATCH_DIST, VALID_SCORE_FLOOR,
};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Tunable thresholds for marker resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    pub duplicate_tolerance: f32,
    pub cluster_min_size: i32,
    pub cluster_min_score: i32,
    pub match_dist: f64,
    pub valid_score_floor: i32,
    pub workers: usize,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            duplicate_tolerance: DUPLICATE_TOLERANCE,
            cluster_min_size: CLUSTER_MIN_SIZE,
            cluster_min_score: CLUSTER_MIN_SCORE,
            match_dist: MATCH_DIST,
            valid_score_floor: VALID_SCORE_FLOOR,
            workers: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
        }
    }
}

impl ResolverConfig {
    /// `<config dir>/face-resolver/config.json`, if the platform has one.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join(CONFIG_DIR_NAME).join(CONFIG_FILE_NAME))
    }

    /// Reads an explicit config file. Missing or malformed files are errors.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        serde_json::from_str(&json).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Loads the explicit path if given, else the default location,
    /// falling back to defaults when no default file exists.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            return Self::from_file(path);
        }
        match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(&path),
            _ => Ok(Self::default()),
        }
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)
    }
}

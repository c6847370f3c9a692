//! Server configuration.
//!
//! Settings are resolved in three layers: built-in defaults, then an optional
//! TOML file, then command-line flags.

use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when loading configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file exists but could not be read.
    #[error("Failed to read config file {path}: {source}")]
    ReadError {
        path: String,
        #[source]
        source: std::io::Error,
    },
    /// The configuration file is not valid TOML for [`Config`].
    #[error("Failed to parse config {path}: {source}")]
    ParseError {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

/// Command-line flags.
#[derive(Parser, Debug)]
#[command(name = "analysis-server")]
#[command(about = "Cached Stockfish analysis over HTTP and WebSocket")]
pub struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "analysis.toml")]
    pub config: PathBuf,

    /// Address to listen on (overrides the config file).
    #[arg(long)]
    pub bind: Option<String>,

    /// Path to the Stockfish executable (overrides the config file).
    #[arg(long)]
    pub stockfish: Option<PathBuf>,

    /// Path to the SQLite database (overrides the config file).
    #[arg(long)]
    pub database: Option<PathBuf>,
}

/// Depth and time defaults for analysis requests.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct AnalysisDefaults {
    /// Depth for `POST /analyze` when the request gives none.
    pub default_depth: u32,
    /// Seconds for `POST /analyze` when the request gives none.
    pub default_time_limit: f64,
    /// Depth for each position of a game analysis.
    pub batch_depth: u32,
    /// Seconds for each position of a game analysis.
    pub batch_time_limit: f64,
    /// Seconds for `POST /variations`.
    pub variation_time_limit: f64,
}

impl Default for AnalysisDefaults {
    fn default() -> Self {
        Self {
            default_depth: 20,
            default_time_limit: 0.5,
            batch_depth: 15,
            batch_time_limit: 1.0,
            variation_time_limit: 0.2,
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Stockfish executable. Defaults to "stockfish" (assumes it's in PATH).
    pub stockfish_path: PathBuf,
    /// SQLite database file.
    pub database_path: PathBuf,
    /// Listen address.
    pub bind: String,
    pub analysis: AnalysisDefaults,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            stockfish_path: PathBuf::from("stockfish"),
            database_path: PathBuf::from("data/analysis.db"),
            bind: "127.0.0.1:8000".to_string(),
            analysis: AnalysisDefaults::default(),
        }
    }
}

impl Config {
    /// Load configuration from `path`, falling back to defaults if the file
    /// does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ReadError`] if the file exists but cannot be read,
    /// or [`ConfigError::ParseError`] if the file contains invalid TOML.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::ReadError {
            path: path.display().to_string(),
            source,
        })?;
        toml::from_str(&content).map_err(|source| ConfigError::ParseError {
            path: path.display().to_string(),
            source,
        })
    }

    /// Load the file named by `args` and apply the flags on top.
    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        let mut config = Self::load(&args.config)?;
        if let Some(bind) = &args.bind {
            config.bind = bind.clone();
        }
        if let Some(stockfish) = &args.stockfish {
            config.stockfish_path = stockfish.clone();
        }
        if let Some(database) = &args.database {
            config.database_path = database.clone();
        }
        Ok(config)
    }
}

/// Longest engine time a request may ask for, in seconds.
pub const MAX_TIME_LIMIT: f64 = 300.0;

/// Convert a request's seconds into a [`Duration`].
///
/// Returns `None` for negative or non-finite values and for anything above
/// [`MAX_TIME_LIMIT`].
pub fn seconds(value: f64) -> Option<Duration> {
    if !(0.0..=MAX_TIME_LIMIT).contains(&value) {
        return None;
    }
    Duration::try_from_secs_f64(value).ok()
}

//! Configuration for the respwire tool.
//!
//! Supports both command-line arguments and TOML configuration file.
//! CLI arguments take precedence over config file values.

use crate::resp::{DecodeLimits, DEFAULT_MAX_DEPTH};
use clap::{Parser, ValueEnum};
use serde::Deserialize;
use std::path::PathBuf;
use thiserror::Error;

/// How decoded values are written to stdout
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// redis-cli style rendering, one value per block
    Inspect,
    /// Canonical RESP encoding of each value
    Wire,
}

/// Command-line arguments for respwire
#[derive(Parser, Debug)]
#[command(name = "respwire")]
#[command(author = "respwire authors")]
#[command(version = "0.1.0")]
#[command(about = "Decode, inspect and re-encode RESP value streams", long_about = None)]
pub struct CliArgs {
    /// Path to TOML configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// File to read values from (defaults to stdin)
    #[arg(short, long)]
    pub input: Option<PathBuf>,

    /// Output format
    #[arg(short, long, value_enum)]
    pub format: Option<OutputFormat>,

    /// Largest accepted bulk string in bytes (0 = unlimited)
    #[arg(long)]
    pub max_bulk_len: Option<usize>,

    /// Largest accepted array element count (0 = unlimited)
    #[arg(long)]
    pub max_array_len: Option<usize>,

    /// Deepest accepted array nesting (0 = unlimited)
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    pub log_level: Option<String>,
}

/// TOML configuration file structure
#[derive(Debug, Deserialize, Default)]
pub struct TomlConfig {
    #[serde(default)]
    pub decoder: DecoderConfig,
    #[serde(default)]
    pub output: OutputConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Decode limits; 0 disables a limit
#[derive(Debug, Deserialize)]
pub struct DecoderConfig {
    #[serde(default = "default_max_bulk_len")]
    pub max_bulk_len: usize,
    #[serde(default = "default_max_array_len")]
    pub max_array_len: usize,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
}

impl Default for DecoderConfig {
    fn default() -> Self {
        Self {
            max_bulk_len: default_max_bulk_len(),
            max_array_len: default_max_array_len(),
            max_depth: default_max_depth(),
        }
    }
}

/// Output configuration
#[derive(Debug, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_format")]
    pub format: OutputFormat,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            format: default_format(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Deserialize)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_max_bulk_len() -> usize {
    512 * 1024 * 1024 // 512 MB
}

fn default_max_array_len() -> usize {
    1024 * 1024
}

fn default_max_depth() -> usize {
    DEFAULT_MAX_DEPTH
}

fn default_format() -> OutputFormat {
    OutputFormat::Inspect
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Final resolved configuration
#[derive(Debug, Clone)]
pub struct Config {
    pub input: Option<PathBuf>,
    pub format: OutputFormat,
    pub limits: DecodeLimits,
    pub log_level: String,
}

impl Config {
    /// Load configuration from CLI args and optional TOML file.
    /// CLI arguments take precedence over TOML file values.
    pub fn load() -> Result<Self, ConfigError> {
        let cli = CliArgs::parse();

        // Load TOML config if specified
        let toml_config = if let Some(ref config_path) = cli.config {
            let contents = std::fs::read_to_string(config_path)
                .map_err(|e| ConfigError::FileRead(config_path.clone(), e))?;
            toml::from_str(&contents)
                .map_err(|e| ConfigError::TomlParse(config_path.clone(), e))?
        } else {
            TomlConfig::default()
        };

        Ok(Self::merge(cli, toml_config))
    }

    /// Merge CLI args with TOML config (CLI takes precedence)
    pub fn merge(cli: CliArgs, toml_config: TomlConfig) -> Self {
        let decoder = toml_config.decoder;
        Config {
            input: cli.input,
            format: cli.format.unwrap_or(toml_config.output.format),
            limits: DecodeLimits {
                max_bulk_len: limit(cli.max_bulk_len.unwrap_or(decoder.max_bulk_len)),
                max_array_len: limit(cli.max_array_len.unwrap_or(decoder.max_array_len)),
                max_depth: limit(cli.max_depth.unwrap_or(decoder.max_depth)),
            },
            log_level: cli.log_level.unwrap_or(toml_config.logging.level),
        }
    }
}

fn limit(value: usize) -> Option<usize> {
    (value != 0).then_some(value)
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {}", .0.display(), .1)]
    FileRead(PathBuf, #[source] std::io::Error),
    #[error("Failed to parse config file '{}': {}", .0.display(), .1)]
    TomlParse(PathBuf, #[source] toml::de::Error),
}

//! Engine configuration.
//!
//! Values come from an optional JSON file (`config.json` in the user config
//! directory) with per-field defaults, and may be overridden by the caller.

use crate::index::builder::DEFAULT_SPLIT_LOOKBACK;
use crate::storage::{
    DecompressMode, StorageConfig, StorageKind, DEFAULT_CHUNK_SIZE, DEFAULT_COMPRESSION_RATIO,
};
use crate::utils::TextEncoding;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

const APP_NAME: &str = "linex";
const CONFIG_FILE: &str = "config.json";

/// Memory limit used when the in-memory threshold is `auto`
const AUTO_MEMORY_LIMIT: u64 = 256 * 1024 * 1024;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid size '{0}': expected bytes with optional K/M/G/T suffix, 'auto' or 'off'")]
    InvalidSize(String),

    #[error("invalid thread count '{0}': expected a positive number or 'auto'")]
    InvalidThreads(String),

    #[error("max partial size must be at least 1 byte")]
    ZeroPartialSize,

    #[error("compression ratio must be in (0, 1], got {0}")]
    InvalidRatio(String),

    #[error("chunk size must be at least 1 byte")]
    ZeroChunkSize,
}

/// A byte threshold that may also be `auto` or `off`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SizeLimit {
    #[default]
    Auto,
    Off,
    Bytes(u64),
}

impl SizeLimit {
    /// Resolve to a byte count; `Off` is zero and `Auto` takes `auto`
    pub fn resolve(self, auto: Option<u64>) -> Option<u64> {
        match self {
            SizeLimit::Auto => auto,
            SizeLimit::Off => Some(0),
            SizeLimit::Bytes(n) => Some(n),
        }
    }
}

impl FromStr for SizeLimit {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        match trimmed.to_ascii_lowercase().as_str() {
            "auto" => return Ok(SizeLimit::Auto),
            "off" | "none" => return Ok(SizeLimit::Off),
            _ => {}
        }

        let invalid = || ConfigError::InvalidSize(s.to_string());
        let upper = trimmed.to_ascii_uppercase();
        let number = upper.strip_suffix('B').unwrap_or(&upper);
        let (digits, shift) = match number.chars().last() {
            Some('K') => (&number[..number.len() - 1], 10),
            Some('M') => (&number[..number.len() - 1], 20),
            Some('G') => (&number[..number.len() - 1], 30),
            Some('T') => (&number[..number.len() - 1], 40),
            _ => (number, 0),
        };

        let value: u64 = digits.trim().parse().map_err(|_| invalid())?;
        value
            .checked_mul(1u64 << shift)
            .map(SizeLimit::Bytes)
            .ok_or_else(invalid)
    }
}

impl TryFrom<String> for SizeLimit {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SizeLimit> for String {
    fn from(value: SizeLimit) -> Self {
        value.to_string()
    }
}

impl fmt::Display for SizeLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SizeLimit::Auto => f.write_str("auto"),
            SizeLimit::Off => f.write_str("off"),
            SizeLimit::Bytes(n) => write!(f, "{}", n),
        }
    }
}

/// Number of search worker threads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ThreadCount {
    #[default]
    Auto,
    Fixed(usize),
}

impl ThreadCount {
    pub fn resolve(self) -> usize {
        match self {
            ThreadCount::Auto => num_cpus(),
            ThreadCount::Fixed(n) => n.max(1),
        }
    }
}

impl FromStr for ThreadCount {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.trim().eq_ignore_ascii_case("auto") {
            return Ok(ThreadCount::Auto);
        }
        match s.trim().parse::<usize>() {
            Ok(n) if n > 0 => Ok(ThreadCount::Fixed(n)),
            _ => Err(ConfigError::InvalidThreads(s.to_string())),
        }
    }
}

impl TryFrom<String> for ThreadCount {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ThreadCount> for String {
    fn from(value: ThreadCount) -> Self {
        match value {
            ThreadCount::Auto => "auto".to_string(),
            ThreadCount::Fixed(n) => n.to_string(),
        }
    }
}

/// Get the number of CPUs available
fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Longest partial line in bytes before a forced split
    #[serde(default = "default_max_partial_size")]
    pub max_partial_size: usize,

    /// Look-back window for choosing a split separator
    #[serde(default = "default_split_lookback")]
    pub split_lookback: usize,

    /// Content up to this size is kept raw in memory
    #[serde(default)]
    pub memory_limit: SizeLimit,

    /// Content up to this size is kept compressed in memory
    #[serde(default)]
    pub compress_limit: SizeLimit,

    /// Compressed/raw ratio above which compression is abandoned
    #[serde(default = "default_compression_ratio")]
    pub compression_ratio: f32,

    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    #[serde(default)]
    pub decompress_mode: DecompressMode,

    #[serde(default)]
    pub search_threads: ThreadCount,

    /// Skip detection and decode with this encoding
    #[serde(default)]
    pub encoding: Option<TextEncoding>,

    /// Interval between partial-load snapshots; 0 disables them
    #[serde(default = "default_snapshot_interval_ms")]
    pub snapshot_interval_ms: u64,

    #[serde(default = "default_tab_width")]
    pub tab_width: usize,

    /// Longest decoded line handed to consumers; longer lines are truncated
    #[serde(default)]
    pub max_line_chars: Option<usize>,
}

fn default_max_partial_size() -> usize {
    64 * 1024
}

fn default_split_lookback() -> usize {
    DEFAULT_SPLIT_LOOKBACK
}

fn default_compression_ratio() -> f32 {
    DEFAULT_COMPRESSION_RATIO
}

fn default_chunk_size() -> usize {
    DEFAULT_CHUNK_SIZE
}

fn default_snapshot_interval_ms() -> u64 {
    500
}

fn default_tab_width() -> usize {
    8
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_partial_size: default_max_partial_size(),
            split_lookback: default_split_lookback(),
            memory_limit: SizeLimit::Auto,
            compress_limit: SizeLimit::Auto,
            compression_ratio: default_compression_ratio(),
            chunk_size: default_chunk_size(),
            decompress_mode: DecompressMode::Cached,
            search_threads: ThreadCount::Auto,
            encoding: None,
            snapshot_interval_ms: default_snapshot_interval_ms(),
            tab_width: default_tab_width(),
            max_line_chars: None,
        }
    }
}

impl Config {
    /// Load config from the user config directory, or return default if not found
    pub fn load() -> Result<Self> {
        match get_config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load config from a specific file
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Save config to the user config directory
    pub fn save(&self) -> Result<()> {
        let path = get_config_path().context("Could not determine config directory")?;
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)?;
        }
        let content = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(&path, content).context("Failed to write config file")?;
        Ok(())
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_partial_size == 0 {
            return Err(ConfigError::ZeroPartialSize);
        }
        if self.chunk_size == 0 {
            return Err(ConfigError::ZeroChunkSize);
        }
        if !(self.compression_ratio > 0.0 && self.compression_ratio <= 1.0) {
            return Err(ConfigError::InvalidRatio(self.compression_ratio.to_string()));
        }
        Ok(())
    }

    pub fn snapshot_interval(&self) -> Option<Duration> {
        (self.snapshot_interval_ms > 0).then(|| Duration::from_millis(self.snapshot_interval_ms))
    }

    pub fn storage_config(&self, base_offset: u64) -> StorageConfig {
        StorageConfig {
            chunk_size: self.chunk_size,
            compression_ratio: self.compression_ratio,
            decompress_mode: self.decompress_mode,
            base_offset,
            ..StorageConfig::default()
        }
    }

    /// Pick a storage backend for content of `size` bytes (`None` if unknown).
    ///
    /// Small content stays raw in memory, larger content is compressed, and
    /// plain files beyond the compression limit are read back from disk.
    /// Streams of unknown size that cannot be re-read are compressed unless
    /// compression is off.
    pub fn choose_storage(&self, size: Option<u64>, rereadable_file: bool) -> StorageKind {
        let memory = self.memory_limit.resolve(Some(AUTO_MEMORY_LIMIT)).unwrap_or(0);
        let compress = self.compress_limit.resolve(None);
        let compression_off = self.compress_limit == SizeLimit::Off;

        if let Some(size) = size {
            if size <= memory {
                return StorageKind::Memory;
            }
            if !compression_off && compress.is_none_or(|limit| size <= limit) {
                return StorageKind::Compressed;
            }
            if rereadable_file {
                return StorageKind::File;
            }
        }

        if compression_off {
            StorageKind::Memory
        } else {
            StorageKind::Compressed
        }
    }
}

/// Get the path to the config file
pub fn get_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_NAME).join(CONFIG_FILE))
}

//! # Config - SlateKV Configuration
//!
//! Engine and front-end parameters, read from a YAML file:
//!
//! ```yaml
//! data_dir: data
//! segment_size: 5          # WAL records per segment
//! lwm: 9                   # WAL segments before a forced flush
//! wal_sync: true
//! memtable_capacity: 10
//! memtable_threshold: 0.8  # full at floor(capacity * threshold) entries
//! lsm_levels: 5
//! lsm_level_max: 4         # tables per level before compaction
//! cache_size: 10
//! summary_interval: 10
//! bloom_fpr: 0.01
//! token_time: 10           # rate-limit window, seconds
//! token_requests: 3        # requests admitted per window
//! ```
//!
//! Every key is optional. A missing or empty file yields
//! [`EngineConfig::default`]; a field with an out-of-range value is reset to
//! its default with a warning. Only malformed YAML is an error.

use log::{info, warn};
use serde::Deserialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] serde_yaml::Error),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub data_dir: PathBuf,
    pub segment_size: usize,
    #[serde(rename = "lwm")]
    pub wal_low_water_mark: usize,
    pub wal_sync: bool,
    pub memtable_capacity: usize,
    pub memtable_threshold: f64,
    pub lsm_levels: usize,
    #[serde(rename = "lsm_level_max")]
    pub max_tables_per_level: usize,
    pub cache_size: usize,
    pub summary_interval: usize,
    pub bloom_fpr: f64,
    #[serde(rename = "token_time")]
    pub token_window_secs: u64,
    pub token_requests: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            segment_size: 5,
            wal_low_water_mark: 9,
            wal_sync: true,
            memtable_capacity: 10,
            memtable_threshold: 0.8,
            lsm_levels: 5,
            max_tables_per_level: 4,
            cache_size: 10,
            summary_interval: 10,
            bloom_fpr: 0.01,
            token_window_secs: 10,
            token_requests: 3,
        }
    }
}

impl EngineConfig {
    /// Loads `path`, falling back to defaults when it does not exist or is empty.
    ///
    /// # Errors
    ///
    /// [`ConfigError::Io`] if the file exists but cannot be read,
    /// [`ConfigError::Parse`] if it is not valid YAML for this schema.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(text) => Self::from_yaml_str(&text),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                info!("config {:?} not found, using defaults", path);
                Ok(Self::default())
            }
            Err(source) => Err(ConfigError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Parses YAML text and validates the result.
    pub fn from_yaml_str(text: &str) -> Result<Self, ConfigError> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        let mut cfg: Self = serde_yaml::from_str(text)?;
        cfg.validate();
        Ok(cfg)
    }

    /// Resets every out-of-range field to its default, logging a warning for
    /// each. Returns the number of fields reset.
    pub fn validate(&mut self) -> usize {
        let d = Self::default();
        let mut reset = 0;

        macro_rules! fallback {
            ($field:ident, $bad:expr) => {
                if $bad {
                    warn!(
                        "config: invalid {} {:?}, using default {:?}",
                        stringify!($field),
                        self.$field,
                        d.$field
                    );
                    self.$field = d.$field.clone();
                    reset += 1;
                }
            };
        }

        fallback!(data_dir, self.data_dir.as_os_str().is_empty());
        fallback!(segment_size, self.segment_size == 0);
        fallback!(wal_low_water_mark, self.wal_low_water_mark == 0);
        fallback!(memtable_capacity, self.memtable_capacity == 0);
        fallback!(
            memtable_threshold,
            !(self.memtable_threshold > 0.0 && self.memtable_threshold <= 1.0)
        );
        fallback!(lsm_levels, self.lsm_levels == 0);
        fallback!(max_tables_per_level, self.max_tables_per_level == 0);
        fallback!(cache_size, self.cache_size == 0);
        fallback!(summary_interval, self.summary_interval == 0);
        fallback!(bloom_fpr, !(self.bloom_fpr > 0.0 && self.bloom_fpr < 1.0));
        fallback!(token_window_secs, self.token_window_secs == 0);
        fallback!(token_requests, self.token_requests == 0);

        reset
    }

    /// Entries the memtable holds before it flushes.
    #[must_use]
    pub fn memtable_limit(&self) -> usize {
        ((self.memtable_capacity as f64 * self.memtable_threshold).floor() as usize).max(1)
    }

    #[must_use]
    pub fn token_window(&self) -> Duration {
        Duration::from_secs(self.token_window_secs)
    }

    pub fn with_data_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.data_dir = dir.into();
        self
    }

    pub fn with_segment_size(mut self, records: usize) -> Self {
        self.segment_size = records;
        self
    }

    pub fn with_low_water_mark(mut self, segments: usize) -> Self {
        self.wal_low_water_mark = segments;
        self
    }

    pub fn with_wal_sync(mut self, sync: bool) -> Self {
        self.wal_sync = sync;
        self
    }

    pub fn with_memtable(mut self, capacity: usize, threshold: f64) -> Self {
        self.memtable_capacity = capacity;
        self.memtable_threshold = threshold;
        self
    }

    pub fn with_levels(mut self, levels: usize, max_tables_per_level: usize) -> Self {
        self.lsm_levels = levels;
        self.max_tables_per_level = max_tables_per_level;
        self
    }

    pub fn with_cache_size(mut self, entries: usize) -> Self {
        self.cache_size = entries;
        self
    }

    pub fn with_summary_interval(mut self, interval: usize) -> Self {
        self.summary_interval = interval;
        self
    }

    pub fn with_bloom_fpr(mut self, fpr: f64) -> Self {
        self.bloom_fpr = fpr;
        self
    }

    pub fn with_rate_limit(mut self, window_secs: u64, requests: u32) -> Self {
        self.token_window_secs = window_secs;
        self.token_requests = requests;
        self
    }
}

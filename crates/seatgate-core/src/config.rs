use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use crate::retry::BackoffPolicy;

/// How same-item admissions are serialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    /// Per-item ordered queue drained by one consumer per shard.
    #[default]
    Queue,
    /// Lease mutex acquired by the calling task.
    Lock,
}

/// Whether one requester may hold several reservations for the same item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    #[default]
    Reject,
    Allow,
}

/// When waitlisted requesters get promoted into freed slots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromotionPolicy {
    /// Only through an explicit `promote_waitlist` call.
    #[default]
    Manual,
    /// A successful cancellation promotes the waitlist head in the same section.
    OnCancel,
}

/// Which notification group an outcome is published to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Addressing {
    /// One room for everybody.
    Shared,
    /// One group per item.
    Item,
    /// One group per requester.
    #[default]
    Requester,
}

/// Serializer sharding parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SerializerConfig {
    /// Number of consumer shards; an item always maps to `item_id % shards`.
    pub shards: usize,
    /// Bounded queue length per shard. A full queue rejects new intents.
    pub queue_capacity: usize,
}

impl Default for SerializerConfig {
    fn default() -> Self {
        Self {
            shards: 8,
            queue_capacity: 1024,
        }
    }
}

/// Lease acquisition retry parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Maximum number of acquire attempts (including the first).
    pub max_attempts: u32,
    /// Base delay in milliseconds; doubles per attempt.
    pub base_delay_ms: u64,
    /// Upper bound on the exponential part, in milliseconds.
    pub max_delay_ms: u64,
    /// Random extra delay in `[0, jitter_ms]` added to every wait.
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_delay_ms: 20,
            max_delay_ms: 500,
            jitter_ms: 25,
        }
    }
}

impl RetryConfig {
    pub fn to_policy(&self) -> BackoffPolicy {
        BackoffPolicy {
            max_attempts: self.max_attempts.max(1),
            base_delay: Duration::from_millis(self.base_delay_ms),
            max_delay: Duration::from_millis(self.max_delay_ms),
            jitter: Duration::from_millis(self.jitter_ms),
        }
    }
}

/// Lease mutex parameters (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// Lease duration in milliseconds; the lease expires even if never released.
    pub lease_ms: u64,
    #[serde(default)]
    pub retry: RetryConfig,
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            lease_ms: 5_000,
            retry: RetryConfig::default(),
        }
    }
}

impl LockConfig {
    pub fn lease(&self) -> Duration {
        Duration::from_millis(self.lease_ms.max(1))
    }
}

/// Global configuration loaded from `~/.config/seatgate/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeatgateConfig {
    #[serde(default)]
    pub strategy: Strategy,
    #[serde(default)]
    pub duplicate_policy: DuplicatePolicy,
    #[serde(default)]
    pub promotion: PromotionPolicy,
    #[serde(default)]
    pub addressing: Addressing,
    /// Buffered events per notification group before slow subscribers lag.
    #[serde(default = "default_notification_capacity")]
    pub notification_capacity: usize,
    /// Redis URL for the shared cache, waitlist and mutex. None = in-process backends.
    #[serde(default)]
    pub redis_url: Option<String>,
    /// SQLite file for reservations. None = XDG state dir.
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub serializer: SerializerConfig,
    #[serde(default)]
    pub lock: LockConfig,
}

fn default_notification_capacity() -> usize {
    64
}

impl Default for SeatgateConfig {
    fn default() -> Self {
        Self {
            strategy: Strategy::default(),
            duplicate_policy: DuplicatePolicy::default(),
            promotion: PromotionPolicy::default(),
            addressing: Addressing::default(),
            notification_capacity: default_notification_capacity(),
            redis_url: None,
            database_path: None,
            serializer: SerializerConfig::default(),
            lock: LockConfig::default(),
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("seatgate")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<SeatgateConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = SeatgateConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: SeatgateConfig = toml::from_str(&data)?;
    Ok(cfg)
}

use anyhow::{Context, Result};
use notify::{Config as NotifyConfig, RecommendedWatcher, RecursiveMode, Watcher};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, warn};

use crate::event::ClientEvent;
use crate::views::View;

pub const DEFAULT_API_ADDR: &str = "127.0.0.1:8332";
pub const DEFAULT_SPAWN_GRACE_MS: u64 = 2_000;
pub const DEFAULT_STOP_SETTLE_MS: u64 = 500;
pub const DEFAULT_PROBE_INTERVAL_MS: u64 = 500;
pub const DEFAULT_MAX_PROBE_ATTEMPTS: u32 = 60;
pub const DEFAULT_PROBE_TIMEOUT_MS: u64 = 2_000;
pub const DEFAULT_TICK_MS: u64 = 1_000;
pub const DEFAULT_RECENT_LIMIT: usize = 5;
pub const DEFAULT_DIFFICULTY_WINDOW: usize = 60;
pub const DEFAULT_DIFFICULTY_REFRESH_SECS: u64 = 15;
pub const DEFAULT_MAX_INCREMENTAL_GAP: u64 = 4;
pub const DEFAULT_ARM_SECS: u64 = 10;
/// A window needs two points to describe a trend.
pub const MIN_DIFFICULTY_WINDOW: usize = 2;
pub const MIN_TICK_MS: u64 = 100;

/// Root configuration structure. Deserialized from `<app-dir>/config.toml`.
#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub readiness: ReadinessConfig,
    #[serde(default)]
    pub poll: PollConfig,
    #[serde(default)]
    pub difficulty: DifficultyConfig,
    #[serde(default)]
    pub guard: GuardConfig,
    #[serde(default)]
    pub ui: UiConfig,
}

/// How the daemon process is launched and reached.
#[derive(Debug, Deserialize)]
pub struct DaemonConfig {
    /// Path to the daemon executable. Defaults to the bundled per-platform
    /// binary under `<app-dir>/binaries/`.
    #[serde(default)]
    pub binary: Option<PathBuf>,
    #[serde(default = "default_api_addr")]
    pub api_addr: String,
    /// How long to wait after spawning before checking whether the process
    /// died immediately.
    #[serde(default = "default_spawn_grace_ms")]
    pub spawn_grace_ms: u64,
    /// Pause after stopping the daemon so the OS releases the API port.
    #[serde(default = "default_stop_settle_ms")]
    pub stop_settle_ms: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            binary: None,
            api_addr: DEFAULT_API_ADDR.to_string(),
            spawn_grace_ms: DEFAULT_SPAWN_GRACE_MS,
            stop_settle_ms: DEFAULT_STOP_SETTLE_MS,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ReadinessConfig {
    #[serde(default = "default_probe_interval_ms")]
    pub probe_interval_ms: u64,
    #[serde(default = "default_max_probe_attempts")]
    pub max_probe_attempts: u32,
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            probe_interval_ms: DEFAULT_PROBE_INTERVAL_MS,
            max_probe_attempts: DEFAULT_MAX_PROBE_ATTEMPTS,
            probe_timeout_ms: DEFAULT_PROBE_TIMEOUT_MS,
        }
    }
}

impl ReadinessConfig {
    pub fn probe_interval(&self) -> Duration {
        Duration::from_millis(self.probe_interval_ms)
    }
}

#[derive(Debug, Deserialize)]
pub struct PollConfig {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Number of outputs shown in the dashboard's recent-activity list.
    #[serde(default = "default_recent_limit")]
    pub recent_limit: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            tick_ms: DEFAULT_TICK_MS,
            recent_limit: DEFAULT_RECENT_LIMIT,
        }
    }
}

impl PollConfig {
    /// Tick interval, floored at [`MIN_TICK_MS`].
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms.max(MIN_TICK_MS))
    }
}

#[derive(Debug, Deserialize)]
pub struct DifficultyConfig {
    #[serde(default = "default_difficulty_window")]
    pub window: usize,
    #[serde(default = "default_difficulty_refresh_secs")]
    pub min_refresh_secs: u64,
    #[serde(default = "default_max_incremental_gap")]
    pub max_incremental_gap: u64,
}

impl Default for DifficultyConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_DIFFICULTY_WINDOW,
            min_refresh_secs: DEFAULT_DIFFICULTY_REFRESH_SECS,
            max_incremental_gap: DEFAULT_MAX_INCREMENTAL_GAP,
        }
    }
}

impl DifficultyConfig {
    /// Window capacity, never below [`MIN_DIFFICULTY_WINDOW`].
    pub fn effective_window(&self) -> usize {
        self.window.max(MIN_DIFFICULTY_WINDOW)
    }
}

#[derive(Debug, Deserialize)]
pub struct GuardConfig {
    /// Seconds a guarded action stays armed waiting for confirmation.
    #[serde(default = "default_arm_secs")]
    pub arm_secs: u64,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self { arm_secs: DEFAULT_ARM_SECS }
    }
}

impl GuardConfig {
    pub fn arm_window(&self) -> Duration {
        Duration::from_secs(self.arm_secs.max(1))
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct UiConfig {
    /// View that is active on startup and after a config reload.
    #[serde(default)]
    pub view: View,
}

/// Loads the config file at `path`, returning `Config::default()` if the file does not exist.
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_or_default(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Watches the parent directory of `path`. Whenever the config file is
/// created or modified, reloads it and sends a `ConfigReloaded` event.
pub async fn watch_config(path: PathBuf, tx: mpsc::Sender<ClientEvent>) {
    let (watch_tx, mut watch_rx) = mpsc::channel::<notify::Event>(16);

    let mut watcher = match RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            if let Ok(event) = res {
                let _ = watch_tx.blocking_send(event);
            }
        },
        NotifyConfig::default(),
    ) {
        Ok(w) => w,
        Err(e) => {
            error!("failed to create config watcher: {e}");
            return;
        }
    };

    // Editors save by write-new + rename, so watch the directory.
    let watch_dir = match path.parent() {
        Some(d) => d.to_path_buf(),
        None => {
            error!("config path has no parent directory");
            return;
        }
    };

    if let Err(e) = watcher.watch(&watch_dir, RecursiveMode::NonRecursive) {
        error!("failed to watch config directory: {e}");
        return;
    }

    while let Some(event) = watch_rx.recv().await {
        let affects_config = event.paths.iter().any(|p| p == path.as_path());
        let is_write = matches!(
            event.kind,
            notify::EventKind::Create(_) | notify::EventKind::Modify(_)
        );

        if affects_config && is_write {
            match load_or_default(&path) {
                Ok(config) => {
                    if tx.send(ClientEvent::ConfigReloaded(config)).await.is_err() {
                        break;
                    }
                }
                Err(e) => warn!("failed to reload config: {e:#}"),
            }
        }
    }
}

fn default_api_addr() -> String {
    DEFAULT_API_ADDR.to_string()
}

fn default_spawn_grace_ms() -> u64 {
    DEFAULT_SPAWN_GRACE_MS
}

fn default_stop_settle_ms() -> u64 {
    DEFAULT_STOP_SETTLE_MS
}

fn default_probe_interval_ms() -> u64 {
    DEFAULT_PROBE_INTERVAL_MS
}

fn default_max_probe_attempts() -> u32 {
    DEFAULT_MAX_PROBE_ATTEMPTS
}

fn default_probe_timeout_ms() -> u64 {
    DEFAULT_PROBE_TIMEOUT_MS
}

fn default_tick_ms() -> u64 {
    DEFAULT_TICK_MS
}

fn default_recent_limit() -> usize {
    DEFAULT_RECENT_LIMIT
}

fn default_difficulty_window() -> usize {
    DEFAULT_DIFFICULTY_WINDOW
}

fn default_difficulty_refresh_secs() -> u64 {
    DEFAULT_DIFFICULTY_REFRESH_SECS
}

fn default_max_incremental_gap() -> u64 {
    DEFAULT_MAX_INCREMENTAL_GAP
}

fn default_arm_secs() -> u64 {
    DEFAULT_ARM_SECS
}

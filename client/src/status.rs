use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

use crate::readiness::DaemonState;
use crate::types::{Balance, ChainStatus};
use crate::views::View;

/// Daemon lifecycle as recorded in the status file.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
#[serde(rename_all = "lowercase")]
pub enum DaemonPhase {
    Stopped,
    Starting,
    Ready,
    Blocked,
}

impl From<&DaemonState> for DaemonPhase {
    fn from(state: &DaemonState) -> Self {
        match state {
            DaemonState::NotStarted => DaemonPhase::Stopped,
            DaemonState::Starting => DaemonPhase::Starting,
            DaemonState::Ready => DaemonPhase::Ready,
            DaemonState::Blocked(_) => DaemonPhase::Blocked,
        }
    }
}

/// Runtime status written by the client to `<app-dir>/status.toml`.
/// External tools read this file to show what the client sees.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ClientStatus {
    /// Client version (set from Cargo.toml at compile time).
    pub version: String,
    pub daemon: DaemonPhase,
    pub view: View,
    pub unlocked: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_height: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peers: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mempool_size: Option<u64>,
    #[serde(default)]
    pub syncing: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub spendable: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pending: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<u64>,
    /// True when the last history shown came from the local cache.
    #[serde(default)]
    pub history_from_cache: bool,
    /// RFC 3339 timestamp of the most recent inbound-funds notification.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_inbound_at: Option<String>,
    /// Most recent error surfaced to the user.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ClientStatus {
    pub fn new(view: View) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            daemon: DaemonPhase::Stopped,
            view,
            unlocked: false,
            chain_height: None,
            peers: None,
            mempool_size: None,
            syncing: false,
            spendable: None,
            pending: None,
            total: None,
            history_from_cache: false,
            last_inbound_at: None,
            error: None,
        }
    }

    pub fn apply_chain(&mut self, chain: &ChainStatus) {
        self.chain_height = Some(chain.chain_height);
        self.peers = Some(chain.peers);
        self.mempool_size = Some(chain.mempool_size);
        self.syncing = chain.syncing;
    }

    pub fn apply_balance(&mut self, balance: &Balance) {
        self.spendable = Some(balance.spendable);
        self.pending = Some(balance.pending);
        self.total = Some(balance.total);
    }

    /// Drops everything that belongs to an unlocked wallet session.
    pub fn clear_wallet(&mut self) {
        self.unlocked = false;
        self.spendable = None;
        self.pending = None;
        self.total = None;
        self.history_from_cache = false;
    }
}

/// Serializes `status` to TOML and writes it to `path`.
/// Creates the parent directory if it does not exist.
/// Failures are logged and otherwise ignored.
pub fn write_status(path: &Path, status: &ClientStatus) {
    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            warn!("failed to create directory {}: {e}", parent.display());
            return;
        }
    }
    match toml::to_string_pretty(status) {
        Ok(content) => {
            if let Err(e) = std::fs::write(path, content) {
                warn!("failed to write status file: {e}");
            }
        }
        Err(e) => warn!("failed to serialize status: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ── ClientStatus::new ─────────────────────────────────────────────────────

    #[test]
    fn new_starts_stopped_and_locked() {
        let s = ClientStatus::new(View::Dashboard);
        assert_eq!(s.daemon, DaemonPhase::Stopped);
        assert!(!s.unlocked);
        assert_eq!(s.version, env!("CARGO_PKG_VERSION"));
    }

    #[test]
    fn phase_follows_readiness_state() {
        assert_eq!(DaemonPhase::from(&DaemonState::Ready), DaemonPhase::Ready);
        assert_eq!(
            DaemonPhase::from(&DaemonState::Blocked("x".into())),
            DaemonPhase::Blocked
        );
        assert_eq!(DaemonPhase::from(&DaemonState::NotStarted), DaemonPhase::Stopped);
    }

    #[test]
    fn phase_serializes_to_lowercase() {
        let mut s = ClientStatus::new(View::Mining);
        s.daemon = DaemonPhase::Starting;
        let out = toml::to_string_pretty(&s).unwrap();
        assert!(out.contains("daemon = \"starting\""));
        assert!(out.contains("view = \"mining\""));
    }

    // ── write_status ──────────────────────────────────────────────────────────

    #[test]
    fn write_status_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("status.toml");
        write_status(&path, &ClientStatus::new(View::Dashboard));
        assert!(path.exists());
    }

    #[test]
    fn write_status_content_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.toml");

        let mut original = ClientStatus::new(View::Dashboard);
        original.daemon = DaemonPhase::Ready;
        original.unlocked = true;
        original.apply_chain(&ChainStatus {
            chain_height: 1200,
            peers: 8,
            mempool_size: 3,
            syncing: true,
        });
        original.apply_balance(&Balance {
            spendable: 5,
            pending: 1,
            total: 6,
        });
        write_status(&path, &original);

        let parsed: ClientStatus = toml::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(parsed.daemon, DaemonPhase::Ready);
        assert_eq!(parsed.chain_height, Some(1200));
        assert!(parsed.syncing);
        assert_eq!(parsed.total, Some(6));
    }

    #[test]
    fn write_status_omits_unset_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("status.toml");
        write_status(&path, &ClientStatus::new(View::Dashboard));
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(!content.contains("chain_height"));
        assert!(!content.contains("last_inbound_at"));
        assert!(!content.contains("error"));
    }

    #[test]
    fn clear_wallet_drops_balances() {
        let mut s = ClientStatus::new(View::Dashboard);
        s.unlocked = true;
        s.apply_balance(&Balance { spendable: 1, pending: 2, total: 3 });
        s.clear_wallet();
        assert!(!s.unlocked);
        assert!(s.total.is_none());
    }
}

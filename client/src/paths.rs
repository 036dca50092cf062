/// Canonical file paths for client data files.
///
/// Everything lives under `<data-dir>/wallet-client/`:
///   - config.toml     Read by the client, edited by the user.
///   - status.toml     Written by the client for external observers.
///   - tx_cache.json   Last live wallet history, served when the daemon is unavailable.
///   - address_book.json  Saved recipients.
///   - active_wallet   Name of the wallet file the daemon should open.
///   - data/           Daemon chain data; `data/api.cookie` holds the API token.
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

const APP_DIR_NAME: &str = "wallet-client";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const STATUS_FILE_NAME: &str = "status.toml";
pub const TX_CACHE_FILE_NAME: &str = "tx_cache.json";
pub const ADDRESS_BOOK_FILE_NAME: &str = "address_book.json";
pub const ACTIVE_WALLET_FILE_NAME: &str = "active_wallet";
pub const DEFAULT_WALLET_NAME: &str = "wallet.dat";
const DATA_DIR_NAME: &str = "data";
const COOKIE_FILE_NAME: &str = "api.cookie";
const BINARIES_DIR_NAME: &str = "binaries";

/// Resolved locations of every file the client touches.
#[derive(Debug, Clone)]
pub struct AppPaths {
    pub root: PathBuf,
}

impl AppPaths {
    /// Uses the platform data directory (e.g. `~/.local/share` or `%APPDATA%`).
    pub fn discover() -> Result<Self> {
        let base = dirs::data_dir().context("Could not determine the user data directory")?;
        Ok(Self::at(base.join(APP_DIR_NAME)))
    }

    pub fn at(root: PathBuf) -> Self {
        Self { root }
    }

    pub fn config_file(&self) -> PathBuf {
        self.root.join(CONFIG_FILE_NAME)
    }

    pub fn status_file(&self) -> PathBuf {
        self.root.join(STATUS_FILE_NAME)
    }

    pub fn tx_cache_file(&self) -> PathBuf {
        self.root.join(TX_CACHE_FILE_NAME)
    }

    pub fn address_book_file(&self) -> PathBuf {
        self.root.join(ADDRESS_BOOK_FILE_NAME)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join(DATA_DIR_NAME)
    }

    pub fn cookie_file(&self) -> PathBuf {
        self.data_dir().join(COOKIE_FILE_NAME)
    }

    /// Bundled daemon binary for this platform.
    pub fn default_daemon_binary(&self) -> PathBuf {
        self.root.join(BINARIES_DIR_NAME).join(daemon_binary_name())
    }

    /// Full path of the active wallet file. Falls back to
    /// [`DEFAULT_WALLET_NAME`] when no choice has been recorded.
    pub fn active_wallet(&self) -> PathBuf {
        self.root.join(read_wallet_name(&self.root.join(ACTIVE_WALLET_FILE_NAME)))
    }
}

fn read_wallet_name(path: &Path) -> String {
    std::fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| DEFAULT_WALLET_NAME.to_string())
}

/// File name of the daemon executable shipped for the current target.
pub fn daemon_binary_name() -> &'static str {
    if cfg!(windows) {
        "blocknet-amd64-windows.exe"
    } else if cfg!(all(target_os = "macos", target_arch = "aarch64")) {
        "blocknet-aarch64-apple-darwin"
    } else if cfg!(target_os = "macos") {
        "blocknet-amd64-apple-darwin"
    } else if cfg!(target_arch = "aarch64") {
        "blocknet-arm64-linux"
    } else {
        "blocknet-amd64-linux"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn files_share_the_app_root() {
        let p = AppPaths::at(PathBuf::from("/tmp/wc"));
        assert_eq!(p.config_file().parent(), p.status_file().parent());
        assert_eq!(p.tx_cache_file().file_name().unwrap(), TX_CACHE_FILE_NAME);
        assert!(p.cookie_file().starts_with(p.data_dir()));
    }

    #[test]
    fn active_wallet_defaults_when_unset() {
        let dir = tempfile::tempdir().unwrap();
        let p = AppPaths::at(dir.path().to_path_buf());
        assert_eq!(p.active_wallet(), dir.path().join(DEFAULT_WALLET_NAME));
    }

    #[test]
    fn active_wallet_reads_recorded_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(ACTIVE_WALLET_FILE_NAME), "savings.dat\n").unwrap();
        let p = AppPaths::at(dir.path().to_path_buf());
        assert_eq!(p.active_wallet(), dir.path().join("savings.dat"));
    }

    #[test]
    fn blank_active_wallet_file_falls_back() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(ACTIVE_WALLET_FILE_NAME), "  \n").unwrap();
        let p = AppPaths::at(dir.path().to_path_buf());
        assert_eq!(p.active_wallet(), dir.path().join(DEFAULT_WALLET_NAME));
    }

    #[test]
    fn binary_lives_under_binaries_dir() {
        let p = AppPaths::at(PathBuf::from("/tmp/wc"));
        let bin = p.default_daemon_binary();
        assert_eq!(bin.parent().unwrap().file_name().unwrap(), BINARIES_DIR_NAME);
        assert_eq!(bin.file_name().unwrap(), daemon_binary_name());
    }
}

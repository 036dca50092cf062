use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use sysinfo::{ProcessesToUpdate, System};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::ClientError;
use crate::paths::AppPaths;

/// Reason carried by [`ClientError::DaemonBlocked`] when the OS refuses to run the binary.
pub const SECURITY_BLOCKED: &str = "SECURITY_BLOCKED";

/// Lifecycle primitives of the backing daemon process.
#[async_trait]
pub trait DaemonControl: Send + Sync {
    /// Launches the daemon. Returns once the process is spawned, not once it
    /// answers requests.
    async fn start(&self) -> Result<(), ClientError>;
    /// True when the daemon answers an authenticated status request.
    async fn probe(&self) -> bool;
    async fn stop(&self);
    async fn wipe_chain_data(&self) -> Result<(), ClientError>;
}

/// Spawns and supervises the daemon as a child process.
pub struct ProcessLauncher {
    binary: PathBuf,
    api_addr: String,
    paths: AppPaths,
    spawn_grace: Duration,
    probe_timeout: Duration,
    http: reqwest::Client,
    child: Mutex<Option<Child>>,
}

impl ProcessLauncher {
    pub fn new(config: &Config, paths: AppPaths) -> Self {
        let binary = config
            .daemon
            .binary
            .clone()
            .unwrap_or_else(|| paths.default_daemon_binary());
        Self {
            binary,
            api_addr: config.daemon.api_addr.clone(),
            paths,
            spawn_grace: Duration::from_millis(config.daemon.spawn_grace_ms),
            probe_timeout: Duration::from_millis(config.readiness.probe_timeout_ms),
            http: reqwest::Client::new(),
            child: Mutex::new(None),
        }
    }

    fn exe_name(&self) -> Option<String> {
        self.binary
            .file_name()
            .map(|n| n.to_string_lossy().to_lowercase())
    }

    /// Maps a failed launch to a block when the OS quarantined the binary.
    async fn launch_failure(&self, detail: String) -> ClientError {
        if is_quarantined(&self.binary).await {
            warn!(binary = %self.binary.display(), "daemon binary is quarantined by the OS");
            ClientError::DaemonBlocked(SECURITY_BLOCKED.to_string())
        } else {
            ClientError::ActionFailed(detail)
        }
    }

    /// Kills any daemon left behind by an earlier session.
    fn kill_strays(&self) {
        let Some(target) = self.exe_name() else {
            return;
        };
        let mut sys = System::new();
        sys.refresh_processes(ProcessesToUpdate::All, false);
        for (pid, p) in sys.processes() {
            if p.name().to_string_lossy().to_lowercase() == target {
                info!(%pid, "killing stray daemon process");
                p.kill();
            }
        }
    }
}

#[async_trait]
impl DaemonControl for ProcessLauncher {
    async fn start(&self) -> Result<(), ClientError> {
        let data_dir = self.paths.data_dir();
        tokio::fs::create_dir_all(&data_dir)
            .await
            .map_err(|e| ClientError::ActionFailed(format!("Failed to create data dir: {e}")))?;

        // A live child still owns its cookie.
        let mut guard = self.child.lock().await;
        if let Some(child) = guard.as_mut() {
            if matches!(child.try_wait(), Ok(None)) {
                debug!("daemon child already running");
                return Ok(());
            }
        }

        remove_if_exists(&self.paths.cookie_file()).await;
        ensure_executable(&self.binary);

        let wallet = self.paths.active_wallet();
        info!(binary = %self.binary.display(), wallet = %wallet.display(), "starting daemon");
        let spawned = Command::new(&self.binary)
            .arg("--daemon")
            .arg("--api")
            .arg(&self.api_addr)
            .arg("--data")
            .arg(&data_dir)
            .arg("--wallet")
            .arg(&wallet)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn();

        let mut child = match spawned {
            Ok(c) => c,
            Err(e) => return Err(self.launch_failure(format!("Failed to launch daemon: {e}")).await),
        };

        tokio::time::sleep(self.spawn_grace).await;

        match child.try_wait() {
            Ok(None) => {
                *guard = Some(child);
                Ok(())
            }
            // Exiting cleanly means another instance already owns the port.
            Ok(Some(status)) if status.success() => Ok(()),
            Ok(Some(status)) => {
                Err(self.launch_failure(format!("Daemon exited during startup ({status})")).await)
            }
            Err(e) => Err(ClientError::ActionFailed(format!("Failed to inspect daemon: {e}"))),
        }
    }

    async fn probe(&self) -> bool {
        let cookie = self.paths.cookie_file();
        let token = match tokio::fs::read_to_string(&cookie).await {
            Ok(t) => t.trim().to_string(),
            Err(_) => return false,
        };
        let res = self
            .http
            .get(format!("http://{}/api/status", self.api_addr))
            .bearer_auth(token)
            .timeout(self.probe_timeout)
            .send()
            .await;
        match res {
            Ok(r) if r.status().is_success() => true,
            Ok(r) => {
                debug!(status = %r.status(), "probe rejected");
                false
            }
            Err(e) => {
                debug!("probe failed: {e}");
                // The token belongs to a daemon that is no longer listening.
                remove_if_exists(&cookie).await;
                false
            }
        }
    }

    async fn stop(&self) {
        if let Some(mut child) = self.child.lock().await.take() {
            if let Err(e) = child.kill().await {
                warn!("failed to kill daemon child: {e}");
            }
        }
        self.kill_strays();
        info!("daemon stopped");
    }

    async fn wipe_chain_data(&self) -> Result<(), ClientError> {
        let data_dir = self.paths.data_dir();
        if let Err(e) = tokio::fs::remove_dir_all(&data_dir).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                return Err(ClientError::ActionFailed(format!("Failed to remove chain data: {e}")));
            }
        }
        tokio::fs::create_dir_all(&data_dir)
            .await
            .map_err(|e| ClientError::ActionFailed(format!("Failed to recreate data dir: {e}")))?;
        info!(dir = %data_dir.display(), "chain data wiped");
        Ok(())
    }
}

async fn remove_if_exists(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "removed stale file"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), "failed to remove file: {e}"),
    }
}

#[cfg(unix)]
fn ensure_executable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    let Ok(meta) = std::fs::metadata(path) else {
        return;
    };
    let mut perms = meta.permissions();
    if perms.mode() & 0o111 == 0 {
        perms.set_mode(perms.mode() | 0o755);
        if let Err(e) = std::fs::set_permissions(path, perms) {
            warn!(path = %path.display(), "failed to mark binary executable: {e}");
        }
    }
}

#[cfg(not(unix))]
fn ensure_executable(_path: &Path) {}

#[cfg(target_os = "macos")]
async fn is_quarantined(path: &Path) -> bool {
    Command::new("xattr")
        .arg("-p")
        .arg("com.apple.quarantine")
        .arg(path)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}

#[cfg(not(target_os = "macos"))]
async fn is_quarantined(_path: &Path) -> bool {
    false
}

/// Instructions shown when the OS blocks the daemon binary.
pub fn blocked_remediation() -> &'static str {
    if cfg!(target_os = "macos") {
        "macOS blocked the node binary. Open System Settings > Privacy & Security, \
         click \"Allow Anyway\" for the node, then retry."
    } else if cfg!(windows) {
        "Windows blocked the node binary. Open Windows Security, allow the node \
         under Protection history, then retry."
    } else {
        "The OS refused to run the node binary. Check its permissions, then retry."
    }
}

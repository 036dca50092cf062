//! The concrete guarded actions and the wallet session flows.
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{info, warn};

use crate::api;
use crate::error::ClientError;
use crate::format::{format_coins, parse_amount};
use crate::guard::GuardedAction;
use crate::process::{blocked_remediation, DaemonControl};
use crate::readiness::ReadinessCoordinator;
use crate::rpc::Gateway;
use crate::types::SendResult;

const ADDRESS_PREVIEW_CHARS: usize = 16;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    pub address: String,
    pub amount: String,
}

pub struct SendFunds {
    gateway: Arc<dyn Gateway>,
}

impl SendFunds {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl GuardedAction for SendFunds {
    type Input = SendRequest;
    type Output = SendResult;

    fn validate(&self, input: &SendRequest) -> Result<(), ClientError> {
        if input.address.trim().is_empty() {
            return Err(ClientError::Validation("Enter a recipient address".to_string()));
        }
        parse_amount(&input.amount).map(|_| ())
    }

    fn prompt(&self, input: &SendRequest) -> String {
        let amount = parse_amount(&input.amount).map(format_coins).unwrap_or_default();
        let preview: String = input.address.trim().chars().take(ADDRESS_PREVIEW_CHARS).collect();
        format!("Send {amount} to {preview}...?")
    }

    async fn perform(&self, input: SendRequest) -> Result<SendResult, ClientError> {
        let amount = parse_amount(&input.amount)?;
        let res = api::send(self.gateway.as_ref(), input.address.trim(), amount).await?;
        info!(txid = %res.txid, fee = res.fee, "transaction sent");
        Ok(res)
    }
}

/// Reveals the recovery phrase. Input is the session password.
pub struct RevealSeed {
    gateway: Arc<dyn Gateway>,
}

impl RevealSeed {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl GuardedAction for RevealSeed {
    type Input = Option<String>;
    type Output = String;

    fn validate(&self, password: &Option<String>) -> Result<(), ClientError> {
        match password {
            Some(p) if !p.is_empty() => Ok(()),
            _ => Err(ClientError::Validation("Unlock the wallet first".to_string())),
        }
    }

    fn prompt(&self, _password: &Option<String>) -> String {
        "Reveal the recovery seed? Anyone who sees it can take your funds.".to_string()
    }

    async fn perform(&self, password: Option<String>) -> Result<String, ClientError> {
        let password =
            password.ok_or_else(|| ClientError::Validation("Unlock the wallet first".to_string()))?;
        api::seed(self.gateway.as_ref(), &password).await
    }
}

/// Stops the daemon, wipes its chain data and brings it back up.
/// Input is the session password, used to reopen the wallet afterwards.
pub struct ResetChainData {
    control: Arc<dyn DaemonControl>,
    readiness: ReadinessCoordinator,
    gateway: Arc<dyn Gateway>,
    settle: Duration,
}

impl ResetChainData {
    pub fn new(
        control: Arc<dyn DaemonControl>,
        readiness: ReadinessCoordinator,
        gateway: Arc<dyn Gateway>,
        settle: Duration,
    ) -> Self {
        Self {
            control,
            readiness,
            gateway,
            settle,
        }
    }
}

#[async_trait]
impl GuardedAction for ResetChainData {
    type Input = Option<String>;
    type Output = ();

    fn validate(&self, _password: &Option<String>) -> Result<(), ClientError> {
        Ok(())
    }

    fn prompt(&self, _password: &Option<String>) -> String {
        "Delete all local chain data and resync from scratch?".to_string()
    }

    async fn perform(&self, password: Option<String>) -> Result<(), ClientError> {
        info!("resetting chain data");
        self.control.stop().await;
        self.readiness.mark_stopped();
        tokio::time::sleep(self.settle).await;
        self.control.wipe_chain_data().await?;
        self.readiness.ensure_ready().await?;
        if let Some(password) = password.filter(|p| !p.is_empty()) {
            api::load_or_unlock(self.gateway.as_ref(), &password).await?;
        }
        info!("chain data reset complete");
        Ok(())
    }
}

// ── Session ───────────────────────────────────────────────────────────────────

/// Brings the daemon up and opens the wallet with `password`.
pub async fn unlock(
    readiness: &ReadinessCoordinator,
    gateway: &dyn Gateway,
    password: &str,
) -> Result<(), ClientError> {
    if password.is_empty() {
        return Err(ClientError::Validation("Enter your password".to_string()));
    }
    readiness.ensure_ready().await?;
    api::load_or_unlock(gateway, password).await
}

pub async fn lock(gateway: &dyn Gateway) -> Result<(), ClientError> {
    api::lock_wallet(gateway).await
}

/// A readable balance means the daemon already has the wallet open.
pub async fn is_unlocked(gateway: &dyn Gateway) -> bool {
    api::balance(gateway).await.is_ok()
}

/// User-facing text for an unlock failure.
pub fn unlock_message(err: &ClientError) -> String {
    match err {
        ClientError::DaemonBlocked(_) => blocked_remediation().to_string(),
        ClientError::Transport(msg) | ClientError::ActionFailed(msg) => {
            let lower = msg.to_lowercase();
            if ["incorrect password", "wrong password", "decrypt", "cipher"]
                .iter()
                .any(|needle| lower.contains(needle))
            {
                "Check your password and try again".to_string()
            } else if lower.contains("wallet already loaded") {
                "Wallet is already loaded".to_string()
            } else {
                msg.clone()
            }
        }
        other => other.to_string(),
    }
}

/// User-facing text for any surfaced error.
pub fn describe(err: &ClientError) -> String {
    match err {
        ClientError::DaemonBlocked(_) => blocked_remediation().to_string(),
        other => other.to_string(),
    }
}

pub async fn set_mining(gateway: &dyn Gateway, running: bool) -> Result<(), ClientError> {
    api::set_mining(gateway, running).await
}

/// Clamps to `[1, available cores]` before applying. Returns the applied count.
pub async fn set_mining_threads(gateway: &dyn Gateway, requested: u32) -> Result<u32, ClientError> {
    let cores = std::thread::available_parallelism()
        .map(|n| u32::try_from(n.get()).unwrap_or(u32::MAX))
        .unwrap_or(1);
    let threads = requested.clamp(1, cores.max(1));
    if threads != requested {
        warn!(requested, threads, "mining thread count clamped");
    }
    api::set_mining_threads(gateway, threads).await?;
    Ok(threads)
}

//! Readiness coordinator: brings the daemon up once, however many callers ask.
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::ReadinessConfig;
use crate::error::ClientError;
use crate::process::DaemonControl;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DaemonState {
    NotStarted,
    Starting,
    Ready,
    /// Terminal until [`ReadinessCoordinator::reset`].
    Blocked(String),
}

type Outcome = Option<Result<(), ClientError>>;

struct Inner {
    state: DaemonState,
    /// Outcome channel of the attempt in flight. Late callers subscribe here.
    pending: Option<watch::Receiver<Outcome>>,
}

#[derive(Clone)]
pub struct ReadinessCoordinator {
    control: Arc<dyn DaemonControl>,
    inner: Arc<Mutex<Inner>>,
    probe_interval: Duration,
    max_attempts: u32,
}

impl ReadinessCoordinator {
    pub fn new(control: Arc<dyn DaemonControl>, config: &ReadinessConfig) -> Self {
        Self {
            control,
            inner: Arc::new(Mutex::new(Inner {
                state: DaemonState::NotStarted,
                pending: None,
            })),
            probe_interval: config.probe_interval(),
            max_attempts: config.max_probe_attempts.max(1),
        }
    }

    pub fn state(&self) -> DaemonState {
        self.lock().state.clone()
    }

    /// Resolves once the daemon answers probes. Concurrent callers share one
    /// attempt and receive the same outcome.
    pub async fn ensure_ready(&self) -> Result<(), ClientError> {
        let mut rx = {
            let mut inner = self.lock();
            match inner.state.clone() {
                DaemonState::Ready => return Ok(()),
                DaemonState::Blocked(reason) => return Err(ClientError::DaemonBlocked(reason)),
                DaemonState::Starting | DaemonState::NotStarted => match inner.pending.clone() {
                    Some(rx) => rx,
                    None => self.begin(&mut inner),
                },
            }
        };

        let outcome = match rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            // The attempt task vanished without settling (runtime shutdown).
            Err(_) => None,
        };
        outcome.unwrap_or(Err(ClientError::DaemonTimeout))
    }

    /// Clears a block so the next `ensure_ready` tries again.
    pub fn reset(&self) {
        let mut inner = self.lock();
        if matches!(inner.state, DaemonState::Blocked(_)) {
            info!("readiness reset after block");
            inner.state = DaemonState::NotStarted;
        }
    }

    /// Records a deliberate daemon stop so the next `ensure_ready` restarts it.
    pub fn mark_stopped(&self) {
        let mut inner = self.lock();
        if inner.state == DaemonState::Ready {
            inner.state = DaemonState::NotStarted;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self, inner: &mut Inner) -> watch::Receiver<Outcome> {
        let (tx, rx) = watch::channel(None);
        inner.state = DaemonState::Starting;
        inner.pending = Some(rx.clone());

        let this = self.clone();
        tokio::spawn(async move {
            let outcome = this.attempt().await;
            {
                let mut inner = this.lock();
                inner.state = match &outcome {
                    Ok(()) => DaemonState::Ready,
                    Err(ClientError::DaemonBlocked(reason)) => DaemonState::Blocked(reason.clone()),
                    Err(_) => DaemonState::NotStarted,
                };
                inner.pending = None;
            }
            let _ = tx.send(Some(outcome));
        });
        rx
    }

    async fn attempt(&self) -> Result<(), ClientError> {
        if self.control.probe().await {
            info!("daemon already running");
            return Ok(());
        }

        match self.control.start().await {
            Ok(()) => debug!("daemon start issued"),
            Err(ClientError::DaemonBlocked(reason)) => {
                warn!(%reason, "daemon start blocked");
                return Err(ClientError::DaemonBlocked(reason));
            }
            // It may still come up, e.g. when an older instance holds the port.
            Err(e) => warn!("daemon start reported an error: {e}"),
        }

        for attempt in 1..=self.max_attempts {
            if self.control.probe().await {
                info!(attempt, "daemon ready");
                return Ok(());
            }
            tokio::time::sleep(self.probe_interval).await;
        }

        warn!(attempts = self.max_attempts, "daemon did not become ready");
        Err(ClientError::DaemonTimeout)
    }
}

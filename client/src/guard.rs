//! Two-step arm/confirm guard for irreversible actions.
//!
//! The first valid trigger arms the guard and returns a prompt. A second
//! trigger with the same input inside the arm window performs the action
//! once. A trigger with different input re-arms for that input instead. If
//! the window lapses the guard silently returns to idle.
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::error::ClientError;

/// An action that must be confirmed before it runs.
#[async_trait]
pub trait GuardedAction: Send + Sync + 'static {
    /// Compared on confirm: only the input that was prompted for may run.
    type Input: PartialEq + Send + 'static;
    type Output: Send + 'static;

    /// Checked on every trigger. Never touches the daemon.
    fn validate(&self, input: &Self::Input) -> Result<(), ClientError>;
    fn prompt(&self, input: &Self::Input) -> String;
    async fn perform(&self, input: Self::Input) -> Result<Self::Output, ClientError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    Armed,
    Performing,
}

struct GuardInner<I> {
    phase: Phase,
    /// Bumped on every arm so a stale expiry cannot disarm a newer cycle.
    cycle: u64,
    armed_at: Option<Instant>,
    armed_input: Option<I>,
    expiry: Option<JoinHandle<()>>,
}

impl<I> GuardInner<I> {
    fn clear(&mut self) {
        self.phase = Phase::Idle;
        self.armed_at = None;
        self.armed_input = None;
        if let Some(handle) = self.expiry.take() {
            handle.abort();
        }
    }
}

/// Snapshot of a guard's arm state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArmState {
    pub armed: bool,
    pub armed_at: Option<Instant>,
    pub ttl: Duration,
}

#[derive(Debug)]
pub enum GuardOutcome<T> {
    /// Input rejected. The guard phase is unchanged.
    Invalid(ClientError),
    /// Waiting for confirmation.
    Armed { prompt: String, expires_in: Duration },
    /// The action is already running.
    Busy,
    Completed(Result<T, ClientError>),
}

pub struct ArmGuard<A: GuardedAction> {
    name: &'static str,
    action: A,
    ttl: Duration,
    inner: Arc<Mutex<GuardInner<A::Input>>>,
}

/// Returns the guard to idle when the perform future finishes or is dropped.
struct PerformingReset<I>(Arc<Mutex<GuardInner<I>>>);

impl<I> Drop for PerformingReset<I> {
    fn drop(&mut self) {
        let mut inner = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if inner.phase == Phase::Performing {
            inner.phase = Phase::Idle;
        }
    }
}

impl<A: GuardedAction> ArmGuard<A> {
    pub fn new(name: &'static str, action: A, ttl: Duration) -> Self {
        Self {
            name,
            action,
            ttl,
            inner: Arc::new(Mutex::new(GuardInner {
                phase: Phase::Idle,
                cycle: 0,
                armed_at: None,
                armed_input: None,
                expiry: None,
            })),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn state(&self) -> ArmState {
        let inner = self.lock();
        ArmState {
            armed: inner.phase == Phase::Armed,
            armed_at: inner.armed_at,
            ttl: self.ttl,
        }
    }

    pub fn disarm(&self) {
        let mut inner = self.lock();
        if inner.phase == Phase::Armed {
            inner.clear();
            debug!(guard = self.name, "disarmed");
        }
    }

    pub async fn trigger(&self, input: A::Input) -> GuardOutcome<A::Output> {
        {
            let mut inner = self.lock();
            if inner.phase == Phase::Performing {
                return GuardOutcome::Busy;
            }
            if let Err(e) = self.action.validate(&input) {
                return GuardOutcome::Invalid(e);
            }
            let confirms = inner.phase == Phase::Armed && inner.armed_input.as_ref() == Some(&input);
            if !confirms {
                if inner.phase == Phase::Armed {
                    debug!(guard = self.name, "input changed, re-arming");
                    inner.clear();
                }
                let prompt = self.action.prompt(&input);
                self.arm(&mut inner, input);
                return GuardOutcome::Armed {
                    prompt,
                    expires_in: self.ttl,
                };
            }
            inner.clear();
            inner.phase = Phase::Performing;
        }

        let _reset = PerformingReset(self.inner.clone());
        info!(guard = self.name, "confirmed, performing");
        GuardOutcome::Completed(self.action.perform(input).await)
    }

    fn arm(&self, inner: &mut GuardInner<A::Input>, input: A::Input) {
        inner.cycle += 1;
        inner.phase = Phase::Armed;
        inner.armed_at = Some(Instant::now());
        inner.armed_input = Some(input);

        let cycle = inner.cycle;
        let ttl = self.ttl;
        let name = self.name;
        let shared = self.inner.clone();
        inner.expiry = Some(tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            let mut inner = shared.lock().unwrap_or_else(PoisonError::into_inner);
            if inner.cycle == cycle && inner.phase == Phase::Armed {
                inner.phase = Phase::Idle;
                inner.armed_at = None;
                inner.armed_input = None;
                inner.expiry = None;
                debug!(guard = name, "arm window expired");
            }
        }));
        debug!(guard = self.name, "armed");
    }

    fn lock(&self) -> MutexGuard<'_, GuardInner<A::Input>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

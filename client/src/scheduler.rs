use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, info};

use crate::event::ClientEvent;
use crate::rpc::Gateway;
use crate::snapshot::Snapshot;
use crate::views::{self, Liveness, PollState, View};

/// Supplies the view that is on screen when a tick fires.
pub trait ViewProvider: Send + Sync + 'static {
    fn current(&self) -> View;
}

impl ViewProvider for watch::Receiver<View> {
    fn current(&self) -> View {
        *self.borrow()
    }
}

impl ViewProvider for View {
    fn current(&self) -> View {
        *self
    }
}

/// Results of a run are only applied while its generation is the latest.
struct RunToken {
    generation: Arc<AtomicU64>,
    mine: u64,
}

impl Liveness for RunToken {
    fn is_current(&self) -> bool {
        self.generation.load(Ordering::SeqCst) == self.mine
    }
}

/// Fixed-cadence refresh of the active view plus the background inbound check.
///
/// Ticks run one at a time inside a single task. A tick that overruns the
/// interval causes the missed ticks to be skipped, not queued.
pub struct PollScheduler {
    gateway: Arc<dyn Gateway>,
    state: Arc<Mutex<PollState>>,
    generation: Arc<AtomicU64>,
    tick: Duration,
    events: mpsc::Sender<ClientEvent>,
    task: Option<JoinHandle<()>>,
    ticks: Arc<AtomicU64>,
}

impl PollScheduler {
    pub fn new(
        gateway: Arc<dyn Gateway>,
        state: PollState,
        tick: Duration,
        events: mpsc::Sender<ClientEvent>,
    ) -> Self {
        Self {
            gateway,
            state: Arc::new(Mutex::new(state)),
            generation: Arc::new(AtomicU64::new(0)),
            tick,
            events,
            task: None,
            ticks: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// (Re)starts polling. Any previous run is stopped first.
    pub fn start(&mut self, views: impl ViewProvider) {
        self.stop();
        let mine = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let token = RunToken {
            generation: self.generation.clone(),
            mine,
        };
        let gateway = self.gateway.clone();
        let state = self.state.clone();
        let events = self.events.clone();
        let ticks = self.ticks.clone();
        let period = self.tick;

        info!(period_ms = period.as_millis() as u64, "polling started");
        self.task = Some(tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if !token.is_current() {
                    break;
                }
                let tick = ticks.fetch_add(1, Ordering::SeqCst) + 1;
                let out = run_tick(&gateway, &state, tick, views.current(), &token).await;
                if !token.is_current() {
                    break;
                }
                for event in out {
                    if events.send(event).await.is_err() {
                        return;
                    }
                }
            }
            debug!("poll loop exited");
        }));
    }

    /// Cancels the timer. A tick in flight may finish its requests but its
    /// results are dropped.
    pub fn stop(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if self.task.take().is_some() {
            info!("polling stopped");
        }
    }

    /// Clears height and inbound tracking, e.g. after a chain reset or a
    /// wallet switch.
    pub async fn reset_tracking(&self) {
        self.state.lock().await.reset_tracking();
    }

    pub async fn load_history(&self) -> Snapshot {
        let tick = self.ticks.load(Ordering::SeqCst);
        let mut state = self.state.lock().await;
        let snapshot = views::load_history(&self.gateway, &mut state, tick).await;
        debug!(tick = snapshot.captured_at, live = snapshot.is_live, "history loaded");
        snapshot
    }
}

async fn run_tick(
    gateway: &Arc<dyn Gateway>,
    state: &Mutex<PollState>,
    tick: u64,
    view: View,
    token: &RunToken,
) -> Vec<ClientEvent> {
    let mut state = state.lock().await;
    let mut out = Vec::new();

    match view {
        View::Dashboard => {
            if let Some(mut model) = views::refresh_dashboard(gateway, &mut state, tick, token).await {
                if let Some(ev) = model.inbound.take() {
                    out.push(ClientEvent::Inbound(ev));
                }
                out.push(ClientEvent::Dashboard(model));
            }
        }
        View::Mining => {
            if let Some(model) = views::refresh_mining(gateway, &mut state, tick, token).await {
                out.push(ClientEvent::Mining(model));
            }
        }
        _ => {}
    }
    if !token.is_current() {
        return Vec::new();
    }

    if let Some(ev) = views::check_inbound(gateway, &mut state, tick, token).await {
        out.push(ClientEvent::Inbound(ev));
    }
    out
}

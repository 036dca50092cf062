//! Per-view refresh routines. Each one reads from the daemon, updates the
//! shared poll state and returns a model for the presentation layer.
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::api;
use crate::config::Config;
use crate::error::ClientError;
use crate::inbound::{InboundEvent, InboundTracker};
use crate::rpc::Gateway;
use crate::series::{DifficultySource, SeriesCache, SeriesWindow};
use crate::snapshot::{balance_series, newest_first, unspent_count, Snapshot, SnapshotCache, SnapshotOrigin};
use crate::types::{Balance, BannedList, ChainStatus, MempoolStats, MiningStatus, Output, PeerList};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum View {
    #[default]
    Dashboard,
    Send,
    Receive,
    History,
    Mining,
    Network,
    Settings,
}

impl View {
    pub const ALL: [View; 7] = [
        View::Dashboard,
        View::Send,
        View::Receive,
        View::History,
        View::Mining,
        View::Network,
        View::Settings,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            View::Dashboard => "dashboard",
            View::Send => "send",
            View::Receive => "receive",
            View::History => "history",
            View::Mining => "mining",
            View::Network => "network",
            View::Settings => "settings",
        }
    }
}

impl fmt::Display for View {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for View {
    type Err = ClientError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        View::ALL
            .into_iter()
            .find(|v| v.as_str() == wanted)
            .ok_or_else(|| ClientError::Validation(format!("Unknown view: {s}")))
    }
}

/// State shared by the refresh routines and the background inbound check.
pub struct PollState {
    /// Chain height the dashboard last loaded history for.
    pub dashboard_height: Option<u64>,
    pub inbound: InboundTracker,
    pub series: SeriesCache,
    pub snapshots: SnapshotCache,
    pub recent_limit: usize,
}

impl PollState {
    pub fn new(config: &Config, snapshots: SnapshotCache) -> Self {
        Self {
            dashboard_height: None,
            inbound: InboundTracker::new(),
            series: SeriesCache::new(&config.difficulty),
            snapshots,
            recent_limit: config.poll.recent_limit,
        }
    }

    /// Forgets everything derived from the current chain and wallet session.
    pub fn reset_tracking(&mut self) {
        self.dashboard_height = None;
        self.inbound.reset();
        self.series.clear();
    }
}

/// Tells a refresh routine whether its results are still wanted.
pub trait Liveness: Send + Sync {
    fn is_current(&self) -> bool;
}

#[derive(Debug, Clone)]
pub struct RecentActivity {
    /// Newest first, at most `recent_limit` entries.
    pub outputs: Vec<Output>,
    pub unspent: usize,
    pub balance_trend: Vec<(u64, i64)>,
    pub from_cache: bool,
    pub cached_at: Option<String>,
}

impl RecentActivity {
    pub fn from_snapshot(snapshot: &Snapshot, limit: usize) -> Self {
        let mut outputs = newest_first(&snapshot.data);
        outputs.truncate(limit);
        Self {
            outputs,
            unspent: unspent_count(&snapshot.data),
            balance_trend: balance_series(&snapshot.data),
            from_cache: snapshot.origin == SnapshotOrigin::Cached,
            cached_at: snapshot.saved_at.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct DashboardModel {
    pub tick: u64,
    pub status: Option<ChainStatus>,
    pub balance: Option<Balance>,
    /// Present only on ticks where history was reloaded.
    pub recent: Option<RecentActivity>,
    pub inbound: Option<InboundEvent>,
}

#[derive(Debug, Clone)]
pub struct NetworkModel {
    pub peers: PeerList,
    pub banned: BannedList,
}

#[derive(Debug, Clone)]
pub struct MiningModel {
    pub tick: u64,
    pub status: Option<MiningStatus>,
    /// `None` when no drawable window exists.
    pub difficulty: Option<SeriesWindow>,
    pub mempool: Option<MempoolStats>,
}

fn quiet<T>(what: &str, res: Result<T, ClientError>) -> Option<T> {
    match res {
        Ok(v) => Some(v),
        Err(e) if e.is_transient() => {
            debug!("{what} refresh failed: {e}");
            None
        }
        Err(e) => {
            warn!("{what} refresh failed: {e}");
            None
        }
    }
}

/// Status and balance every tick. History only when the chain height moved.
/// Returns `None` if the results arrived after the poller stopped.
pub async fn refresh_dashboard(
    gw: &Arc<dyn Gateway>,
    state: &mut PollState,
    tick: u64,
    live: &dyn Liveness,
) -> Option<DashboardModel> {
    let status = quiet("status", api::chain_status(gw.as_ref()).await);
    if !live.is_current() {
        return None;
    }
    let balance = quiet("balance", api::balance(gw.as_ref()).await);
    if !live.is_current() {
        return None;
    }

    let mut recent = None;
    let mut inbound = None;
    if let Some(height) = status.as_ref().map(|s| s.chain_height) {
        if state.dashboard_height != Some(height) {
            let fetched = api::history(gw.as_ref()).await;
            if !live.is_current() {
                return None;
            }
            state.dashboard_height = Some(height);
            let snapshot = state.snapshots.resolve(tick, fetched);
            inbound = state.inbound.observe(tick, &snapshot);
            recent = Some(RecentActivity::from_snapshot(&snapshot, state.recent_limit));
        }
    }

    Some(DashboardModel {
        tick,
        status,
        balance,
        recent,
        inbound,
    })
}

/// Mining status, mempool and the difficulty window. While the window is
/// drawable and younger than the refresh interval, no chain request is made.
pub async fn refresh_mining(
    gw: &Arc<dyn Gateway>,
    state: &mut PollState,
    tick: u64,
    live: &dyn Liveness,
) -> Option<MiningModel> {
    let status = quiet("mining", api::mining(gw.as_ref()).await);
    if !live.is_current() {
        return None;
    }
    let mempool = quiet("mempool", api::mempool(gw.as_ref()).await);
    if !live.is_current() {
        return None;
    }

    let difficulty = if state.series.is_due(Instant::now()) {
        match api::chain_status(gw.as_ref()).await {
            Ok(chain) => {
                let source = DifficultySource::new(gw.clone());
                state.series.refresh(chain.chain_height, &source, live).await
            }
            Err(e) => {
                debug!("difficulty tip lookup failed: {e}");
                drawable(state.series.window())
            }
        }
    } else {
        drawable(state.series.window())
    };

    if !live.is_current() {
        return None;
    }
    Some(MiningModel {
        tick,
        status,
        difficulty,
        mempool,
    })
}

fn drawable(window: &SeriesWindow) -> Option<SeriesWindow> {
    window.is_drawable().then(|| window.clone())
}

/// Background arrival check. Skipped when a refresh routine already
/// observed live history during this tick.
pub async fn check_inbound(
    gw: &Arc<dyn Gateway>,
    state: &mut PollState,
    tick: u64,
    live: &dyn Liveness,
) -> Option<InboundEvent> {
    if !live.is_current() || state.inbound.observed_in(tick) {
        return None;
    }
    let fetched = api::history(gw.as_ref()).await;
    if !live.is_current() {
        return None;
    }
    if let Err(e) = &fetched {
        debug!("inbound check failed: {e}");
        return None;
    }
    let snapshot = state.snapshots.resolve(tick, fetched);
    state.inbound.observe(tick, &snapshot)
}

/// One-shot history load for the history view.
pub async fn load_history(gw: &Arc<dyn Gateway>, state: &mut PollState, tick: u64) -> Snapshot {
    let gw = gw.clone();
    state
        .snapshots
        .get(tick, || async move { api::history(gw.as_ref()).await })
        .await
}

/// One-shot peer and ban list load for the network view. Both lists are
/// requested together; either failing fails the load.
pub async fn load_network(gw: &dyn Gateway) -> Result<NetworkModel, ClientError> {
    let (peers, banned) = tokio::try_join!(api::peers(gw), api::banned_peers(gw))?;
    debug!(peers = peers.count, banned = banned.count, "network loaded");
    Ok(NetworkModel { peers, banned })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{output, MockGateway};
    use serde_json::json;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Flag(AtomicBool);

    impl Liveness for Flag {
        fn is_current(&self) -> bool {
            self.0.load(Ordering::SeqCst)
        }
    }

    fn current() -> Flag {
        Flag(AtomicBool::new(true))
    }

    fn setup() -> (tempfile::TempDir, Arc<MockGateway>, Arc<dyn Gateway>, PollState) {
        let dir = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockGateway::new());
        let gw: Arc<dyn Gateway> = mock.clone();
        let state = PollState::new(
            &Config::default(),
            SnapshotCache::new(dir.path().join("tx_cache.json")),
        );
        mock.respond(
            "/api/wallet/balance",
            json!({ "spendable": 1000, "pending": 0, "total": 1000 }),
        );
        (dir, mock, gw, state)
    }

    // ── view names ────────────────────────────────────────────────────────────

    #[test]
    fn view_parses_case_insensitively() {
        assert_eq!("Mining".parse::<View>().unwrap(), View::Mining);
        assert!("casino".parse::<View>().is_err());
        for v in View::ALL {
            assert_eq!(v.to_string().parse::<View>().unwrap(), v);
        }
    }

    // ── dashboard ─────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn dashboard_loads_history_only_on_height_change() {
        let (_dir, mock, gw, mut state) = setup();
        let live = current();
        mock.set_height(100);
        mock.set_history(&[output("a", 10, 500, false)]);

        let first = refresh_dashboard(&gw, &mut state, 1, &live).await.unwrap();
        assert!(first.recent.is_some());
        let second = refresh_dashboard(&gw, &mut state, 2, &live).await.unwrap();
        assert!(second.recent.is_none());
        assert_eq!(mock.calls_to("/api/wallet/history"), 1);

        mock.set_height(101);
        let third = refresh_dashboard(&gw, &mut state, 3, &live).await.unwrap();
        assert!(third.recent.is_some());
        assert_eq!(mock.calls_to("/api/wallet/history"), 2);
    }

    #[tokio::test]
    async fn dashboard_reports_new_funds() {
        let (_dir, mock, gw, mut state) = setup();
        let live = current();
        let two = vec![output("a", 10, 500, false), output("b", 12, 500, false)];
        mock.set_height(12);
        mock.set_history(&two);
        refresh_dashboard(&gw, &mut state, 1, &live).await.unwrap();

        let mut three = two.clone();
        three.push(output("c", 14, 300, false));
        mock.set_height(14);
        mock.set_history(&three);
        let model = refresh_dashboard(&gw, &mut state, 2, &live).await.unwrap();
        let ev = model.inbound.unwrap();
        assert_eq!((ev.previous, ev.current), (2, 3));

        // The background check in the same tick stays quiet.
        assert!(check_inbound(&gw, &mut state, 2, &live).await.is_none());
        assert_eq!(mock.calls_to("/api/wallet/history"), 2);
    }

    #[tokio::test]
    async fn dashboard_serves_cache_when_history_fails() {
        let (_dir, mock, gw, mut state) = setup();
        let live = current();
        mock.set_height(10);
        mock.set_history(&[output("a", 10, 500, false), output("b", 9, 200, false)]);
        refresh_dashboard(&gw, &mut state, 1, &live).await.unwrap();

        mock.set_height(11);
        mock.fail("/api/wallet/history", ClientError::Transport("down".into()));
        let model = refresh_dashboard(&gw, &mut state, 2, &live).await.unwrap();
        let recent = model.recent.unwrap();
        assert!(recent.from_cache);
        assert_eq!(recent.outputs[0].id, "a");
        assert!(model.inbound.is_none());
    }

    #[tokio::test]
    async fn recent_activity_is_limited() {
        let (_dir, mock, gw, mut state) = setup();
        let live = current();
        let outs: Vec<_> = (1..=8).map(|h| output(&format!("o{h}"), h, 1, false)).collect();
        mock.set_height(8);
        mock.set_history(&outs);
        let model = refresh_dashboard(&gw, &mut state, 1, &live).await.unwrap();
        let recent = model.recent.unwrap();
        assert_eq!(recent.outputs.len(), 5);
        assert_eq!(recent.outputs[0].id, "o8");
        assert_eq!(recent.unspent, 8);
    }

    #[tokio::test]
    async fn stale_dashboard_result_is_discarded() {
        let (_dir, mock, gw, mut state) = setup();
        let live = Flag(AtomicBool::new(false));
        mock.set_height(10);
        mock.set_history(&[output("a", 10, 500, false)]);
        assert!(refresh_dashboard(&gw, &mut state, 1, &live).await.is_none());
        assert_eq!(state.dashboard_height, None);
        assert_eq!(state.inbound.last_count(), None);
    }

    // ── mining ────────────────────────────────────────────────────────────────

    #[tokio::test(start_paused = true)]
    async fn mining_difficulty_is_rate_limited() {
        let (_dir, mock, gw, mut state) = setup();
        let live = current();
        mock.set_height(100);
        mock.set_blocks(41..=100);
        mock.respond("/api/mining", json!({ "running": true, "threads": 2 }));
        mock.fail("/api/mempool", ClientError::Transport("down".into()));

        let first = refresh_mining(&gw, &mut state, 1, &live).await.unwrap();
        assert_eq!(first.difficulty.unwrap().len(), 60);
        assert!(first.mempool.is_none());
        assert_eq!(first.status.unwrap().threads, 2);
        let status_calls = mock.calls_to("/api/status");

        let second = refresh_mining(&gw, &mut state, 2, &live).await.unwrap();
        assert_eq!(second.difficulty.unwrap().len(), 60);
        assert_eq!(mock.calls_to("/api/status"), status_calls);
        assert_eq!(mock.calls_with_prefix("/api/block/").len(), 60);

        tokio::time::advance(std::time::Duration::from_secs(15)).await;
        mock.set_height(102);
        mock.set_blocks(101..=102);
        let third = refresh_mining(&gw, &mut state, 3, &live).await.unwrap();
        assert_eq!(third.difficulty.unwrap().last_height(), Some(102));
        assert_eq!(mock.calls_with_prefix("/api/block/").len(), 62);
    }

    #[tokio::test]
    async fn mining_without_blocks_draws_nothing() {
        let (_dir, mock, gw, mut state) = setup();
        let live = current();
        mock.set_height(100);
        let model = refresh_mining(&gw, &mut state, 1, &live).await.unwrap();
        assert!(model.difficulty.is_none());
        assert!(model.status.is_none());
    }

    // ── background check ──────────────────────────────────────────────────────

    #[tokio::test]
    async fn background_check_ignores_failures() {
        let (_dir, mock, gw, mut state) = setup();
        let live = current();
        mock.set_history(&[output("a", 1, 1, false)]);
        assert!(check_inbound(&gw, &mut state, 1, &live).await.is_none());

        mock.fail("/api/wallet/history", ClientError::Transport("down".into()));
        assert!(check_inbound(&gw, &mut state, 2, &live).await.is_none());
        assert_eq!(state.inbound.last_count(), Some(1));

        mock.set_history(&[output("a", 1, 1, false), output("b", 2, 1, false)]);
        assert!(check_inbound(&gw, &mut state, 3, &live).await.is_some());
    }

    #[tokio::test]
    async fn history_view_load_uses_cache_fallback() {
        let (_dir, mock, gw, mut state) = setup();
        mock.set_history(&[output("a", 1, 1, false)]);
        assert!(load_history(&gw, &mut state, 1).await.is_live);
        mock.fail("/api/wallet/history", ClientError::Transport("down".into()));
        let snap = load_history(&gw, &mut state, 2).await;
        assert!(!snap.is_live);
        assert_eq!(snap.data.len(), 1);
    }

    // ── network ───────────────────────────────────────────────────────────────

    #[tokio::test]
    async fn network_loads_peers_and_bans() {
        let mock = MockGateway::new();
        mock.respond("/api/peers", json!({ "count": 2, "peers": ["p1", "p2"] }));
        mock.respond(
            "/api/peers/banned",
            json!({ "count": 1, "banned": [{ "peer_id": "bad", "reason": "spam" }] }),
        );
        let net = load_network(&mock).await.unwrap();
        assert_eq!(net.peers.peers, vec!["p1", "p2"]);
        assert_eq!(net.banned.banned[0].reason, "spam");
    }

    #[tokio::test]
    async fn network_fails_when_either_list_fails() {
        let mock = MockGateway::new();
        mock.respond("/api/peers", json!({ "count": 0 }));
        mock.fail("/api/peers/banned", ClientError::ActionFailed("not allowed".into()));
        assert_eq!(
            load_network(&mock).await.unwrap_err(),
            ClientError::ActionFailed("not allowed".into())
        );
    }
}

//! Last-known-good wallet history, served when the live fetch comes back empty or fails.
use std::future::Future;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::ClientError;
use crate::types::Output;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotOrigin {
    /// Non-empty live result, now persisted.
    Live,
    /// The daemon answered with an empty history and no cache existed.
    LiveEmpty,
    /// Replayed from the persisted file.
    Cached,
    /// Nothing live and nothing cached.
    Unavailable,
}

#[derive(Debug, Clone)]
pub struct Snapshot {
    pub data: Vec<Output>,
    /// Poll tick at which this snapshot was produced.
    pub captured_at: u64,
    pub is_live: bool,
    pub origin: SnapshotOrigin,
    /// RFC 3339 time the cached copy was written, for cached snapshots.
    pub saved_at: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CacheFile {
    saved_at: String,
    outputs: Vec<Output>,
}

pub struct SnapshotCache {
    path: PathBuf,
}

impl SnapshotCache {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Runs `fetch` and resolves it against the persisted copy.
    pub async fn get<F, Fut>(&self, tick: u64, fetch: F) -> Snapshot
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Vec<Output>, ClientError>>,
    {
        self.resolve(tick, fetch().await)
    }

    pub fn resolve(&self, tick: u64, live: Result<Vec<Output>, ClientError>) -> Snapshot {
        let live_empty = match live {
            Ok(outputs) if !outputs.is_empty() => {
                self.store(&outputs);
                return Snapshot {
                    data: outputs,
                    captured_at: tick,
                    is_live: true,
                    origin: SnapshotOrigin::Live,
                    saved_at: None,
                };
            }
            Ok(_) => true,
            Err(e) => {
                debug!("history fetch failed, using cache: {e}");
                false
            }
        };

        match self.load() {
            Some(file) => Snapshot {
                data: file.outputs,
                captured_at: tick,
                is_live: false,
                origin: SnapshotOrigin::Cached,
                saved_at: Some(file.saved_at),
            },
            None => Snapshot {
                data: Vec::new(),
                captured_at: tick,
                is_live: false,
                origin: if live_empty {
                    SnapshotOrigin::LiveEmpty
                } else {
                    SnapshotOrigin::Unavailable
                },
                saved_at: None,
            },
        }
    }

    fn load(&self) -> Option<CacheFile> {
        let content = std::fs::read_to_string(&self.path).ok()?;
        match serde_json::from_str(&content) {
            Ok(file) => Some(file),
            Err(e) => {
                warn!(path = %self.path.display(), "ignoring unreadable history cache: {e}");
                None
            }
        }
    }

    /// Best effort. A failed write only means the next fallback may be empty.
    fn store(&self, outputs: &[Output]) {
        if let Err(e) = write_cache(&self.path, outputs) {
            warn!(path = %self.path.display(), "failed to persist history cache: {e}");
        }
    }
}

fn write_cache(path: &Path, outputs: &[Output]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = CacheFile {
        saved_at: chrono::Utc::now().to_rfc3339(),
        outputs: outputs.to_vec(),
    };
    std::fs::write(path, serde_json::to_vec(&file)?)?;
    Ok(())
}

pub fn unspent_count(outputs: &[Output]) -> usize {
    outputs.iter().filter(|o| !o.spent).count()
}

/// Display order: newest block first, then output index.
pub fn newest_first(outputs: &[Output]) -> Vec<Output> {
    let mut sorted = outputs.to_vec();
    sorted.sort_by(|a, b| {
        b.block_height
            .cmp(&a.block_height)
            .then(a.index.cmp(&b.index))
    });
    sorted
}

/// Running balance by height. Spent outputs count against the total.
/// Starts with a zero point one block before the first output.
pub fn balance_series(outputs: &[Output]) -> Vec<(u64, i64)> {
    if outputs.is_empty() {
        return Vec::new();
    }
    let mut sorted = outputs.to_vec();
    sorted.sort_by(|a, b| {
        a.block_height
            .cmp(&b.block_height)
            .then(a.index.cmp(&b.index))
    });

    let mut points = Vec::with_capacity(sorted.len() + 1);
    points.push((sorted[0].block_height.saturating_sub(1), 0));
    let mut running: i64 = 0;
    for o in &sorted {
        let amount = i64::try_from(o.amount).unwrap_or(i64::MAX);
        running = if o.spent {
            running.saturating_sub(amount)
        } else {
            running.saturating_add(amount)
        };
        points.push((o.block_height, running));
    }
    points
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::output;

    fn cache() -> (tempfile::TempDir, SnapshotCache) {
        let dir = tempfile::tempdir().unwrap();
        let cache = SnapshotCache::new(dir.path().join("tx_cache.json"));
        (dir, cache)
    }

    // ── live / fallback ───────────────────────────────────────────────────────

    #[test]
    fn live_result_is_persisted() {
        let (dir, c) = cache();
        let snap = c.resolve(1, Ok(vec![output("a", 10, 500, false)]));
        assert!(snap.is_live);
        assert_eq!(snap.origin, SnapshotOrigin::Live);
        assert!(dir.path().join("tx_cache.json").exists());
    }

    #[test]
    fn failure_replays_last_live_result() {
        let (_dir, c) = cache();
        let live = vec![output("a", 10, 500, false), output("b", 12, 500, true)];
        c.resolve(1, Ok(live.clone()));

        let snap = c.resolve(2, Err(ClientError::Transport("down".into())));
        assert!(!snap.is_live);
        assert_eq!(snap.origin, SnapshotOrigin::Cached);
        assert_eq!(snap.data, live);
        assert!(snap.saved_at.is_some());
    }

    #[test]
    fn empty_live_result_falls_back_without_overwriting() {
        let (_dir, c) = cache();
        c.resolve(1, Ok(vec![output("a", 10, 500, false)]));
        let snap = c.resolve(2, Ok(Vec::new()));
        assert_eq!(snap.origin, SnapshotOrigin::Cached);
        assert_eq!(snap.data.len(), 1);

        let again = c.resolve(3, Err(ClientError::DaemonTimeout));
        assert_eq!(again.data.len(), 1);
    }

    #[test]
    fn nothing_cached_yields_empty_stale_result() {
        let (_dir, c) = cache();
        let snap = c.resolve(1, Err(ClientError::Transport("down".into())));
        assert!(snap.data.is_empty());
        assert!(!snap.is_live);
        assert_eq!(snap.origin, SnapshotOrigin::Unavailable);

        let empty = c.resolve(2, Ok(Vec::new()));
        assert_eq!(empty.origin, SnapshotOrigin::LiveEmpty);
        assert!(!empty.is_live);
    }

    #[test]
    fn unwritable_cache_does_not_fail_fetch() {
        let dir = tempfile::tempdir().unwrap();
        // Parent "directory" is a regular file, so the write must fail.
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "x").unwrap();
        let c = SnapshotCache::new(blocker.join("tx_cache.json"));
        let snap = c.resolve(1, Ok(vec![output("a", 1, 1, false)]));
        assert!(snap.is_live);
        assert_eq!(snap.data.len(), 1);
    }

    #[test]
    fn corrupt_cache_is_ignored() {
        let (dir, c) = cache();
        std::fs::write(dir.path().join("tx_cache.json"), "{not json").unwrap();
        let snap = c.resolve(1, Err(ClientError::Transport("down".into())));
        assert_eq!(snap.origin, SnapshotOrigin::Unavailable);
    }

    #[tokio::test]
    async fn get_runs_the_fetch() {
        let (_dir, c) = cache();
        let snap = c
            .get(4, || async { Ok(vec![output("a", 1, 1, false)]) })
            .await;
        assert_eq!(snap.captured_at, 4);
        assert!(snap.is_live);
    }

    // ── helpers ───────────────────────────────────────────────────────────────

    #[test]
    fn unspent_count_ignores_spent() {
        let outs = vec![
            output("a", 10, 500, false),
            output("b", 12, 500, true),
            output("c", 14, 300, false),
        ];
        assert_eq!(unspent_count(&outs), 2);
    }

    #[test]
    fn newest_first_orders_by_height_then_index() {
        let mut a = output("a", 10, 1, false);
        a.index = 1;
        let b = output("b", 10, 1, false);
        let c = output("c", 20, 1, false);
        let ids: Vec<_> = newest_first(&[a, b, c]).into_iter().map(|o| o.id).collect();
        assert_eq!(ids, ["c", "b", "a"]);
    }

    #[test]
    fn balance_series_runs_from_zero() {
        let outs = vec![
            output("b", 12, 200, true),
            output("a", 10, 500, false),
            output("c", 14, 300, false),
        ];
        assert_eq!(
            balance_series(&outs),
            vec![(9, 0), (10, 500), (12, 300), (14, 600)]
        );
        assert!(balance_series(&[]).is_empty());
    }
}

//! Bounded difficulty-by-height window, refreshed incrementally.
use std::collections::VecDeque;
use std::ops::RangeInclusive;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::future::join_all;
use tokio::time::Instant;
use tracing::debug;

use crate::api;
use crate::config::{DifficultyConfig, MIN_DIFFICULTY_WINDOW};
use crate::error::ClientError;
use crate::rpc::Gateway;
use crate::views::Liveness;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesPoint {
    pub height: u64,
    pub value: f64,
}

/// Points in strictly increasing height order, at most `capacity` of them.
/// When full, the oldest point is evicted to make room for the newest.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesWindow {
    points: VecDeque<SeriesPoint>,
    capacity: usize,
}

impl SeriesWindow {
    pub fn new(capacity: usize) -> Self {
        Self {
            points: VecDeque::with_capacity(capacity),
            capacity: capacity.max(MIN_DIFFICULTY_WINDOW),
        }
    }

    /// Appends `point` if it is above the current last height.
    fn push(&mut self, point: SeriesPoint) {
        if self.last_height().is_some_and(|h| point.height <= h) {
            return;
        }
        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(point);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> impl Iterator<Item = &SeriesPoint> {
        self.points.iter()
    }

    #[cfg(test)]
    pub fn heights(&self) -> Vec<u64> {
        self.points.iter().map(|p| p.height).collect()
    }

    pub fn last_height(&self) -> Option<u64> {
        self.points.back().map(|p| p.height)
    }

    pub fn latest(&self) -> Option<SeriesPoint> {
        self.points.back().copied()
    }

    /// (min, max) of the values, for scaling a chart.
    pub fn value_range(&self) -> Option<(f64, f64)> {
        let mut it = self.points().map(|p| p.value);
        let first = it.next()?;
        Some(it.fold((first, first), |(lo, hi), v| (lo.min(v), hi.max(v))))
    }

    /// A trend needs at least two points.
    pub fn is_drawable(&self) -> bool {
        self.points.len() >= 2
    }
}

/// Source of one point per height. Each height is fetched independently.
#[async_trait]
pub trait PointSource: Send + Sync {
    async fn point(&self, height: u64) -> Result<SeriesPoint, ClientError>;
}

/// Block difficulty read through the gateway.
pub struct DifficultySource {
    gateway: Arc<dyn Gateway>,
}

impl DifficultySource {
    pub fn new(gateway: Arc<dyn Gateway>) -> Self {
        Self { gateway }
    }
}

#[async_trait]
impl PointSource for DifficultySource {
    async fn point(&self, height: u64) -> Result<SeriesPoint, ClientError> {
        let block = api::block(self.gateway.as_ref(), height).await?;
        if !block.difficulty.is_finite() {
            return Err(ClientError::ActionFailed(format!(
                "Block {height} has no usable difficulty"
            )));
        }
        Ok(SeriesPoint {
            height,
            value: block.difficulty,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshPlan {
    /// Tip unchanged and the window is drawable. No fetch.
    Cached,
    /// Fetch only the heights above the cached tip.
    Extend(RangeInclusive<u64>),
    /// Discard and fetch the whole window ending at the tip.
    Rebuild(RangeInclusive<u64>),
}

impl RefreshPlan {
    pub fn heights(&self) -> Option<RangeInclusive<u64>> {
        match self {
            RefreshPlan::Cached => None,
            RefreshPlan::Extend(r) | RefreshPlan::Rebuild(r) => Some(r.clone()),
        }
    }
}

pub struct SeriesCache {
    window: SeriesWindow,
    /// Tip requested by the last committed refresh.
    tip: Option<u64>,
    last_refresh: Option<Instant>,
    min_interval: Duration,
    max_gap: u64,
}

impl SeriesCache {
    pub fn new(config: &DifficultyConfig) -> Self {
        Self {
            window: SeriesWindow::new(config.effective_window()),
            tip: None,
            last_refresh: None,
            min_interval: Duration::from_secs(config.min_refresh_secs),
            max_gap: config.max_incremental_gap,
        }
    }

    pub fn window(&self) -> &SeriesWindow {
        &self.window
    }

    #[cfg(test)]
    pub fn tip(&self) -> Option<u64> {
        self.tip
    }

    /// False while a drawable window is younger than the minimum refresh interval.
    pub fn is_due(&self, now: Instant) -> bool {
        if !self.window.is_drawable() {
            return true;
        }
        match self.last_refresh {
            Some(at) => now.saturating_duration_since(at) >= self.min_interval,
            None => true,
        }
    }

    pub fn plan(&self, tip: u64) -> RefreshPlan {
        match self.tip {
            Some(cached) if cached == tip && self.window.is_drawable() => RefreshPlan::Cached,
            Some(cached) if !self.window.is_empty() && tip > cached && tip - cached <= self.max_gap => {
                RefreshPlan::Extend(cached + 1..=tip)
            }
            _ => {
                let span = self.window.capacity as u64;
                RefreshPlan::Rebuild(tip.saturating_sub(span - 1)..=tip)
            }
        }
    }

    /// Applies fetched points. Returns the new window, or `None` when it would
    /// hold fewer than two points, in which case the cache is unchanged.
    pub fn commit(
        &mut self,
        plan: &RefreshPlan,
        points: Vec<SeriesPoint>,
        tip: u64,
        now: Instant,
    ) -> Option<SeriesWindow> {
        let candidate = match plan {
            RefreshPlan::Cached => {
                self.last_refresh = Some(now);
                return Some(self.window.clone());
            }
            RefreshPlan::Extend(_) => {
                let mut w = self.window.clone();
                for p in points {
                    w.push(p);
                }
                w
            }
            RefreshPlan::Rebuild(_) => {
                let mut w = SeriesWindow::new(self.window.capacity);
                for p in points {
                    w.push(p);
                }
                w
            }
        };

        if !candidate.is_drawable() {
            debug!(tip, points = candidate.len(), "difficulty window too short, keeping previous");
            return None;
        }
        self.window = candidate;
        self.tip = Some(tip);
        self.last_refresh = Some(now);
        Some(self.window.clone())
    }

    /// Plans, fetches and commits in one step. Results that arrive after
    /// `live` stops being current are dropped without touching the cache.
    pub async fn refresh(
        &mut self,
        tip: u64,
        source: &dyn PointSource,
        live: &dyn Liveness,
    ) -> Option<SeriesWindow> {
        let plan = self.plan(tip);
        let points = match plan.heights() {
            Some(range) => fetch_points(source, range).await,
            None => Vec::new(),
        };
        if !live.is_current() {
            return None;
        }
        self.commit(&plan, points, tip, Instant::now())
    }

    pub fn clear(&mut self) {
        self.window = SeriesWindow::new(self.window.capacity);
        self.tip = None;
        self.last_refresh = None;
    }
}

/// Fetches every height concurrently. Failed heights are dropped; the rest
/// come back sorted by height.
pub async fn fetch_points(source: &dyn PointSource, heights: RangeInclusive<u64>) -> Vec<SeriesPoint> {
    let results = join_all(heights.map(|h| async move { (h, source.point(h).await) })).await;
    let mut points: Vec<SeriesPoint> = results
        .into_iter()
        .filter_map(|(h, r)| match r {
            Ok(p) => Some(p),
            Err(e) => {
                debug!(height = h, "difficulty fetch failed: {e}");
                None
            }
        })
        .collect();
    points.sort_by_key(|p| p.height);
    points
}

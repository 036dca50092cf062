//! Shared "did funds arrive?" tracker, fed by every path that sees live history.
use crate::snapshot::{unspent_count, Snapshot, SnapshotOrigin};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InboundEvent {
    pub previous: usize,
    pub current: usize,
    pub tick: u64,
}

/// Last live unspent count. Updated at most once per tick, so the dashboard
/// and the background check cannot both fire for the same arrival.
#[derive(Debug, Default)]
pub struct InboundTracker {
    last_count: Option<usize>,
    last_tick: Option<u64>,
}

impl InboundTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached replays are ignored: they may repeat an arrival already reported.
    pub fn observe(&mut self, tick: u64, snapshot: &Snapshot) -> Option<InboundEvent> {
        match snapshot.origin {
            SnapshotOrigin::Live => self.observe_count(tick, unspent_count(&snapshot.data)),
            SnapshotOrigin::LiveEmpty => self.observe_count(tick, 0),
            SnapshotOrigin::Cached | SnapshotOrigin::Unavailable => None,
        }
    }

    pub fn observe_count(&mut self, tick: u64, count: usize) -> Option<InboundEvent> {
        if self.observed_in(tick) {
            return None;
        }
        self.last_tick = Some(tick);
        let previous = self.last_count.replace(count)?;
        (count > previous).then_some(InboundEvent {
            previous,
            current: count,
            tick,
        })
    }

    pub fn observed_in(&self, tick: u64) -> bool {
        self.last_tick == Some(tick)
    }

    #[cfg(test)]
    pub fn last_count(&self) -> Option<usize> {
        self.last_count
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

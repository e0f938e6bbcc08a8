// SPDX-License-Identifier: GPL-2.0-or-later

//! C7 EventMerger: produces a single time-ordered view across all
//! currently-Ready segments in the window, and atomically swaps it in
//! whenever the window's Ready set changes. Grounded directly on spec §4.7;
//! the "merged-view swap under a live reader" design note's poll-based
//! `updating_events` contract is implemented as stated there, not the
//! cleaner snapshot-pointer alternative the note merely floats.

use common::{Event, SegmentId};
use segment::Segment;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use window::WindowHandle;

const MERGE_INTERVAL: Duration = Duration::from_millis(100);

/// One immutable, time-ordered snapshot of every event across the
/// currently-Ready segments. Keeps `Arc<Segment>` handles alive so the
/// buffers its `Event`s borrow from are never evicted out from under it.
pub struct MergedView {
    pub events: Vec<Event>,
    pub route_start_ts: u64,
    pub earliest_segment_id: Option<SegmentId>,
    pub latest_segment_id: Option<SegmentId>,
    _segments: Vec<Arc<Segment>>,
}

impl MergedView {
    #[must_use]
    pub fn empty() -> Arc<Self> {
        Arc::new(Self {
            events: Vec::new(),
            route_start_ts: 0,
            earliest_segment_id: None,
            latest_segment_id: None,
            _segments: Vec::new(),
        })
    }

    /// Index of the first event with `mono_time >= target_nanos`, or
    /// `events.len()` if none. Used by the controller's stream loop to
    /// resolve an iterator after a seek or a view swap.
    #[must_use]
    pub fn lower_bound(&self, target_nanos: u64) -> usize {
        self.events.partition_point(|e| e.mono_time.as_nanos() < target_nanos)
    }
}

/// Shared cell holding the current merged view plus the swap-in-progress
/// flag the stream loop polls between events, per spec §4.7's publication
/// protocol and §9's "merged-view swap under a live reader" note.
pub struct MergedViewCell {
    view: tokio::sync::RwLock<Arc<MergedView>>,
    updating: AtomicBool,
    route_start_ts: AtomicU64,
    notify: tokio::sync::Notify,
}

impl Default for MergedViewCell {
    fn default() -> Self {
        Self {
            view: tokio::sync::RwLock::new(MergedView::empty()),
            updating: AtomicBool::new(false),
            route_start_ts: AtomicU64::new(0),
            notify: tokio::sync::Notify::new(),
        }
    }
}

impl MergedViewCell {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub async fn current(&self) -> Arc<MergedView> {
        self.view.read().await.clone()
    }

    #[must_use]
    pub fn is_updating(&self) -> bool {
        self.updating.load(Ordering::Acquire)
    }

    /// Resolves once a swap completes after this call; used by the stream
    /// loop to wait out an in-progress swap rather than busy-poll.
    pub async fn notified(&self) {
        self.notify.notified().await;
    }

    async fn swap(&self, new_view: Arc<MergedView>) {
        self.updating.store(true, Ordering::Release);
        *self.view.write().await = new_view;
        self.updating.store(false, Ordering::Release);
        self.notify.notify_waiters();
    }
}

/// Builds merged views from the window's Ready segments on a fixed cadence
/// and publishes them through a shared `MergedViewCell`.
pub struct EventMerger {
    cell: Arc<MergedViewCell>,
}

impl EventMerger {
    #[must_use]
    pub fn new(cell: Arc<MergedViewCell>) -> Self {
        Self { cell }
    }

    #[must_use]
    pub fn cell(&self) -> Arc<MergedViewCell> {
        Arc::clone(&self.cell)
    }

    /// Builds and publishes one merged view from the window's current
    /// Ready segments. Returns `true` if the view was non-empty.
    pub async fn merge_once(&self, window: &WindowHandle) -> bool {
        let resident = window.snapshot().await;

        let mut ready: Vec<(SegmentId, Arc<Segment>)> = Vec::new();
        for (id, seg) in resident {
            if seg.is_ready().await {
                ready.push((id, seg));
            }
        }
        ready.sort_by_key(|(id, _)| *id);

        let mut events = Vec::new();
        for (_, seg) in &ready {
            events.extend(seg.events_snapshot().await);
        }
        // Stable sort: segments were appended in ascending SegmentId order
        // and each segment's own events are already position-ordered, so a
        // stable sort here ties-break exactly as spec §5 requires (segment
        // id, then original position).
        events.sort_by_key(|e| e.mono_time);

        let route_start_ts = self.resolve_route_start_ts(&events);

        let earliest = ready.first().map(|(id, _)| *id);
        let latest = ready.last().map(|(id, _)| *id);
        let segments = ready.into_iter().map(|(_, s)| s).collect();

        let non_empty = !events.is_empty();
        let view = Arc::new(MergedView {
            events,
            route_start_ts,
            earliest_segment_id: earliest,
            latest_segment_id: latest,
            _segments: segments,
        });

        self.cell.swap(view).await;
        non_empty
    }

    fn resolve_route_start_ts(&self, events: &[Event]) -> u64 {
        let existing = self.cell.route_start_ts.load(Ordering::Acquire);
        if existing != 0 {
            return existing;
        }
        let Some(resolved) = events
            .iter()
            .find(|e| e.which == common::SocketTag::InitData)
            .or_else(|| events.first())
            .map(|e| e.mono_time.as_nanos())
        else {
            return 0;
        };
        self.cell.route_start_ts.store(resolved, Ordering::Release);
        resolved
    }

    /// Runs the merge loop until `cancel` fires, re-merging on a fixed
    /// cadence after every window reconciliation pass.
    pub async fn run(self, window: WindowHandle, cancel: tokio_util::sync::CancellationToken) {
        let mut tick = tokio::time::interval(MERGE_INTERVAL);
        loop {
            tokio::select! {
                () = cancel.cancelled() => return,
                _ = tick.tick() => {
                    self.merge_once(&window).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn lower_bound_finds_first_event_at_or_after_target() {
        use bytes::Bytes;
        use common::time::MonoTime;
        use common::SocketTag;

        let events = vec![
            Event::new(SocketTag::Can, MonoTime::from_nanos(10), Bytes::new()),
            Event::new(SocketTag::Can, MonoTime::from_nanos(20), Bytes::new()),
            Event::new(SocketTag::Can, MonoTime::from_nanos(30), Bytes::new()),
        ];
        let view = MergedView {
            events,
            route_start_ts: 0,
            earliest_segment_id: None,
            latest_segment_id: None,
            _segments: Vec::new(),
        };
        assert_eq!(view.lower_bound(15), 1);
        assert_eq!(view.lower_bound(20), 1);
        assert_eq!(view.lower_bound(31), 3);
    }
}

// SPDX-License-Identifier: GPL-2.0-or-later

//! C6 SegmentWindow: a sliding cache of `Segment`s around the play head.
//! Grounded on the teacher's actor-with-mpsc-request-channel idiom
//! (`MonitorManager` in `monitor/monitor.rs`): a background task owns the
//! segment map exclusively and answers control messages instead of
//! exposing the map behind a shared lock, keeping the lock order
//! `segment_lock < stream_lock` from spec §5 trivially satisfied (the
//! window never touches the merger's stream lock at all).

use common::{ArcLogger, LogEntry, LogLevel, RequestedCameras, SegmentFiles, SegmentId};
use fetch::{AbortFlag, FetchOptions, FileSource};
use segment::Segment;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone, Copy, Debug)]
pub struct WindowConfig {
    pub backward: i64,
    pub forward: i64,
    /// Hard cap on resident segments. `None` means no cap beyond the
    /// natural window size.
    pub max_segments: Option<usize>,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            backward: 2,
            forward: 2,
            max_segments: None,
        }
    }
}

impl WindowConfig {
    /// Widens the forward lookahead when any camera is requested, since
    /// video decode needs more buffered segments ahead of the play head
    /// than a log-only replay (spec §4.6: "2-5 depending on camera
    /// requirement").
    #[must_use]
    pub fn for_cameras(cameras: RequestedCameras) -> Self {
        let any_camera = cameras.road || cameras.driver || cameras.wide;
        Self {
            backward: 2,
            forward: if any_camera { 5 } else { 2 },
            max_segments: None,
        }
    }
}

enum WindowRequest {
    SetCurrent(i64),
    Snapshot(oneshot::Sender<Vec<(SegmentId, Arc<Segment>)>>),
    ResidentIds(oneshot::Sender<Vec<i64>>),
}

/// Shared handle to a running `SegmentWindow` actor task.
#[derive(Clone)]
pub struct WindowHandle {
    tx: mpsc::Sender<WindowRequest>,
    cancel: CancellationToken,
}

impl WindowHandle {
    /// Moves the play head; the background loop will load/evict segments
    /// to match on its next tick.
    pub async fn set_current(&self, segment: i64) {
        let _ = self.tx.send(WindowRequest::SetCurrent(segment)).await;
    }

    /// Current resident Ready-or-Loading segments, for the merger to scan.
    pub async fn snapshot(&self) -> Vec<(SegmentId, Arc<Segment>)> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(WindowRequest::Snapshot(reply_tx)).await.is_err() {
            return Vec::new();
        }
        reply_rx.await.unwrap_or_default()
    }

    /// Ids currently resident, for cache-convergence assertions in tests.
    pub async fn resident_ids(&self) -> Vec<i64> {
        let (reply_tx, reply_rx) = oneshot::channel();
        if self.tx.send(WindowRequest::ResidentIds(reply_tx)).await.is_err() {
            return Vec::new();
        }
        reply_rx.await.unwrap_or_default()
    }

    /// Stops the background loop. The task exits at its next tick or
    /// request boundary.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }
}

/// Spawns the window's background control loop and returns a handle to it.
#[must_use]
pub fn spawn(
    route_files: BTreeMap<i64, SegmentFiles>,
    cameras: RequestedCameras,
    config: WindowConfig,
    source: Arc<FileSource>,
    fetch_opts: FetchOptions,
    abort: AbortFlag,
    logger: Option<ArcLogger>,
) -> WindowHandle {
    let (tx, rx) = mpsc::channel(32);
    let cancel = CancellationToken::new();

    let actor = WindowActor {
        segments: std::collections::HashMap::new(),
        route_files,
        current: 0,
        config,
        cameras,
        source,
        fetch_opts,
        abort,
        logger,
        warned: HashSet::new(),
    };

    let handle = WindowHandle {
        tx,
        cancel: cancel.clone(),
    };

    tokio::spawn(actor.run(rx, cancel));

    handle
}

struct WindowActor {
    segments: std::collections::HashMap<i64, Arc<Segment>>,
    route_files: BTreeMap<i64, SegmentFiles>,
    current: i64,
    config: WindowConfig,
    cameras: RequestedCameras,
    source: Arc<FileSource>,
    fetch_opts: FetchOptions,
    abort: AbortFlag,
    logger: Option<ArcLogger>,
    /// Segment ids already reported as missing, so a persistently-absent
    /// or persistently-failed segment only warns once (spec §8 scenario 3:
    /// "exactly one missing segment warning").
    warned: HashSet<i64>,
}

impl WindowActor {
    async fn run(mut self, mut rx: mpsc::Receiver<WindowRequest>, cancel: CancellationToken) {
        let mut tick = tokio::time::interval(POLL_INTERVAL);
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => return,
                maybe_req = rx.recv() => {
                    match maybe_req {
                        Some(req) => self.handle(req).await,
                        None => return,
                    }
                }
                _ = tick.tick() => self.reconcile().await,
            }
        }
    }

    async fn handle(&mut self, req: WindowRequest) {
        match req {
            WindowRequest::SetCurrent(seg) => {
                self.current = seg;
            }
            WindowRequest::Snapshot(reply) => {
                let snap = self
                    .segments
                    .iter()
                    .map(|(id, s)| (SegmentId(*id), Arc::clone(s)))
                    .collect();
                let _ = reply.send(snap);
            }
            WindowRequest::ResidentIds(reply) => {
                let mut ids: Vec<i64> = self.segments.keys().copied().collect();
                ids.sort_unstable();
                let _ = reply.send(ids);
            }
        }
    }

    async fn reconcile(&mut self) {
        let Some(&last) = self.route_files.keys().last() else {
            return;
        };
        let cur = self.current;
        let lo = (cur - self.config.backward).max(0);
        let hi = (cur + self.config.forward).min(last);

        for id in lo..=hi {
            if !self.route_files.contains_key(&id) && self.warned.insert(id) {
                self.warn_missing(id, "no log/video files for this segment index");
            }
        }

        let desired: Vec<i64> = self
            .route_files
            .range(lo..=hi)
            .map(|(id, _)| *id)
            .collect();

        for id in &desired {
            if self.segments.contains_key(id) {
                continue;
            }
            let Some(files) = self.route_files.get(id) else {
                continue;
            };
            let segment = Segment::spawn(
                SegmentId(*id),
                files.clone(),
                self.cameras,
                Arc::clone(&self.source),
                self.fetch_opts.clone(),
                self.abort.clone(),
                self.logger.clone(),
            );
            self.segments.insert(*id, segment);
        }

        let desired_set: std::collections::HashSet<i64> = desired.iter().copied().collect();
        let evictable: Vec<i64> = self
            .segments
            .keys()
            .copied()
            .filter(|id| !desired_set.contains(id))
            .collect();
        for id in evictable {
            self.segments.remove(&id);
        }

        for (&id, seg) in &self.segments {
            if let Some(err) = seg.load_error().await {
                if self.warned.insert(id) {
                    use common::Classify;
                    self.warn_missing(id, &format!("segment failed to load ({}): {err}", err.kind()));
                }
            }
        }

        self.enforce_cap(cur).await;
    }

    fn warn_missing(&self, id: i64, reason: &str) {
        let Some(logger) = &self.logger else {
            return;
        };
        logger.log(LogEntry::new(
            LogLevel::Warning,
            "window",
            Some(SegmentId(id)),
            format!("missing segment {id}: {reason}"),
        ));
    }

    /// Evicts farthest-from-`cur` residents first when over `max_segments`,
    /// never touching a still-Loading segment (spec §4.6's tie-break).
    async fn enforce_cap(&mut self, cur: i64) {
        let Some(cap) = self.config.max_segments else {
            return;
        };
        if self.segments.len() <= cap {
            return;
        }

        let mut candidates = Vec::new();
        for (&id, seg) in &self.segments {
            if !seg.is_loading().await {
                candidates.push(id);
            }
        }
        candidates.sort_by_key(|id| std::cmp::Reverse((id - cur).abs()));

        let mut to_remove = self.segments.len().saturating_sub(cap);
        for id in candidates {
            if to_remove == 0 {
                break;
            }
            self.segments.remove(&id);
            to_remove -= 1;
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn files_for(n: i64) -> BTreeMap<i64, SegmentFiles> {
        (0..n)
            .map(|i| {
                (
                    i,
                    SegmentFiles {
                        log: Some(format!("/nonexistent/{i}.bz2")),
                        ..Default::default()
                    },
                )
            })
            .collect()
    }

    #[tokio::test]
    async fn converges_to_window_around_current() {
        let handle = spawn(
            files_for(10),
            RequestedCameras::road_only(),
            WindowConfig {
                backward: 1,
                forward: 1,
                max_segments: None,
            },
            Arc::new(FileSource::new(None)),
            FetchOptions::default(),
            AbortFlag::new(),
            None,
        );

        handle.set_current(5).await;

        let mut ids = Vec::new();
        for _ in 0..50 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            ids = handle.resident_ids().await;
            if ids == vec![4, 5, 6] {
                break;
            }
        }
        assert_eq!(ids, vec![4, 5, 6]);
        handle.shutdown();
    }
}

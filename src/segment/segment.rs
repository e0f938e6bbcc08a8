// SPDX-License-Identifier: GPL-2.0-or-later

//! C4 Segment: bundles one segment's log decode and up to three per-camera
//! `FrameReader`s, and reports readiness once every spawned loader has
//! terminated. Grounded on the teacher's `MonitorManager` startup pattern in
//! `monitor/monitor.rs`, which spawns several independent async workers per
//! monitor and joins them before declaring the monitor ready.

use bytes::Bytes;
use common::{
    ArcLogger, EncodeIdx, Event, LogEntry, LogLevel, RequestedCameras, SegmentFiles, SegmentId,
};
use fetch::{AbortFlag, FetchError, FetchOptions, FileSource};
use log_decoder::{decode_log, LogDecodeError};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::RwLock;
use video::FrameReader;

#[derive(Debug, Error, Clone)]
pub enum SegmentLoadError {
    #[error("log fetch failed: {0}")]
    LogFetch(String),

    #[error("log decode failed: {0}")]
    LogDecode(String),
}

impl From<FetchError> for SegmentLoadError {
    fn from(e: FetchError) -> Self {
        Self::LogFetch(e.to_string())
    }
}

impl From<LogDecodeError> for SegmentLoadError {
    fn from(e: LogDecodeError) -> Self {
        Self::LogDecode(e.to_string())
    }
}

impl common::Classify for SegmentLoadError {
    /// Both variants are a missing-or-unparseable mandatory log, which
    /// spec.md §7 classifies the same way: "a missing log is
    /// `SegmentLoadFailed`".
    fn kind(&self) -> common::ErrorKind {
        common::ErrorKind::SegmentLoadFailed
    }
}

/// Camera slot within a segment, parallel to `CameraType` in `common`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CameraSlot {
    Road,
    Driver,
    Wide,
}

pub type CameraReaders = HashMap<CameraSlot, Arc<FrameReader>>;

enum SegmentState {
    Loading,
    Ready {
        events: Vec<Event>,
        encode_index: HashMap<u32, EncodeIdx>,
        cameras: CameraReaders,
    },
    Failed(SegmentLoadError),
}

/// One ~60s slice of a route: its parsed event stream plus whichever camera
/// readers were requested and available. Once a segment transitions to
/// Ready, `events` never changes (spec §4.4's invariant) — only the
/// `Loading -> {Ready, Failed}` transition is mutable, guarded by an
/// `RwLock` so `SegmentWindow` can hold an `Arc<Segment>` the instant
/// loading starts and poll its readiness cheaply thereafter.
pub struct Segment {
    pub id: SegmentId,
    state: RwLock<SegmentState>,
}

impl Segment {
    /// Returns an `Arc<Segment>` immediately in the Loading state, and
    /// spawns the log + per-camera loaders in the background. Mirrors the
    /// teacher's pattern of spawning independent startup steps as separate
    /// tasks and joining them rather than awaiting sequentially.
    #[must_use]
    pub fn spawn(
        id: SegmentId,
        files: SegmentFiles,
        cameras: RequestedCameras,
        source: Arc<FileSource>,
        fetch_opts: FetchOptions,
        abort: AbortFlag,
        logger: Option<ArcLogger>,
    ) -> Arc<Self> {
        let segment = Arc::new(Self {
            id,
            state: RwLock::new(SegmentState::Loading),
        });

        let target = Arc::clone(&segment);
        tokio::spawn(async move {
            let state = load(id, files, cameras, source, fetch_opts, abort, logger).await;
            *target.state.write().await = state;
        });

        segment
    }

    /// Builds a segment that is already Ready/Failed, for tests.
    #[must_use]
    #[cfg(test)]
    fn from_state(id: SegmentId, state: SegmentState) -> Self {
        Self {
            id,
            state: RwLock::new(state),
        }
    }

    pub async fn is_ready(&self) -> bool {
        matches!(*self.state.read().await, SegmentState::Ready { .. })
    }

    pub async fn is_loading(&self) -> bool {
        matches!(*self.state.read().await, SegmentState::Loading)
    }

    pub async fn load_error(&self) -> Option<SegmentLoadError> {
        match &*self.state.read().await {
            SegmentState::Failed(e) => Some(e.clone()),
            _ => None,
        }
    }

    /// Snapshot of this segment's parsed events. Empty until Ready.
    pub async fn events_snapshot(&self) -> Vec<Event> {
        match &*self.state.read().await {
            SegmentState::Ready { events, .. } => events.clone(),
            _ => Vec::new(),
        }
    }

    pub async fn encode_index_snapshot(&self) -> HashMap<u32, EncodeIdx> {
        match &*self.state.read().await {
            SegmentState::Ready { encode_index, .. } => encode_index.clone(),
            _ => HashMap::new(),
        }
    }

    pub async fn camera(&self, slot: CameraSlot) -> Option<Arc<FrameReader>> {
        match &*self.state.read().await {
            SegmentState::Ready { cameras, .. } => cameras.get(&slot).cloned(),
            _ => None,
        }
    }
}

async fn load(
    id: SegmentId,
    files: SegmentFiles,
    cameras: RequestedCameras,
    source: Arc<FileSource>,
    fetch_opts: FetchOptions,
    abort: AbortFlag,
    logger: Option<ArcLogger>,
) -> SegmentState {
    let log_url = files.resolved_log(false).map(str::to_owned);

    let log_task = {
        let source = Arc::clone(&source);
        let opts = fetch_opts.clone();
        let abort = abort.clone();
        tokio::spawn(async move { load_log(log_url, &source, &opts, &abort).await })
    };

    let mut camera_tasks = Vec::new();
    if cameras.road {
        if let Some(url) = files.resolved_cam(cameras.prefer_qcam).map(str::to_owned) {
            camera_tasks.push((
                CameraSlot::Road,
                spawn_camera_loader(url, Arc::clone(&source), fetch_opts.clone(), abort.clone()),
            ));
        }
    }
    if cameras.driver {
        if let Some(url) = files.dcam.clone() {
            camera_tasks.push((
                CameraSlot::Driver,
                spawn_camera_loader(url, Arc::clone(&source), fetch_opts.clone(), abort.clone()),
            ));
        }
    }
    if cameras.wide {
        if let Some(url) = files.ecam.clone() {
            camera_tasks.push((
                CameraSlot::Wide,
                spawn_camera_loader(url, Arc::clone(&source), fetch_opts.clone(), abort.clone()),
            ));
        }
    }

    let log_result = log_task.await.expect("log loader task should not panic");

    let mut readers = CameraReaders::new();
    for (slot, task) in camera_tasks {
        let reader = task.await.expect("camera loader task should not panic");
        if let Some(reader) = reader {
            readers.insert(slot, reader);
        }
    }

    match log_result {
        Ok((events, encode_index, partial)) => {
            if partial {
                warn_partial_decode(&logger, id);
            }
            SegmentState::Ready {
                events,
                encode_index,
                cameras: readers,
            }
        }
        Err(e) => SegmentState::Failed(e),
    }
}

/// Logs a `PartialDecode` warning for `id`. Called at most once, since
/// `load()` itself only ever runs once per segment (spawned exactly once by
/// `Segment::spawn`) — the single call site already gives spec.md §8's
/// "exactly one warning per segment", the same guarantee the window's
/// `warned: HashSet` gives across its repeated `reconcile` polls.
fn warn_partial_decode(logger: &Option<ArcLogger>, id: SegmentId) {
    let Some(logger) = logger else { return };
    logger.log(LogEntry::new(
        LogLevel::Warning,
        "segment",
        Some(id),
        format!(
            "segment {id} log decode was partial ({})",
            common::ErrorKind::PartialDecode
        ),
    ));
}

async fn load_log(
    url: Option<String>,
    source: &FileSource,
    opts: &FetchOptions,
    abort: &AbortFlag,
) -> Result<(Vec<Event>, HashMap<u32, EncodeIdx>, bool), SegmentLoadError> {
    let Some(url) = url else {
        return Err(SegmentLoadError::LogFetch("no log or qlog url".to_owned()));
    };
    let bytes = source.fetch(&url, opts, abort).await?;
    let outcome = decode_log(&bytes, true)?;
    Ok((outcome.events, outcome.encode_index, outcome.partial))
}

fn spawn_camera_loader(
    url: String,
    source: Arc<FileSource>,
    opts: FetchOptions,
    abort: AbortFlag,
) -> tokio::task::JoinHandle<Option<Arc<FrameReader>>> {
    tokio::spawn(async move {
        let bytes: Bytes = match source.fetch(&url, &opts, &abort).await {
            Ok(b) => b,
            Err(_) => return None,
        };
        match FrameReader::open(bytes) {
            Ok(reader) => Some(Arc::new(reader)),
            Err(_e) => None,
        }
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn missing_log_url_fails_segment() {
        let source = Arc::new(FileSource::new(None));
        let segment = Segment::spawn(
            SegmentId(0),
            SegmentFiles::default(),
            RequestedCameras::road_only(),
            source,
            FetchOptions::default(),
            AbortFlag::new(),
            None,
        );

        for _ in 0..200 {
            if !segment.is_loading().await {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }

        assert!(!segment.is_ready().await);
        assert!(segment.load_error().await.is_some());
    }

    #[tokio::test]
    async fn ready_segment_exposes_events() {
        let events = vec![Event::new(
            common::SocketTag::Can,
            common::time::MonoTime::from_nanos(1),
            Bytes::from_static(b"x"),
        )];
        let segment = Segment::from_state(
            SegmentId(3),
            SegmentState::Ready {
                events: events.clone(),
                encode_index: HashMap::new(),
                cameras: HashMap::new(),
            },
        );

        assert!(segment.is_ready().await);
        assert_eq!(segment.events_snapshot().await.len(), 1);
    }

    #[tokio::test]
    async fn partial_decode_logs_warning() {
        let logger = common::Logger::new();
        let mut feed = logger.subscribe();
        let logger: ArcLogger = Arc::new(logger);

        warn_partial_decode(&Some(logger), SegmentId(7));

        let entry = feed.recv().await.expect("should receive");
        assert_eq!(entry.level, LogLevel::Warning);
        assert_eq!(entry.segment_id, Some(SegmentId(7)));
        assert!(entry.message.contains("partial"));
    }

    #[tokio::test]
    async fn no_logger_skips_partial_decode_warning() {
        // Should not panic with no logger configured.
        warn_partial_decode(&None, SegmentId(1));
    }
}

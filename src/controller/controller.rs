// SPDX-License-Identifier: GPL-2.0-or-later

//! C10 ReplayController: orchestrates the route resolver, segment window,
//! event merger, frame dispatchers and clock into the public play/pause/
//! seek/speed API, and runs the single stream loop that publishes events
//! to a `MessageSink`. Grounded on `MonitorManager`'s request-actor plus
//! `Monitor`'s `CancellationToken`-gated async API in `monitor/monitor.rs`:
//! callers hold a cheap `Clone`able handle, mutation happens through a
//! shared `Inner`, and a background task is the sole owner of the stream
//! loop's iteration state.

mod filter;
mod flag;

pub use filter::SubscriptionFilter;
pub use flag::EngagementFlag;

use clock::ReplayClock;
use common::time::MonoTime;
use common::{
    ArcMessageSink, ArcVideoSink, CameraType, LogEntry, LogLevel, RequestedCameras, RouteId,
    SegmentId, VideoStream,
};
use dispatch::DispatcherHandle;
use fetch::{AbortFlag, FetchOptions, FileSource};
use merge::{EventMerger, MergedViewCell};
use route::{Route, RouteConfig, RouteLoadError};
use segment::CameraSlot;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{broadcast, Notify, RwLock};
use tokio_util::sync::CancellationToken;
use window::{WindowConfig, WindowHandle};

/// How long `load()` waits for the first non-empty merged view before
/// reporting failure, per spec §4.10's "first successful merge or
/// definitive failure" contract.
const FIRST_MERGE_TIMEOUT: Duration = Duration::from_secs(5);
const FIRST_MERGE_POLL: Duration = Duration::from_millis(50);

/// Per-camera decode queue depth, mirroring the teacher's small fixed
/// channel buffers for per-stream fan-out.
const DISPATCH_QUEUE_CAPACITY: usize = 8;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControllerState {
    Idle,
    Loading,
    Streaming,
    Paused,
    Stopped,
}

#[derive(Clone, Debug)]
pub enum ControllerSignal {
    SegmentChanged(SegmentId),
    StreamStarted,
    Progress { current_secs: f64, total_secs: f64 },
    Summary(String),
    Stopped,
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("route not found: {0}")]
    RouteNotFound(String),
}

impl From<RouteLoadError> for LoadError {
    fn from(e: RouteLoadError) -> Self {
        match e {
            RouteLoadError::RouteNotFound(s) => Self::RouteNotFound(s),
        }
    }
}

impl common::Classify for LoadError {
    fn kind(&self) -> common::ErrorKind {
        match self {
            LoadError::RouteNotFound(_) => common::ErrorKind::RouteNotFound,
        }
    }
}

#[derive(Clone, Debug)]
pub struct ControllerConfig {
    pub cameras: RequestedCameras,
    pub fetch_opts: FetchOptions,
    pub route_config: RouteConfig,
    pub cache_dir: Option<PathBuf>,
    pub flags: common::ReplayFlags,
    pub initial_speed: f64,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            cameras: RequestedCameras::road_only(),
            fetch_opts: FetchOptions::default(),
            route_config: RouteConfig::default(),
            cache_dir: None,
            flags: common::ReplayFlags::NONE,
            initial_speed: 1.0,
        }
    }
}

struct SeekRequest {
    target_ns: u64,
}

struct Inner {
    config: ControllerConfig,
    sink: ArcMessageSink,
    video_sink: Option<ArcVideoSink>,
    filter: SubscriptionFilter,
    logger: Option<common::ArcLogger>,
    signals: broadcast::Sender<ControllerSignal>,
    state: RwLock<ControllerState>,
    clock: Arc<ReplayClock>,
    cancel: CancellationToken,
    wake: Notify,
    seek: RwLock<Option<SeekRequest>>,
    cur_mono_ns: AtomicU64,
    route_start_ns: AtomicU64,
    last_segment: AtomicU64,
    window: RwLock<Option<WindowHandle>>,
    merge_cell: RwLock<Option<Arc<MergedViewCell>>>,
    dispatchers: RwLock<HashMap<CameraSlot, DispatcherHandle>>,
    abort: AbortFlag,
}

/// Shared, `Clone`able handle to a running replay session.
#[derive(Clone)]
pub struct ReplayController {
    inner: Arc<Inner>,
}

impl ReplayController {
    #[must_use]
    pub fn new(
        config: ControllerConfig,
        sink: ArcMessageSink,
        video_sink: Option<ArcVideoSink>,
        filter: SubscriptionFilter,
    ) -> Self {
        Self::with_logger(config, sink, video_sink, filter, None)
    }

    /// Same as [`Self::new`] but with an explicit `Logger`/`ILogger`
    /// collaborator (spec.md's ambient logging stack, see SPEC_FULL.md §1)
    /// instead of the default no-op.
    #[must_use]
    pub fn with_logger(
        config: ControllerConfig,
        sink: ArcMessageSink,
        video_sink: Option<ArcVideoSink>,
        filter: SubscriptionFilter,
        logger: Option<common::ArcLogger>,
    ) -> Self {
        let (signals, _) = broadcast::channel(256);
        let speed = config.initial_speed;
        let inner = Inner {
            config,
            sink,
            video_sink,
            filter,
            logger,
            signals,
            state: RwLock::new(ControllerState::Idle),
            clock: Arc::new(ReplayClock::new(MonoTime::ZERO, speed)),
            cancel: CancellationToken::new(),
            wake: Notify::new(),
            seek: RwLock::new(None),
            cur_mono_ns: AtomicU64::new(0),
            route_start_ns: AtomicU64::new(0),
            last_segment: AtomicU64::new(0),
            window: RwLock::new(None),
            merge_cell: RwLock::new(None),
            dispatchers: RwLock::new(HashMap::new()),
            abort: AbortFlag::new(),
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<ControllerSignal> {
        self.inner.signals.subscribe()
    }

    fn log(&self, level: LogLevel, segment_id: Option<SegmentId>, message: String) {
        if let Some(logger) = &self.inner.logger {
            logger.log(LogEntry::new(level, "controller", segment_id, message));
        }
    }

    pub async fn state(&self) -> ControllerState {
        *self.inner.state.read().await
    }

    /// Resolves the route, spawns the window and merger, and waits for the
    /// first successful merge. Returns `Ok(true)` once streaming has
    /// started, `Ok(false)` if the route resolved but no segment ever
    /// became ready, or `Err` if the route itself could not be resolved.
    pub async fn load(&self, route: &RouteId) -> Result<bool, LoadError> {
        *self.inner.state.write().await = ControllerState::Loading;

        let source = Arc::new(FileSource::new(self.inner.config.cache_dir.clone()));
        let route_files = match Route::load(
            route,
            &self.inner.config.route_config,
            &source,
            &self.inner.abort,
        )
        .await
        {
            Ok(files) => files,
            Err(e) => {
                self.log(LogLevel::Error, None, format!("route {route} not found: {e}"));
                return Err(e.into());
            }
        };
        self.log(
            LogLevel::Info,
            None,
            format!("route {route} resolved to {} segment(s)", route_files.len()),
        );

        let window_config = WindowConfig::for_cameras(self.inner.config.cameras);
        let window = window::spawn(
            route_files,
            self.inner.config.cameras,
            window_config,
            Arc::clone(&source),
            self.inner.config.fetch_opts.clone(),
            self.inner.abort.clone(),
            self.inner.logger.clone(),
        );

        let cell = MergedViewCell::new();
        let merger = EventMerger::new(Arc::clone(&cell));
        tokio::spawn(merger.run(window.clone(), self.inner.cancel.clone()));

        *self.inner.window.write().await = Some(window.clone());
        *self.inner.merge_cell.write().await = Some(Arc::clone(&cell));

        let merger_probe = EventMerger::new(Arc::clone(&cell));
        let mut waited = Duration::ZERO;
        let mut became_ready = false;
        while waited < FIRST_MERGE_TIMEOUT {
            if merger_probe.merge_once(&window).await {
                became_ready = true;
                break;
            }
            tokio::time::sleep(FIRST_MERGE_POLL).await;
            waited += FIRST_MERGE_POLL;
        }

        if !became_ready {
            return Ok(false);
        }

        let view = cell.current().await;
        self.inner.route_start_ns.store(view.route_start_ts, Ordering::Release);
        self.inner
            .cur_mono_ns
            .store(view.route_start_ts, Ordering::Release);
        if let Some(latest) = view.latest_segment_id {
            #[allow(clippy::cast_sign_loss)]
            self.inner.last_segment.store(latest.0.max(0) as u64, Ordering::Release);
        }

        self.spawn_dispatchers(&window).await;

        self.inner.clock.rebase(MonoTime::from_nanos(view.route_start_ts));
        *self.inner.state.write().await = ControllerState::Streaming;
        let _ = self.inner.signals.send(ControllerSignal::StreamStarted);

        tokio::spawn(stream_loop(Arc::clone(&self.inner)));

        Ok(true)
    }

    async fn spawn_dispatchers(&self, window: &WindowHandle) {
        let Some(sink) = self.inner.video_sink.clone() else {
            return;
        };
        let wanted = [
            (self.inner.config.cameras.road, CameraSlot::Road, VideoStream::RgbBack),
            (self.inner.config.cameras.driver, CameraSlot::Driver, VideoStream::RgbFront),
            (self.inner.config.cameras.wide, CameraSlot::Wide, VideoStream::RgbWide),
        ];
        let mut dispatchers = HashMap::new();
        for (enabled, slot, stream) in wanted {
            if !enabled {
                continue;
            }
            let handle = dispatch::spawn(
                slot,
                stream,
                window.clone(),
                Arc::clone(&sink),
                DISPATCH_QUEUE_CAPACITY,
                self.inner.cancel.clone(),
            );
            dispatchers.insert(slot, handle);
        }
        *self.inner.dispatchers.write().await = dispatchers;
    }

    /// Seeks to `seconds` and ensures playback is not paused. Per spec
    /// §4.10's transition table, the stream loop itself is started
    /// automatically on the first successful merge inside [`Self::load`];
    /// this is seek-and-resume sugar over the public seek/pause API, not a
    /// required second step.
    pub async fn start(&self, seconds: f64) {
        self.seek_to(seconds, false).await;
        self.pause(false).await;
    }

    pub async fn pause(&self, paused: bool) {
        if paused {
            self.inner.clock.pause();
            *self.inner.state.write().await = ControllerState::Paused;
        } else {
            let cur = MonoTime::from_nanos(self.inner.cur_mono_ns.load(Ordering::Acquire));
            self.inner.clock.unpause(cur);
            *self.inner.state.write().await = ControllerState::Streaming;
        }
        self.inner.wake.notify_waiters();
    }

    pub async fn seek_to(&self, seconds: f64, relative: bool) {
        let route_start = self.inner.route_start_ns.load(Ordering::Acquire);
        #[allow(clippy::cast_sign_loss, clippy::cast_possible_truncation)]
        let offset_ns = (seconds.max(0.0) * 1e9) as u64;
        let target_ns = if relative {
            self.inner.cur_mono_ns.load(Ordering::Acquire).saturating_add(offset_ns)
        } else {
            route_start.saturating_add(offset_ns)
        };
        *self.inner.seek.write().await = Some(SeekRequest { target_ns });
        self.inner.clock.rebase(MonoTime::from_nanos(target_ns));
        self.retarget_window(target_ns).await;
        self.inner.wake.notify_waiters();
    }

    /// Moves the sliding window to the segment containing `target_ns`
    /// immediately, rather than waiting for the stream loop to deliver an
    /// event there -- spec.md §8 scenario 2 requires the resident set to
    /// reflect a seek within ~500ms, well under the window's own 100ms
    /// reconcile tick.
    async fn retarget_window(&self, target_ns: u64) {
        let route_start = self.inner.route_start_ns.load(Ordering::Acquire);
        #[allow(clippy::cast_possible_wrap)]
        let segment = (target_ns.saturating_sub(route_start) / 60_000_000_000) as i64;
        if let Some(window) = self.inner.window.read().await.clone() {
            window.set_current(segment).await;
        }
    }

    pub fn set_speed(&self, speed: f64) {
        let cur = MonoTime::from_nanos(self.inner.cur_mono_ns.load(Ordering::Acquire));
        self.inner.clock.set_speed(speed, cur);
        self.inner.wake.notify_waiters();
    }

    /// Scans the current merged view for the next engagement transition at
    /// or after the play head and seeks there, per spec §4.10.
    pub async fn seek_to_flag(&self, flag: EngagementFlag) {
        let Some(cell) = self.inner.merge_cell.read().await.clone() else {
            return;
        };
        let view = cell.current().await;
        let cur = self.inner.cur_mono_ns.load(Ordering::Acquire);
        if let Some(target_ns) = flag::next_transition(&view.events, cur, flag) {
            *self.inner.seek.write().await = Some(SeekRequest { target_ns });
            self.inner.clock.rebase(MonoTime::from_nanos(target_ns));
            self.retarget_window(target_ns).await;
            self.inner.wake.notify_waiters();
        }
    }

    pub async fn stop(&self) {
        self.inner.cancel.cancel();
        self.inner.abort.set();
        if let Some(window) = self.inner.window.read().await.clone() {
            window.shutdown();
        }
        *self.inner.state.write().await = ControllerState::Stopped;
        self.inner.wake.notify_waiters();
        let _ = self.inner.signals.send(ControllerSignal::Stopped);
        self.log(LogLevel::Info, None, "stopped".to_owned());
    }
}

async fn stream_loop(inner: Arc<Inner>) {
    let Some(cell) = inner.merge_cell.read().await.clone() else {
        return;
    };

    let mut view = cell.current().await;
    let mut pos = view.lower_bound(inner.cur_mono_ns.load(Ordering::Acquire));

    loop {
        if inner.cancel.is_cancelled() {
            return;
        }

        if let Some(seek) = inner.seek.write().await.take() {
            view = cell.current().await;
            pos = view.lower_bound(seek.target_ns);
            inner.cur_mono_ns.store(seek.target_ns, Ordering::Release);
        }

        // Detect a merged-view swap by identity rather than racily polling
        // `updating_events`, which could be observed false on both sides
        // of a fast swap; pointer identity is unambiguous.
        let latest = cell.current().await;
        if !Arc::ptr_eq(&view, &latest) {
            let cur = inner.cur_mono_ns.load(Ordering::Acquire);
            view = latest;
            pos = view.lower_bound(cur);
        }

        if pos >= view.events.len() {
            if let Some(next_pos) = wait_for_more_events(&inner, &cell, &mut view, pos).await {
                pos = next_pos;
                continue;
            }
            return;
        }

        let event = &view.events[pos];
        if inner.filter.allows(&event.which) {
            inner.cur_mono_ns.store(event.mono_time.as_nanos(), Ordering::Release);
            report_progress(&inner, &view, event.mono_time.as_nanos()).await;

            if !inner.config.flags.contains(common::ReplayFlags::FULL_SPEED) {
                tokio::select! {
                    () = inner.clock.pace(event.mono_time) => {}
                    () = inner.wake.notified() => continue,
                    () = inner.cancel.cancelled() => return,
                }
            }

            if let Some(frame_id) = camera_frame_id(event) {
                if let Some(slot) = event.which.camera_type().and_then(camera_type_to_slot) {
                    let guess = SegmentId(
                        #[allow(clippy::cast_possible_wrap)]
                        {
                            ((event.mono_time.as_nanos().saturating_sub(
                                inner.route_start_ns.load(Ordering::Acquire),
                            )) / 60_000_000_000) as i64
                        },
                    );
                    if let Some(handle) = inner.dispatchers.read().await.get(&slot) {
                        handle.push(frame_id, guess);
                    }
                }
            }

            inner.sink.publish(event.which, event.bytes.clone()).await;
        }

        pos += 1;
    }
}

/// No more buffered events: either more are still loading (poll a bit),
/// or this is genuinely the end of the route (wrap or stop per the
/// `NO_LOOP` flag).
async fn wait_for_more_events(
    inner: &Arc<Inner>,
    cell: &Arc<MergedViewCell>,
    view: &mut Arc<merge::MergedView>,
    pos: usize,
) -> Option<usize> {
    for _ in 0..20 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        if inner.cancel.is_cancelled() {
            return None;
        }
        let latest = cell.current().await;
        if latest.events.len() > pos || !Arc::ptr_eq(view, &latest) {
            *view = latest;
            let cur = inner.cur_mono_ns.load(Ordering::Acquire);
            return Some(view.lower_bound(cur).max(pos.min(view.events.len())));
        }
    }

    if inner.config.flags.contains(common::ReplayFlags::NO_LOOP) {
        *inner.state.write().await = ControllerState::Stopped;
        let _ = inner.signals.send(ControllerSignal::Stopped);
        None
    } else {
        let route_start = inner.route_start_ns.load(Ordering::Acquire);
        inner.cur_mono_ns.store(route_start, Ordering::Release);
        inner.clock.rebase(MonoTime::from_nanos(route_start));
        Some(0)
    }
}

async fn report_progress(inner: &Arc<Inner>, view: &merge::MergedView, cur_ns: u64) {
    #[allow(clippy::cast_precision_loss)]
    let current_secs = cur_ns.saturating_sub(view.route_start_ts) as f64 / 1e9;
    let total_secs = view
        .events
        .last()
        .map(|e| {
            #[allow(clippy::cast_precision_loss)]
            {
                e.mono_time.as_nanos().saturating_sub(view.route_start_ts) as f64 / 1e9
            }
        })
        .unwrap_or(current_secs);

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let segment = (current_secs / 60.0) as i64;
    let prev = inner.last_segment.swap(
        {
            #[allow(clippy::cast_sign_loss)]
            {
                segment.max(0) as u64
            }
        },
        Ordering::AcqRel,
    );
    #[allow(clippy::cast_sign_loss)]
    if prev != segment.max(0) as u64 {
        let _ = inner.signals.send(ControllerSignal::SegmentChanged(SegmentId(segment)));
        // Move the sliding window with the play head so SegmentWindow's
        // control loop (spec §4.6) loads/evicts around where playback
        // actually is, not just where it started.
        if let Some(window) = inner.window.read().await.clone() {
            window.set_current(segment).await;
        }
    }

    let _ = inner.signals.send(ControllerSignal::Progress {
        current_secs,
        total_secs,
    });
}

/// Reads the frame id carried by a camera-state event. Since this engine
/// defines its own wire encoding (not capnp), a camera-state event's
/// payload is simply its `frame_id` as 4 little-endian bytes.
fn camera_frame_id(event: &common::Event) -> Option<u32> {
    if event.which.camera_type().is_none() || event.which.is_encode_idx() {
        return None;
    }
    let bytes = event.bytes.as_ref();
    if bytes.len() < 4 {
        return None;
    }
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn camera_type_to_slot(camera: CameraType) -> Option<CameraSlot> {
    match camera {
        CameraType::Road => Some(CameraSlot::Road),
        CameraType::Driver => Some(CameraSlot::Driver),
        CameraType::WideRoad => Some(CameraSlot::Wide),
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use common::{RecordingSink, SocketTag};
    use std::str::FromStr;

    fn sink_pair() -> (Arc<RecordingSink>, ArcMessageSink) {
        let sink = Arc::new(RecordingSink::default());
        let as_sink: ArcMessageSink = sink.clone();
        (sink, as_sink)
    }

    fn write_segment(dir: &std::path::Path, route: &str, seg: i64, log_name: &str, body: &[u8]) {
        let seg_dir = dir.join(format!("{route}--{seg}"));
        std::fs::create_dir_all(&seg_dir).expect("mkdir");
        std::fs::write(seg_dir.join(log_name), body).expect("write log");
    }

    #[tokio::test]
    async fn missing_route_reports_route_not_found() {
        let (_, sink) = sink_pair();
        let config = ControllerConfig {
            route_config: RouteConfig {
                log_root: std::env::temp_dir().join("replay-controller-test-empty"),
                api_base: "http://127.0.0.1:0/".to_owned(),
            },
            ..ControllerConfig::default()
        };
        let controller = ReplayController::new(
            config,
            sink,
            None,
            SubscriptionFilter::allow_all(),
        );
        let route = RouteId::from_str("dongle|routeid").expect("route id");
        let err = controller.load(&route).await.expect_err("should fail");
        assert!(matches!(err, LoadError::RouteNotFound(_)));
    }

    #[tokio::test]
    async fn load_with_corrupt_log_reports_no_ready_segment() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_segment(dir.path(), "dongle|route", 0, "rlog.bz2", b"not a valid bz2 stream");

        let (_, sink) = sink_pair();
        let config = ControllerConfig {
            route_config: RouteConfig {
                log_root: dir.path().to_path_buf(),
                api_base: "http://127.0.0.1:0/".to_owned(),
            },
            ..ControllerConfig::default()
        };
        let controller = ReplayController::new(
            config,
            sink,
            None,
            SubscriptionFilter::allow_all(),
        );
        let route = RouteId::from_str("dongle|route").expect("route id");
        let ok = controller.load(&route).await.expect("route resolves");
        assert!(!ok);
        assert_eq!(controller.state().await, ControllerState::Loading);
    }

    fn single_segment_log() -> Vec<u8> {
        let mut builder = log_decoder::testutil::RecordLogBuilder::new();
        builder
            .push(SocketTag::InitData, 0, b"init")
            .push(SocketTag::Can, 1_000_000, b"can-0")
            .push(SocketTag::Can, 2_000_000, b"can-1")
            .push(SocketTag::Can, 3_000_000, b"can-2");
        builder.compress()
    }

    /// Events spread far enough apart in real time that a pause mid-stream
    /// reliably lands between deliveries instead of racing past all of them.
    fn paced_segment_log() -> Vec<u8> {
        let mut builder = log_decoder::testutil::RecordLogBuilder::new();
        builder
            .push(SocketTag::InitData, 0, b"init")
            .push(SocketTag::Can, 0, b"can-0")
            .push(SocketTag::Can, 500_000_000, b"can-1")
            .push(SocketTag::Can, 900_000_000, b"can-2")
            .push(SocketTag::Can, 1_300_000_000, b"can-3");
        builder.compress()
    }

    /// Full-speed mode skips real-time pacing entirely (spec §8 scenario
    /// 6), so every event in a short single-segment route should reach the
    /// sink almost immediately.
    #[tokio::test]
    async fn full_speed_mode_delivers_all_events_without_pacing() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_segment(dir.path(), "dongle|route", 0, "rlog.bz2", &single_segment_log());

        let (recording, sink) = sink_pair();
        let config = ControllerConfig {
            route_config: RouteConfig {
                log_root: dir.path().to_path_buf(),
                api_base: "http://127.0.0.1:0/".to_owned(),
            },
            flags: common::ReplayFlags::FULL_SPEED | common::ReplayFlags::NO_LOOP,
            ..ControllerConfig::default()
        };
        let controller = ReplayController::new(config, sink, None, SubscriptionFilter::allow_all());
        let route = RouteId::from_str("dongle|route").expect("route id");
        let ok = controller.load(&route).await.expect("route resolves");
        assert!(ok);
        controller.start(0.0).await;

        let mut delivered = 0;
        for _ in 0..100 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            delivered = recording.messages.lock().await.len();
            if delivered == 4 {
                break;
            }
        }
        assert_eq!(delivered, 4);
        controller.stop().await;
    }

    /// Pausing immediately after start must stop the clock from advancing
    /// events past the play head; progress should stay pinned until
    /// `pause(false)` resumes it (spec §8 scenario 4).
    #[tokio::test]
    async fn pause_holds_progress_until_resumed() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_segment(dir.path(), "dongle|route", 0, "rlog.bz2", &paced_segment_log());

        let (recording, sink) = sink_pair();
        let config = ControllerConfig {
            route_config: RouteConfig {
                log_root: dir.path().to_path_buf(),
                api_base: "http://127.0.0.1:0/".to_owned(),
            },
            flags: common::ReplayFlags::NO_LOOP,
            ..ControllerConfig::default()
        };
        let controller = ReplayController::new(config, sink, None, SubscriptionFilter::allow_all());
        let route = RouteId::from_str("dongle|route").expect("route id");
        let ok = controller.load(&route).await.expect("route resolves");
        assert!(ok);

        controller.start(0.0).await;
        assert_eq!(controller.state().await, ControllerState::Streaming);

        tokio::time::sleep(Duration::from_millis(80)).await;
        let before = recording.messages.lock().await.len();
        controller.pause(true).await;
        tokio::time::sleep(Duration::from_millis(300)).await;
        let after = recording.messages.lock().await.len();
        assert_eq!(before, after);

        controller.pause(false).await;
        assert_eq!(controller.state().await, ControllerState::Streaming);
        controller.stop().await;
    }
}

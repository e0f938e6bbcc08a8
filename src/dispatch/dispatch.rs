// SPDX-License-Identifier: GPL-2.0-or-later

//! C8 FrameDispatcher: one per camera, owns a bounded non-blocking queue of
//! encode-index lookups and a dedicated worker that decodes and forwards
//! frames to a `VideoSink`. Grounded on the teacher's `broadcast`/`mpsc`
//! channel plumbing for per-stream fan-out in `monitor/source.rs`, adapted
//! here to a hand-rolled drop-oldest ring buffer since `tokio::sync::mpsc`
//! has no drop-oldest backpressure policy.

use common::{ArcVideoSink, FrameMeta, SegmentId, VideoStream};
use segment::{CameraSlot, Segment};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use window::WindowHandle;

struct QueueItem {
    frame_id: u32,
    hint_segment: SegmentId,
}

/// Bounded drop-oldest queue: `push` never blocks and discards the oldest
/// pending entry once full, trading completeness for visual continuity per
/// spec §4.8.
struct CameraQueue {
    inner: Mutex<VecDeque<QueueItem>>,
    capacity: usize,
    notify: tokio::sync::Notify,
}

impl CameraQueue {
    fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            notify: tokio::sync::Notify::new(),
        }
    }

    fn push(&self, item: QueueItem) {
        let mut q = self.inner.lock().expect("queue mutex poisoned");
        if q.len() >= self.capacity {
            q.pop_front();
        }
        q.push_back(item);
        drop(q);
        self.notify.notify_one();
    }

    async fn pop(&self) -> QueueItem {
        loop {
            if let Some(item) = self.inner.lock().expect("queue mutex poisoned").pop_front() {
                return item;
            }
            self.notify.notified().await;
        }
    }
}

/// Handle a controller holds to push encode-index lookups for one camera.
#[derive(Clone)]
pub struct DispatcherHandle {
    queue: Arc<CameraQueue>,
}

impl DispatcherHandle {
    /// Enqueues a lookup for `frame_id`, expected to live in `hint_segment`
    /// or an adjacent one. Never blocks.
    pub fn push(&self, frame_id: u32, hint_segment: SegmentId) {
        self.queue.push(QueueItem {
            frame_id,
            hint_segment,
        });
    }
}

/// Spawns the worker task for one camera and returns a handle to feed it.
#[must_use]
pub fn spawn(
    slot: CameraSlot,
    stream: VideoStream,
    window: WindowHandle,
    sink: ArcVideoSink,
    capacity: usize,
    cancel: tokio_util::sync::CancellationToken,
) -> DispatcherHandle {
    let queue = Arc::new(CameraQueue::new(capacity));
    let handle = DispatcherHandle {
        queue: Arc::clone(&queue),
    };

    tokio::spawn(run(queue, slot, stream, window, sink, cancel));

    handle
}

async fn run(
    queue: Arc<CameraQueue>,
    slot: CameraSlot,
    stream: VideoStream,
    window: WindowHandle,
    sink: ArcVideoSink,
    cancel: tokio_util::sync::CancellationToken,
) {
    loop {
        let item = tokio::select! {
            () = cancel.cancelled() => return,
            item = queue.pop() => item,
        };

        if let Some((reader, rgb, encode_id)) =
            resolve_and_decode(&window, slot, item.hint_segment, item.frame_id).await
        {
            let meta = FrameMeta {
                frame_id: item.frame_id,
                width: reader.width(),
                height: reader.height(),
                timestamp_eof: u64::from(encode_id),
            };
            sink.send(stream, rgb.rgb, meta).await;
        }
    }
}

/// Resolves `frame_id`'s encode index by checking `hint_segment` then its
/// ±1 neighbors (a frame referenced by a message may live in the previous
/// segment's video file, per spec §4.8), then decodes it.
async fn resolve_and_decode(
    window: &WindowHandle,
    slot: CameraSlot,
    hint_segment: SegmentId,
    frame_id: u32,
) -> Option<(Arc<video::FrameReader>, video::RgbFrame, u32)> {
    let resident = window.snapshot().await;
    let candidates = [hint_segment.0, hint_segment.0 - 1, hint_segment.0 + 1];

    for candidate in candidates {
        let Some((_, segment)) = resident.iter().find(|(id, _)| id.0 == candidate) else {
            continue;
        };
        if let Some(found) = try_segment(segment, slot, frame_id).await {
            return Some(found);
        }
    }
    None
}

async fn try_segment(
    segment: &Arc<Segment>,
    slot: CameraSlot,
    frame_id: u32,
) -> Option<(Arc<video::FrameReader>, video::RgbFrame, u32)> {
    if !segment.is_ready().await {
        return None;
    }
    let index = segment.encode_index_snapshot().await;
    let entry = index.get(&frame_id)?;
    let reader = segment.camera(slot).await?;
    let rgb = reader.get(entry.frame_encode_id).await.ok()?;
    Some((reader, rgb, entry.frame_encode_id))
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn drop_oldest_keeps_queue_bounded() {
        let queue = CameraQueue::new(2);
        queue.push(QueueItem {
            frame_id: 1,
            hint_segment: SegmentId(0),
        });
        queue.push(QueueItem {
            frame_id: 2,
            hint_segment: SegmentId(0),
        });
        queue.push(QueueItem {
            frame_id: 3,
            hint_segment: SegmentId(0),
        });

        let first = queue.pop().await;
        assert_eq!(first.frame_id, 2);
        let second = queue.pop().await;
        assert_eq!(second.frame_id, 3);
    }
}

// SPDX-License-Identifier: GPL-2.0-or-later

use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;

use crate::event::SocketTag;

pub type ArcMessageSink = Arc<dyn MessageSink + Send + Sync>;

/// Publishes decoded messages to whatever transport stands in for the
/// vehicle's inter-process bus (spec.md §6's `MessageSink`).
#[async_trait]
pub trait MessageSink {
    async fn publish(&self, tag: SocketTag, bytes: Bytes);
}

/// Three fixed video stream identifiers, named after the VisionIPC streams
/// the original implementation publishes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum VideoStream {
    RgbBack,
    RgbFront,
    RgbWide,
}

/// One RGB24 frame buffer, along with the frame metadata needed to
/// correlate it with the message stream.
#[derive(Clone, Debug)]
pub struct FrameMeta {
    pub frame_id: u32,
    pub width: u32,
    pub height: u32,
    pub timestamp_eof: u64,
}

pub type ArcVideoSink = Arc<dyn VideoSink + Send + Sync>;

/// Consumes decoded camera frames (spec.md §6's `VideoSink`).
#[async_trait]
pub trait VideoSink {
    /// Establishes (or reuses) the pixel buffer for `stream` and hands it
    /// decoded RGB24 bytes plus metadata. Frame dimensions are fixed for the
    /// lifetime of a session after the first call.
    async fn send(&self, stream: VideoStream, rgb: Bytes, meta: FrameMeta);
}

/// An in-memory `MessageSink`/`VideoSink` pair for tests and the CAN
/// inspector, recording everything it receives instead of forwarding it.
#[derive(Default)]
pub struct RecordingSink {
    pub messages: tokio::sync::Mutex<Vec<(SocketTag, Bytes)>>,
    pub frames: tokio::sync::Mutex<Vec<(VideoStream, FrameMeta)>>,
}

#[async_trait]
impl MessageSink for RecordingSink {
    async fn publish(&self, tag: SocketTag, bytes: Bytes) {
        self.messages.lock().await.push((tag, bytes));
    }
}

#[async_trait]
impl VideoSink for RecordingSink {
    async fn send(&self, stream: VideoStream, _rgb: Bytes, meta: FrameMeta) {
        self.frames.lock().await.push((stream, meta));
    }
}

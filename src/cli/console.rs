// SPDX-License-Identifier: GPL-2.0-or-later

//! Default `MessageSink`/`VideoSink` collaborators for the standalone
//! replay binary. Spec.md §6 treats both as abstract externals ("the
//! default implementation is a process-wide multicast bus" / a shared-memory
//! video server); neither exists in this workspace; the CLI's console
//! sinks stand in for them so `replay` is runnable without a real bus.

use async_trait::async_trait;
use bytes::Bytes;
use common::{FrameMeta, MessageSink, SocketTag, VideoSink, VideoStream};
use std::collections::HashMap;
use tokio::sync::Mutex;

/// Counts published messages per tag instead of printing each one -- a real
/// publish is cheap and frequent (CAN alone can be thousands/sec), so the
/// only CLI-visible output is the final per-tag summary.
#[derive(Default)]
pub struct ConsoleMessageSink {
    counts: Mutex<HashMap<SocketTag, u64>>,
}

impl ConsoleMessageSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn summary(&self) -> Vec<(SocketTag, u64)> {
        let counts = self.counts.lock().await;
        let mut out: Vec<_> = counts.iter().map(|(tag, n)| (*tag, *n)).collect();
        out.sort_by_key(|(tag, _)| tag.discriminant());
        out
    }
}

#[async_trait]
impl MessageSink for ConsoleMessageSink {
    async fn publish(&self, tag: SocketTag, _bytes: Bytes) {
        *self.counts.lock().await.entry(tag).or_insert(0) += 1;
    }
}

/// Prints a line per decoded frame. Frame volume (≈20/s/camera) is low
/// enough that this is useful feedback rather than noise, unlike messages.
#[derive(Default)]
pub struct ConsoleVideoSink;

impl ConsoleVideoSink {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl VideoSink for ConsoleVideoSink {
    async fn send(&self, stream: VideoStream, rgb: Bytes, meta: FrameMeta) {
        println!(
            "frame {:?} id={} {}x{} ({} bytes)",
            stream,
            meta.frame_id,
            meta.width,
            meta.height,
            rgb.len()
        );
    }
}

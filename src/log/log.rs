// SPDX-License-Identifier: GPL-2.0-or-later

//! C2 LogDecoder: stream-parses a decompressed log into typed `Event`s plus
//! the `EncodeIndex` map, per spec.md §4.2.
//!
//! Wire format: bz2-compressed concatenation of length-prefixed records.
//! Each record is `[tag: u8][other_tag: u16][mono_time: u64][len: u32][payload]`;
//! `other_tag` is only meaningful when `tag == TAG_OTHER` and is otherwise
//! zero. This is a simplified stand-in for the original schema-evolving
//! capnp format -- compiling a `.capnp` IDL is out of scope for this core.

use bytes::Bytes;
use common::{EncodeIdx, Event, SegmentId, SocketTag};
use std::collections::HashMap;
use std::io::Read;
use thiserror::Error;

const HEADER_LEN: usize = 1 + 2 + 8 + 4;
const ENCODE_IDX_PAYLOAD_LEN: usize = 4 + 4 + 8 + 8 + 8 + 4;

const TAG_INIT_DATA: u8 = 0;
const TAG_ROAD_CAMERA_STATE: u8 = 1;
const TAG_DRIVER_CAMERA_STATE: u8 = 2;
const TAG_WIDE_ROAD_CAMERA_STATE: u8 = 3;
const TAG_ROAD_ENCODE_IDX: u8 = 4;
const TAG_DRIVER_ENCODE_IDX: u8 = 5;
const TAG_WIDE_ROAD_ENCODE_IDX: u8 = 6;
const TAG_CAR_CONTROL: u8 = 7;
const TAG_CONTROLS_STATE: u8 = 8;
const TAG_CAN: u8 = 9;
const TAG_OTHER: u8 = 255;

fn tag_from_code(code: u8, other: u16) -> SocketTag {
    match code {
        TAG_INIT_DATA => SocketTag::InitData,
        TAG_ROAD_CAMERA_STATE => SocketTag::RoadCameraState,
        TAG_DRIVER_CAMERA_STATE => SocketTag::DriverCameraState,
        TAG_WIDE_ROAD_CAMERA_STATE => SocketTag::WideRoadCameraState,
        TAG_ROAD_ENCODE_IDX => SocketTag::RoadEncodeIdx,
        TAG_DRIVER_ENCODE_IDX => SocketTag::DriverEncodeIdx,
        TAG_WIDE_ROAD_ENCODE_IDX => SocketTag::WideRoadEncodeIdx,
        TAG_CAR_CONTROL => SocketTag::CarControl,
        TAG_CONTROLS_STATE => SocketTag::ControlsState,
        TAG_CAN => SocketTag::Can,
        _ => SocketTag::Other(other),
    }
}

/// Inverse of [`tag_from_code`], used by the test record builder below.
#[cfg(any(test, feature = "test-util"))]
fn code_for(tag: &SocketTag) -> (u8, u16) {
    match tag {
        SocketTag::InitData => (TAG_INIT_DATA, 0),
        SocketTag::RoadCameraState => (TAG_ROAD_CAMERA_STATE, 0),
        SocketTag::DriverCameraState => (TAG_DRIVER_CAMERA_STATE, 0),
        SocketTag::WideRoadCameraState => (TAG_WIDE_ROAD_CAMERA_STATE, 0),
        SocketTag::RoadEncodeIdx => (TAG_ROAD_ENCODE_IDX, 0),
        SocketTag::DriverEncodeIdx => (TAG_DRIVER_ENCODE_IDX, 0),
        SocketTag::WideRoadEncodeIdx => (TAG_WIDE_ROAD_ENCODE_IDX, 0),
        SocketTag::CarControl => (TAG_CAR_CONTROL, 0),
        SocketTag::ControlsState => (TAG_CONTROLS_STATE, 0),
        SocketTag::Can => (TAG_CAN, 0),
        SocketTag::Other(v) => (TAG_OTHER, *v),
    }
}

#[derive(Debug, Error)]
pub enum LogDecodeError {
    #[error("bz2 decompression failed: {0}")]
    Decompress(std::io::Error),

    #[error("decompressed log is empty")]
    CorruptLog,
}

impl common::Classify for LogDecodeError {
    fn kind(&self) -> common::ErrorKind {
        common::ErrorKind::CorruptLog
    }
}

/// Result of a successful (possibly partial) decode.
pub struct DecodeOutcome {
    pub events: Vec<Event>,
    pub encode_index: HashMap<u32, EncodeIdx>,
    /// Set when parsing stopped early because a record was malformed; the
    /// events parsed up to that point are still returned (spec.md §4.2's
    /// `PartialDecode` warning).
    pub partial: bool,
}

/// Decompresses `compressed` (bz2) and parses it into events, per spec.md
/// §4.2. `sort_by_time` stable-sorts the result by `mono_time`, tie-breaking
/// on original record position -- the tie-break spec.md §9 leaves as an open
/// question, resolved here as "keep the encode-index original before its
/// duplicated frame event when both land on the same `mono_time`".
pub fn decode_log(compressed: &[u8], sort_by_time: bool) -> Result<DecodeOutcome, LogDecodeError> {
    let raw = decompress(compressed)?;
    if raw.is_empty() {
        return Err(LogDecodeError::CorruptLog);
    }
    let raw = Bytes::from(raw);

    let mut events = Vec::new();
    let mut encode_index = HashMap::new();
    let mut offset = 0usize;
    let mut partial = false;

    while offset < raw.len() {
        match parse_record(&raw, offset) {
            Some((record, next_offset)) => {
                if let Some(idx) = record.encode_idx {
                    encode_index.insert(idx.frame_id, idx);

                    let mut original = Event::new(record.tag, record.mono_time, record.payload.clone());
                    original.encode_idx = Some(idx);
                    events.push(original);

                    let frame_mono = if idx.timestamp_sof > 0 {
                        idx.timestamp_sof
                    } else if idx.timestamp_eof > 0 {
                        idx.timestamp_eof
                    } else {
                        *record.mono_time
                    };
                    let mut frame_event = Event::new(record.tag, frame_mono.into(), record.payload);
                    frame_event.encode_idx = Some(idx);
                    events.push(frame_event);
                } else {
                    events.push(Event::new(record.tag, record.mono_time, record.payload));
                }
                offset = next_offset;
            }
            None => {
                partial = true;
                break;
            }
        }
    }

    if events.is_empty() && partial {
        return Err(LogDecodeError::CorruptLog);
    }

    if sort_by_time {
        // sort_by_key is a stable sort: ties keep their original relative
        // order, which is the tie-break spec.md §9 leaves as an open question.
        events.sort_by_key(|e| e.mono_time);
    }

    Ok(DecodeOutcome {
        events,
        encode_index,
        partial,
    })
}

struct ParsedRecord {
    tag: SocketTag,
    mono_time: common::time::MonoTime,
    payload: Bytes,
    encode_idx: Option<EncodeIdx>,
}

fn parse_record(raw: &Bytes, offset: usize) -> Option<(ParsedRecord, usize)> {
    if raw.len() - offset < HEADER_LEN {
        return None;
    }
    let h = &raw[offset..offset + HEADER_LEN];
    let tag_code = h[0];
    let other_tag = u16::from_le_bytes([h[1], h[2]]);
    let mono_time = u64::from_le_bytes(h[3..11].try_into().ok()?);
    #[allow(clippy::as_conversions)]
    let payload_len = u32::from_le_bytes(h[11..15].try_into().ok()?) as usize;

    let payload_start = offset + HEADER_LEN;
    let payload_end = payload_start.checked_add(payload_len)?;
    if payload_end > raw.len() {
        return None;
    }

    let tag = tag_from_code(tag_code, other_tag);
    let payload = raw.slice(payload_start..payload_end);

    let encode_idx = if tag.is_encode_idx() {
        parse_encode_idx(&payload)
    } else {
        None
    };

    Some((
        ParsedRecord {
            tag,
            mono_time: mono_time.into(),
            payload,
            encode_idx,
        },
        payload_end,
    ))
}

fn parse_encode_idx(payload: &[u8]) -> Option<EncodeIdx> {
    if payload.len() < ENCODE_IDX_PAYLOAD_LEN {
        return None;
    }
    let frame_id = u32::from_le_bytes(payload[0..4].try_into().ok()?);
    let segment_num = u32::from_le_bytes(payload[4..8].try_into().ok()?);
    let segment_id = i64::from_le_bytes(payload[8..16].try_into().ok()?);
    let timestamp_sof = u64::from_le_bytes(payload[16..24].try_into().ok()?);
    let timestamp_eof = u64::from_le_bytes(payload[24..32].try_into().ok()?);
    let frame_encode_id = u32::from_le_bytes(payload[32..36].try_into().ok()?);
    Some(EncodeIdx {
        frame_id,
        segment_num,
        segment_id: SegmentId(segment_id),
        timestamp_sof,
        timestamp_eof,
        frame_encode_id,
    })
}

fn decompress(compressed: &[u8]) -> Result<Vec<u8>, LogDecodeError> {
    let mut decoder = bzip2::read::BzDecoder::new(compressed);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(LogDecodeError::Decompress)?;
    Ok(out)
}

/// Test-only helpers for building synthetic logs without a real bz2 route.
#[cfg(any(test, feature = "test-util"))]
pub mod testutil {
    use super::{code_for, ENCODE_IDX_PAYLOAD_LEN};
    use common::{SegmentId, SocketTag};

    #[derive(Default)]
    pub struct RecordLogBuilder {
        records: Vec<u8>,
    }

    impl RecordLogBuilder {
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        pub fn push(&mut self, tag: SocketTag, mono_time: u64, payload: &[u8]) -> &mut Self {
            let (code, other) = code_for(&tag);
            self.records.push(code);
            self.records.extend_from_slice(&other.to_le_bytes());
            self.records.extend_from_slice(&mono_time.to_le_bytes());
            #[allow(clippy::as_conversions)]
            let len = payload.len() as u32;
            self.records.extend_from_slice(&len.to_le_bytes());
            self.records.extend_from_slice(payload);
            self
        }

        pub fn push_encode_idx(
            &mut self,
            tag: SocketTag,
            mono_time: u64,
            frame_id: u32,
            segment_num: u32,
            segment_id: SegmentId,
            timestamp_sof: u64,
            timestamp_eof: u64,
            frame_encode_id: u32,
        ) -> &mut Self {
            let mut payload = Vec::with_capacity(ENCODE_IDX_PAYLOAD_LEN);
            payload.extend_from_slice(&frame_id.to_le_bytes());
            payload.extend_from_slice(&segment_num.to_le_bytes());
            payload.extend_from_slice(&segment_id.0.to_le_bytes());
            payload.extend_from_slice(&timestamp_sof.to_le_bytes());
            payload.extend_from_slice(&timestamp_eof.to_le_bytes());
            payload.extend_from_slice(&frame_encode_id.to_le_bytes());
            self.push(tag, mono_time, &payload)
        }

        #[must_use]
        pub fn compress(&self) -> Vec<u8> {
            use bzip2::write::BzEncoder;
            use bzip2::Compression;
            use std::io::Write;
            let mut encoder = BzEncoder::new(Vec::new(), Compression::fast());
            encoder.write_all(&self.records).expect("write to memory encoder");
            encoder.finish().expect("finish encoder")
        }
    }
}

#[cfg(test)]
mod test {
    use super::testutil::RecordLogBuilder;
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn decodes_simple_events_in_order() {
        let mut builder = RecordLogBuilder::new();
        builder
            .push(SocketTag::InitData, 0, b"init")
            .push(SocketTag::Can, 100, b"can-1")
            .push(SocketTag::Can, 50, b"can-0");

        let compressed = builder.compress();
        let out = decode_log(&compressed, true).expect("should decode");

        assert_eq!(out.events.len(), 3);
        assert_eq!(out.events[0].mono_time.as_nanos(), 0);
        assert_eq!(out.events[1].mono_time.as_nanos(), 50);
        assert_eq!(out.events[2].mono_time.as_nanos(), 100);
        assert_eq!(&out.events[1].bytes[..], b"can-0");
    }

    #[test]
    fn encode_idx_produces_two_events_and_populates_index() {
        let mut builder = RecordLogBuilder::new();
        builder.push_encode_idx(
            SocketTag::RoadEncodeIdx,
            1_000,
            7,
            0,
            SegmentId(0),
            1_200,
            0,
        );

        let compressed = builder.compress();
        let out = decode_log(&compressed, true).expect("should decode");

        assert_eq!(out.events.len(), 2);
        assert_eq!(out.events[0].mono_time.as_nanos(), 1_000);
        assert_eq!(out.events[1].mono_time.as_nanos(), 1_200);
        assert_eq!(out.encode_index.get(&7).expect("indexed").frame_id, 7);
    }

    #[test]
    fn encode_idx_falls_back_to_log_time_when_sof_and_eof_are_zero() {
        let mut builder = RecordLogBuilder::new();
        builder.push_encode_idx(SocketTag::DriverEncodeIdx, 500, 1, 0, SegmentId(0), 0, 0, 0);

        let out = decode_log(&builder.compress(), true).expect("should decode");
        assert_eq!(out.events[1].mono_time.as_nanos(), 500);
    }

    #[test]
    fn empty_log_is_corrupt() {
        use bzip2::write::BzEncoder;
        use bzip2::Compression;
        use std::io::Write;
        let mut encoder = BzEncoder::new(Vec::new(), Compression::fast());
        encoder.write_all(&[]).expect("write");
        let compressed = encoder.finish().expect("finish");

        let err = decode_log(&compressed, true).expect_err("should be corrupt");
        assert!(matches!(err, LogDecodeError::CorruptLog));
    }
}

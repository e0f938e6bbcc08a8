// SPDX-License-Identifier: GPL-2.0-or-later

//! C3 FrameReader: opens one segment's encoded video container and decodes
//! frames by encode id, per spec.md §4.3.
//!
//! Container format: a small header (dimensions + H264 avcC extradata) plus
//! a packet index (`is_keyframe`, byte offset, length) and the concatenated
//! H264 packets themselves. This stands in for the original's mp4-ish
//! per-camera video file; decoding uses the same ffmpeg wrapper the teacher
//! uses for its own H264 pipeline (`sentryshot_ffmpeg_h264` +
//! `sentryshot_convert`).

use bytes::Bytes;
use sentryshot_convert::{ConvertError, NewConverterError, PixelFormat, PixelFormatConverter};
use sentryshot_ffmpeg_h264::{
    H264BuilderError, H264Decoder, H264DecoderBuilder, Packet, PaddedBytes, ReceiveFrameError,
    Ready, SendPacketError,
};
use sentryshot_util::Frame;
use std::collections::VecDeque;
use thiserror::Error;
use tokio::sync::Mutex;

/// Number of most-recently-decoded frames `FrameReader` keeps around so
/// sequential playback doesn't re-decode from the last keyframe every call.
const FRAME_CACHE_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum OpenFrameReaderError {
    #[error("container too short for header")]
    TruncatedHeader,

    #[error("bad magic bytes")]
    BadMagic,

    #[error("container shorter than its own index claims")]
    TruncatedIndex,

    #[error("new h264 decoder: {0}")]
    NewDecoder(#[from] H264BuilderError),
}

impl common::Classify for OpenFrameReaderError {
    fn kind(&self) -> common::ErrorKind {
        common::ErrorKind::VideoDecodeError
    }
}

#[derive(Debug, Error)]
pub enum DecodeFrameError {
    #[error("encode id {0} out of range")]
    OutOfRange(u32),

    #[error("send packet: {0}")]
    SendPacket(#[from] SendPacketError),

    #[error("receive frame: {0}")]
    ReceiveFrame(#[from] ReceiveFrameError),

    #[error("new pixel converter: {0}")]
    NewConverter(#[from] NewConverterError),

    #[error("convert: {0}")]
    Convert(#[from] ConvertError),

    #[error("no frame produced for encode id {0}")]
    NoFrameProduced(u32),
}

impl common::Classify for DecodeFrameError {
    fn kind(&self) -> common::ErrorKind {
        common::ErrorKind::VideoDecodeError
    }
}

const MAGIC: &[u8; 4] = b"RPLV";

struct IndexEntry {
    is_keyframe: bool,
    offset: usize,
    len: usize,
}

/// One RGB24 decoded frame. Valid until the next call to
/// [`FrameReader::get`] on the same reader, unless copied out.
#[derive(Clone)]
pub struct RgbFrame {
    pub width: u32,
    pub height: u32,
    pub rgb: Bytes,
}

struct DecoderState {
    decoder: H264Decoder<Ready>,
    /// Encode id the decoder has most recently produced output for, used to
    /// decide whether sequential decoding can continue from where it left
    /// off instead of re-seeking to the last keyframe.
    last_decoded: Option<u32>,
    cache: VecDeque<(u32, RgbFrame)>,
}

/// Opens an encoded video container for one segment's one camera and
/// decodes frames on demand by encode id.
pub struct FrameReader {
    width: u32,
    height: u32,
    index: Vec<IndexEntry>,
    packets: Bytes,
    state: Mutex<DecoderState>,
}

impl FrameReader {
    /// Parses the container held in `bytes` (already read off disk by the
    /// caller via `replay-fetch`).
    pub fn open(bytes: Bytes) -> Result<Self, OpenFrameReaderError> {
        use OpenFrameReaderError::*;
        if bytes.len() < 16 {
            return Err(TruncatedHeader);
        }
        if &bytes[0..4] != MAGIC {
            return Err(BadMagic);
        }
        let width = u32::from_le_bytes(bytes[4..8].try_into().expect("4 bytes"));
        let height = u32::from_le_bytes(bytes[8..12].try_into().expect("4 bytes"));
        let extradata_len = u32::from_le_bytes(bytes[12..16].try_into().expect("4 bytes")) as usize;

        let mut pos = 16;
        if bytes.len() < pos + extradata_len {
            return Err(TruncatedHeader);
        }
        let extradata = bytes.slice(pos..pos + extradata_len);
        pos += extradata_len;

        if bytes.len() < pos + 4 {
            return Err(TruncatedHeader);
        }
        let frame_count =
            u32::from_le_bytes(bytes[pos..pos + 4].try_into().expect("4 bytes")) as usize;
        pos += 4;

        let mut index = Vec::with_capacity(frame_count);
        for _ in 0..frame_count {
            if bytes.len() < pos + 13 {
                return Err(TruncatedIndex);
            }
            let is_keyframe = bytes[pos] != 0;
            let offset = u64::from_le_bytes(bytes[pos + 1..pos + 9].try_into().expect("8 bytes"))
                as usize;
            let len =
                u32::from_le_bytes(bytes[pos + 9..pos + 13].try_into().expect("4 bytes")) as usize;
            index.push(IndexEntry {
                is_keyframe,
                offset,
                len,
            });
            pos += 13;
        }

        let packets = bytes.slice(pos..bytes.len());
        for entry in &index {
            let in_range = entry
                .offset
                .checked_add(entry.len)
                .map_or(false, |end| end <= packets.len());
            if !in_range {
                return Err(TruncatedIndex);
            }
        }

        let decoder = H264DecoderBuilder::new().avcc(PaddedBytes::new(extradata.to_vec()))?;

        Ok(Self {
            width,
            height,
            index,
            packets,
            state: Mutex::new(DecoderState {
                decoder,
                last_decoded: None,
                cache: VecDeque::new(),
            }),
        })
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[must_use]
    pub fn frame_count(&self) -> usize {
        self.index.len()
    }

    fn nearest_keyframe(&self, encode_id: u32) -> Option<u32> {
        #[allow(clippy::as_conversions)]
        let id = encode_id as usize;
        (0..=id).rev().find(|&i| self.index.get(i).is_some_and(|e| e.is_keyframe)).map(|v| {
            #[allow(clippy::as_conversions)]
            {
                v as u32
            }
        })
    }

    /// Decodes the frame at `encode_id`, seeking to the nearest prior
    /// keyframe and decoding forward if sequential decode isn't already in
    /// progress at the right position.
    pub async fn get(&self, encode_id: u32) -> Result<RgbFrame, DecodeFrameError> {
        #[allow(clippy::as_conversions)]
        let id = encode_id as usize;
        if id >= self.index.len() {
            return Err(DecodeFrameError::OutOfRange(encode_id));
        }

        let mut state = self.state.lock().await;
        if let Some(cached) = state.cache.iter().find(|(id, _)| *id == encode_id) {
            return Ok(cached.1.clone());
        }

        let start = match state.last_decoded {
            Some(last) if last < encode_id && !self.crosses_keyframe(last, encode_id) => last + 1,
            _ => self
                .nearest_keyframe(encode_id)
                .ok_or(DecodeFrameError::OutOfRange(encode_id))?,
        };

        let mut last_frame = None;
        for i in start..=encode_id {
            let entry = &self.index[i as usize];
            let packet_bytes = &self.packets[entry.offset..entry.offset + entry.len];
            let padded = PaddedBytes::new(packet_bytes.to_vec());

            state.decoder.send_packet(&Packet::new(&padded))?;

            loop {
                let mut frame = Frame::new();
                match state.decoder.receive_frame(&mut frame) {
                    Ok(()) => last_frame = Some(frame),
                    Err(ReceiveFrameError::Eagain) => break,
                    Err(e) => return Err(e.into()),
                }
            }
            state.last_decoded = Some(i);
        }

        let frame = last_frame.ok_or(DecodeFrameError::NoFrameProduced(encode_id))?;
        let rgb = self.to_rgb(&frame)?;

        state.cache.push_back((encode_id, rgb.clone()));
        if state.cache.len() > FRAME_CACHE_LEN {
            state.cache.pop_front();
        }

        Ok(rgb)
    }

    fn crosses_keyframe(&self, from_exclusive: u32, to_inclusive: u32) -> bool {
        #[allow(clippy::as_conversions)]
        ((from_exclusive + 1)..=to_inclusive)
            .any(|i| self.index.get(i as usize).is_some_and(|e| e.is_keyframe) && i != from_exclusive + 1)
    }

    fn to_rgb(&self, frame: &Frame) -> Result<RgbFrame, DecodeFrameError> {
        let mut converter = PixelFormatConverter::new(
            frame.width(),
            frame.height(),
            frame.color_range(),
            frame.pix_fmt(),
            PixelFormat::RGB24,
        )?;
        let mut rgb_frame = Frame::new();
        converter.convert(frame, &mut rgb_frame)?;

        let mut raw = Vec::new();
        rgb_frame.copy_to_buffer(&mut raw, 1)?;

        Ok(RgbFrame {
            width: rgb_frame.width().get(),
            height: rgb_frame.height().get(),
            rgb: Bytes::from(raw),
        })
    }
}

#[cfg(any(test, feature = "test-util"))]
pub mod testutil {
    //! Minimal container writer for tests; produces a file the real ffmpeg
    //! decoder can't decode (no real H264 data) so it is only useful for
    //! exercising the header/index parsing path, not `get`.
    use bytes::Bytes;

    pub fn build_container(width: u32, height: u32, extradata: &[u8], packets: &[(bool, &[u8])]) -> Bytes {
        let mut out = Vec::new();
        out.extend_from_slice(super::MAGIC);
        out.extend_from_slice(&width.to_le_bytes());
        out.extend_from_slice(&height.to_le_bytes());
        #[allow(clippy::as_conversions)]
        out.extend_from_slice(&(extradata.len() as u32).to_le_bytes());
        out.extend_from_slice(extradata);
        #[allow(clippy::as_conversions)]
        out.extend_from_slice(&(packets.len() as u32).to_le_bytes());

        let mut offset = 0u64;
        let mut bodies = Vec::new();
        for (is_keyframe, data) in packets {
            out.push(u8::from(*is_keyframe));
            out.extend_from_slice(&offset.to_le_bytes());
            #[allow(clippy::as_conversions)]
            out.extend_from_slice(&(data.len() as u32).to_le_bytes());
            offset += data.len() as u64;
            bodies.extend_from_slice(data);
        }
        out.extend_from_slice(&bodies);
        Bytes::from(out)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn rejects_bad_magic() {
        let bytes = Bytes::from_static(b"xxxxxxxxxxxxxxxx");
        let err = FrameReader::open(bytes).expect_err("should reject");
        assert!(matches!(err, OpenFrameReaderError::BadMagic));
    }

    #[test]
    fn rejects_truncated_header() {
        let bytes = Bytes::from_static(b"RPLV");
        let err = FrameReader::open(bytes).expect_err("should reject");
        assert!(matches!(err, OpenFrameReaderError::TruncatedHeader));
    }
}

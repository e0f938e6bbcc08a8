// SPDX-License-Identifier: GPL-2.0-or-later

use bytes::Bytes;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::time::MonoTime;

/// Zero-based segment index within a route. Gaps are allowed.
#[repr(transparent)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct SegmentId(pub i64);

impl fmt::Display for SegmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// `DONGLE|ROUTE_ID`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RouteId {
    raw: String,
    split: usize,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseRouteIdError {
    #[error("missing '|' separator in route id '{0}'")]
    MissingSeparator(String),

    #[error("empty dongle id in route id '{0}'")]
    EmptyDongle(String),

    #[error("empty route id in route id '{0}'")]
    EmptyRoute(String),
}

impl FromStr for RouteId {
    type Err = ParseRouteIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use ParseRouteIdError::*;
        let Some(split) = s.find('|') else {
            return Err(MissingSeparator(s.to_owned()));
        };
        if split == 0 {
            return Err(EmptyDongle(s.to_owned()));
        }
        if split + 1 == s.len() {
            return Err(EmptyRoute(s.to_owned()));
        }
        Ok(Self {
            raw: s.to_owned(),
            split,
        })
    }
}

impl RouteId {
    #[must_use]
    pub fn dongle_id(&self) -> &str {
        &self.raw[..self.split]
    }

    #[must_use]
    pub fn route_name(&self) -> &str {
        &self.raw[self.split + 1..]
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }
}

impl fmt::Display for RouteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

/// Which video stream a frame belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CameraType {
    Road,
    Driver,
    WideRoad,
}

impl CameraType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            CameraType::Road => "road",
            CameraType::Driver => "driver",
            CameraType::WideRoad => "wide_road",
        }
    }
}

/// Discriminant of one event-union variant, precomputed once from the
/// subscribed tag list so the hot loop compares integers rather than
/// reflecting on field names (see SPEC_FULL.md's dynamic-dispatch note).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SocketTag {
    InitData,
    RoadCameraState,
    DriverCameraState,
    WideRoadCameraState,
    RoadEncodeIdx,
    DriverEncodeIdx,
    WideRoadEncodeIdx,
    CarControl,
    ControlsState,
    Can,
    Other(u16),
}

impl SocketTag {
    #[must_use]
    pub fn discriminant(&self) -> u16 {
        match self {
            SocketTag::InitData => 0,
            SocketTag::RoadCameraState => 1,
            SocketTag::DriverCameraState => 2,
            SocketTag::WideRoadCameraState => 3,
            SocketTag::RoadEncodeIdx => 4,
            SocketTag::DriverEncodeIdx => 5,
            SocketTag::WideRoadEncodeIdx => 6,
            SocketTag::CarControl => 7,
            SocketTag::ControlsState => 8,
            SocketTag::Can => 9,
            SocketTag::Other(v) => *v,
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            SocketTag::InitData => "initData",
            SocketTag::RoadCameraState => "roadCameraState",
            SocketTag::DriverCameraState => "driverCameraState",
            SocketTag::WideRoadCameraState => "wideRoadCameraState",
            SocketTag::RoadEncodeIdx => "roadEncodeIdx",
            SocketTag::DriverEncodeIdx => "driverEncodeIdx",
            SocketTag::WideRoadEncodeIdx => "wideRoadEncodeIdx",
            SocketTag::CarControl => "carControl",
            SocketTag::ControlsState => "controlsState",
            SocketTag::Can => "can",
            SocketTag::Other(_) => "other",
        }
    }

    #[must_use]
    pub fn camera_type(&self) -> Option<CameraType> {
        match self {
            SocketTag::RoadCameraState | SocketTag::RoadEncodeIdx => Some(CameraType::Road),
            SocketTag::DriverCameraState | SocketTag::DriverEncodeIdx => Some(CameraType::Driver),
            SocketTag::WideRoadCameraState | SocketTag::WideRoadEncodeIdx => {
                Some(CameraType::WideRoad)
            }
            _ => None,
        }
    }

    /// Parses a tag by its wire name, for `ALLOW`/`BLOCK` env var parsing.
    /// Unrecognized names are not representable by `Other` (that variant
    /// carries a discriminant, not a name), so this returns `None` for them.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "initData" => SocketTag::InitData,
            "roadCameraState" => SocketTag::RoadCameraState,
            "driverCameraState" => SocketTag::DriverCameraState,
            "wideRoadCameraState" => SocketTag::WideRoadCameraState,
            "roadEncodeIdx" => SocketTag::RoadEncodeIdx,
            "driverEncodeIdx" => SocketTag::DriverEncodeIdx,
            "wideRoadEncodeIdx" => SocketTag::WideRoadEncodeIdx,
            "carControl" => SocketTag::CarControl,
            "controlsState" => SocketTag::ControlsState,
            "can" => SocketTag::Can,
            _ => return None,
        })
    }

    #[must_use]
    pub fn is_encode_idx(&self) -> bool {
        matches!(
            self,
            SocketTag::RoadEncodeIdx | SocketTag::DriverEncodeIdx | SocketTag::WideRoadEncodeIdx
        )
    }
}

/// One encode-index record: links a logical `frame_id` to a position in the
/// segment's encoded video file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncodeIdx {
    pub frame_id: u32,
    pub segment_num: u32,
    pub segment_id: SegmentId,
    pub timestamp_sof: u64,
    pub timestamp_eof: u64,
    /// Physical position within the video file (keyframe-relative decode id).
    pub frame_encode_id: u32,
}

/// One parsed record from a decompressed log buffer.
///
/// `bytes` is a zero-copy slice into the buffer owned by the segment that
/// produced it (via `bytes::Bytes`'s shared refcounted storage) -- the
/// segment's buffer stays alive for as long as any `Event` still borrows
/// from it, which is exactly the lifetime spec.md's data model requires.
#[derive(Clone, Debug)]
pub struct Event {
    pub which: SocketTag,
    pub mono_time: MonoTime,
    pub bytes: Bytes,
    pub encode_idx: Option<EncodeIdx>,
}

impl Event {
    #[must_use]
    pub fn new(which: SocketTag, mono_time: MonoTime, bytes: Bytes) -> Self {
        Self {
            which,
            mono_time,
            bytes,
            encode_idx: None,
        }
    }

    #[must_use]
    pub fn frame_id(&self) -> Option<u32> {
        self.encode_idx.as_ref().map(|e| e.frame_id)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use test_case::test_case;

    #[test_case("dongle|route", Ok(("dongle", "route")); "ok")]
    #[test_case("route", Err(ParseRouteIdError::MissingSeparator("route".to_owned())); "no_sep")]
    #[test_case("|route", Err(ParseRouteIdError::EmptyDongle("|route".to_owned())); "empty_dongle")]
    #[test_case("dongle|", Err(ParseRouteIdError::EmptyRoute("dongle|".to_owned())); "empty_route")]
    fn route_id_parse(input: &str, want: Result<(&str, &str), ParseRouteIdError>) {
        let got = RouteId::from_str(input);
        match want {
            Ok((dongle, route)) => {
                let got = got.expect("should parse");
                assert_eq!(got.dongle_id(), dongle);
                assert_eq!(got.route_name(), route);
            }
            Err(e) => assert_eq!(got.expect_err("should fail"), e),
        }
    }

    #[test]
    fn socket_tag_discriminant_stable() {
        assert_eq!(SocketTag::RoadCameraState.discriminant(), 1);
        assert_eq!(SocketTag::RoadEncodeIdx.discriminant(), 4);
        assert!(SocketTag::RoadEncodeIdx.is_encode_idx());
        assert!(!SocketTag::RoadCameraState.is_encode_idx());
    }
}

// SPDX-License-Identifier: GPL-2.0-or-later

use std::fmt;

/// The error taxonomy from spec.md §7. Concrete fallible operations each
/// define their own `thiserror` enum (one per crate, per operation); this
/// classification exists only so logs and progress signals can tag *which*
/// kind of failure occurred without every crate depending on every other
/// crate's error type.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    NetworkError,
    IOError,
    CorruptLog,
    PartialDecode,
    SegmentLoadFailed,
    RouteNotFound,
    VideoDecodeError,
    Cancelled,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::NetworkError => "network error",
            ErrorKind::IOError => "io error",
            ErrorKind::CorruptLog => "corrupt log",
            ErrorKind::PartialDecode => "partial decode",
            ErrorKind::SegmentLoadFailed => "segment load failed",
            ErrorKind::RouteNotFound => "route not found",
            ErrorKind::VideoDecodeError => "video decode error",
            ErrorKind::Cancelled => "cancelled",
        };
        write!(f, "{s}")
    }
}

/// Implemented by every crate's concrete error enum so the controller and
/// logger can classify a failure without matching on its variants.
pub trait Classify {
    fn kind(&self) -> ErrorKind;
}

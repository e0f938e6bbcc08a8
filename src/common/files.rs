//! `SegmentFiles`: the per-segment URL bundle resolved by Route and consumed
//! by Segment, per spec §3's data model.

/// The up to six URLs (or local paths) that make up one segment's on-disk
/// or remote files. `log`/`cam` substitution (falling back to `qlog`/`qcam`
/// when the full-resolution file is absent) is a per-route decision made by
/// `replay-route`, not stored here.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SegmentFiles {
    pub log: Option<String>,
    pub qlog: Option<String>,
    pub cam: Option<String>,
    pub dcam: Option<String>,
    pub ecam: Option<String>,
    pub qcam: Option<String>,
}

impl SegmentFiles {
    /// Returns the log URL to use, substituting `qlog` when `log` is absent
    /// and `prefer_qlog` is false, or when `prefer_qlog` forces it.
    #[must_use]
    pub fn resolved_log(&self, prefer_qlog: bool) -> Option<&str> {
        if prefer_qlog {
            self.qlog.as_deref().or(self.log.as_deref())
        } else {
            self.log.as_deref().or(self.qlog.as_deref())
        }
    }

    /// Returns the road-camera URL to use, substituting `qcam` when `cam`
    /// is absent or when `prefer_qcam` (the `QCAMERA` flag) is set.
    #[must_use]
    pub fn resolved_cam(&self, prefer_qcam: bool) -> Option<&str> {
        if prefer_qcam {
            self.qcam.as_deref().or(self.cam.as_deref())
        } else {
            self.cam.as_deref().or(self.qcam.as_deref())
        }
    }
}

/// Which camera streams a session wants loaded, derived from `ReplayFlags`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RequestedCameras {
    pub road: bool,
    pub driver: bool,
    pub wide: bool,
    pub prefer_qcam: bool,
}

impl RequestedCameras {
    #[must_use]
    pub fn road_only() -> Self {
        Self {
            road: true,
            driver: false,
            wide: false,
            prefer_qcam: false,
        }
    }
}

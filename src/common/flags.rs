// SPDX-License-Identifier: GPL-2.0-or-later

/// Bitmask flags for the replay binary, named after the original
/// `REPLAY_FLAGS` enum. `SEND_YUV` and `NO_CUDA` from the original are
/// dropped: this core has no GPU pixel path to steer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ReplayFlags(u32);

impl ReplayFlags {
    pub const NONE: ReplayFlags = ReplayFlags(0x0000);
    pub const DCAM: ReplayFlags = ReplayFlags(0x0002);
    pub const ECAM: ReplayFlags = ReplayFlags(0x0004);
    pub const NO_LOOP: ReplayFlags = ReplayFlags(0x0010);
    pub const NO_FILE_CACHE: ReplayFlags = ReplayFlags(0x0020);
    pub const QCAMERA: ReplayFlags = ReplayFlags(0x0040);
    pub const FULL_SPEED: ReplayFlags = ReplayFlags(0x0200);
    pub const NO_VIPC: ReplayFlags = ReplayFlags(0x0400);

    #[must_use]
    pub fn contains(&self, flag: ReplayFlags) -> bool {
        self.0 & flag.0 == flag.0
    }

    #[must_use]
    pub fn with(self, flag: ReplayFlags) -> Self {
        Self(self.0 | flag.0)
    }
}

impl std::ops::BitOr for ReplayFlags {
    type Output = ReplayFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        self.with(rhs)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn combine_and_query() {
        let flags = ReplayFlags::DCAM | ReplayFlags::FULL_SPEED;
        assert!(flags.contains(ReplayFlags::DCAM));
        assert!(flags.contains(ReplayFlags::FULL_SPEED));
        assert!(!flags.contains(ReplayFlags::ECAM));
    }
}

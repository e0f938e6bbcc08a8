// SPDX-License-Identifier: GPL-2.0-or-later

//! Command-line surface for the replay binary (spec.md §6 "CLI"). Mirrors
//! `sentryshot/main.rs`'s `clap::Parser` idiom: a flat struct of flags
//! translated into the in-process types (`ReplayFlags`, `RequestedCameras`)
//! rather than hand-rolled `std::env` parsing.

use clap::Parser;
use common::ReplayFlags;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(version, about = "Replay a recorded driving route", long_about = None)]
pub struct Args {
    /// Route identifier, `DONGLE|ROUTE_ID`.
    pub route: String,

    /// Start playback this many seconds into the route.
    #[arg(long, default_value_t = 0.0)]
    pub start: f64,

    /// Playback speed multiplier.
    #[arg(long, default_value_t = 1.0)]
    pub speed: f64,

    /// Include the driver camera.
    #[arg(long)]
    pub dcam: bool,

    /// Include the wide road camera.
    #[arg(long)]
    pub ecam: bool,

    /// Stop at the end of the route instead of looping back to the start.
    #[arg(long)]
    pub no_loop: bool,

    /// Don't write fetched segment files to the on-disk cache.
    #[arg(long)]
    pub no_file_cache: bool,

    /// Use the low-resolution road camera even when the full one is available.
    #[arg(long)]
    pub qcamera: bool,

    /// Ignore pacing; publish events as fast as they can be produced.
    #[arg(long)]
    pub full_speed: bool,

    /// Don't decode or publish video frames.
    #[arg(long)]
    pub no_vipc: bool,

    /// Override the on-disk segment cache directory (defaults under `LOG_ROOT`).
    #[arg(long)]
    pub cache_dir: Option<PathBuf>,
}

impl Args {
    #[must_use]
    pub fn replay_flags(&self) -> ReplayFlags {
        let mut flags = ReplayFlags::NONE;
        if self.dcam {
            flags = flags | ReplayFlags::DCAM;
        }
        if self.ecam {
            flags = flags | ReplayFlags::ECAM;
        }
        if self.no_loop {
            flags = flags | ReplayFlags::NO_LOOP;
        }
        if self.no_file_cache {
            flags = flags | ReplayFlags::NO_FILE_CACHE;
        }
        if self.qcamera {
            flags = flags | ReplayFlags::QCAMERA;
        }
        if self.full_speed {
            flags = flags | ReplayFlags::FULL_SPEED;
        }
        if self.no_vipc {
            flags = flags | ReplayFlags::NO_VIPC;
        }
        flags
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn flags_translate_to_bitmask() {
        let args = Args {
            route: "dongle|route".to_owned(),
            start: 0.0,
            speed: 1.0,
            dcam: true,
            ecam: false,
            no_loop: true,
            no_file_cache: false,
            qcamera: false,
            full_speed: false,
            no_vipc: false,
            cache_dir: None,
        };
        let flags = args.replay_flags();
        assert!(flags.contains(ReplayFlags::DCAM));
        assert!(flags.contains(ReplayFlags::NO_LOOP));
        assert!(!flags.contains(ReplayFlags::ECAM));
    }
}

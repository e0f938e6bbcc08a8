// SPDX-License-Identifier: GPL-2.0-or-later

//! C9 ReplayClock: soft-real-time pacing, translating log-mono-time
//! progression into wall-clock sleeps. Grounded on `common::time`'s
//! `MonoTime`/`LogDuration` newtypes, generalized here to the wall-clock
//! vs. log-mono-time relationship spec §4.9 describes.

use common::time::MonoTime;
use std::sync::Mutex;
use std::time::{Duration, Instant};

const MAX_SLEEP: Duration = Duration::from_secs(1);

struct ClockState {
    loop_start_wall: Instant,
    loop_start_mono: MonoTime,
    speed: f64,
    paused: bool,
}

/// Paces event delivery to real time. One uninterrupted run holds
/// `loop_start_wall`/`loop_start_mono` fixed; seek, pause/unpause, and
/// speed changes each re-establish that pair per spec §4.9 (including the
/// "always re-establish on re-seek" contract the source sometimes skips —
/// this implementation always rebases).
pub struct ReplayClock {
    state: Mutex<ClockState>,
    resume: tokio::sync::Notify,
}

impl ReplayClock {
    #[must_use]
    pub fn new(start_mono: MonoTime, speed: f64) -> Self {
        Self {
            state: Mutex::new(ClockState {
                loop_start_wall: Instant::now(),
                loop_start_mono: start_mono,
                speed: normalize_speed(speed),
                paused: false,
            }),
            resume: tokio::sync::Notify::new(),
        }
    }

    /// Re-establishes the pacing origin at `mono`, keeping the current
    /// speed. Used on seek.
    pub fn rebase(&self, mono: MonoTime) {
        let mut s = self.state.lock().expect("clock mutex poisoned");
        s.loop_start_wall = Instant::now();
        s.loop_start_mono = mono;
    }

    /// Changes playback speed, rebased so `current_mono`'s wall-clock
    /// target is preserved (no jump at the moment of the change).
    pub fn set_speed(&self, speed: f64, current_mono: MonoTime) {
        let mut s = self.state.lock().expect("clock mutex poisoned");
        s.speed = normalize_speed(speed);
        s.loop_start_wall = Instant::now();
        s.loop_start_mono = current_mono;
    }

    #[must_use]
    pub fn speed(&self) -> f64 {
        self.state.lock().expect("clock mutex poisoned").speed
    }

    pub fn pause(&self) {
        self.state.lock().expect("clock mutex poisoned").paused = true;
    }

    /// Resumes from pause, rebasing so no wall-clock jump occurs in the
    /// log (spec §4.9: "on unpause, `loop_start_wall` is rebased").
    pub fn unpause(&self, current_mono: MonoTime) {
        let mut s = self.state.lock().expect("clock mutex poisoned");
        s.paused = false;
        s.loop_start_wall = Instant::now();
        s.loop_start_mono = current_mono;
        drop(s);
        self.resume.notify_waiters();
    }

    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.state.lock().expect("clock mutex poisoned").paused
    }

    /// How long to sleep before `ev_mono` should be delivered, clamped to
    /// `[0, 1s]`. `None` means the target is more than a second out (a
    /// discontinuity after a gap) and the caller should not sleep at all.
    #[must_use]
    pub fn sleep_duration(&self, ev_mono: MonoTime) -> Option<Duration> {
        let s = self.state.lock().expect("clock mutex poisoned");
        let target_wall = match ev_mono.checked_sub(s.loop_start_mono) {
            Some(delta) => {
                #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
                let scaled_nanos = (delta.as_secs_f64() / s.speed * 1e9) as u64;
                s.loop_start_wall + Duration::from_nanos(scaled_nanos)
            }
            None => s.loop_start_wall,
        };
        let now = Instant::now();
        if target_wall <= now {
            return Some(Duration::ZERO);
        }
        let gap = target_wall - now;
        if gap >= MAX_SLEEP {
            None
        } else {
            Some(gap)
        }
    }

    /// Blocks the stream loop until paused playback resumes, then paces
    /// delivery of `ev_mono` by sleeping the real-time gap computed by
    /// [`Self::sleep_duration`].
    pub async fn pace(&self, ev_mono: MonoTime) {
        while self.is_paused() {
            self.resume.notified().await;
        }
        if let Some(d) = self.sleep_duration(ev_mono) {
            if !d.is_zero() {
                tokio::time::sleep(d).await;
            }
        }
    }
}

fn normalize_speed(speed: f64) -> f64 {
    if speed.is_finite() && speed > 0.0 {
        speed
    } else {
        1.0
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn sleep_duration_is_zero_once_target_passed() {
        let clock = ReplayClock::new(MonoTime::ZERO, 1.0);
        assert_eq!(clock.sleep_duration(MonoTime::ZERO), Some(Duration::ZERO));
    }

    #[test]
    fn sleep_duration_clamps_large_gaps_to_none() {
        let clock = ReplayClock::new(MonoTime::ZERO, 1.0);
        let far_future = MonoTime::from_nanos(5 * 1_000_000_000);
        assert_eq!(clock.sleep_duration(far_future), None);
    }

    #[test]
    fn set_speed_rebases_origin() {
        let clock = ReplayClock::new(MonoTime::ZERO, 1.0);
        clock.set_speed(2.0, MonoTime::from_nanos(500_000_000));
        assert_eq!(clock.speed(), 2.0);
        // Right after rebasing, the current event's target is "now".
        assert_eq!(
            clock.sleep_duration(MonoTime::from_nanos(500_000_000)),
            Some(Duration::ZERO)
        );
    }

    #[test]
    fn invalid_speed_normalizes_to_one() {
        let clock = ReplayClock::new(MonoTime::ZERO, -3.0);
        assert_eq!(clock.speed(), 1.0);
    }
}

// SPDX-License-Identifier: GPL-2.0-or-later

//! `seekToFlag`: scans the merged view for the next engagement transition
//! in a `controlsState` event, per spec §4.10. Since this engine defines
//! its own wire encoding (not capnp), a `controlsState` event's payload is
//! simply its engaged flag as a single byte (0/1).

use common::{Event, SocketTag};

/// Which transition `seekToFlag` searches for.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EngagementFlag {
    /// Next disengaged -> engaged transition.
    NextEngaged,
    /// Next engaged -> disengaged transition.
    NextDisengaged,
}

fn engaged(event: &Event) -> Option<bool> {
    if event.which != SocketTag::ControlsState {
        return None;
    }
    event.bytes.first().map(|b| *b != 0)
}

/// Finds the `mono_time` (in nanoseconds) of the next transition matching
/// `flag`'s direction strictly after `from_ns`, tracking the most recent
/// engaged state seen at or before `from_ns` as the transition's baseline.
#[must_use]
pub fn next_transition(events: &[Event], from_ns: u64, flag: EngagementFlag) -> Option<u64> {
    let start = events.partition_point(|e| e.mono_time.as_nanos() <= from_ns);

    let mut prev = events[..start]
        .iter()
        .rev()
        .find_map(engaged);

    for event in &events[start..] {
        let Some(cur) = engaged(event) else { continue };
        if let Some(prev_state) = prev {
            let wants = match flag {
                EngagementFlag::NextEngaged => !prev_state && cur,
                EngagementFlag::NextDisengaged => prev_state && !cur,
            };
            if wants {
                return Some(event.mono_time.as_nanos());
            }
        }
        prev = Some(cur);
    }
    None
}

#[cfg(test)]
mod test {
    use super::*;
    use bytes::Bytes;
    use common::time::MonoTime;

    fn controls_event(ns: u64, engaged: bool) -> Event {
        Event::new(
            SocketTag::ControlsState,
            MonoTime::from_nanos(ns),
            Bytes::from(vec![u8::from(engaged)]),
        )
    }

    #[test]
    fn finds_next_disengage_transition() {
        let events = vec![
            controls_event(10, true),
            controls_event(20, true),
            controls_event(30, false),
            controls_event(40, false),
        ];
        assert_eq!(
            next_transition(&events, 5, EngagementFlag::NextDisengaged),
            Some(30)
        );
    }

    #[test]
    fn skips_wrong_direction_transition() {
        let events = vec![
            controls_event(10, true),
            controls_event(20, true),
            controls_event(30, false),
            controls_event(40, true),
        ];
        // Next disengaged->engaged transition is at 40, not the 30 disengage.
        assert_eq!(
            next_transition(&events, 5, EngagementFlag::NextEngaged),
            Some(40)
        );
    }

    #[test]
    fn no_transition_returns_none() {
        let events = vec![controls_event(10, true), controls_event(20, true)];
        assert_eq!(
            next_transition(&events, 5, EngagementFlag::NextDisengaged),
            None
        );
    }
}

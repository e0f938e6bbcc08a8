// SPDX-License-Identifier: GPL-2.0-or-later

//! `ALLOW`/`BLOCK` subscription filtering, precomputed into a discriminant
//! set once at startup per spec §9's dynamic-tag-dispatch redesign note
//! (compare integers in the hot loop rather than reflecting on names).

use common::SocketTag;
use std::collections::HashSet;

/// Which event tags the stream loop publishes. `allow` is `None` when no
/// `ALLOW` list was given, meaning every tag is a candidate; `block`
/// subtracts from whatever `allow` permits.
#[derive(Clone, Debug, Default)]
pub struct SubscriptionFilter {
    allow: Option<HashSet<u16>>,
    block: HashSet<u16>,
}

impl SubscriptionFilter {
    #[must_use]
    pub fn allow_all() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn new(allow: impl IntoIterator<Item = SocketTag>, block: impl IntoIterator<Item = SocketTag>) -> Self {
        let allow: HashSet<u16> = allow.into_iter().map(|t| t.discriminant()).collect();
        Self {
            allow: if allow.is_empty() { None } else { Some(allow) },
            block: block.into_iter().map(|t| t.discriminant()).collect(),
        }
    }

    #[must_use]
    pub fn allows(&self, tag: &SocketTag) -> bool {
        let d = tag.discriminant();
        if self.block.contains(&d) {
            return false;
        }
        match &self.allow {
            Some(allow) => allow.contains(&d),
            None => true,
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_allow_list_permits_everything_except_blocked() {
        let filter = SubscriptionFilter::new([], [SocketTag::Can]);
        assert!(filter.allows(&SocketTag::ControlsState));
        assert!(!filter.allows(&SocketTag::Can));
    }

    #[test]
    fn non_empty_allow_list_restricts_to_named_tags() {
        let filter = SubscriptionFilter::new([SocketTag::Can], []);
        assert!(filter.allows(&SocketTag::Can));
        assert!(!filter.allows(&SocketTag::ControlsState));
    }
}

// SPDX-License-Identifier: GPL-2.0-or-later

//! Reads the `ALLOW`/`BLOCK` environment variables into a
//! `SubscriptionFilter`, per spec.md §6: "`ALLOW=tag1,tag2,…` (subscribed
//! tags; empty = all), `BLOCK=…` (subtract set)". `LOG_ROOT` and `HOME`
//! are read directly by `replay-route`'s `RouteConfig::default`, not here.

use common::{ArcLogger, LogEntry, LogLevel, SocketTag};
use controller::SubscriptionFilter;

#[must_use]
pub fn filter_from_env(logger: Option<&ArcLogger>) -> SubscriptionFilter {
    let allow = parse_tag_list("ALLOW", logger);
    let block = parse_tag_list("BLOCK", logger);
    SubscriptionFilter::new(allow, block)
}

fn parse_tag_list(var: &str, logger: Option<&ArcLogger>) -> Vec<SocketTag> {
    let Ok(raw) = std::env::var(var) else {
        return Vec::new();
    };
    let mut tags = Vec::new();
    for name in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match SocketTag::from_name(name) {
            Some(tag) => tags.push(tag),
            None => {
                if let Some(logger) = logger {
                    logger.log(LogEntry::new(
                        LogLevel::Warning,
                        "cli",
                        None,
                        format!("{var}: unrecognized tag '{name}'"),
                    ));
                }
            }
        }
    }
    tags
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn empty_env_permits_everything() {
        std::env::remove_var("ALLOW");
        std::env::remove_var("BLOCK");
        let filter = filter_from_env(None);
        assert!(filter.allows(&SocketTag::Can));
    }
}

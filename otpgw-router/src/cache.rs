//! The sorted, lock-swappable route cache (spec §4.C).

use otpgw_core::{CallerIdRoute, CATCH_ALL_PREFIX};

/// Routes for one channel, pre-sorted so lookup is a linear scan: longest
/// prefix first, `*` always last regardless of its original position.
#[derive(Debug, Clone, Default)]
pub struct RouteTable {
    routes: Vec<CallerIdRoute>,
}

impl RouteTable {
    #[must_use]
    pub fn new(mut routes: Vec<CallerIdRoute>) -> Self {
        routes.retain(|r| r.enabled);
        routes.sort_by(|a, b| match (a.is_catch_all(), b.is_catch_all()) {
            (true, true) => std::cmp::Ordering::Equal,
            (true, false) => std::cmp::Ordering::Greater,
            (false, true) => std::cmp::Ordering::Less,
            (false, false) => b.prefix.len().cmp(&a.prefix.len()),
        });
        Self { routes }
    }

    /// Longest-prefix lookup. `destination` should already be normalized
    /// (leading `+` stripped) by the caller.
    #[must_use]
    pub fn lookup(&self, destination: &str) -> Option<&str> {
        for route in &self.routes {
            if route.is_catch_all() || destination.starts_with(route.prefix.as_str()) {
                return Some(route.caller_id.as_str());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use otpgw_core::Channel;

    fn route(prefix: &str, caller_id: &str) -> CallerIdRoute {
        CallerIdRoute {
            channel: Channel::Sms,
            prefix: prefix.to_owned(),
            caller_id: caller_id.to_owned(),
            enabled: true,
        }
    }

    #[test]
    fn longest_prefix_wins() {
        let table = RouteTable::new(vec![route("1", "+1generic"), route("1415", "+1415local"), route("*", "+1fallback")]);
        assert_eq!(table.lookup("14155551234"), Some("+1415local"));
    }

    #[test]
    fn catch_all_is_last_resort_regardless_of_insertion_order() {
        let table = RouteTable::new(vec![route("*", "+1fallback"), route("44", "+44local")]);
        assert_eq!(table.lookup("14155551234"), Some("+1fallback"));
        assert_eq!(table.lookup("447911123456"), Some("+44local"));
    }

    #[test]
    fn no_match_and_no_catch_all_returns_none() {
        let table = RouteTable::new(vec![route("44", "+44local")]);
        assert!(table.lookup("14155551234").is_none());
    }

    #[test]
    fn disabled_routes_are_excluded() {
        let mut disabled = route("1415", "+1415local");
        disabled.enabled = false;
        let table = RouteTable::new(vec![disabled, route("*", "+1fallback")]);
        assert_eq!(table.lookup("14155551234"), Some("+1fallback"));
    }
}

//! Lock-free host-header routing table.
//!
//! Grounded in the `ArcSwap`-based snapshot routing table pattern (`DefaultRouter` in
//! `spark-router`): readers take one atomic load and never block; writers build a
//! fresh table off to the side and install it with a single atomic store.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::error::RouterError;
use crate::model::{ChannelHostBinding, ChannelReference};

#[derive(Debug, Default)]
struct HostTable {
    by_host: HashMap<String, ChannelReference>,
}

/// Atomically-swappable host → channel routing table.
///
/// Rebuilds are all-or-nothing: a duplicate hostname in the input aborts the rebuild
/// and leaves the table exactly as it was (`SPEC_FULL.md` §4.2 fail-closed policy).
#[derive(Debug)]
pub struct HostRouter {
    table: ArcSwap<HostTable>,
}

impl Default for HostRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl HostRouter {
    pub fn new() -> Self {
        Self { table: ArcSwap::from_pointee(HostTable::default()) }
    }

    /// Lock-free lookup: one atomic load followed by a map get.
    pub fn channel_for_host(&self, host: &str) -> Result<ChannelReference, RouterError> {
        let snapshot = self.table.load();
        snapshot.by_host.get(host).cloned().ok_or_else(|| RouterError::HostNotFound(host.to_string()))
    }

    /// Rebuild the routing table from the full declarative set of bindings. On
    /// success the new table is installed atomically; on a duplicate hostname the
    /// previous table is left installed and an error is returned.
    pub fn rebuild(&self, bindings: &[ChannelHostBinding]) -> Result<(), RouterError> {
        let mut by_host: HashMap<String, ChannelReference> = HashMap::with_capacity(bindings.len());
        for binding in bindings {
            if let Some(existing) = by_host.get(&binding.host) {
                return Err(RouterError::DuplicateHostname {
                    host: binding.host.clone(),
                    first: existing.clone(),
                    second: binding.channel.clone(),
                });
            }
            by_host.insert(binding.host.clone(), binding.channel.clone());
        }
        self.table.store(Arc::new(HostTable { by_host }));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn binding(host: &str, ns: &str, name: &str) -> ChannelHostBinding {
        ChannelHostBinding { host: host.into(), channel: ChannelReference::new(ns, name) }
    }

    #[test]
    fn lookup_unknown_host_errors() {
        let router = HostRouter::new();
        assert!(matches!(router.channel_for_host("nope"), Err(RouterError::HostNotFound(_))));
    }

    #[test]
    fn rebuild_then_lookup_round_trips() {
        let router = HostRouter::new();
        router.rebuild(&[binding("h1.svc", "default", "c1")]).unwrap();
        let found = router.channel_for_host("h1.svc").unwrap();
        assert_eq!(found, ChannelReference::new("default", "c1"));
    }

    #[test]
    fn duplicate_hostname_rejected_and_table_unchanged() {
        let router = HostRouter::new();
        router.rebuild(&[binding("h1.svc", "default", "c1")]).unwrap();

        let err = router
            .rebuild(&[binding("h1.svc", "default", "c1"), binding("h1.svc", "default", "c2")])
            .unwrap_err();
        assert!(matches!(err, RouterError::DuplicateHostname { .. }));

        // previous table must still resolve to c1, not be partially rebuilt or cleared
        let found = router.channel_for_host("h1.svc").unwrap();
        assert_eq!(found, ChannelReference::new("default", "c1"));
    }
}

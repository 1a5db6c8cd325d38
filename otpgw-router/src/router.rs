//! The Caller-ID Router (spec §4.C): routing must add no database
//! round-trip per dispatch, and operators must be able to change routes
//! without a restart. Both are satisfied by holding one pre-sorted
//! [`RouteTable`] per channel behind a lock that only the (rare) reload
//! path writes to.

use std::sync::Arc;

use parking_lot::RwLock;

use otpgw_core::Channel;
use otpgw_store::{Store, StoreError};

use crate::cache::RouteTable;

/// Strips a leading `+` so lookups compare against the bare digit string
/// routes are authored with (spec §4.C "normalizes the destination").
#[must_use]
pub fn normalize_destination(destination: &str) -> &str {
    destination.strip_prefix('+').unwrap_or(destination)
}

pub struct CallerIdRouter {
    store: Arc<dyn Store>,
    sms: RwLock<Arc<RouteTable>>,
    voice: RwLock<Arc<RouteTable>>,
}

impl CallerIdRouter {
    /// Builds an empty router; call [`Self::reload`] once before serving
    /// traffic.
    #[must_use]
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self {
            store,
            sms: RwLock::new(Arc::new(RouteTable::default())),
            voice: RwLock::new(Arc::new(RouteTable::default())),
        }
    }

    /// Reloads both channels' tables from the store. The swap is a single
    /// pointer write per channel, so in-flight lookups never observe a
    /// half-built table.
    pub async fn reload(&self) -> Result<(), StoreError> {
        let sms_routes = self.store.list_routes(Channel::Sms).await?;
        let voice_routes = self.store.list_routes(Channel::Voice).await?;
        *self.sms.write() = Arc::new(RouteTable::new(sms_routes));
        *self.voice.write() = Arc::new(RouteTable::new(voice_routes));
        Ok(())
    }

    /// Resolve the outbound caller id for `destination` on `channel`, or
    /// `None` if nothing matches and no `*` fallback is configured.
    #[must_use]
    pub fn resolve(&self, channel: Channel, destination: &str) -> Option<String> {
        let normalized = normalize_destination(destination);
        let table = match channel {
            Channel::Sms => self.sms.read().clone(),
            Channel::Voice => self.voice.read().clone(),
        };
        table.lookup(normalized).map(str::to_owned)
    }
}

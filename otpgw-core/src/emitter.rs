//! The seam channel providers and the voice stack emit events through,
//! without depending on `otpgw-bus` directly (spec §4.E: "the single public
//! entry point for channel status changes").

use async_trait::async_trait;

use crate::event::{ChannelEventType, EventData};
use crate::types::{Channel, RequestId};

/// Implemented by `otpgw-bus::EventBus`. Providers and the voice stack hold
/// an `Arc<dyn EventEmitter>` so they can report status changes without
/// knowing how they are persisted or fanned out.
#[async_trait]
pub trait EventEmitter: Send + Sync {
    async fn emit(
        &self,
        request_id: &RequestId,
        channel: Channel,
        event_type: ChannelEventType,
        event_data: EventData,
    );
}

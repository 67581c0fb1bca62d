use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use stockhold_core::ItemId;

use crate::Event;

/// Envelope for a published event.
///
/// Wire shape: `{event_id, event_type, timestamp, item_id, payload}`.
///
/// Notes:
/// - `event_type` and `timestamp` are copied from the payload at wrap time so
///   consumers can route without decoding the payload.
/// - `event_id` is unique per envelope; redeliveries of the same envelope keep it,
///   which lets consumers deduplicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope<E> {
    event_id: Uuid,
    event_type: String,
    timestamp: DateTime<Utc>,
    item_id: ItemId,
    payload: E,
}

impl<E: Event> EventEnvelope<E> {
    /// Wrap an event concerning `item_id` with a fresh envelope id.
    pub fn wrap(item_id: ItemId, payload: E) -> Self {
        Self::new(Uuid::now_v7(), item_id, payload)
    }

    pub fn new(event_id: Uuid, item_id: ItemId, payload: E) -> Self {
        Self {
            event_id,
            event_type: payload.event_type().to_string(),
            timestamp: payload.occurred_at(),
            item_id,
            payload,
        }
    }
}

impl<E> EventEnvelope<E> {
    pub fn event_id(&self) -> Uuid {
        self.event_id
    }

    pub fn event_type(&self) -> &str {
        &self.event_type
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn item_id(&self) -> &ItemId {
        &self.item_id
    }

    pub fn payload(&self) -> &E {
        &self.payload
    }

    pub fn into_payload(self) -> E {
        self.payload
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
    struct Ping {
        at: DateTime<Utc>,
    }

    impl Event for Ping {
        fn event_type(&self) -> &'static str {
            "ping"
        }

        fn version(&self) -> u32 {
            1
        }

        fn occurred_at(&self) -> DateTime<Utc> {
            self.at
        }
    }

    #[test]
    fn wrap_copies_type_and_timestamp_from_payload() {
        let at = Utc::now();
        let env = EventEnvelope::wrap(ItemId::new("SKU-1"), Ping { at });

        assert_eq!(env.event_type(), "ping");
        assert_eq!(env.timestamp(), at);
        assert_eq!(env.item_id().as_str(), "SKU-1");
        assert_eq!(env.payload(), &Ping { at });
    }
}

//! Store record types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A pending reminder as persisted in the store.
///
/// The store copy is the durability backstop for reboot recovery; the
/// primary delivery path carries the payload with the wake registration
/// itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderRecord {
    /// Caller-assigned id, unique within the store.
    pub id: i64,
    /// Absolute instant at which the reminder should fire.
    pub fire_at: DateTime<Utc>,
    /// Opaque payload handed back to the consumer on delivery.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

impl ReminderRecord {
    /// Create a new record.
    pub fn new(id: i64, fire_at: DateTime<Utc>, payload: Option<String>) -> Self {
        Self {
            id,
            fire_at,
            payload,
        }
    }

    /// Check whether this record's fire time is still in the future.
    pub fn is_future(&self, now: DateTime<Utc>) -> bool {
        self.fire_at > now
    }
}

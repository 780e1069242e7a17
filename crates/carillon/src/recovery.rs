//! Boot-time recovery pass.
//!
//! Wake registrations do not survive a reboot; the record store does.
//! Once per boot, re-arm every record whose fire time is still ahead.
//! Past-due records are skipped, not fired and not removed: they stay
//! stale and harmless until the next explicit cancel or overwrite for
//! their id. No notification is posted here.

use chrono::Utc;
use tracing::{info, warn};

use carillon_scheduler::WakeScheduler;
use carillon_store::ReminderStore;

/// Run the recovery pass. Returns the number of re-armed reminders.
///
/// A store that cannot be read yet (locked boot) lists as empty, which
/// makes this pass a no-op.
pub fn run(store: &ReminderStore, scheduler: &WakeScheduler) -> usize {
    let now = Utc::now();
    let mut rearmed = 0;

    for record in store.list() {
        if record.is_future(now) {
            match scheduler.schedule_exact(record.id, record.fire_at, record.payload) {
                Ok(_) => rearmed += 1,
                Err(e) => warn!(id = record.id, error = %e, "failed re-arming reminder"),
            }
        } else {
            info!(id = record.id, fire_at = %record.fire_at, "skipping past-due reminder");
        }
    }

    info!(rearmed, "recovery pass complete");
    rearmed
}

//! Exact-time wake scheduler for Carillon.
//!
//! This crate registers one-shot wake callbacks keyed by reminder id:
//! - Re-registering an id replaces the existing registration
//! - The payload travels with the wake, so delivery needs no store
//!   lookup at fire time
//! - The underlying timer primitive is capability-negotiated, falling
//!   back to best-effort windowed scheduling where exact wakes are not
//!   permitted

mod capability;
mod error;
mod scheduler;

pub use capability::{TimerCapabilities, TimerPrimitive};
pub use error::SchedulerError;
pub use scheduler::{WakeFire, WakeScheduler};

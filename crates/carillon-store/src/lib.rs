//! Durable reminder record store for Carillon.
//!
//! This crate provides the persistence backstop for scheduled reminders:
//! - Records survive process death and device reboots
//! - Every mutation is a full read-modify-write of the record set
//! - A single `last_unseen` slot holds the most recent escalated payload
//!   as a cold-start fallback for the consumer application

mod error;
mod store;
mod types;

pub use error::StoreError;
pub use store::ReminderStore;
pub use types::ReminderRecord;

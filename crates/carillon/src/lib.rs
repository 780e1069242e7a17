//! Carillon: escalating reminder delivery.
//!
//! The pipeline runs in stages: the wake scheduler fires at the exact
//! reminder time, the delivery handler consumes the durable record and
//! posts two notification surfaces, the escalation session grabs the
//! user's attention, and the handoff queue carries the payload to the
//! consumer application. `daemon` wires the stages together behind a
//! single event loop.

pub mod commands;
pub mod daemon;
pub mod delivery;
pub mod escalate;
pub mod handoff;
pub mod notify;
pub mod payload;
pub mod recovery;
pub mod service;

//! # FoodBridge Worker Library
//!
//! Background maintenance for the donation store: expiring donations whose
//! food has gone past its date and keeping urgency levels current.
//!
//! ## Modules
//!
//! - `sweep`: the `Sweep` trait and the built-in sweeps
//! - `sweeper`: the interval loop that runs them until shutdown

pub mod sweep;
pub mod sweeper;

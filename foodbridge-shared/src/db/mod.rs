/// Database layer: connection pool and embedded migrations
///
/// Models live in the crate-level `models` module.

pub mod migrations;
pub mod pool;

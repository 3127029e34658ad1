//! Persistence module: subscription store and dedup ledger.
//!
//! This module is split into two submodules:
//! - `model`: typed entities returned by repositories.
//! - `repo`: SQL-only functions that map rows into entities.
//!
//! External modules should import from `drive_relay::db` — we re-export the
//! repository API and the subscription model for convenience.

pub mod model;
pub mod repo;

pub use model::Subscription;
pub use repo::*;

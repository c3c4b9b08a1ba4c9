//! SQLite backend for the Lineage genealogy store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on dedicated
//! connection threads without blocking the async runtime. One store instance
//! implements every trait in [`lineage_core::store`]: the event log, the
//! synchronous projection engine, the read model and snapshots.

mod encode;
mod events;
mod projection;
mod read_model;
mod schema;
mod snapshots;
mod store;
mod tables;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;

#[cfg(test)]
mod tests;

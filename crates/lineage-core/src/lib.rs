//! Core types and trait definitions for the Lineage genealogy store.
//!
//! No HTTP or database dependencies live here. Every other crate depends on
//! this one.

// Backends implement the `impl Future` trait methods with `async fn`.
#![allow(async_fn_in_trait)]

pub mod aggregate;
pub mod codec;
pub mod date;
pub mod error;
pub mod event;
pub mod model;
pub mod pedigree;
pub mod search;
pub mod similarity;
pub mod snapshot;
pub mod store;

pub use error::{DomainError, Error, Result};

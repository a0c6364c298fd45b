//! Database layer for data persistence and access.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │ Handlers / Pipeline  │
//! └──────────┬───────────┘
//!            │  Arc<dyn Datastore>
//!            ↓
//! ┌──────────────────────┐      ┌───────────────────┐
//! │    PgDatastore       │      │ InMemoryDatastore │
//! └──────────┬───────────┘      └───────────────────┘
//!            ↓
//! ┌──────────────────────┐
//! │ Repositories         │  (db::handlers, one per table)
//! └──────────┬───────────┘
//!            ↓
//! ┌──────────────────────┐
//! │     PostgreSQL       │
//! └──────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`handlers`]: Repository implementations over a `PgConnection`
//! - [`models`]: Database record structures matching table schemas
//! - [`store`]: The [`store::Datastore`] trait and its PostgreSQL implementation
//! - [`memory`]: In-process implementation
//! - [`errors`]: Database-specific error types

pub mod errors;
pub mod handlers;
pub mod memory;
pub mod models;
pub mod store;

pub use memory::InMemoryDatastore;
pub use store::{Datastore, PgDatastore};

//! Persistence boundary for the checkout system.
//!
//! [`Store`] exposes reads and collaborator upserts, and opens [`StoreTx`]
//! units for every multi-row change (stock reservation, order insert/update,
//! cart clearing, webhook bookkeeping). Two implementations are provided:
//! [`InMemoryStore`] for tests and local runs, and [`PostgresStore`].

pub mod error;
pub mod memory;
pub mod postgres;
pub mod query;
pub mod store;

pub use error::{Result, StoreError};
pub use memory::InMemoryStore;
pub use postgres::PostgresStore;
pub use query::OrderFilter;
pub use store::{Store, StoreTx};

//! gitsync row store.
//!
//! This crate defines the storage contract the reconciliation engine runs
//! against:
//! - planning reads (`StoreReader`): self-identity lookups, active-row scans,
//!   current role grants and child rows
//! - writes inside one transaction (`StoreTransaction`), applied in order
//!
//! Design stance:
//! - Postgres is the source of truth; every reference to a top-level id is
//!   declared `ON UPDATE CASCADE` so natural-key matches can reassign ids.
//! - The in-memory adapter enforces the same constraints (foreign keys,
//!   one active row per natural key) so ordering bugs surface in tests.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod error;
pub mod memory;
mod model;
#[cfg(feature = "postgres")]
pub mod postgres;
mod traits;

pub use error::{StorageError, StorageResult};
pub use memory::{InMemoryStore, JournalEntry};
pub use model::{field_uuid, uuid_value, ChildRow, EntityRow, NaturalKey, CHILD_TABLE_MAPPINGS};
pub use traits::{Store, StoreReader, StoreTransaction};

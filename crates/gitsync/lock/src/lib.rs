//! gitsync sync lock.
//!
//! One reconciliation pass per workspace at a time. A pass acquires a lease
//! before planning and releases it on every exit path; a second caller sees
//! the current holder and backs off. The TTL only exists to recover from a
//! holder that crashed without releasing.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]
#![warn(rust_2018_idioms)]

mod error;
mod memory;
#[cfg(feature = "postgres")]
mod postgres;
mod traits;

pub use error::{LockError, LockResult};
pub use memory::InMemorySyncLock;
#[cfg(feature = "postgres")]
pub use postgres::PostgresSyncLock;
pub use traits::{Acquisition, LockHolder, LockToken, SyncLock};

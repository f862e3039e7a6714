//! gitsync Engine - manifest reconciliation
//!
//! Takes a parsed [`Manifest`](gitsync_types::Manifest) and the current
//! store and produces an idempotent, dependency-ordered set of writes:
//!
//! - **Resolvers**: per-kind identity resolution (by id, then by natural
//!   key, then create), role grants and child rows
//! - **Operations**: plain-data writes that can be described or applied
//! - **Executor**: applies the queue in order inside one transaction
//! - **DeletionResolver**: deactivates rows the manifest no longer declares
//! - **ReconciliationPass**: the entry point, validate or commit, under a
//!   per-workspace sync lock
//!
//! Validate and commit run the same planning code. A validation with no
//! issues means a commit would write nothing and warn about nothing.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod content;
pub mod deletion;
pub mod error;
pub mod executor;
pub mod operation;
pub mod pass;
pub mod queue;
pub mod report;
mod resolver;
pub mod role_sync;

pub use content::{
    ContentDecl, ContentError, ContentIndexer, ContentSource, InMemoryContentSource, NoopIndexer,
};
pub use deletion::DeletionResolver;
pub use error::{SyncError, SyncResult, SyncWarning};
pub use executor::OperationExecutor;
pub use operation::{
    Deactivate, Delete, Effect, Operation, PlannedWrite, Reactivate, SyncRoles, Upsert,
    UpsertStrategy, WriteChild,
};
pub use pass::{Mode, PassConfig, PassOutcome, Plan, ReconciliationPass};
pub use queue::OperationQueue;
pub use report::{SyncReport, ValidationReport};
pub use role_sync::{role_diff, RoleSyncer};

//! gitsync Types - declarations and entity metadata for manifest sync
//!
//! A workspace's configuration lives in a version-controlled manifest; the
//! relational store holds the live rows the platform executes against. This
//! crate carries the vocabulary both sides share:
//!
//! - **Manifest**: already-parsed, typed declarations grouped by entity kind
//! - **EntityKind**: the closed set of top-level kinds, with their table,
//!   natural key and foreign-key metadata
//! - **DEPENDENCY_ORDER**: the fixed order in which kinds are resolved and
//!   applied so that foreign keys are satisfied by statement order
//! - **RoleJunction**: the many-to-many role grant tables
//!
//! The manifest never expresses a relationship by name. Every reference is
//! the UUID carried by the referenced declaration.

#![deny(unsafe_code)]
#![cfg_attr(feature = "strict-docs", warn(missing_docs))]
#![cfg_attr(not(feature = "strict-docs"), allow(missing_docs))]

pub mod error;
pub mod ids;
pub mod kind;
pub mod manifest;

pub use error::{ManifestError, StructuralIssue};
pub use ids::WorkspaceId;
pub use kind::{EntityKind, ForeignKey, RoleJunction, DEPENDENCY_ORDER};
pub use manifest::{
    AccessLevel, AgentDecl, ApplicationDecl, ConfigDecl, ConfigType, EventSourceDecl,
    EventSourceType, FieldMap, FormDecl, IntegrationDecl, IntegrationMappingDecl, Manifest,
    OrganizationDecl, RoleDecl, SubscriptionDecl, TableDecl, WorkflowDecl,
};

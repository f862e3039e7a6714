//! Seams for form and agent file bodies.
//!
//! The engine only knows that a form or agent declaration points at a body
//! by path. Reading the body is a [`ContentSource`]; turning it into child
//! rows (form fields, agent tools) is a [`ContentIndexer`].

use crate::operation::Operation;
use async_trait::async_trait;
use gitsync_types::{AgentDecl, EntityKind, FormDecl};
use std::collections::HashMap;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum ContentError {
    #[error("failed to read content '{path}': {message}")]
    Read { path: String, message: String },

    #[error("failed to index content '{path}': {message}")]
    Index { path: String, message: String },
}

/// A declaration whose body is indexed.
#[derive(Debug, Clone, Copy)]
pub enum ContentDecl<'a> {
    Form(&'a FormDecl),
    Agent(&'a AgentDecl),
}

impl ContentDecl<'_> {
    pub fn kind(&self) -> EntityKind {
        match self {
            ContentDecl::Form(_) => EntityKind::Form,
            ContentDecl::Agent(_) => EntityKind::Agent,
        }
    }

    pub fn id(&self) -> Uuid {
        match self {
            ContentDecl::Form(d) => d.id,
            ContentDecl::Agent(d) => d.id,
        }
    }

    pub fn path(&self) -> &str {
        match self {
            ContentDecl::Form(d) => &d.path,
            ContentDecl::Agent(d) => &d.path,
        }
    }
}

/// Durable storage of file bodies, addressed by path.
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// `Ok(None)` when no body exists at `path`.
    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>, ContentError>;
}

/// Turns a body into child-row operations for its declaration.
///
/// Returned `WriteChild` operations are compared against the stored child
/// rows; rows in [`ContentIndexer::owned_tables`] that the indexer no longer
/// produces are deleted.
pub trait ContentIndexer: Send + Sync {
    /// Child tables this indexer fully owns for `kind`.
    fn owned_tables(&self, kind: EntityKind) -> Vec<String>;

    fn index(&self, decl: ContentDecl<'_>, body: &[u8]) -> Result<Vec<Operation>, ContentError>;
}

/// Indexer that produces and owns nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopIndexer;

impl ContentIndexer for NoopIndexer {
    fn owned_tables(&self, _kind: EntityKind) -> Vec<String> {
        Vec::new()
    }

    fn index(&self, _decl: ContentDecl<'_>, _body: &[u8]) -> Result<Vec<Operation>, ContentError> {
        Ok(Vec::new())
    }
}

/// Content held in a map; used by tests and by callers that preload bodies.
#[derive(Debug, Default, Clone)]
pub struct InMemoryContentSource {
    bodies: HashMap<String, Vec<u8>>,
}

impl InMemoryContentSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, path: impl Into<String>, body: impl Into<Vec<u8>>) -> Self {
        self.insert(path, body);
        self
    }

    pub fn insert(&mut self, path: impl Into<String>, body: impl Into<Vec<u8>>) {
        self.bodies.insert(path.into(), body.into());
    }
}

#[async_trait]
impl ContentSource for InMemoryContentSource {
    async fn read(&self, path: &str) -> Result<Option<Vec<u8>>, ContentError> {
        Ok(self.bodies.get(path).cloned())
    }
}

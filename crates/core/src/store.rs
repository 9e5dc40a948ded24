//! Document storage behind the intake.
//!
//! The workflow stores every accepted artifact before registering it and
//! uses the identifier the store hands back as the artifact id. Only the
//! in-memory backend ships here; durable backends implement
//! [`DocumentStore`] out of tree.

use async_trait::async_trait;
use rand::Rng;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use tokio::sync::RwLock;

use crate::intake::ArtifactId;

/// All errors a [`DocumentStore`] can return.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// No document with the given id.
    #[error("document not found: {0}")]
    NotFound(ArtifactId),

    /// A backend-specific failure (I/O, connection, quota).
    #[error("document store backend error: {0}")]
    Backend(String),
}

/// A stored document's metadata plus its content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDocument {
    pub id: ArtifactId,
    pub name: String,
    pub size_bytes: u64,
    /// Lower-case hex SHA-256 of `content`.
    pub sha256: String,
    pub content: Vec<u8>,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Store `content` under a fresh id.
    async fn put(&self, name: &str, content: Vec<u8>) -> Result<ArtifactId, StoreError>;

    async fn get(&self, id: &ArtifactId) -> Result<StoredDocument, StoreError>;

    async fn remove(&self, id: &ArtifactId) -> Result<(), StoreError>;
}

// ──────────────────────────────────────────────
// InMemoryDocumentStore
// ──────────────────────────────────────────────

#[derive(Default)]
pub struct InMemoryDocumentStore {
    documents: RwLock<HashMap<ArtifactId, StoredDocument>>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.documents.read().await.is_empty()
    }
}

fn fresh_id() -> ArtifactId {
    let n: u64 = rand::thread_rng().gen();
    ArtifactId::new(format!("doc-{:016x}", n))
}

pub fn sha256_hex(content: &[u8]) -> String {
    let digest = Sha256::digest(content);
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn put(&self, name: &str, content: Vec<u8>) -> Result<ArtifactId, StoreError> {
        let mut documents = self.documents.write().await;
        let mut id = fresh_id();
        while documents.contains_key(&id) {
            id = fresh_id();
        }
        let document = StoredDocument {
            id: id.clone(),
            name: name.to_string(),
            size_bytes: content.len() as u64,
            sha256: sha256_hex(&content),
            content,
        };
        documents.insert(id.clone(), document);
        Ok(id)
    }

    async fn get(&self, id: &ArtifactId) -> Result<StoredDocument, StoreError> {
        self.documents
            .read()
            .await
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }

    async fn remove(&self, id: &ArtifactId) -> Result<(), StoreError> {
        self.documents
            .write()
            .await
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(id.clone()))
    }
}

//! Store client - the administrative surface of the remote document store.
//!
//! Drivers never connect to anything themselves. The host builds a client
//! (for MongoDB, a pooled `mongodb::Client`; in tests, [`MemoryStore`]) and
//! hands it to the [`Provider`], which shares it between drivers. The client
//! must be safe to call from many lifecycle calls at once.
//!
//! [`MemoryStore`]: crate::memory::MemoryStore
//! [`Provider`]: crate::provider::Provider

use async_trait::async_trait;
use bson::Document;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Server error code for "namespace already exists".
pub const CODE_NAMESPACE_EXISTS: i32 = 48;
/// Server error code for "namespace not found".
pub const CODE_NAMESPACE_NOT_FOUND: i32 = 26;
/// Server error code for "index not found".
pub const CODE_INDEX_NOT_FOUND: i32 = 27;

/// Failure reported by the store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("namespace already exists: {0}")]
    NamespaceExists(String),

    #[error("namespace not found: {0}")]
    NamespaceNotFound(String),

    #[error("index not found: {0}")]
    IndexNotFound(String),

    #[error("command failed ({code}): {message}")]
    Command { code: i32, message: String },

    #[error("transport error: {0}")]
    Transport(String),
}

impl StoreError {
    /// Classify a server command error by its code.
    pub fn from_code(code: i32, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            CODE_NAMESPACE_EXISTS => StoreError::NamespaceExists(message),
            CODE_NAMESPACE_NOT_FOUND => StoreError::NamespaceNotFound(message),
            CODE_INDEX_NOT_FOUND => StoreError::IndexNotFound(message),
            code => StoreError::Command { code, message },
        }
    }

    pub fn is_namespace_exists(&self) -> bool {
        matches!(self, StoreError::NamespaceExists(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            StoreError::NamespaceNotFound(_) | StoreError::IndexNotFound(_)
        )
    }
}

/// Result type for store calls.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Administrative commands the engine needs from a store.
///
/// Documents are returned exactly as the store reports them; decoding is
/// the engine's job.
#[async_trait]
pub trait StoreClient: Send + Sync {
    /// Check the store is reachable.
    async fn ping(&self) -> StoreResult<()>;

    /// Names of databases holding data, optionally filtered to one name.
    async fn list_database_names(&self, name: Option<&str>) -> StoreResult<Vec<String>>;

    /// Names of every collection in a database.
    async fn list_collection_names(&self, database: &str) -> StoreResult<Vec<String>>;

    /// `listCollections` entries whose name equals `name`.
    async fn list_collection_specs(&self, database: &str, name: &str)
        -> StoreResult<Vec<Document>>;

    /// Create a collection with the given `create` options.
    async fn create_collection(
        &self,
        database: &str,
        name: &str,
        options: Document,
    ) -> StoreResult<()>;

    async fn drop_collection(&self, database: &str, name: &str) -> StoreResult<()>;

    async fn drop_database(&self, database: &str) -> StoreResult<()>;

    /// Run an arbitrary administrative command against a database.
    async fn run_command(&self, database: &str, command: Document) -> StoreResult<Document>;

    /// `listIndexes` entries for a collection.
    async fn list_index_specs(&self, database: &str, collection: &str)
        -> StoreResult<Vec<Document>>;

    /// Create one index from a full specification; returns the index name.
    async fn create_index(
        &self,
        database: &str,
        collection: &str,
        spec: Document,
    ) -> StoreResult<String>;

    async fn drop_index(&self, database: &str, collection: &str, name: &str) -> StoreResult<()>;
}

/// Shared handle to a store client.
///
/// This is the one collaborator type the [`Provider`] accepts from a host.
///
/// [`Provider`]: crate::provider::Provider
#[derive(Clone)]
pub struct StoreHandle(Arc<dyn StoreClient>);

impl StoreHandle {
    pub fn new(client: impl StoreClient + 'static) -> Self {
        Self(Arc::new(client))
    }

    pub fn from_arc(client: Arc<dyn StoreClient>) -> Self {
        Self(client)
    }

    pub fn client(&self) -> &Arc<dyn StoreClient> {
        &self.0
    }
}

impl fmt::Debug for StoreHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreHandle").finish()
    }
}

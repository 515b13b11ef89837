//! # Keel Engine
//!
//! A declarative reconciliation engine for MongoDB administrative objects.
//!
//! Given the desired specification of a database, a collection or a
//! secondary index, and the state recorded for it last time, the engine
//! issues the minimum set of administrative commands that makes the live
//! store match. Recorded state is always re-derived by reading the store;
//! nothing is cached between calls.
//!
//! ## Design Principles
//!
//! - **Injected store**: drivers talk to a [`StoreClient`] handed to them,
//!   never to a global connection
//! - **Explicit policy**: which changes apply in place and which force a
//!   replace is one table in [`classify`]
//! - **Tolerant reads**: unexpected metadata becomes a [`Warning`], not an
//!   error
//! - **Bounded calls**: every store call honours the [`CallContext`]
//!   deadline and cancellation
//!
//! ## Core Concepts
//!
//! ### Resources
//!
//! - [`DatabaseResource`] - kept alive by a placeholder collection
//! - [`CollectionResource`] - validator, validation level/action, time-series
//! - [`IndexResource`] - ordered keys and options, all fixed at creation
//!
//! Each has an identity string: `database`, `database/collection` or
//! `database/collection/index`.
//!
//! ### Lifecycle
//!
//! Every driver implements [`Lifecycle`]: create, read, update, delete,
//! import, plus a data-source lookup. The [`Reconciler`] combines them into
//! one pass that creates, updates in place, replaces or deletes.
//!
//! ## Quick Start
//!
//! ```rust
//! use keel_engine::{
//!     CallContext, IndexKey, IndexResource, Lifecycle, MemoryStore, Provider, ReadOutcome,
//! };
//! use std::sync::Arc;
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let provider = Provider::new(Arc::new(MemoryStore::new()));
//! let ctx = CallContext::new();
//!
//! let desired = IndexResource::new("app", "users", "users_email", vec![IndexKey::new("email", 1)])
//!     .unique();
//! let recorded = provider.indexes().create(&ctx, desired).await.unwrap();
//! assert_eq!(recorded.id, "app/users/users_email");
//!
//! let outcome = provider.indexes().read(&ctx, &recorded.state).await.unwrap();
//! assert!(matches!(outcome, ReadOutcome::Present(_)));
//! # });
//! ```

pub mod classify;
pub mod context;
pub mod decode;
pub mod driver;
pub mod error;
pub mod identity;
pub mod memory;
pub mod provider;
pub mod reconcile;
pub mod resource;
pub mod store;

// Re-export main types at crate root
pub use classify::{ChangeSet, Classify, FieldChange, Verdict};
pub use context::{CallContext, Canceller};
pub use decode::Warning;
pub use driver::{
    CollectionDriver, DatabaseDriver, IndexDriver, Lifecycle, ReadOutcome, Recorded,
};
pub use error::{Error, Result};
pub use memory::MemoryStore;
pub use provider::{Provider, ProviderData};
pub use reconcile::{Action, Plan, ReconcileResult, Reconciler};
pub use resource::{
    CollectionResource, DatabaseResource, Granularity, IndexKey, IndexResource, Resource,
    ResourceKind, TimeSeries, ValidationAction, ValidationLevel, PLACEHOLDER_COLLECTION,
};
pub use store::{StoreClient, StoreError, StoreHandle, StoreResult};

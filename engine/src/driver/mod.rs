//! Resource drivers.
//!
//! Each driver implements the five-operation lifecycle for one resource
//! kind, plus a data-source lookup. Drivers hold nothing but the shared
//! store client; every call re-derives state from the store.
//!
//! # Contract
//!
//! - `create` issues the store commands for a desired model and returns the
//!   recorded state with its identity.
//! - `read` observes the store. An object that no longer exists is
//!   [`ReadOutcome::Absent`], not an error, so the host can drop it from
//!   its records.
//! - `update` applies in-place changes only. A change the store cannot make
//!   in place fails with [`Error::ReplaceRequired`](crate::Error).
//! - `delete` removes the object; store errors are surfaced.
//! - `import` seeds a recorded model from an identity string.

mod collection;
mod database;
mod index;

pub use collection::CollectionDriver;
pub use database::DatabaseDriver;
pub use index::IndexDriver;

use crate::context::CallContext;
use crate::decode::Warning;
use crate::error::Result;
use crate::resource::Resource;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// State a driver hands back to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recorded<T> {
    pub id: String,
    pub state: T,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<Warning>,
}

impl<T: Resource> Recorded<T> {
    pub fn new(state: T) -> Self {
        Self {
            id: state.identity(),
            state,
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(mut self, warnings: Vec<Warning>) -> Self {
        self.warnings = warnings;
        self
    }
}

/// Result of a lifecycle read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadOutcome<T> {
    Present(Recorded<T>),
    Absent,
}

impl<T> ReadOutcome<T> {
    pub fn is_present(&self) -> bool {
        matches!(self, ReadOutcome::Present(_))
    }

    pub fn into_option(self) -> Option<Recorded<T>> {
        match self {
            ReadOutcome::Present(recorded) => Some(recorded),
            ReadOutcome::Absent => None,
        }
    }
}

/// The lifecycle contract every driver implements.
#[async_trait]
pub trait Lifecycle: Send + Sync {
    type Model: Resource;

    async fn create(&self, ctx: &CallContext, desired: Self::Model)
        -> Result<Recorded<Self::Model>>;

    async fn read(
        &self,
        ctx: &CallContext,
        recorded: &Self::Model,
    ) -> Result<ReadOutcome<Self::Model>>;

    async fn update(
        &self,
        ctx: &CallContext,
        desired: Self::Model,
        recorded: &Self::Model,
    ) -> Result<Recorded<Self::Model>>;

    async fn delete(&self, ctx: &CallContext, recorded: &Self::Model) -> Result<()>;

    /// Seed a recorded model from an identity string.
    fn import(&self, id: &str) -> Result<Self::Model> {
        Self::Model::from_identity(id)
    }

    /// Data-source read by identity. Absence is [`Error::NotFound`](crate::Error).
    async fn lookup(&self, ctx: &CallContext, id: &str) -> Result<Recorded<Self::Model>>;
}

/// Log decode warnings attached to a read.
pub(crate) fn log_warnings(id: &str, warnings: &[Warning]) {
    for warning in warnings {
        tracing::warn!(id, field = ?warning.field, "{warning}");
    }
}

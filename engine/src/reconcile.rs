//! Reconciliation of one resource instance.
//!
//! Given the desired model and the last recorded one, a pass drives the
//! store to the desired state with the fewest operations.
//!
//! # Algorithm
//!
//! 1. If something is recorded, refresh it with a read. An object that is
//!    gone from the store is drift: the record is dropped.
//! 2. Nothing desired but something recorded: delete.
//! 3. Something desired but nothing recorded: create.
//! 4. Both: classify. Unchanged is a no-op, in-place changes are an update,
//!    and any immutable change is a delete followed by a create.
//!
//! A failure part-way through is returned as is. Nothing is rolled back;
//! the next pass reads whatever the store holds.

use crate::classify::{ChangeSet, Classify};
use crate::context::CallContext;
use crate::driver::{Lifecycle, ReadOutcome, Recorded};
use crate::error::Result;
use crate::resource::Resource;
use serde::{Deserialize, Serialize};

/// What a pass did, or would do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Action {
    Noop,
    Create,
    Update,
    Replace,
    Delete,
}

/// Planned action together with the field verdicts behind it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub action: Action,
    pub changes: ChangeSet,
}

/// Result of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileResult<T> {
    pub action: Action,
    /// Recorded state after the pass; `None` once the object is gone.
    pub state: Option<Recorded<T>>,
    /// The recorded object had disappeared from the store.
    pub drifted: bool,
}

/// Drives one driver through reconciliation passes.
pub struct Reconciler<'a, D: Lifecycle> {
    driver: &'a D,
}

impl<'a, D: Lifecycle> Reconciler<'a, D> {
    pub fn new(driver: &'a D) -> Self {
        Self { driver }
    }

    /// Decide what a pass would do, without touching the store.
    pub fn plan(desired: Option<&D::Model>, recorded: Option<&D::Model>) -> Plan {
        match (desired, recorded) {
            (None, None) => Plan {
                action: Action::Noop,
                changes: ChangeSet::default(),
            },
            (None, Some(_)) => Plan {
                action: Action::Delete,
                changes: ChangeSet::default(),
            },
            (Some(_), None) => Plan {
                action: Action::Create,
                changes: ChangeSet::default(),
            },
            (Some(desired), Some(recorded)) => {
                let changes = desired.classify(recorded);
                let action = if changes.is_unchanged() {
                    Action::Noop
                } else if changes.requires_replace() {
                    Action::Replace
                } else {
                    Action::Update
                };
                Plan { action, changes }
            }
        }
    }

    /// Run one pass.
    pub async fn apply(
        &self,
        ctx: &CallContext,
        desired: Option<D::Model>,
        recorded: Option<D::Model>,
    ) -> Result<ReconcileResult<D::Model>> {
        let mut drifted = false;
        let current = match recorded {
            Some(recorded) => match self.driver.read(ctx, &recorded).await? {
                ReadOutcome::Present(observed) => Some(observed),
                ReadOutcome::Absent => {
                    let kind = D::Model::KIND;
                    tracing::warn!(
                        call_id = %ctx.call_id(),
                        %kind,
                        "recorded object is gone from the store"
                    );
                    drifted = true;
                    None
                }
            },
            None => None,
        };

        let plan = Self::plan(desired.as_ref(), current.as_ref().map(|r| &r.state));
        tracing::debug!(call_id = %ctx.call_id(), action = ?plan.action, "reconciling");

        let state = match (plan.action, desired, current) {
            (Action::Noop, _, current) => current,
            (Action::Delete, _, Some(current)) => {
                self.driver.delete(ctx, &current.state).await?;
                None
            }
            (Action::Create, Some(desired), _) => Some(self.driver.create(ctx, desired).await?),
            (Action::Update, Some(desired), Some(current)) => {
                Some(self.driver.update(ctx, desired, &current.state).await?)
            }
            (Action::Replace, Some(desired), Some(current)) => {
                self.driver.delete(ctx, &current.state).await?;
                Some(self.driver.create(ctx, desired).await?)
            }
            // plan() only yields the combinations above
            (_, _, current) => current,
        };

        Ok(ReconcileResult {
            action: plan.action,
            state,
            drifted,
        })
    }
}

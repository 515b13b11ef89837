//! Lifecycle handlers - run one driver operation for a request.
//!
//! These are generic over the driver, so the three resource kinds share
//! one implementation.

use crate::error::Result;
use keel_engine::{
    CallContext, Lifecycle, Plan, ReadOutcome, ReconcileResult, Reconciler, Recorded, Resource,
};
use serde::{Deserialize, Serialize};
use tracing::{Instrument, Span};

fn call_span<M: Resource>(ctx: &CallContext, operation: &'static str) -> Span {
    tracing::info_span!("call", call_id = %ctx.call_id(), kind = %M::KIND, operation)
}

/// Request body carrying a desired model.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest<M> {
    pub desired: M,
}

/// Request body carrying a recorded model.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordedRequest<M> {
    pub recorded: M,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest<M> {
    pub desired: M,
    pub recorded: M,
}

/// Request body naming an identity.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRequest {
    pub id: String,
}

/// Request body for plan and reconcile; either side may be absent.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileRequest<M> {
    pub desired: Option<M>,
    pub recorded: Option<M>,
}

/// Response for a read.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadResponse<M> {
    pub present: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recorded: Option<Recorded<M>>,
}

pub async fn handle_create<D: Lifecycle>(
    driver: &D,
    ctx: &CallContext,
    request: CreateRequest<D::Model>,
) -> Result<Recorded<D::Model>> {
    let recorded = driver
        .create(ctx, request.desired)
        .instrument(call_span::<D::Model>(ctx, "create"))
        .await?;
    tracing::info!(call_id = %ctx.call_id(), kind = %D::Model::KIND, id = %recorded.id, "created");
    Ok(recorded)
}

pub async fn handle_read<D: Lifecycle>(
    driver: &D,
    ctx: &CallContext,
    request: RecordedRequest<D::Model>,
) -> Result<ReadResponse<D::Model>> {
    let outcome = driver
        .read(ctx, &request.recorded)
        .instrument(call_span::<D::Model>(ctx, "read"))
        .await?;
    let response = match outcome {
        ReadOutcome::Present(recorded) => ReadResponse {
            present: true,
            recorded: Some(recorded),
        },
        ReadOutcome::Absent => ReadResponse {
            present: false,
            recorded: None,
        },
    };
    Ok(response)
}

pub async fn handle_update<D: Lifecycle>(
    driver: &D,
    ctx: &CallContext,
    request: UpdateRequest<D::Model>,
) -> Result<Recorded<D::Model>> {
    let recorded = driver
        .update(ctx, request.desired, &request.recorded)
        .instrument(call_span::<D::Model>(ctx, "update"))
        .await?;
    tracing::info!(call_id = %ctx.call_id(), kind = %D::Model::KIND, id = %recorded.id, "updated");
    Ok(recorded)
}

pub async fn handle_delete<D: Lifecycle>(
    driver: &D,
    ctx: &CallContext,
    request: RecordedRequest<D::Model>,
) -> Result<()> {
    driver
        .delete(ctx, &request.recorded)
        .instrument(call_span::<D::Model>(ctx, "delete"))
        .await?;
    tracing::info!(
        call_id = %ctx.call_id(),
        kind = %D::Model::KIND,
        id = %request.recorded.identity(),
        "deleted"
    );
    Ok(())
}

pub fn handle_import<D: Lifecycle>(driver: &D, request: IdentityRequest) -> Result<D::Model> {
    Ok(driver.import(&request.id)?)
}

pub fn handle_plan<D: Lifecycle>(request: ReconcileRequest<D::Model>) -> Plan {
    Reconciler::<D>::plan(request.desired.as_ref(), request.recorded.as_ref())
}

pub async fn handle_reconcile<D: Lifecycle>(
    driver: &D,
    ctx: &CallContext,
    request: ReconcileRequest<D::Model>,
) -> Result<ReconcileResult<D::Model>> {
    let result = Reconciler::new(driver)
        .apply(ctx, request.desired, request.recorded)
        .instrument(call_span::<D::Model>(ctx, "reconcile"))
        .await?;
    tracing::info!(
        call_id = %ctx.call_id(),
        kind = %D::Model::KIND,
        action = ?result.action,
        drifted = result.drifted,
        "reconciled"
    );
    Ok(result)
}

pub async fn handle_lookup<D: Lifecycle>(
    driver: &D,
    ctx: &CallContext,
    request: IdentityRequest,
) -> Result<Recorded<D::Model>> {
    let recorded = driver
        .lookup(ctx, &request.id)
        .instrument(call_span::<D::Model>(ctx, "lookup"))
        .await?;
    Ok(recorded)
}

//! Lifecycle endpoint routes, one set per resource kind.

use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use keel_engine::{
    CollectionDriver, DatabaseDriver, IndexDriver, Lifecycle, Plan, Provider, ReconcileResult,
    Recorded,
};

use crate::error::Result;
use crate::handlers::{
    call_context, handle_create, handle_delete, handle_import, handle_lookup, handle_plan,
    handle_read, handle_reconcile, handle_update, CreateRequest, IdentityRequest, ReadResponse,
    ReconcileRequest, RecordedRequest, UpdateRequest,
};
use crate::AppState;

/// A driver reachable from the provider.
pub trait Routed: Lifecycle + 'static {
    fn select(provider: &Provider) -> &Self;
}

impl Routed for DatabaseDriver {
    fn select(provider: &Provider) -> &Self {
        provider.databases()
    }
}

impl Routed for CollectionDriver {
    fn select(provider: &Provider) -> &Self {
        provider.collections()
    }
}

impl Routed for IndexDriver {
    fn select(provider: &Provider) -> &Self {
        provider.indexes()
    }
}

/// Create lifecycle routes for all resource kinds.
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/v1/databases", lifecycle_routes::<DatabaseDriver>())
        .nest("/v1/collections", lifecycle_routes::<CollectionDriver>())
        .nest("/v1/indexes", lifecycle_routes::<IndexDriver>())
}

fn lifecycle_routes<D: Routed>() -> Router<AppState> {
    Router::new()
        .route("/create", post(create::<D>))
        .route("/read", post(read::<D>))
        .route("/update", post(update::<D>))
        .route("/delete", post(delete::<D>))
        .route("/import", post(import::<D>))
        .route("/plan", post(plan::<D>))
        .route("/reconcile", post(reconcile::<D>))
        .route("/lookup", post(lookup::<D>))
}

/// POST /v1/{kind}/create
async fn create<D: Routed>(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateRequest<D::Model>>,
) -> Result<Json<Recorded<D::Model>>> {
    let ctx = call_context(&headers, state.call_timeout)?;
    let recorded = handle_create(D::select(&state.provider), &ctx, request).await?;
    Ok(Json(recorded))
}

/// POST /v1/{kind}/read
async fn read<D: Routed>(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<RecordedRequest<D::Model>>,
) -> Result<Json<ReadResponse<D::Model>>> {
    let ctx = call_context(&headers, state.call_timeout)?;
    let response = handle_read(D::select(&state.provider), &ctx, request).await?;
    Ok(Json(response))
}

/// POST /v1/{kind}/update
async fn update<D: Routed>(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<UpdateRequest<D::Model>>,
) -> Result<Json<Recorded<D::Model>>> {
    let ctx = call_context(&headers, state.call_timeout)?;
    let recorded = handle_update(D::select(&state.provider), &ctx, request).await?;
    Ok(Json(recorded))
}

/// POST /v1/{kind}/delete
async fn delete<D: Routed>(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<RecordedRequest<D::Model>>,
) -> Result<StatusCode> {
    let ctx = call_context(&headers, state.call_timeout)?;
    handle_delete(D::select(&state.provider), &ctx, request).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /v1/{kind}/import
async fn import<D: Routed>(
    State(state): State<AppState>,
    Json(request): Json<IdentityRequest>,
) -> Result<Json<D::Model>> {
    let seed = handle_import(D::select(&state.provider), request)?;
    Ok(Json(seed))
}

/// POST /v1/{kind}/plan
async fn plan<D: Routed>(Json(request): Json<ReconcileRequest<D::Model>>) -> Json<Plan> {
    Json(handle_plan::<D>(request))
}

/// POST /v1/{kind}/reconcile
async fn reconcile<D: Routed>(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<ReconcileRequest<D::Model>>,
) -> Result<Json<ReconcileResult<D::Model>>> {
    let ctx = call_context(&headers, state.call_timeout)?;
    let result = handle_reconcile(D::select(&state.provider), &ctx, request).await?;
    Ok(Json(result))
}

/// POST /v1/{kind}/lookup
async fn lookup<D: Routed>(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<IdentityRequest>,
) -> Result<Json<Recorded<D::Model>>> {
    let ctx = call_context(&headers, state.call_timeout)?;
    let recorded = handle_lookup(D::select(&state.provider), &ctx, request).await?;
    Ok(Json(recorded))
}

use super::{log_warnings, Lifecycle, ReadOutcome, Recorded};
use crate::classify::Classify;
use crate::context::CallContext;
use crate::decode::{decode_index_spec, encode_key_order, find_index, parse_document, reconcile_text};
use crate::error::Result;
use crate::identity;
use crate::resource::{IndexResource, Resource, ResourceKind};
use crate::store::StoreClient;
use crate::Error;
use async_trait::async_trait;
use bson::{doc, Document};
use std::sync::Arc;

/// Manages secondary indexes. Every index attribute is fixed at creation.
#[derive(Clone)]
pub struct IndexDriver {
    client: Arc<dyn StoreClient>,
}

impl IndexDriver {
    pub fn new(client: Arc<dyn StoreClient>) -> Self {
        Self { client }
    }

    async fn specs(&self, ctx: &CallContext, database: &str, collection: &str) -> Result<Vec<Document>> {
        ctx.run(
            "list indexes",
            self.client.list_index_specs(database, collection),
        )
        .await
    }
}

/// Build the full index specification sent to the store.
fn index_spec(desired: &IndexResource) -> Result<Document> {
    if desired.keys.is_empty() {
        return Err(Error::validation("keys", "at least one key is required"));
    }

    let mut spec = doc! {
        "key": encode_key_order(&desired.keys),
        "name": desired.name.as_str(),
    };
    if desired.unique {
        spec.insert("unique", true);
    }
    if desired.sparse {
        spec.insert("sparse", true);
    }
    if let Some(ttl) = desired.ttl_seconds {
        spec.insert("expireAfterSeconds", ttl);
    }
    if let Some(text) = desired.partial_filter_text() {
        spec.insert(
            "partialFilterExpression",
            parse_document("partialFilterExpression", text)?,
        );
    }
    spec.insert("background", desired.background);
    Ok(spec)
}

/// Build recorded state from one `listIndexes` entry.
fn decode_index(
    database: &str,
    collection: &str,
    name: &str,
    spec: &Document,
    recorded: Option<&IndexResource>,
) -> Recorded<IndexResource> {
    let decoded = decode_index_spec(spec);
    let background = decoded
        .background
        .or(recorded.map(|r| r.background))
        .unwrap_or(true);

    let state = IndexResource {
        database: database.to_string(),
        collection: collection.to_string(),
        name: name.to_string(),
        keys: decoded.keys,
        unique: decoded.unique,
        sparse: decoded.sparse,
        ttl_seconds: decoded.ttl_seconds,
        partial_filter_expression: reconcile_text(
            recorded.and_then(IndexResource::partial_filter_text),
            decoded.partial_filter_expression.as_ref(),
        ),
        background,
    };

    let recorded = Recorded::new(state);
    log_warnings(&recorded.id, &decoded.warnings);
    recorded.with_warnings(decoded.warnings)
}

#[async_trait]
impl Lifecycle for IndexDriver {
    type Model = IndexResource;

    async fn create(
        &self,
        ctx: &CallContext,
        desired: IndexResource,
    ) -> Result<Recorded<IndexResource>> {
        identity::check_segment("database", &desired.database)?;
        identity::check_segment("collection", &desired.collection)?;
        identity::check_segment("name", &desired.name)?;
        let spec = index_spec(&desired)?;

        let existing = self
            .specs(ctx, &desired.database, &desired.collection)
            .await?;
        if find_index(&existing, &desired.name).is_some() {
            return Err(Error::AlreadyExists {
                kind: ResourceKind::Index,
                id: desired.identity(),
            });
        }

        let name = ctx
            .call(
                "create index",
                self.client
                    .create_index(&desired.database, &desired.collection, spec),
            )
            .await?
            .map_err(|e| Error::CreateFailed {
                kind: ResourceKind::Index,
                message: e.to_string(),
            })?;

        let recorded = Recorded::new(IndexResource { name, ..desired });
        tracing::info!(call_id = %ctx.call_id(), id = %recorded.id, "index created");
        Ok(recorded)
    }

    async fn read(
        &self,
        ctx: &CallContext,
        recorded: &IndexResource,
    ) -> Result<ReadOutcome<IndexResource>> {
        let specs = self
            .specs(ctx, &recorded.database, &recorded.collection)
            .await?;
        match find_index(&specs, &recorded.name) {
            Some(spec) => Ok(ReadOutcome::Present(decode_index(
                &recorded.database,
                &recorded.collection,
                &recorded.name,
                spec,
                Some(recorded),
            ))),
            None => {
                tracing::info!(id = %recorded.identity(), "index no longer exists");
                Ok(ReadOutcome::Absent)
            }
        }
    }

    /// Re-persists the desired record. Real changes never get here: every
    /// attribute is immutable, so they are planned as replacements.
    async fn update(
        &self,
        ctx: &CallContext,
        desired: IndexResource,
        recorded: &IndexResource,
    ) -> Result<Recorded<IndexResource>> {
        let changes = desired.classify(recorded);
        if !changes.is_unchanged() {
            tracing::warn!(
                call_id = %ctx.call_id(),
                id = %recorded.identity(),
                fields = ?changes.replace_fields(),
                "index update received changes that need a replace; recording as given"
            );
        }
        Ok(Recorded::new(desired))
    }

    async fn delete(&self, ctx: &CallContext, recorded: &IndexResource) -> Result<()> {
        ctx.run(
            "drop index",
            self.client
                .drop_index(&recorded.database, &recorded.collection, &recorded.name),
        )
        .await?;
        tracing::info!(call_id = %ctx.call_id(), id = %recorded.identity(), "index dropped");
        Ok(())
    }

    async fn lookup(&self, ctx: &CallContext, id: &str) -> Result<Recorded<IndexResource>> {
        let target = IndexResource::from_identity(id)?;
        let specs = self.specs(ctx, &target.database, &target.collection).await?;
        match find_index(&specs, &target.name) {
            Some(spec) => Ok(decode_index(
                &target.database,
                &target.collection,
                &target.name,
                spec,
                None,
            )),
            None => Err(Error::NotFound {
                kind: ResourceKind::Index,
                id: target.identity(),
                detail: "no index with that name on the collection".into(),
            }),
        }
    }
}

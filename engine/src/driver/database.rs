use super::{Lifecycle, ReadOutcome, Recorded};
use crate::classify::Classify;
use crate::context::CallContext;
use crate::error::Result;
use crate::identity;
use crate::resource::{DatabaseResource, Resource, ResourceKind, PLACEHOLDER_COLLECTION};
use crate::store::StoreClient;
use crate::Error;
use async_trait::async_trait;
use bson::Document;
use std::sync::Arc;

/// Manages databases.
///
/// A database only exists on the store while it holds a collection, so
/// creation is done by creating the placeholder collection.
#[derive(Clone)]
pub struct DatabaseDriver {
    client: Arc<dyn StoreClient>,
}

impl DatabaseDriver {
    pub fn new(client: Arc<dyn StoreClient>) -> Self {
        Self { client }
    }

    async fn observe(&self, ctx: &CallContext, name: &str) -> Result<Option<DatabaseResource>> {
        let collections = ctx
            .run("list collections", self.client.list_collection_names(name))
            .await?;
        if collections.is_empty() {
            return Ok(None);
        }
        let keep = collections.iter().any(|c| c == PLACEHOLDER_COLLECTION);
        Ok(Some(DatabaseResource::new(name).with_placeholder(keep)))
    }

    async fn create_placeholder(&self, ctx: &CallContext, name: &str) -> Result<()> {
        let result = ctx
            .call(
                "create placeholder",
                self.client
                    .create_collection(name, PLACEHOLDER_COLLECTION, Document::new()),
            )
            .await?;
        match result {
            Err(e) if !e.is_namespace_exists() => Err(Error::store("create placeholder", e)),
            _ => Ok(()),
        }
    }

    async fn drop_placeholder(&self, ctx: &CallContext, name: &str) -> Result<()> {
        let result = ctx
            .call(
                "drop placeholder",
                self.client.drop_collection(name, PLACEHOLDER_COLLECTION),
            )
            .await?;
        match result {
            Err(e) if !e.is_not_found() => Err(Error::store("drop placeholder", e)),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl Lifecycle for DatabaseDriver {
    type Model = DatabaseResource;

    async fn create(
        &self,
        ctx: &CallContext,
        desired: DatabaseResource,
    ) -> Result<Recorded<DatabaseResource>> {
        identity::check_segment("name", &desired.name)?;

        let existing = ctx
            .run(
                "list databases",
                self.client.list_database_names(Some(&desired.name)),
            )
            .await?;
        if existing.iter().any(|db| db == &desired.name) {
            return Err(Error::AlreadyExists {
                kind: ResourceKind::Database,
                id: desired.name,
            });
        }

        if desired.keep_placeholder {
            self.create_placeholder(ctx, &desired.name)
                .await
                .map_err(|e| match e {
                    Error::Store { source, .. } => Error::CreateFailed {
                        kind: ResourceKind::Database,
                        message: source.to_string(),
                    },
                    other => other,
                })?;
        }

        tracing::info!(call_id = %ctx.call_id(), database = %desired.name, "database created");
        Ok(Recorded::new(desired))
    }

    async fn read(
        &self,
        ctx: &CallContext,
        recorded: &DatabaseResource,
    ) -> Result<ReadOutcome<DatabaseResource>> {
        match self.observe(ctx, &recorded.name).await? {
            Some(state) => Ok(ReadOutcome::Present(Recorded::new(state))),
            None => {
                tracing::info!(database = %recorded.name, "database no longer exists");
                Ok(ReadOutcome::Absent)
            }
        }
    }

    async fn update(
        &self,
        ctx: &CallContext,
        desired: DatabaseResource,
        recorded: &DatabaseResource,
    ) -> Result<Recorded<DatabaseResource>> {
        let changes = desired.classify(recorded);
        if changes.requires_replace() {
            return Err(Error::ReplaceRequired {
                kind: ResourceKind::Database,
                id: recorded.name.clone(),
                fields: changes.replace_fields(),
            });
        }

        // the placeholder always follows the desired flag, whatever was recorded
        if desired.keep_placeholder {
            self.create_placeholder(ctx, &desired.name).await?;
        } else {
            self.drop_placeholder(ctx, &desired.name).await?;
        }

        tracing::info!(
            call_id = %ctx.call_id(),
            database = %desired.name,
            keep_placeholder = desired.keep_placeholder,
            "database updated"
        );
        Ok(Recorded::new(desired))
    }

    async fn delete(&self, ctx: &CallContext, recorded: &DatabaseResource) -> Result<()> {
        ctx.run("drop database", self.client.drop_database(&recorded.name))
            .await?;
        tracing::info!(call_id = %ctx.call_id(), database = %recorded.name, "database dropped");
        Ok(())
    }

    async fn lookup(&self, ctx: &CallContext, id: &str) -> Result<Recorded<DatabaseResource>> {
        let name = DatabaseResource::from_identity(id)?.name;
        let listed = ctx
            .run("list databases", self.client.list_database_names(Some(&name)))
            .await?;
        if !listed.iter().any(|db| db == &name) {
            return Err(Error::NotFound {
                kind: ResourceKind::Database,
                id: name,
                detail: "no database with that name holds data".into(),
            });
        }

        match self.observe(ctx, &name).await? {
            Some(state) => Ok(Recorded::new(state)),
            None => Err(Error::NotFound {
                kind: ResourceKind::Database,
                id: name,
                detail: "database has no collections".into(),
            }),
        }
    }
}

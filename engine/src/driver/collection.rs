use super::{log_warnings, Lifecycle, ReadOutcome, Recorded};
use crate::classify::Classify;
use crate::context::CallContext;
use crate::decode::{
    decode_time_series, decode_validator, parse_document, reconcile_text, wrap_json_schema,
};
use crate::error::Result;
use crate::identity;
use crate::resource::{CollectionResource, Resource, ResourceKind};
use crate::store::StoreClient;
use crate::Error;
use async_trait::async_trait;
use bson::{doc, Document};
use std::sync::Arc;

/// Manages collections, including validation settings and time-series
/// options.
#[derive(Clone)]
pub struct CollectionDriver {
    client: Arc<dyn StoreClient>,
}

impl CollectionDriver {
    pub fn new(client: Arc<dyn StoreClient>) -> Self {
        Self { client }
    }

    async fn specs(
        &self,
        ctx: &CallContext,
        database: &str,
        name: &str,
    ) -> Result<Vec<Document>> {
        ctx.run(
            "list collections",
            self.client.list_collection_specs(database, name),
        )
        .await
    }
}

/// Build the `create` options for a desired collection.
fn create_options(desired: &CollectionResource) -> Result<Document> {
    let mut options = Document::new();

    if let Some(text) = desired.validator_text() {
        let body = parse_document("validator", text)?;
        options.insert("validator", wrap_json_schema(body));
    }
    options.insert("validationLevel", desired.validation_level.as_str());
    options.insert("validationAction", desired.validation_action.as_str());

    if let Some(ts) = &desired.time_series {
        if ts.time_field.trim().is_empty() {
            return Err(Error::validation("timeSeries.timeField", "must not be empty"));
        }
        let mut timeseries = doc! { "timeField": ts.time_field.as_str() };
        if let Some(meta) = &ts.meta_field {
            timeseries.insert("metaField", meta.as_str());
        }
        if let Some(granularity) = ts.granularity {
            timeseries.insert("granularity", granularity.as_str());
        }
        if let Some(span) = ts.bucket_max_span_seconds {
            timeseries.insert("bucketMaxSpanSeconds", span);
        }
        if let Some(rounding) = ts.bucket_rounding_seconds {
            timeseries.insert("bucketRoundingSeconds", rounding);
        }
        options.insert("timeseries", timeseries);

        if let Some(ttl) = ts.expire_after_seconds {
            options.insert("expireAfterSeconds", ttl);
        }
    }

    Ok(options)
}

/// Build the `collMod` command carrying only the fields that changed.
///
/// Returns `None` when nothing needs to be sent.
fn modify_command(
    desired: &CollectionResource,
    recorded: &CollectionResource,
) -> Result<Option<Document>> {
    let changes = desired.classify(recorded);
    let mut command = doc! { "collMod": desired.name.as_str() };

    if changes.is_changed("validator") {
        let validator = match desired.validator_text() {
            Some(text) => wrap_json_schema(parse_document("validator", text)?),
            // an explicit empty document clears the validator
            None => Document::new(),
        };
        command.insert("validator", validator);
    }
    if changes.is_changed("validationLevel") {
        command.insert("validationLevel", desired.validation_level.as_str());
    }
    if changes.is_changed("validationAction") {
        command.insert("validationAction", desired.validation_action.as_str());
    }

    Ok((command.len() > 1).then_some(command))
}

/// Build recorded state from one `listCollections` entry.
fn decode_collection(
    database: &str,
    name: &str,
    spec: &Document,
    recorded_validator: Option<&str>,
) -> Recorded<CollectionResource> {
    let empty = Document::new();
    let options = spec.get_document("options").unwrap_or(&empty);

    let (settings, mut warnings) = decode_validator(options);
    let (time_series, ts_warnings) = decode_time_series(options);
    warnings.extend(ts_warnings);

    let state = CollectionResource {
        database: database.to_string(),
        name: name.to_string(),
        validator: reconcile_text(recorded_validator, settings.validator.as_ref()),
        validation_level: settings.level,
        validation_action: settings.action,
        time_series,
    };

    let recorded = Recorded::new(state);
    log_warnings(&recorded.id, &warnings);
    recorded.with_warnings(warnings)
}

#[async_trait]
impl Lifecycle for CollectionDriver {
    type Model = CollectionResource;

    async fn create(
        &self,
        ctx: &CallContext,
        desired: CollectionResource,
    ) -> Result<Recorded<CollectionResource>> {
        identity::check_segment("database", &desired.database)?;
        identity::check_segment("name", &desired.name)?;

        let failed = |message: String| Error::CreateFailed {
            kind: ResourceKind::Collection,
            message,
        };

        let options = create_options(&desired).map_err(|e| failed(e.to_string()))?;
        ctx.call(
            "create collection",
            self.client
                .create_collection(&desired.database, &desired.name, options),
        )
        .await?
        .map_err(|e| failed(e.to_string()))?;

        let recorded = Recorded::new(desired);
        tracing::info!(call_id = %ctx.call_id(), id = %recorded.id, "collection created");
        Ok(recorded)
    }

    async fn read(
        &self,
        ctx: &CallContext,
        recorded: &CollectionResource,
    ) -> Result<ReadOutcome<CollectionResource>> {
        let specs = self.specs(ctx, &recorded.database, &recorded.name).await?;
        match specs.as_slice() {
            [] => {
                tracing::info!(id = %recorded.identity(), "collection no longer exists");
                Ok(ReadOutcome::Absent)
            }
            [spec] => Ok(ReadOutcome::Present(decode_collection(
                &recorded.database,
                &recorded.name,
                spec,
                recorded.validator_text(),
            ))),
            many => Err(Error::NotFound {
                kind: ResourceKind::Collection,
                id: recorded.identity(),
                detail: format!("expected one matching collection, found {}", many.len()),
            }),
        }
    }

    async fn update(
        &self,
        ctx: &CallContext,
        desired: CollectionResource,
        recorded: &CollectionResource,
    ) -> Result<Recorded<CollectionResource>> {
        let changes = desired.classify(recorded);
        if changes.requires_replace() {
            return Err(Error::ReplaceRequired {
                kind: ResourceKind::Collection,
                id: recorded.identity(),
                fields: changes.replace_fields(),
            });
        }

        let Some(command) = modify_command(&desired, recorded)? else {
            return Ok(Recorded::new(desired));
        };

        ctx.run(
            "modify collection",
            self.client.run_command(&desired.database, command),
        )
        .await?;

        let recorded = Recorded::new(desired);
        tracing::info!(
            call_id = %ctx.call_id(),
            id = %recorded.id,
            fields = ?changes.in_place_fields(),
            "collection updated"
        );
        Ok(recorded)
    }

    async fn delete(&self, ctx: &CallContext, recorded: &CollectionResource) -> Result<()> {
        ctx.run(
            "drop collection",
            self.client
                .drop_collection(&recorded.database, &recorded.name),
        )
        .await?;
        tracing::info!(call_id = %ctx.call_id(), id = %recorded.identity(), "collection dropped");
        Ok(())
    }

    async fn lookup(&self, ctx: &CallContext, id: &str) -> Result<Recorded<CollectionResource>> {
        let target = CollectionResource::from_identity(id)?;
        let specs = self.specs(ctx, &target.database, &target.name).await?;
        match specs.as_slice() {
            [spec] => Ok(decode_collection(&target.database, &target.name, spec, None)),
            other => Err(Error::NotFound {
                kind: ResourceKind::Collection,
                id: target.identity(),
                detail: format!("expected one matching collection, found {}", other.len()),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryStore;
    use crate::resource::{Granularity, TimeSeries, ValidationAction, ValidationLevel};

    const SCHEMA: &str = r#"{"bsonType":"object","required":["email"]}"#;

    fn driver() -> (CollectionDriver, MemoryStore) {
        let store = MemoryStore::new();
        (CollectionDriver::new(Arc::new(store.clone())), store)
    }

    fn modify_commands(store: &MemoryStore) -> Vec<Document> {
        store
            .commands()
            .into_iter()
            .map(|(_, command)| command)
            .filter(|command| command.contains_key("collMod"))
            .collect()
    }

    #[tokio::test]
    async fn duplicate_specs_are_not_found() {
        let (driver, store) = driver();
        let ctx = CallContext::new();
        let recorded = driver
            .create(&ctx, CollectionResource::new("app", "users"))
            .await
            .unwrap();
        store.insert_collection_spec(
            "app",
            doc! { "name": "users", "type": "collection", "options": {}, "info": {} },
        );

        let err = driver.read(&ctx, &recorded.state).await.unwrap_err();
        assert!(matches!(err, Error::NotFound { ref detail, .. } if detail.contains("found 2")));

        let err = driver.lookup(&ctx, "app/users").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }));
    }

    #[tokio::test]
    async fn validator_round_trips_byte_identical() {
        let (driver, store) = driver();
        let ctx = CallContext::new();
        let desired = CollectionResource::new("app", "users").with_validator(SCHEMA);

        let recorded = driver.create(&ctx, desired.clone()).await.unwrap();
        let options = store.collection_options("app", "users").unwrap();
        assert!(options.get_document("validator").unwrap().contains_key("$jsonSchema"));

        // a fresh read with nothing recorded renders canonical text
        let observed = driver
            .read(&ctx, &CollectionResource::new("app", "users"))
            .await
            .unwrap()
            .into_option()
            .unwrap();
        assert_eq!(observed.state.validator.as_deref(), Some(SCHEMA));
        assert_eq!(observed.state, recorded.state);
    }

    #[tokio::test]
    async fn read_keeps_recorded_formatting() {
        let (driver, _) = driver();
        let ctx = CallContext::new();
        let spaced = r#"{ "bsonType": "object", "required": ["email"] }"#;
        let desired = CollectionResource::new("app", "users").with_validator(spaced);

        driver.create(&ctx, desired.clone()).await.unwrap();
        let observed = driver.read(&ctx, &desired).await.unwrap().into_option().unwrap();
        assert_eq!(observed.state.validator.as_deref(), Some(spaced));
    }

    #[tokio::test]
    async fn invalid_validator_fails_create() {
        let (driver, store) = driver();
        let desired = CollectionResource::new("app", "users").with_validator("{oops");
        let err = driver.create(&CallContext::new(), desired).await.unwrap_err();
        assert!(matches!(err, Error::CreateFailed { kind: ResourceKind::Collection, .. }));
        assert!(store.collection_options("app", "users").is_none());
    }

    #[tokio::test]
    async fn existing_collection_fails_create() {
        let (driver, _) = driver();
        let ctx = CallContext::new();
        driver.create(&ctx, CollectionResource::new("app", "users")).await.unwrap();
        let err = driver
            .create(&ctx, CollectionResource::new("app", "users"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::CreateFailed { ref message, .. } if message.contains("already exists")));
    }

    #[tokio::test]
    async fn time_series_options_are_sent_and_read_back() {
        let (driver, store) = driver();
        let ctx = CallContext::new();
        let mut ts = TimeSeries::new("ts");
        ts.meta_field = Some("sensor".into());
        ts.granularity = Some(Granularity::Minutes);
        ts.expire_after_seconds = Some(86_400);
        let desired = CollectionResource::new("metrics", "events").with_time_series(ts.clone());

        driver.create(&ctx, desired.clone()).await.unwrap();
        let options = store.collection_options("metrics", "events").unwrap();
        assert_eq!(options.get_i64("expireAfterSeconds").unwrap(), 86_400);
        let timeseries = options.get_document("timeseries").unwrap();
        assert_eq!(timeseries.get_str("granularity").unwrap(), "minutes");
        assert!(!timeseries.contains_key("bucketMaxSpanSeconds"));

        let observed = driver.read(&ctx, &desired).await.unwrap().into_option().unwrap();
        assert_eq!(observed.state.time_series, Some(ts));
        assert!(observed.warnings.is_empty());
    }

    #[tokio::test]
    async fn update_sends_only_changed_fields() {
        let (driver, store) = driver();
        let ctx = CallContext::new();
        let recorded = CollectionResource::new("app", "users").with_validator(SCHEMA);
        driver.create(&ctx, recorded.clone()).await.unwrap();

        let desired = CollectionResource {
            validation_level: ValidationLevel::Moderate,
            ..recorded.clone()
        };
        driver.update(&ctx, desired, &recorded).await.unwrap();

        let sent = modify_commands(&store);
        assert_eq!(sent, vec![doc! { "collMod": "users", "validationLevel": "moderate" }]);
    }

    #[tokio::test]
    async fn clearing_validator_sends_empty_document() {
        let (driver, store) = driver();
        let ctx = CallContext::new();
        let recorded = CollectionResource::new("app", "users").with_validator(SCHEMA);
        driver.create(&ctx, recorded.clone()).await.unwrap();

        let desired = CollectionResource {
            validator: None,
            ..recorded.clone()
        };
        driver.update(&ctx, desired.clone(), &recorded).await.unwrap();

        let sent = modify_commands(&store);
        assert_eq!(sent, vec![doc! { "collMod": "users", "validator": {} }]);

        let observed = driver.read(&ctx, &desired).await.unwrap().into_option().unwrap();
        assert_eq!(observed.state.validator, None);
    }

    #[tokio::test]
    async fn unchanged_update_issues_no_command() {
        let (driver, store) = driver();
        let ctx = CallContext::new();
        let recorded = CollectionResource::new("app", "users");
        driver.create(&ctx, recorded.clone()).await.unwrap();

        driver.update(&ctx, recorded.clone(), &recorded).await.unwrap();
        assert!(modify_commands(&store).is_empty());
    }

    #[tokio::test]
    async fn immutable_changes_are_refused() {
        let (driver, store) = driver();
        let ctx = CallContext::new();
        let mut ts = TimeSeries::new("ts");
        ts.granularity = Some(Granularity::Seconds);
        let recorded = CollectionResource::new("metrics", "events").with_time_series(ts);

        let mut desired = recorded.clone();
        desired.validation_action = ValidationAction::Warn;
        if let Some(ts) = desired.time_series.as_mut() {
            ts.granularity = Some(Granularity::Hours);
        }

        let err = driver.update(&ctx, desired, &recorded).await.unwrap_err();
        assert!(matches!(
            err,
            Error::ReplaceRequired { ref fields, .. } if fields == &["timeSeries.granularity"]
        ));
        assert!(store.commands().is_empty());
    }

    #[tokio::test]
    async fn missing_collection_reads_absent_but_lookup_fails() {
        let (driver, _) = driver();
        let ctx = CallContext::new();
        let outcome = driver
            .read(&ctx, &CollectionResource::new("app", "ghosts"))
            .await
            .unwrap();
        assert_eq!(outcome, ReadOutcome::Absent);

        let err = driver.lookup(&ctx, "app/ghosts").await.unwrap_err();
        assert!(matches!(err, Error::NotFound { kind: ResourceKind::Collection, .. }));
        assert!(driver.lookup(&ctx, "app").await.unwrap_err().is_validation());
    }

    #[tokio::test]
    async fn delete_drops_collection() {
        let (driver, store) = driver();
        let ctx = CallContext::new();
        let recorded = driver
            .create(&ctx, CollectionResource::new("app", "users"))
            .await
            .unwrap();
        driver.delete(&ctx, &recorded.state).await.unwrap();
        assert!(store.collection_options("app", "users").is_none());
    }
}

//! In-memory store.
//!
//! A [`StoreClient`] that keeps databases, collections and index
//! specifications in process, answering with the same document shapes and
//! error codes a MongoDB server uses. Drivers are tested against it, and it
//! can back an embedded engine that has no server to talk to.

use crate::store::{StoreClient, StoreError, StoreResult};
use async_trait::async_trait;
use bson::{doc, Bson, Document};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

/// Name of the index every plain collection starts with.
const ID_INDEX: &str = "_id_";

#[derive(Debug, Clone, Default)]
struct CollectionState {
    options: Document,
    indexes: Vec<Document>,
}

impl CollectionState {
    fn new(options: Document) -> Self {
        let mut indexes = Vec::new();
        if !options.contains_key("timeseries") {
            indexes.push(doc! { "v": 2, "key": { "_id": 1 }, "name": ID_INDEX });
        }
        Self { options, indexes }
    }

    fn is_time_series(&self) -> bool {
        self.options.contains_key("timeseries")
    }
}

#[derive(Debug, Default)]
struct State {
    databases: BTreeMap<String, BTreeMap<String, CollectionState>>,
    commands: Vec<(String, Document)>,
    failures: HashMap<String, StoreError>,
    /// Extra `listCollections` entries, keyed by database.
    planted_specs: Vec<(String, Document)>,
}

impl State {
    fn take_failure(&mut self, operation: &str) -> StoreResult<()> {
        match self.failures.remove(operation) {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn collection(&self, database: &str, name: &str) -> Option<&CollectionState> {
        self.databases.get(database).and_then(|db| db.get(name))
    }

    fn collection_mut(&mut self, database: &str, name: &str) -> Option<&mut CollectionState> {
        self.databases.get_mut(database).and_then(|db| db.get_mut(name))
    }

    fn create(&mut self, database: &str, name: &str, options: Document) -> StoreResult<()> {
        let db = self.databases.entry(database.to_string()).or_default();
        if db.contains_key(name) {
            return Err(StoreError::NamespaceExists(format!(
                "Collection {database}.{name} already exists."
            )));
        }
        db.insert(name.to_string(), CollectionState::new(options));
        Ok(())
    }

    fn drop_collection(&mut self, database: &str, name: &str) -> bool {
        let removed = self
            .databases
            .get_mut(database)
            .map(|db| db.remove(name).is_some())
            .unwrap_or(false);
        if self
            .databases
            .get(database)
            .map(BTreeMap::is_empty)
            .unwrap_or(false)
        {
            self.databases.remove(database);
        }
        removed
    }
}

/// Shared in-memory store. Clones see the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call of `operation` fail with `err`.
    ///
    /// Operation names are the [`StoreClient`] method names.
    pub fn fail_next(&self, operation: &str, err: StoreError) {
        self.state.lock().failures.insert(operation.to_string(), err);
    }

    /// Commands received through `run_command`, oldest first.
    pub fn commands(&self) -> Vec<(String, Document)> {
        self.state.lock().commands.clone()
    }

    /// The stored creation options of a collection.
    pub fn collection_options(&self, database: &str, name: &str) -> Option<Document> {
        self.state
            .lock()
            .collection(database, name)
            .map(|c| c.options.clone())
    }

    /// Store a raw index specification, creating the collection if needed.
    ///
    /// Lets tests plant shapes the engine itself never creates, such as
    /// geospatial or text keys.
    pub fn insert_index_spec(&self, database: &str, collection: &str, spec: Document) {
        let mut state = self.state.lock();
        let db = state.databases.entry(database.to_string()).or_default();
        db.entry(collection.to_string())
            .or_insert_with(|| CollectionState::new(Document::new()))
            .indexes
            .push(spec);
    }

    /// Report an extra `listCollections` entry for `database`.
    ///
    /// The entry is returned next to the real one when its `name` matches,
    /// which a healthy server never does.
    pub fn insert_collection_spec(&self, database: &str, spec: Document) {
        self.state
            .lock()
            .planted_specs
            .push((database.to_string(), spec));
    }

    fn collection_spec(name: &str, collection: &CollectionState) -> Document {
        let kind = if collection.is_time_series() {
            "timeseries"
        } else {
            "collection"
        };
        doc! {
            "name": name,
            "type": kind,
            "options": collection.options.clone(),
            "info": { "readOnly": false },
        }
    }
}

/// Default index name the server derives from a key pattern.
fn generated_name(keys: &Document) -> String {
    keys.iter()
        .map(|(field, value)| match value {
            Bson::String(s) => format!("{field}_{s}"),
            other => format!("{field}_{other}"),
        })
        .collect::<Vec<_>>()
        .join("_")
}

fn without(doc: &Document, keys: &[&str]) -> Document {
    doc.iter()
        .filter(|(k, _)| !keys.contains(&k.as_str()))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn ok() -> Document {
    doc! { "ok": 1.0 }
}

#[async_trait]
impl StoreClient for MemoryStore {
    async fn ping(&self) -> StoreResult<()> {
        self.state.lock().take_failure("ping")
    }

    async fn list_database_names(&self, name: Option<&str>) -> StoreResult<Vec<String>> {
        let mut state = self.state.lock();
        state.take_failure("list_database_names")?;
        Ok(state
            .databases
            .iter()
            .filter(|(db, collections)| {
                !collections.is_empty() && name.map(|n| n == db.as_str()).unwrap_or(true)
            })
            .map(|(db, _)| db.clone())
            .collect())
    }

    async fn list_collection_names(&self, database: &str) -> StoreResult<Vec<String>> {
        let mut state = self.state.lock();
        state.take_failure("list_collection_names")?;
        Ok(state
            .databases
            .get(database)
            .map(|db| db.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn list_collection_specs(
        &self,
        database: &str,
        name: &str,
    ) -> StoreResult<Vec<Document>> {
        let mut state = self.state.lock();
        state.take_failure("list_collection_specs")?;
        let mut specs: Vec<Document> = state
            .collection(database, name)
            .map(|c| vec![Self::collection_spec(name, c)])
            .unwrap_or_default();
        specs.extend(
            state
                .planted_specs
                .iter()
                .filter(|(db, spec)| {
                    db == database && spec.get_str("name").map(|n| n == name).unwrap_or(false)
                })
                .map(|(_, spec)| spec.clone()),
        );
        Ok(specs)
    }

    async fn create_collection(
        &self,
        database: &str,
        name: &str,
        options: Document,
    ) -> StoreResult<()> {
        let mut state = self.state.lock();
        state.take_failure("create_collection")?;
        state.create(database, name, options)
    }

    async fn drop_collection(&self, database: &str, name: &str) -> StoreResult<()> {
        let mut state = self.state.lock();
        state.take_failure("drop_collection")?;
        // dropping a missing collection is not an error at this level
        state.drop_collection(database, name);
        Ok(())
    }

    async fn drop_database(&self, database: &str) -> StoreResult<()> {
        let mut state = self.state.lock();
        state.take_failure("drop_database")?;
        state.databases.remove(database);
        Ok(())
    }

    async fn run_command(&self, database: &str, command: Document) -> StoreResult<Document> {
        let mut state = self.state.lock();
        state.take_failure("run_command")?;
        state
            .commands
            .push((database.to_string(), command.clone()));

        let Some((name, target)) = command.iter().next() else {
            return Err(StoreError::Command {
                code: 59,
                message: "empty command".into(),
            });
        };

        match (name.as_str(), target) {
            ("ping", _) => Ok(ok()),
            ("create", Bson::String(collection)) => {
                let options = without(&command, &["create"]);
                state.create(database, collection, options)?;
                Ok(ok())
            }
            ("drop", Bson::String(collection)) => {
                if state.drop_collection(database, collection) {
                    Ok(ok())
                } else {
                    Err(StoreError::NamespaceNotFound("ns not found".into()))
                }
            }
            ("collMod", Bson::String(collection)) => {
                let Some(target) = state.collection_mut(database, collection) else {
                    return Err(StoreError::NamespaceNotFound(format!(
                        "ns does not exist: {database}.{collection}"
                    )));
                };
                for (key, value) in command.iter().skip(1) {
                    match key.as_str() {
                        "validator" | "validationLevel" | "validationAction" => {
                            target.options.insert(key.clone(), value.clone());
                        }
                        other => {
                            return Err(StoreError::Command {
                                code: 72,
                                message: format!("unsupported collMod option: {other}"),
                            })
                        }
                    }
                }
                Ok(ok())
            }
            ("dropDatabase", _) => {
                state.databases.remove(database);
                Ok(ok())
            }
            (other, _) => Err(StoreError::Command {
                code: 59,
                message: format!("no such command: '{other}'"),
            }),
        }
    }

    async fn list_index_specs(
        &self,
        database: &str,
        collection: &str,
    ) -> StoreResult<Vec<Document>> {
        let mut state = self.state.lock();
        state.take_failure("list_index_specs")?;
        Ok(state
            .collection(database, collection)
            .map(|c| c.indexes.clone())
            .unwrap_or_default())
    }

    async fn create_index(
        &self,
        database: &str,
        collection: &str,
        spec: Document,
    ) -> StoreResult<String> {
        let mut state = self.state.lock();
        state.take_failure("create_index")?;

        let keys = spec
            .get_document("key")
            .map_err(|_| StoreError::Command {
                code: 67,
                message: "index specification has no key pattern".into(),
            })?
            .clone();
        let name = match spec.get_str("name") {
            Ok(name) => name.to_string(),
            Err(_) => generated_name(&keys),
        };

        if state.collection(database, collection).is_none() {
            state.create(database, collection, Document::new())?;
        }
        let Some(target) = state.collection_mut(database, collection) else {
            return Err(StoreError::NamespaceNotFound(format!(
                "{database}.{collection}"
            )));
        };

        let mut stored = doc! { "v": 2, "key": keys, "name": name.as_str() };
        for (k, v) in without(&spec, &["key", "name", "v"]) {
            stored.insert(k, v);
        }

        if let Some(existing) = target
            .indexes
            .iter()
            .find(|i| i.get_str("name").map(|n| n == name).unwrap_or(false))
        {
            // identical definitions are accepted silently, like the server
            if without(existing, &["v"]) == without(&stored, &["v"]) {
                return Ok(name);
            }
            return Err(StoreError::Command {
                code: 86,
                message: format!(
                    "An existing index has the same name as the requested index. Requested index: {stored}, existing index: {existing}"
                ),
            });
        }

        target.indexes.push(stored);
        Ok(name)
    }

    async fn drop_index(&self, database: &str, collection: &str, name: &str) -> StoreResult<()> {
        let mut state = self.state.lock();
        state.take_failure("drop_index")?;

        let Some(target) = state.collection_mut(database, collection) else {
            return Err(StoreError::NamespaceNotFound(format!(
                "ns not found {database}.{collection}"
            )));
        };
        if name == ID_INDEX {
            return Err(StoreError::Command {
                code: 72,
                message: "cannot drop _id index".into(),
            });
        }

        let before = target.indexes.len();
        target
            .indexes
            .retain(|i| i.get_str("name").map(|n| n != name).unwrap_or(true));
        if target.indexes.len() == before {
            return Err(StoreError::IndexNotFound(format!(
                "index not found with name [{name}]"
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn databases_exist_only_with_collections() -> StoreResult<()> {
        let store = MemoryStore::new();
        assert!(store.list_database_names(None).await?.is_empty());

        store.create_collection("app", "users", Document::new()).await?;
        assert_eq!(store.list_database_names(Some("app")).await?, vec!["app"]);
        assert!(store.list_database_names(Some("other")).await?.is_empty());

        store.drop_collection("app", "users").await?;
        assert!(store.list_database_names(None).await?.is_empty());
        Ok(())
    }

    #[tokio::test]
    async fn create_command_reports_existing_namespace() -> StoreResult<()> {
        let store = MemoryStore::new();
        store.run_command("app", doc! { "create": "users" }).await?;
        let err = store
            .run_command("app", doc! { "create": "users" })
            .await
            .unwrap_err();
        assert!(err.is_namespace_exists());

        let err = store
            .run_command("app", doc! { "drop": "missing" })
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        Ok(())
    }

    #[tokio::test]
    async fn coll_mod_updates_options() -> StoreResult<()> {
        let store = MemoryStore::new();
        store
            .create_collection("app", "users", doc! { "validationLevel": "strict" })
            .await?;
        store
            .run_command(
                "app",
                doc! { "collMod": "users", "validationLevel": "moderate" },
            )
            .await?;

        let options = store.collection_options("app", "users").unwrap();
        assert_eq!(options.get_str("validationLevel").unwrap(), "moderate");

        let err = store
            .run_command("app", doc! { "collMod": "users", "timeseries": {} })
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Command { code: 72, .. }));
        Ok(())
    }

    #[tokio::test]
    async fn index_lifecycle() -> StoreResult<()> {
        let store = MemoryStore::new();
        let spec = doc! { "key": { "email": 1 }, "name": "users_email", "unique": true };

        let name = store.create_index("app", "users", spec.clone()).await?;
        assert_eq!(name, "users_email");
        // same definition again is accepted
        store.create_index("app", "users", spec).await?;

        let conflicting = doc! { "key": { "email": -1 }, "name": "users_email" };
        assert!(store.create_index("app", "users", conflicting).await.is_err());

        let specs = store.list_index_specs("app", "users").await?;
        assert_eq!(specs.len(), 2);

        store.drop_index("app", "users", "users_email").await?;
        let err = store
            .drop_index("app", "users", "users_email")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        Ok(())
    }

    #[tokio::test]
    async fn generated_index_names_follow_key_pattern() -> StoreResult<()> {
        let store = MemoryStore::new();
        let name = store
            .create_index("app", "users", doc! { "key": { "email": 1, "created": -1 } })
            .await?;
        assert_eq!(name, "email_1_created_-1");
        Ok(())
    }

    #[tokio::test]
    async fn injected_failures_fire_once() {
        let store = MemoryStore::new();
        store.fail_next("ping", StoreError::Transport("connection reset".into()));
        assert!(store.ping().await.is_err());
        assert!(store.ping().await.is_ok());
    }
}

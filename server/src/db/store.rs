//! Store client backed by a live MongoDB deployment.
//!
//! Every operation is a plain administrative command, so the documents
//! handed to the engine are exactly what the server reported.

use async_trait::async_trait;
use keel_engine::{StoreClient, StoreError, StoreResult};
use mongodb::bson::{doc, Bson, Document};
use mongodb::error::ErrorKind;
use mongodb::{Client, Cursor};

/// [`StoreClient`] over a pooled `mongodb::Client`.
#[derive(Clone, Debug)]
pub struct MongoStore {
    client: Client,
}

impl MongoStore {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn command(&self, database: &str, command: Document) -> StoreResult<Document> {
        let name = command.keys().next().cloned().unwrap_or_default();
        tracing::debug!(database, command = %name, "running command");
        self.client
            .database(database)
            .run_command(command)
            .await
            .map_err(store_error)
    }

    async fn cursor_command(&self, database: &str, command: Document) -> StoreResult<Vec<Document>> {
        let name = command.keys().next().cloned().unwrap_or_default();
        tracing::debug!(database, command = %name, "running cursor command");
        let cursor = self
            .client
            .database(database)
            .run_cursor_command(command)
            .await
            .map_err(store_error)?;
        drain(cursor).await
    }
}

async fn drain(mut cursor: Cursor<Document>) -> StoreResult<Vec<Document>> {
    let mut documents = Vec::new();
    while cursor.advance().await.map_err(store_error)? {
        documents.push(cursor.deserialize_current().map_err(store_error)?);
    }
    Ok(documents)
}

/// Classify a driver error by server code; anything else is transport.
fn store_error(err: mongodb::error::Error) -> StoreError {
    match err.kind.as_ref() {
        ErrorKind::Command(command) => StoreError::from_code(command.code, command.message.clone()),
        _ => StoreError::Transport(err.to_string()),
    }
}

#[async_trait]
impl StoreClient for MongoStore {
    async fn ping(&self) -> StoreResult<()> {
        self.command("admin", doc! { "ping": 1 }).await.map(|_| ())
    }

    async fn list_database_names(&self, name: Option<&str>) -> StoreResult<Vec<String>> {
        let mut command = doc! { "listDatabases": 1, "nameOnly": true };
        if let Some(name) = name {
            command.insert("filter", doc! { "name": name });
        }
        let reply = self.command("admin", command).await?;

        let databases = reply.get_array("databases").map_err(|e| StoreError::Command {
            code: 0,
            message: format!("malformed listDatabases reply: {e}"),
        })?;
        Ok(databases
            .iter()
            .filter_map(|db| match db {
                Bson::Document(db) => db.get_str("name").ok().map(str::to_string),
                _ => None,
            })
            .collect())
    }

    async fn list_collection_names(&self, database: &str) -> StoreResult<Vec<String>> {
        let specs = self
            .cursor_command(database, doc! { "listCollections": 1, "nameOnly": true })
            .await?;
        Ok(specs
            .iter()
            .filter_map(|spec| spec.get_str("name").ok().map(str::to_string))
            .collect())
    }

    async fn list_collection_specs(
        &self,
        database: &str,
        name: &str,
    ) -> StoreResult<Vec<Document>> {
        self.cursor_command(
            database,
            doc! { "listCollections": 1, "filter": { "name": name } },
        )
        .await
    }

    async fn create_collection(
        &self,
        database: &str,
        name: &str,
        options: Document,
    ) -> StoreResult<()> {
        let mut command = doc! { "create": name };
        for (key, value) in options {
            command.insert(key, value);
        }
        self.command(database, command).await.map(|_| ())
    }

    async fn drop_collection(&self, database: &str, name: &str) -> StoreResult<()> {
        match self.command(database, doc! { "drop": name }).await {
            Err(StoreError::NamespaceNotFound(_)) => Ok(()),
            other => other.map(|_| ()),
        }
    }

    async fn drop_database(&self, database: &str) -> StoreResult<()> {
        self.command(database, doc! { "dropDatabase": 1 })
            .await
            .map(|_| ())
    }

    async fn run_command(&self, database: &str, command: Document) -> StoreResult<Document> {
        self.command(database, command).await
    }

    async fn list_index_specs(
        &self,
        database: &str,
        collection: &str,
    ) -> StoreResult<Vec<Document>> {
        match self
            .cursor_command(database, doc! { "listIndexes": collection })
            .await
        {
            // a collection that does not exist has no indexes
            Err(StoreError::NamespaceNotFound(_)) => Ok(Vec::new()),
            other => other,
        }
    }

    async fn create_index(
        &self,
        database: &str,
        collection: &str,
        spec: Document,
    ) -> StoreResult<String> {
        let name = spec
            .get_str("name")
            .map(str::to_string)
            .map_err(|_| StoreError::Command {
                code: 67,
                message: "index specification has no name".into(),
            })?;
        self.command(
            database,
            doc! { "createIndexes": collection, "indexes": [spec] },
        )
        .await?;
        Ok(name)
    }

    async fn drop_index(&self, database: &str, collection: &str, name: &str) -> StoreResult<()> {
        self.command(
            database,
            doc! { "dropIndexes": collection, "index": name },
        )
        .await
        .map(|_| ())
    }
}

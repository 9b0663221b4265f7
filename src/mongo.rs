// MongoDB adapter
// QueryBackend and Connector over the official driver. Everything above this
// module only ever sees the traits.

use crate::contracts::{Connector, QueryBackend};
use crate::types::FindQuery;
use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::TryStreamExt;
use mongodb::bson::{doc, Document};
use mongodb::options::{ClientOptions, FindOptions, Hint};
use mongodb::{Client, Collection};
use std::time::Duration;
use tracing::{debug, info};

pub const APP_NAME: &str = "index-perf";

/// Connects to a MongoDB deployment from a connection string
#[derive(Debug, Clone)]
pub struct MongoConnector {
    uri: String,
    server_selection_timeout: Option<Duration>,
}

impl MongoConnector {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            server_selection_timeout: None,
        }
    }

    /// Bound how long a single connection attempt waits for a usable server
    pub fn with_server_selection_timeout(mut self, timeout: Duration) -> Self {
        self.server_selection_timeout = Some(timeout);
        self
    }
}

#[async_trait]
impl Connector for MongoConnector {
    type Backend = MongoBackend;

    async fn connect(&self) -> Result<MongoBackend> {
        let mut options = ClientOptions::parse(self.uri.as_str())
            .await
            .context("Failed to parse MongoDB connection string")?;
        options.app_name = Some(APP_NAME.to_string());
        if let Some(timeout) = self.server_selection_timeout {
            options.server_selection_timeout = Some(timeout);
        }

        let client = Client::with_options(options).context("Failed to create MongoDB client")?;

        // The driver connects lazily; force a round trip so an unreachable
        // server fails here rather than in the first trial.
        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .context("Failed to reach MongoDB server")?;

        info!("Connected to MongoDB");
        Ok(MongoBackend { client })
    }
}

/// A connected client
#[derive(Debug, Clone)]
pub struct MongoBackend {
    client: Client,
}

impl MongoBackend {
    fn collection(&self, query: &FindQuery) -> Collection<Document> {
        self.client
            .database(&query.namespace.database)
            .collection::<Document>(&query.namespace.collection)
    }

    fn find_options(query: &FindQuery) -> FindOptions {
        FindOptions::builder()
            .projection(query.projection.clone())
            .sort(query.sort.clone())
            .skip(query.skip)
            .limit(query.limit)
            .hint(query.hint.clone().map(Hint::Keys))
            .build()
    }
}

#[async_trait]
impl QueryBackend for MongoBackend {
    async fn execute_find(&self, query: &FindQuery) -> Result<Vec<Document>> {
        let cursor = self
            .collection(query)
            .find(query.filter.clone())
            .with_options(Self::find_options(query))
            .await
            .with_context(|| format!("Failed to query {}", query.namespace))?;

        cursor
            .try_collect()
            .await
            .with_context(|| format!("Failed to drain cursor for {}", query.namespace))
    }

    async fn explain(&self, query: &FindQuery) -> Result<Document> {
        let command = doc! {
            "explain": query.to_find_command(),
            "verbosity": "executionStats",
        };
        self.run_command(&query.namespace.database, command)
            .await
            .with_context(|| format!("Failed to explain query on {}", query.namespace))
    }

    async fn run_command(&self, database: &str, command: Document) -> Result<Document> {
        let name = command.keys().next().cloned().unwrap_or_default();
        debug!(database = %database, command = %name, "Running command");

        self.client
            .database(database)
            .run_command(command)
            .await
            .with_context(|| format!("Command {name} on {database} failed"))
    }

    async fn close(self) -> Result<()> {
        self.client.shutdown().await;
        info!("MongoDB connection closed");
        Ok(())
    }
}

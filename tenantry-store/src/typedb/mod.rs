//! TypeDB backend. Each partition is its own TypeDB database holding
//! documents as `document` entities with a JSON `body`.
//!
//! Lookups are keyed by the filter's canonical form, so a document is found
//! with the same filter it was upserted with.

mod transactions;

use std::collections::HashSet;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::info;
use typedb_driver::{Credentials, DriverOptions, TypeDBDriver};

use tenantry_core::{PartitionName, TenantryConfigSnapshot};

use crate::connector::DatabaseConnector;
use crate::document::{DocumentClient, DocumentFilter};
use crate::error::StoreError;

use transactions::{define_schema, quote, read_rows, write_all};

const DOCUMENT_SCHEMA: &str = r#"define
  attribute collection, value string;
  attribute doc-key, value string;
  attribute body, value string;
  entity document, owns collection, owns doc-key, owns body;
"#;

#[derive(Debug, Clone)]
pub struct TypeDBConnector {
    address: String,
    username: String,
    password: String,
    tls: bool,
}

impl TypeDBConnector {
    pub fn new(
        address: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        tls: bool,
    ) -> Self {
        Self {
            address: address.into(),
            username: username.into(),
            password: password.into(),
            tls,
        }
    }

    /// Reads `typedb.address`, `typedb.username`, `typedb.password` and `typedb.tls`.
    pub fn from_config(cfg: &TenantryConfigSnapshot) -> Self {
        Self::new(
            cfg.get_string("typedb.address").unwrap_or_else(|| "127.0.0.1:1729".to_string()),
            cfg.get_string("typedb.username").unwrap_or_else(|| "admin".to_string()),
            cfg.get_string("typedb.password").unwrap_or_else(|| "password".to_string()),
            cfg.get_bool("typedb.tls").unwrap_or(false),
        )
    }
}

#[async_trait]
impl DatabaseConnector for TypeDBConnector {
    type Client = TypeDBDocuments;

    async fn connect(&self) -> Result<Self::Client> {
        let options = DriverOptions::new(self.tls, None).map_err(|e| anyhow!(e))?;
        let credentials = Credentials::new(&self.username, &self.password);
        let driver = TypeDBDriver::new(&self.address, credentials, options)
            .await
            .map_err(|e| anyhow!(e))?;
        Ok(TypeDBDocuments::new(Arc::new(driver)))
    }

    fn endpoint(&self) -> String {
        format!("typedb://{}", self.address)
    }
}

pub struct TypeDBDocuments {
    driver: Arc<TypeDBDriver>,
    ready: Mutex<HashSet<String>>,
}

impl TypeDBDocuments {
    pub fn new(driver: Arc<TypeDBDriver>) -> Self {
        Self {
            driver,
            ready: Mutex::new(HashSet::new()),
        }
    }

    /// Create the partition's database and schema on first use.
    async fn ensure_partition(&self, partition: &PartitionName) -> Result<()> {
        let name = partition.as_str();
        if self.ready.lock().contains(name) {
            return Ok(());
        }

        let exists = self
            .driver
            .databases()
            .all()
            .await
            .map_err(|e| anyhow!("{}", e))?
            .iter()
            .any(|db| db.name() == name);
        if !exists {
            info!(partition = name, "Creating TypeDB database");
            self.driver
                .databases()
                .create(name)
                .await
                .map_err(|e| anyhow!("{}", e))?;
        }
        define_schema(&self.driver, name, DOCUMENT_SCHEMA).await?;

        self.ready.lock().insert(name.to_string());
        Ok(())
    }
}

#[async_trait]
impl DocumentClient for TypeDBDocuments {
    async fn find_one(
        &self,
        partition: &PartitionName,
        collection: &str,
        filter: &DocumentFilter,
    ) -> Result<Option<Value>> {
        self.ensure_partition(partition).await?;
        let query = format!(
            "match $d isa document, has collection {}, has doc-key {}, has body $b; select $b;",
            quote(collection),
            quote(&filter.canonical_key()),
        );

        let rows = read_rows(&self.driver, partition.as_str(), &query).await?;
        let Some(body) = rows.into_iter().find_map(|mut row| row.remove("b")) else {
            return Ok(None);
        };
        let Value::String(raw) = body else {
            return Err(StoreError::MalformedDocument {
                collection: collection.to_string(),
                message: "body is not a string".to_string(),
            }
            .into());
        };

        let doc = serde_json::from_str(&raw).map_err(|e| StoreError::MalformedDocument {
            collection: collection.to_string(),
            message: e.to_string(),
        })?;
        Ok(Some(doc))
    }

    async fn upsert_one(
        &self,
        partition: &PartitionName,
        collection: &str,
        filter: &DocumentFilter,
        document: Value,
    ) -> Result<()> {
        self.ensure_partition(partition).await?;
        let collection = quote(collection);
        let key = quote(&filter.canonical_key());
        let body = quote(&serde_json::to_string(&document)?);

        let selector = format!("has collection {collection}, has doc-key {key}");
        let queries = [
            format!("match $d isa document, {selector}; delete $d;"),
            format!("insert $d isa document, {selector}, has body {body};"),
        ];
        write_all(&self.driver, partition.as_str(), &queries).await
    }

    async fn ping(&self) -> Result<()> {
        self.driver
            .databases()
            .all()
            .await
            .map(|_| ())
            .map_err(|e| anyhow!("{}", e))
    }
}

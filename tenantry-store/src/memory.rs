use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;

use tenantry_core::PartitionName;

use crate::connector::DatabaseConnector;
use crate::document::{DocumentClient, DocumentFilter};
use crate::error::StoreError;

type Collections = HashMap<String, Vec<Value>>;

/// In-memory document database, partitioned like the real one.
///
/// Clones share state, so a test can keep one handle for seeding and
/// assertions while the manager owns another.
#[derive(Clone, Default)]
pub struct MemoryDocumentDb {
    partitions: Arc<RwLock<HashMap<String, Collections>>>,
    writes: Arc<AtomicUsize>,
    unreachable: Arc<AtomicBool>,
}

impl MemoryDocumentDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a document without counting it as a write.
    pub fn insert(&self, partition: &PartitionName, collection: &str, document: Value) {
        self.partitions
            .write()
            .entry(partition.as_str().to_string())
            .or_default()
            .entry(collection.to_string())
            .or_default()
            .push(document);
    }

    pub fn documents(&self, partition: &PartitionName, collection: &str) -> Vec<Value> {
        self.partitions
            .read()
            .get(partition.as_str())
            .and_then(|c| c.get(collection))
            .cloned()
            .unwrap_or_default()
    }

    /// Upserts performed through the client since creation.
    pub fn write_count(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    /// Make every subsequent call fail until cleared.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    fn check_reachable(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("memory store unreachable".to_string()).into());
        }
        Ok(())
    }
}

#[async_trait]
impl DocumentClient for MemoryDocumentDb {
    async fn find_one(
        &self,
        partition: &PartitionName,
        collection: &str,
        filter: &DocumentFilter,
    ) -> Result<Option<Value>> {
        self.check_reachable()?;
        let partitions = self.partitions.read();
        Ok(partitions
            .get(partition.as_str())
            .and_then(|c| c.get(collection))
            .and_then(|docs| docs.iter().find(|d| filter.matches(d)).cloned()))
    }

    async fn upsert_one(
        &self,
        partition: &PartitionName,
        collection: &str,
        filter: &DocumentFilter,
        document: Value,
    ) -> Result<()> {
        self.check_reachable()?;
        let mut partitions = self.partitions.write();
        let docs = partitions
            .entry(partition.as_str().to_string())
            .or_default()
            .entry(collection.to_string())
            .or_default();

        match docs.iter_mut().find(|d| filter.matches(d)) {
            Some(existing) => *existing = document,
            None => docs.push(document),
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        self.check_reachable()
    }
}

/// Connector handing out clones of one [`MemoryDocumentDb`].
#[derive(Clone, Default)]
pub struct MemoryConnector {
    db: MemoryDocumentDb,
    failures_left: Arc<AtomicU32>,
    attempts: Arc<AtomicU32>,
}

impl MemoryConnector {
    pub fn new(db: MemoryDocumentDb) -> Self {
        Self {
            db,
            ..Default::default()
        }
    }

    /// Fail the next `n` connect attempts.
    pub fn fail_next(&self, n: u32) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    /// Connect attempts seen, failed ones included.
    pub fn attempt_count(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn db(&self) -> &MemoryDocumentDb {
        &self.db
    }
}

#[async_trait]
impl DatabaseConnector for MemoryConnector {
    type Client = MemoryDocumentDb;

    async fn connect(&self) -> Result<Self::Client> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let failed = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            anyhow::bail!("connection refused");
        }
        Ok(self.db.clone())
    }

    fn endpoint(&self) -> String {
        "memory://".to_string()
    }
}

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

use tenantry_core::PartitionName;

/// Equality filter over top-level document fields.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentFilter {
    fields: Vec<(String, Value)>,
}

impl DocumentFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Filter on a single field.
    pub fn by<K: Into<String>, V: Into<Value>>(field: K, value: V) -> Self {
        Self::new().and(field, value)
    }

    pub fn and<K: Into<String>, V: Into<Value>>(mut self, field: K, value: V) -> Self {
        self.fields.push((field.into(), value.into()));
        self
    }

    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    pub fn matches(&self, document: &Value) -> bool {
        self.fields
            .iter()
            .all(|(field, expected)| document.get(field) == Some(expected))
    }

    /// Stable textual form, `a=1&b="x"` with fields sorted by name.
    pub fn canonical_key(&self) -> String {
        let mut parts: Vec<String> = self
            .fields
            .iter()
            .map(|(field, value)| match value {
                Value::String(s) => format!("{field}={s}"),
                other => format!("{field}={other}"),
            })
            .collect();
        parts.sort();
        parts.join("&")
    }
}

/// Minimal document access the directory and domain handlers need.
///
/// Every call names its partition; a client never remembers one.
#[async_trait]
pub trait DocumentClient: Send + Sync + 'static {
    async fn find_one(
        &self,
        partition: &PartitionName,
        collection: &str,
        filter: &DocumentFilter,
    ) -> Result<Option<Value>>;

    /// Replace the first document matching `filter`, or insert `document`.
    async fn upsert_one(
        &self,
        partition: &PartitionName,
        collection: &str,
        filter: &DocumentFilter,
        document: Value,
    ) -> Result<()>;

    /// Cheap round trip used by health checks.
    async fn ping(&self) -> Result<()>;
}

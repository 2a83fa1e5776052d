use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;

use tenantry_core::ConnectSettings;

use crate::document::DocumentClient;

/// Opens clients to a multi-tenant document database.
#[async_trait]
pub trait DatabaseConnector: Send + Sync + 'static {
    type Client: DocumentClient;

    /// One connection attempt. Retrying is the manager's job.
    async fn connect(&self) -> Result<Self::Client>;

    /// Human readable target, used in logs and errors.
    fn endpoint(&self) -> String;
}

/// Bounds on connection retries: attempt count, fixed backoff, total time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Duration,
    pub deadline: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&ConnectSettings::default())
    }
}

impl From<&ConnectSettings> for RetryPolicy {
    fn from(settings: &ConnectSettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            backoff: settings.backoff,
            deadline: settings.deadline,
        }
    }
}

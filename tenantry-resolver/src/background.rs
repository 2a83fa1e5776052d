//! Best-effort writes that must never block a request.
//!
//! Jobs go through a bounded queue to a single worker task. Every outcome
//! is logged and broadcast as a [`BackgroundEvent`].

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn, Instrument};

use tenantry_core::{
    AuthoritativeStore, NormalizedEmail, PartitionName, TenantAssignment, TenantCacheValue,
    TenantContext, TenantId,
};

use crate::tenant_cache::TenantCache;

#[derive(Debug, Clone)]
pub enum BackgroundJob {
    /// Write a freshly resolved assignment back to the cache.
    RepopulateCache {
        email: NormalizedEmail,
        assignment: TenantAssignment,
        partition: PartitionName,
    },
    /// Persist a committed switch in the authoritative store.
    RecordSwitch {
        email: NormalizedEmail,
        tenant_id: TenantId,
        switched_at: DateTime<Utc>,
    },
}

impl BackgroundJob {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RepopulateCache { .. } => "repopulate-cache",
            Self::RecordSwitch { .. } => "record-switch",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum BackgroundEvent {
    CacheRepopulated {
        email: String,
        partition: String,
        at: DateTime<Utc>,
    },
    RepopulateSkipped {
        email: String,
        reason: String,
        at: DateTime<Utc>,
    },
    RepopulateFailed {
        email: String,
        error: String,
        at: DateTime<Utc>,
    },
    SwitchRecorded {
        email: String,
        tenant_id: String,
        at: DateTime<Utc>,
    },
    SwitchRecordFailed {
        email: String,
        tenant_id: String,
        error: String,
        at: DateTime<Utc>,
    },
}

/// Returned when a job could not be queued.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum EnqueueError {
    #[error("Background queue is full, '{0}' job dropped")]
    Full(&'static str),
    #[error("Background worker has stopped, '{0}' job dropped")]
    Closed(&'static str),
}

/// Producer side of the background queue. Cheap to clone.
#[derive(Clone)]
pub struct BackgroundQueue {
    sender: mpsc::Sender<BackgroundJob>,
    events: broadcast::Sender<BackgroundEvent>,
}

impl BackgroundQueue {
    /// Creates the queue and spawns its worker on the current runtime.
    pub fn start(
        capacity: usize,
        cache: TenantCache,
        store: Arc<dyn AuthoritativeStore>,
        store_timeout: Duration,
    ) -> (Self, JoinHandle<()>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let (events, _) = broadcast::channel(1000);

        let worker = BackgroundWorker {
            receiver,
            events: events.clone(),
            cache,
            store,
            store_timeout,
        };
        let handle = tokio::spawn(worker.run().in_current_span());

        (Self { sender, events }, handle)
    }

    /// Queue a job without waiting for room.
    pub fn enqueue(&self, job: BackgroundJob) -> Result<(), EnqueueError> {
        let kind = job.kind();
        self.sender.try_send(job).map_err(|e| {
            let err = match e {
                mpsc::error::TrySendError::Full(_) => EnqueueError::Full(kind),
                mpsc::error::TrySendError::Closed(_) => EnqueueError::Closed(kind),
            };
            warn!(job = kind, error = %err, "Background job not queued");
            err
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<BackgroundEvent> {
        self.events.subscribe()
    }
}

struct BackgroundWorker {
    receiver: mpsc::Receiver<BackgroundJob>,
    events: broadcast::Sender<BackgroundEvent>,
    cache: TenantCache,
    store: Arc<dyn AuthoritativeStore>,
    store_timeout: Duration,
}

impl BackgroundWorker {
    async fn run(mut self) {
        debug!("Background worker started");
        while let Some(job) = self.receiver.recv().await {
            let event = match job {
                BackgroundJob::RepopulateCache {
                    email,
                    assignment,
                    partition,
                } => self.repopulate(email, assignment, partition).await,
                BackgroundJob::RecordSwitch {
                    email,
                    tenant_id,
                    switched_at,
                } => self.record_switch(email, tenant_id, switched_at).await,
            };
            let _ = self.events.send(event);
        }
        debug!("Background worker stopped");
    }

    async fn repopulate(
        &self,
        email: NormalizedEmail,
        assignment: TenantAssignment,
        partition: PartitionName,
    ) -> BackgroundEvent {
        let at = Utc::now();

        // A switch may have written a newer entry since resolution.
        match self.cache.try_get(&email).await {
            Ok(Some(_)) => {
                debug!(email = %email, "Cache already populated, skipping repopulation");
                return BackgroundEvent::RepopulateSkipped {
                    email: email.to_string(),
                    reason: "entry-exists".to_string(),
                    at,
                };
            }
            Ok(None) => {}
            Err(e) => {
                warn!(email = %email, error = %e, "Cache unavailable, repopulation abandoned");
                return BackgroundEvent::RepopulateFailed {
                    email: email.to_string(),
                    error: e.to_string(),
                    at,
                };
            }
        }

        let identity = match tokio::time::timeout(
            self.store_timeout,
            self.store.lookup_identity(&partition, &email),
        )
        .await
        {
            Ok(Ok(Some(identity))) => identity,
            Ok(Ok(None)) => {
                debug!(
                    email = %email,
                    partition = %partition,
                    "No identity in partition, skipping repopulation"
                );
                return BackgroundEvent::RepopulateSkipped {
                    email: email.to_string(),
                    reason: "no-identity".to_string(),
                    at,
                };
            }
            Ok(Err(e)) => {
                warn!(email = %email, error = %e, "Identity lookup failed during repopulation");
                return BackgroundEvent::RepopulateFailed {
                    email: email.to_string(),
                    error: e.to_string(),
                    at,
                };
            }
            Err(_) => {
                warn!(email = %email, "Identity lookup timed out during repopulation");
                return BackgroundEvent::RepopulateFailed {
                    email: email.to_string(),
                    error: format!("timed out after {:?}", self.store_timeout),
                    at,
                };
            }
        };

        let active = TenantContext::from_summary(&assignment.active, partition.clone());
        let result = match TenantCacheValue::new(active, assignment.available, identity) {
            // Conditional: a switch committed during the lookup above must win.
            Ok(value) => self.cache.put_if_absent(&email, &value).await.map_err(|e| e.to_string()),
            Err(e) => Err(e.to_string()),
        };

        match result {
            Ok(true) => {
                info!(email = %email, partition = %partition, "Tenant context cached");
                BackgroundEvent::CacheRepopulated {
                    email: email.to_string(),
                    partition: partition.to_string(),
                    at,
                }
            }
            Ok(false) => {
                debug!(email = %email, "Entry written while repopulating, keeping it");
                BackgroundEvent::RepopulateSkipped {
                    email: email.to_string(),
                    reason: "entry-exists".to_string(),
                    at,
                }
            }
            Err(error) => {
                warn!(email = %email, error = %error, "Cache repopulation failed");
                BackgroundEvent::RepopulateFailed {
                    email: email.to_string(),
                    error,
                    at,
                }
            }
        }
    }

    async fn record_switch(
        &self,
        email: NormalizedEmail,
        tenant_id: TenantId,
        switched_at: DateTime<Utc>,
    ) -> BackgroundEvent {
        let result = tokio::time::timeout(
            self.store_timeout,
            self.store.record_switch(&email, &tenant_id, switched_at),
        )
        .await;

        let error = match result {
            Ok(Ok(())) => {
                info!(email = %email, tenant = %tenant_id, "Tenant switch recorded");
                return BackgroundEvent::SwitchRecorded {
                    email: email.to_string(),
                    tenant_id: tenant_id.to_string(),
                    at: Utc::now(),
                };
            }
            Ok(Err(e)) => e.to_string(),
            Err(_) => format!("timed out after {:?}", self.store_timeout),
        };

        // The cache entry stays authoritative until its TTL runs out.
        warn!(
            email = %email,
            tenant = %tenant_id,
            error = %error,
            "Failed to record tenant switch"
        );
        BackgroundEvent::SwitchRecordFailed {
            email: email.to_string(),
            tenant_id: tenant_id.to_string(),
            error,
            at: Utc::now(),
        }
    }
}

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};

use crate::store::{ObjectKey, ObjectStore, StoreError};

/// Leader identity used for the lease holder field: `POD_NAME` when set
/// (the orchestrator injects it per §6.4), otherwise a random identity
/// so two local demo instances never collide.
pub fn pod_identity() -> String {
    std::env::var("POD_NAME").unwrap_or_else(|_| uuid::Uuid::new_v4().to_string())
}

/// Lease timing fixed by the shared-runtime contract: 15s duration, 10s
/// renew deadline, 2s retry period.
#[derive(Debug, Clone, Copy)]
pub struct LeaseConfig {
    pub lease_duration: Duration,
    pub renew_deadline: Duration,
    pub retry_period: Duration,
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            lease_duration: Duration::from_secs(15),
            renew_deadline: Duration::from_secs(10),
            retry_period: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LeaseRecord {
    holder_identity: String,
    acquired_at: chrono::DateTime<chrono::Utc>,
    renewed_at: chrono::DateTime<chrono::Utc>,
    duration_seconds: u64,
}

impl LeaseRecord {
    fn is_expired(&self, now: chrono::DateTime<chrono::Utc>) -> bool {
        let expiry = self.renewed_at + chrono::Duration::seconds(self.duration_seconds as i64);
        now > expiry
    }
}

/// Acquires a named lease in a configurable namespace. On loss of
/// leadership, callers are expected to exit the process non-zero so the
/// supervising workload restarts it — `run` drives that loop directly.
pub struct LeaderElector {
    store: std::sync::Arc<dyn ObjectStore>,
    lease_key: ObjectKey,
    identity: String,
    config: LeaseConfig,
}

impl LeaderElector {
    pub fn new(
        store: std::sync::Arc<dyn ObjectStore>,
        namespace: &str,
        lease_name: &str,
        identity: String,
        config: LeaseConfig,
    ) -> Self {
        Self {
            store,
            lease_key: ObjectKey::new("Lease", namespace, lease_name),
            identity,
            config,
        }
    }

    async fn try_acquire_or_renew(&self) -> Result<bool, StoreError> {
        let now = chrono::Utc::now();
        match self.store.get(&self.lease_key).await? {
            None => {
                let record = LeaseRecord {
                    holder_identity: self.identity.clone(),
                    acquired_at: now,
                    renewed_at: now,
                    duration_seconds: self.config.lease_duration.as_secs(),
                };
                match self.store.create(&self.lease_key, json!(record)).await {
                    Ok(()) => Ok(true),
                    Err(StoreError::Conflict(_)) => Ok(false),
                    Err(e) => Err(e),
                }
            }
            Some(value) => {
                let existing: LeaseRecord = serde_json::from_value(value)
                    .map_err(|e| StoreError::Backend(e.to_string()))?;
                if existing.holder_identity == self.identity {
                    let record = LeaseRecord { renewed_at: now, ..existing };
                    self.store.update(&self.lease_key, json!(record)).await?;
                    Ok(true)
                } else if existing.is_expired(now) {
                    let record = LeaseRecord {
                        holder_identity: self.identity.clone(),
                        acquired_at: now,
                        renewed_at: now,
                        duration_seconds: self.config.lease_duration.as_secs(),
                    };
                    self.store.update(&self.lease_key, json!(record)).await?;
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }

    /// Blocks until leadership is acquired, then renews on
    /// `retry_period` until renewal fails to land inside
    /// `renew_deadline` of the lease expiring, at which point it returns
    /// — callers exit non-zero on that return, per the contract.
    pub async fn run_until_leadership_lost(&self) {
        loop {
            match self.try_acquire_or_renew().await {
                Ok(true) => break,
                Ok(false) => {
                    tokio::time::sleep(self.config.retry_period).await;
                }
                Err(e) => {
                    warn!("leader election backend error, retrying: {e}");
                    tokio::time::sleep(self.config.retry_period).await;
                }
            }
        }
        info!(identity = %self.identity, "acquired leadership");

        loop {
            tokio::time::sleep(self.config.retry_period).await;
            match self.try_acquire_or_renew().await {
                Ok(true) => continue,
                Ok(false) => {
                    error!(identity = %self.identity, "lost leadership");
                    return;
                }
                Err(e) => {
                    error!("leader election renewal error: {e}");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryStore;
    use std::sync::Arc;

    #[tokio::test]
    async fn second_identity_cannot_acquire_live_lease() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemoryStore::new());
        let a = LeaderElector::new(
            store.clone(),
            "default",
            "cluster-controller",
            "pod-a".to_string(),
            LeaseConfig::default(),
        );
        let b = LeaderElector::new(
            store.clone(),
            "default",
            "cluster-controller",
            "pod-b".to_string(),
            LeaseConfig::default(),
        );

        assert!(a.try_acquire_or_renew().await.unwrap());
        assert!(!b.try_acquire_or_renew().await.unwrap());
    }

    #[tokio::test]
    async fn holder_can_renew_its_own_lease() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemoryStore::new());
        let a = LeaderElector::new(
            store,
            "default",
            "cluster-controller",
            "pod-a".to_string(),
            LeaseConfig::default(),
        );
        assert!(a.try_acquire_or_renew().await.unwrap());
        assert!(a.try_acquire_or_renew().await.unwrap());
    }
}

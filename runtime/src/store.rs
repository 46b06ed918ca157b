use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use thiserror::Error;

/// Identifies one object regardless of kind: every kind this system
/// handles (`LLMCluster`, `LLMClusterAutoscaler`, their children, and
/// lease records) is addressed the same way.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectKey {
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(kind: impl Into<String>, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl std::fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("object {0} not found")]
    NotFound(ObjectKey),
    #[error("resource version conflict for {0}")]
    Conflict(ObjectKey),
    #[error("store backend error: {0}")]
    Backend(String),
}

/// A schema-less client over custom kinds and their children: the
/// schema evolves in the user's hands, so the controllers must tolerate
/// unknown fields. Payloads are opaque `serde_json::Value`s; typed
/// callers serialize/deserialize their own spec types around this.
///
/// The same trait also backs the leader-election lease record — a lease
/// is just another kind stored here, per the design note that there is
/// no separate in-process state.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, key: &ObjectKey) -> Result<Option<Value>, StoreError>;
    async fn list(&self, kind: &str, namespace: &str) -> Result<Vec<Value>, StoreError>;
    async fn create(&self, key: &ObjectKey, value: Value) -> Result<(), StoreError>;
    async fn update(&self, key: &ObjectKey, value: Value) -> Result<(), StoreError>;
    /// Status writes go through their own path so they can never race
    /// with, or accidentally clobber, a concurrent spec update.
    async fn update_status(&self, key: &ObjectKey, status: Value) -> Result<(), StoreError>;
    async fn delete(&self, key: &ObjectKey) -> Result<(), StoreError>;
}

#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
struct StoredObject {
    #[serde(flatten)]
    value: Value,
    resource_version: u64,
}

/// An in-memory backend used by the demo binaries and by the unit and
/// property tests in `cluster-controller`/`fleet-autoscaler`. Production
/// deployments swap this for a client talking to the real orchestrator
/// API; that client is out of this system's scope (§1) and is referenced
/// here only by this trait.
#[derive(Default)]
pub struct InMemoryStore {
    objects: Mutex<HashMap<ObjectKey, StoredObject>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ObjectStore for InMemoryStore {
    async fn get(&self, key: &ObjectKey) -> Result<Option<Value>, StoreError> {
        let objects = self.objects.lock().unwrap();
        Ok(objects.get(key).map(|o| o.value.clone()))
    }

    async fn list(&self, kind: &str, namespace: &str) -> Result<Vec<Value>, StoreError> {
        let objects = self.objects.lock().unwrap();
        Ok(objects
            .iter()
            .filter(|(k, _)| k.kind == kind && k.namespace == namespace)
            .map(|(_, v)| v.value.clone())
            .collect())
    }

    async fn create(&self, key: &ObjectKey, value: Value) -> Result<(), StoreError> {
        let mut objects = self.objects.lock().unwrap();
        if objects.contains_key(key) {
            return Err(StoreError::Conflict(key.clone()));
        }
        objects.insert(
            key.clone(),
            StoredObject {
                value,
                resource_version: 1,
            },
        );
        Ok(())
    }

    async fn update(&self, key: &ObjectKey, value: Value) -> Result<(), StoreError> {
        let mut objects = self.objects.lock().unwrap();
        let entry = objects.get_mut(key).ok_or_else(|| StoreError::NotFound(key.clone()))?;
        entry.value = value;
        entry.resource_version += 1;
        Ok(())
    }

    async fn update_status(&self, key: &ObjectKey, status: Value) -> Result<(), StoreError> {
        let mut objects = self.objects.lock().unwrap();
        let entry = objects.get_mut(key).ok_or_else(|| StoreError::NotFound(key.clone()))?;
        if let Some(obj) = entry.value.as_object_mut() {
            obj.insert("status".to_string(), status);
        }
        entry.resource_version += 1;
        Ok(())
    }

    async fn delete(&self, key: &ObjectKey) -> Result<(), StoreError> {
        let mut objects = self.objects.lock().unwrap();
        objects
            .remove(key)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(key.clone()))
    }
}

/// Marks an object for cascade deletion rather than removing it
/// immediately, mirroring the orchestrator's own deletion-timestamp
/// convention that the cascade garbage collector relies on.
pub async fn mark_deleting(store: &dyn ObjectStore, key: &ObjectKey) -> Result<(), StoreError> {
    let mut value = store
        .get(key)
        .await?
        .ok_or_else(|| StoreError::NotFound(key.clone()))?;
    if let Some(metadata) = value.get_mut("metadata").and_then(|m| m.as_object_mut()) {
        metadata.insert(
            "deletionTimestamp".to_string(),
            serde_json::to_value(Utc::now()).unwrap(),
        );
    }
    store.update(key, value).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = InMemoryStore::new();
        let key = ObjectKey::new("LLMCluster", "default", "llama");
        store.create(&key, json!({"spec": {"replicas": 2}})).await.unwrap();

        let got = store.get(&key).await.unwrap().unwrap();
        assert_eq!(got["spec"]["replicas"], 2);
    }

    #[tokio::test]
    async fn create_twice_conflicts() {
        let store = InMemoryStore::new();
        let key = ObjectKey::new("LLMCluster", "default", "llama");
        store.create(&key, json!({})).await.unwrap();
        let err = store.create(&key, json!({})).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn update_status_never_touches_spec() {
        let store = InMemoryStore::new();
        let key = ObjectKey::new("LLMCluster", "default", "llama");
        store
            .create(&key, json!({"spec": {"replicas": 2}, "status": {}}))
            .await
            .unwrap();

        store
            .update_status(&key, json!({"phase": "Running"}))
            .await
            .unwrap();

        let got = store.get(&key).await.unwrap().unwrap();
        assert_eq!(got["spec"]["replicas"], 2);
        assert_eq!(got["status"]["phase"], "Running");
    }

    #[tokio::test]
    async fn list_filters_by_kind_and_namespace() {
        let store = InMemoryStore::new();
        store
            .create(&ObjectKey::new("LLMCluster", "default", "a"), json!({}))
            .await
            .unwrap();
        store
            .create(&ObjectKey::new("LLMCluster", "default", "b"), json!({}))
            .await
            .unwrap();
        store
            .create(&ObjectKey::new("LLMCluster", "other", "c"), json!({}))
            .await
            .unwrap();

        let listed = store.list("LLMCluster", "default").await.unwrap();
        assert_eq!(listed.len(), 2);
    }

    #[tokio::test]
    async fn delete_missing_object_errors() {
        let store = InMemoryStore::new();
        let key = ObjectKey::new("LLMCluster", "default", "missing");
        assert!(matches!(store.delete(&key).await, Err(StoreError::NotFound(_))));
    }
}

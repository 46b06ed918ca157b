use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use crd::cluster::{ClusterPhase, LLMCluster};
use runtime::events::{EventReason, EventType};
use runtime::{EventRecorder, ObjectKey, ObjectStore, ReconcileError};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::{info, warn};

use crate::children::{self, envelope};

/// Resync cadence from the reconcile contract: fast while children are
/// not yet ready, slow once converged.
pub const RESYNC_NOT_READY: Duration = Duration::from_secs(10);
pub const RESYNC_HEALTHY: Duration = Duration::from_secs(5 * 60);
/// Requeue delay after a transient child-creation failure.
pub const RESYNC_AFTER_TRANSIENT_FAILURE: Duration = Duration::from_secs(5);

pub struct ClusterReconciler {
    pub store: Arc<dyn ObjectStore>,
    pub events: Arc<EventRecorder>,
}

/// What the caller (the controller's work-queue loop) should do next.
/// Validation failures are terminal for the generation and are not
/// requeued at all — only a spec update (a new generation) will trigger
/// another attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Requeue(Duration),
    TerminalForGeneration,
    Deleted,
}

impl ClusterReconciler {
    pub fn new(store: Arc<dyn ObjectStore>, events: Arc<EventRecorder>) -> Self {
        Self { store, events }
    }

    pub async fn reconcile(&self, key: &ObjectKey) -> Result<ReconcileOutcome, ReconcileError> {
        let Some(raw) = self
            .store
            .get(key)
            .await
            .map_err(|e| ReconcileError::Transient(e.to_string()))?
        else {
            // Missing parent: cascade delete already removed the children.
            return Ok(ReconcileOutcome::Deleted);
        };

        let mut cluster: LLMCluster =
            serde_json::from_value(raw).map_err(|e| ReconcileError::Transient(e.to_string()))?;

        if cluster.metadata.is_deleting() {
            return Ok(ReconcileOutcome::Deleted);
        }

        // Step 2: validate. TP mismatch (and the closed per-instance
        // autoscaler gap) is terminal for this generation.
        if let Err(err) = cluster.spec.validate() {
            let now = Utc::now();
            cluster.status.mark_validation_failed(&err, now);
            cluster.status.observed_generation = cluster.metadata.generation;
            self.write_status(key, &cluster).await?;
            self.events.record(
                key.clone(),
                EventType::Warning,
                EventReason::ValidationFailed,
                err.to_string(),
            );
            return Ok(ReconcileOutcome::TerminalForGeneration);
        }

        // Step 3: transition phase.
        if !matches!(cluster.status.phase, ClusterPhase::Running | ClusterPhase::Creating) {
            cluster.status.phase = ClusterPhase::Creating;
            self.write_status(key, &cluster).await?;
        }

        // Step 4: reconcile children in order. Ordering is not strict —
        // later failures do not roll back earlier successes — but the
        // first failure short-circuits the rest of this pass.
        if let Err(e) = self.reconcile_children(&cluster).await {
            warn!(object = %key, "child reconciliation failed, requeuing: {e}");
            return Ok(ReconcileOutcome::Requeue(RESYNC_AFTER_TRANSIENT_FAILURE));
        }

        // Step 5/6: compute status and determine phase.
        let ready_replicas = self.observed_ready_replicas(&cluster).await?;
        cluster.status.replicas = cluster.spec.replicas;
        cluster.status.ready_replicas = ready_replicas;
        cluster.status.observed_generation = cluster.metadata.generation;
        cluster.status.metrics.total_gpus = cluster.spec.replicas * cluster.spec.gpus_per_pod;

        let now = Utc::now();
        if ready_replicas == cluster.spec.replicas {
            cluster.status.mark_running(now);
        } else {
            cluster.status.mark_progressing(now);
        }

        self.write_status(key, &cluster).await?;

        let outcome = if cluster.status.phase == ClusterPhase::Running {
            ReconcileOutcome::Requeue(RESYNC_HEALTHY)
        } else {
            ReconcileOutcome::Requeue(RESYNC_NOT_READY)
        };
        Ok(outcome)
    }

    async fn reconcile_children(&self, cluster: &LLMCluster) -> Result<(), ReconcileError> {
        let parent = &cluster.metadata.name;
        let ns = &cluster.metadata.namespace;

        self.reconcile_child(
            &ObjectKey::new("StatefulSet", ns, parent),
            cluster,
            children::desired_stateful_set(cluster),
        )
        .await?;

        self.reconcile_child(
            &ObjectKey::new("Service", ns, &children::backend_service_name(parent)),
            cluster,
            children::desired_backend_service(cluster),
        )
        .await?;

        if let Some(router) = children::desired_router_deployment(cluster) {
            self.reconcile_child(
                &ObjectKey::new("Deployment", ns, &router.name.clone()),
                cluster,
                router,
            )
            .await?;
        }
        if let Some(router_svc) = children::desired_router_service(cluster) {
            self.reconcile_child(
                &ObjectKey::new("Service", ns, &router_svc.name.clone()),
                cluster,
                router_svc,
            )
            .await?;
        }

        if let Some(queue) = children::desired_queue_deployment(cluster) {
            self.reconcile_child(&ObjectKey::new("Deployment", ns, &queue.name.clone()), cluster, queue)
                .await?;
        }
        if let Some(queue_svc) = children::desired_queue_service(cluster) {
            self.reconcile_child(
                &ObjectKey::new("Service", ns, &queue_svc.name.clone()),
                cluster,
                queue_svc,
            )
            .await?;
        }

        self.reconcile_child(
            &ObjectKey::new("ConfigRecord", ns, &format!("{parent}-config")),
            cluster,
            children::desired_config_record(cluster),
        )
        .await?;

        if let Some(hpa) = children::desired_per_instance_autoscaler(cluster) {
            self.reconcile_child(
                &ObjectKey::new("HorizontalPodAutoscaler", ns, &hpa.name.clone()),
                cluster,
                hpa,
            )
            .await?;
        }

        if let Some(pdb) = children::desired_disruption_budget(cluster) {
            self.reconcile_child(&ObjectKey::new("PodDisruptionBudget", ns, &pdb.name.clone()), cluster, pdb)
                .await?;
        }

        if let Some(netpol) = children::desired_network_policy(cluster) {
            self.reconcile_child(
                &ObjectKey::new("NetworkPolicy", ns, &netpol.name.clone()),
                cluster,
                netpol,
            )
            .await?;
        }

        Ok(())
    }

    /// Fetch-by-name, diff, create-or-update, with the parent set as
    /// owner. Property 1 (§8) depends on this being a true no-op when
    /// the desired body already matches what is stored.
    async fn reconcile_child<T>(&self, key: &ObjectKey, owner: &LLMCluster, desired: T) -> Result<(), ReconcileError>
    where
        T: Serialize + DeserializeOwned + PartialEq,
    {
        let desired_value = envelope(&key.kind, owner, &desired);

        match self
            .store
            .get(key)
            .await
            .map_err(|e| ReconcileError::Transient(e.to_string()))?
        {
            None => {
                self.store
                    .create(key, desired_value)
                    .await
                    .map_err(|e| ReconcileError::Transient(e.to_string()))?;
                self.events.record(
                    ObjectKey::new("LLMCluster", &owner.metadata.namespace, &owner.metadata.name),
                    EventType::Normal,
                    EventReason::Created,
                    format!("created {key}"),
                );
                info!(object = %key, "created child");
            }
            Some(actual) => {
                let actual_body: Option<T> = actual
                    .get("body")
                    .cloned()
                    .and_then(|b| serde_json::from_value(b).ok());
                if actual_body.as_ref() != Some(&desired) {
                    self.store
                        .update(key, desired_value)
                        .await
                        .map_err(|e| ReconcileError::Transient(e.to_string()))?;
                }
            }
        }
        Ok(())
    }

    /// Reads back the stateful set child's observed readiness. In a real
    /// deployment this is written by the orchestrator's own pod
    /// controller as pods report ready; here it is read straight from
    /// whatever the store holds, since that data path is out of this
    /// system's scope (§1).
    async fn observed_ready_replicas(&self, cluster: &LLMCluster) -> Result<u32, ReconcileError> {
        let key = ObjectKey::new("StatefulSet", &cluster.metadata.namespace, &cluster.metadata.name);
        let value = self
            .store
            .get(&key)
            .await
            .map_err(|e| ReconcileError::Transient(e.to_string()))?;
        Ok(value
            .and_then(|v: Value| v.get("observedReadyReplicas").and_then(|r| r.as_u64()))
            .unwrap_or(0) as u32)
    }

    async fn write_status(&self, key: &ObjectKey, cluster: &LLMCluster) -> Result<(), ReconcileError> {
        let status = serde_json::to_value(&cluster.status).map_err(|e| ReconcileError::Transient(e.to_string()))?;
        self.store
            .update_status(key, status)
            .await
            .map_err(|e| ReconcileError::Transient(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crd::cluster::{LLMClusterSpec, LLMClusterStatus, RouterSpec};
    use crd::meta::ObjectMeta;
    use runtime::InMemoryStore;

    fn base_cluster(replicas: u32, gpus_per_pod: u32, tensor_parallel_size: Option<u32>) -> LLMCluster {
        LLMCluster {
            metadata: ObjectMeta {
                name: "llama".to_string(),
                namespace: "default".to_string(),
                ..Default::default()
            },
            spec: LLMClusterSpec {
                model: "llama-3-70b".to_string(),
                model_size: None,
                image: "vllm/vllm-openai:latest".to_string(),
                inference_engine: Default::default(),
                replicas,
                gpus_per_pod,
                tensor_parallel_size,
                inference_args: Default::default(),
                router: RouterSpec::default(),
                queue: Default::default(),
                autoscaling: Default::default(),
                coordination: Default::default(),
                scheduling: Default::default(),
                high_availability: Default::default(),
                network: Default::default(),
                security: Default::default(),
            },
            status: LLMClusterStatus::default(),
        }
    }

    async fn seed(store: &InMemoryStore, cluster: &LLMCluster) -> ObjectKey {
        let key = ObjectKey::new("LLMCluster", &cluster.metadata.namespace, &cluster.metadata.name);
        store.create(&key, serde_json::to_value(cluster).unwrap()).await.unwrap();
        key
    }

    fn reconciler(store: Arc<dyn ObjectStore>) -> ClusterReconciler {
        ClusterReconciler::new(store, Arc::new(EventRecorder::default()))
    }

    /// Scenario A: a declared tensorParallelSize that does not match
    /// replicas * gpusPerPod is terminal for the generation — no children
    /// are created and the phase is Failed.
    #[tokio::test]
    async fn tp_mismatch_fails_without_creating_children() {
        let store = Arc::new(InMemoryStore::new());
        let store_dyn: Arc<dyn ObjectStore> = store.clone();
        let cluster = base_cluster(2, 4, Some(16));
        let key = seed(&store, &cluster).await;
        let outcome = reconciler(store_dyn).reconcile(&key).await.unwrap();

        assert_eq!(outcome, ReconcileOutcome::TerminalForGeneration);

        let stored: LLMCluster = serde_json::from_value(store.get(&key).await.unwrap().unwrap()).unwrap();
        assert_eq!(stored.status.phase, ClusterPhase::Failed);
        let cond = stored
            .status
            .conditions
            .iter()
            .find(|c| c.condition_type == crd::cluster::CONDITION_VALIDATION_FAILED)
            .expect("ValidationFailed condition");
        assert!(cond.message.contains('8'));

        let sts_key = ObjectKey::new("StatefulSet", "default", "llama");
        assert!(store.get(&sts_key).await.unwrap().is_none());
    }

    /// Scenario B: a valid spec with router/queue disabled converges to
    /// Running once the StatefulSet reports every pod ready.
    #[tokio::test]
    async fn happy_path_converges_to_running_once_pods_are_ready() {
        let store = Arc::new(InMemoryStore::new());
        let store_dyn: Arc<dyn ObjectStore> = store.clone();
        let cluster = base_cluster(2, 4, Some(8));
        let key = seed(&store, &cluster).await;

        let outcome = reconciler(store_dyn.clone()).reconcile(&key).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Requeue(RESYNC_NOT_READY));

        let sts_key = ObjectKey::new("StatefulSet", "default", "llama");
        let sts = store.get(&sts_key).await.unwrap().expect("stateful set created");
        let body = sts.get("body").cloned().unwrap();
        assert_eq!(body["replicas"], 2);
        assert_eq!(body["container"]["gpu_request"], 4);
        assert_eq!(
            body["container"]["env"]["MASTER_ADDR"],
            "llama-0.llama-backend.default.svc.cluster.local"
        );

        let backend_key = ObjectKey::new("Service", "default", "llama-backend");
        assert!(store.get(&backend_key).await.unwrap().is_some());

        let stored: LLMCluster = serde_json::from_value(store.get(&key).await.unwrap().unwrap()).unwrap();
        assert_eq!(stored.status.phase, ClusterPhase::Progressing);

        // Orchestrator reports both pods ready.
        let mut sts_value = store.get(&sts_key).await.unwrap().unwrap();
        sts_value
            .as_object_mut()
            .unwrap()
            .insert("observedReadyReplicas".to_string(), serde_json::json!(2));
        store.update(&sts_key, sts_value).await.unwrap();

        let outcome = reconciler(store_dyn).reconcile(&key).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::Requeue(RESYNC_HEALTHY));

        let stored: LLMCluster = serde_json::from_value(store.get(&key).await.unwrap().unwrap()).unwrap();
        assert_eq!(stored.status.phase, ClusterPhase::Running);
        assert_eq!(stored.status.ready_replicas, 2);
        assert_eq!(stored.status.metrics.total_gpus, 8);
        let ready = stored
            .status
            .conditions
            .iter()
            .find(|c| c.condition_type == crd::cluster::CONDITION_READY)
            .unwrap();
        assert!(ready.is_true());
        assert_eq!(ready.reason, "AllPodsReady");
    }

    /// Property 1 (§8): reconciling an already-converged object a second
    /// time performs no additional child mutations — diffing the desired
    /// body against the actual one must make `reconcile_child` a no-op.
    #[tokio::test]
    async fn converged_reconcile_is_idempotent() {
        let store = Arc::new(InMemoryStore::new());
        let store_dyn: Arc<dyn ObjectStore> = store.clone();
        let cluster = base_cluster(1, 1, Some(1));
        let key = seed(&store, &cluster).await;

        reconciler(store_dyn.clone()).reconcile(&key).await.unwrap();
        let sts_key = ObjectKey::new("StatefulSet", "default", "llama");
        let first = store.get(&sts_key).await.unwrap().unwrap();

        reconciler(store_dyn).reconcile(&key).await.unwrap();
        let second = store.get(&sts_key).await.unwrap().unwrap();

        assert_eq!(first, second);
    }
}

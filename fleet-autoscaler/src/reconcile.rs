use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use crd::autoscaler::{
    AutoscalerValidationError, LLMClusterAutoscaler, ScaleAction, ScaleGroup, CONDITION_DEGRADED,
    CONDITION_METRICS_AVAILABLE, CONDITION_READY,
};
use crd::cluster::{ClusterPhase, LLMCluster, LLMClusterStatus};
use crd::meta::{set_condition, Condition, ConditionStatus, ObjectMeta};
use metrics_client::{decision, default_query, MetricsClient, Sample};
use runtime::events::{EventReason, EventType};
use runtime::{EventRecorder, ObjectKey, ObjectStore, ReconcileError};
use tracing::{info, warn};

use crate::{cooldown, fleet, router, template};

pub struct FleetReconciler {
    pub store: Arc<dyn ObjectStore>,
    pub events: Arc<EventRecorder>,
    /// Bounded context for each metrics query (§4.2, default 10s).
    pub prom_query_timeout: Duration,
    /// Fixed sleep between router detachment and instance deletion
    /// during scale-down (§4.2 step 5, default 30s).
    pub drain_delay: Duration,
}

/// What the caller's ticker should do next. Every autoscaler is
/// reconciled independently and serially within one tick (§4.2 "Control
/// loop").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Reconciled,
    TerminalForGeneration,
    Deleted,
}

impl FleetReconciler {
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<ReconcileOutcome, ReconcileError> {
        let Some(raw) = self
            .store
            .get(key)
            .await
            .map_err(|e| ReconcileError::Transient(e.to_string()))?
        else {
            return Ok(ReconcileOutcome::Deleted);
        };

        let mut autoscaler: LLMClusterAutoscaler =
            serde_json::from_value(raw).map_err(|e| ReconcileError::Transient(e.to_string()))?;

        if autoscaler.metadata.is_deleting() {
            return Ok(ReconcileOutcome::Deleted);
        }

        // Step 1: parse and validate policy. A validation failure is
        // terminal for this generation, mirroring the cluster
        // reconciler's own validation gate.
        if let Err(err) = autoscaler.spec.validate() {
            self.mark_validation_failed(key, &mut autoscaler, &err).await?;
            return Ok(ReconcileOutcome::TerminalForGeneration);
        }

        // Steps 2-5: each scale group (one for a monolithic policy, one
        // per phase for a disaggregated one) is listed, sampled, and
        // acted on independently; cooldown state on the autoscaler's own
        // annotations is the only thing the groups share (§9).
        let groups = autoscaler.spec.scale_groups();
        let mut overlap: Vec<String> = Vec::new();
        let mut group_outcomes: Vec<GroupOutcome> = Vec::with_capacity(groups.len());

        for group in &groups {
            let instances = fleet::list_managed_instances(self.store.as_ref(), &autoscaler, &group.selector_ref)
                .await
                .map_err(|e| ReconcileError::Transient(e.to_string()))?;
            let group_overlap = fleet::detect_ownership_overlap(self.store.as_ref(), &autoscaler, &group.selector_ref)
                .await
                .map_err(|e| ReconcileError::Transient(e.to_string()))?;
            if !group_overlap.is_empty() {
                warn!(object = %key, phase = ?group.phase, instances = ?group_overlap, "scaleTargetRef overlaps instances owned by another autoscaler");
            }
            overlap.extend(group_overlap);

            let samples = self.sample_metrics(&autoscaler, group).await;
            let decision = decision::evaluate(&autoscaler.spec, &samples);
            let outcome = self.execute_action(&mut autoscaler, instances, &decision, group).await;
            group_outcomes.push(GroupOutcome { phase: group.phase, outcome, decision });
        }

        // Step 6: re-list across every group (the fleet may have grown
        // or shrunk) and reconcile router backends unconditionally, even
        // on an all-`NoOp` tick.
        let final_instances = self.list_all_instances(&autoscaler).await?;
        let backends = router::desired_backends(&autoscaler, &final_instances);
        if let Err(e) = router::reconcile_router_backends(self.store.as_ref(), &autoscaler, backends).await {
            warn!(object = %key, "router backend reconciliation failed: {e}");
        }

        // Persist cooldown annotations (metadata) and status (subresource).
        self.store
            .update(key, serde_json::to_value(&autoscaler).map_err(|e| ReconcileError::Transient(e.to_string()))?)
            .await
            .map_err(|e| ReconcileError::Transient(e.to_string()))?;

        self.write_status(key, &mut autoscaler, final_instances.len() as u32, group_outcomes, &overlap)
            .await?;

        Ok(ReconcileOutcome::Reconciled)
    }

    /// The combined fleet across every scale group — used for router
    /// backend reconciliation and the status instance count, where
    /// disaggregated prefill and decode instances are both members of
    /// the one fleet this autoscaler reports on.
    async fn list_all_instances(&self, autoscaler: &LLMClusterAutoscaler) -> Result<Vec<LLMCluster>, ReconcileError> {
        let mut all = Vec::new();
        for group in autoscaler.spec.scale_groups() {
            let instances = fleet::list_managed_instances(self.store.as_ref(), autoscaler, &group.selector_ref)
                .await
                .map_err(|e| ReconcileError::Transient(e.to_string()))?;
            all.extend(instances);
        }
        Ok(all)
    }

    async fn sample_metrics(&self, autoscaler: &LLMClusterAutoscaler, group: &ScaleGroup) -> Vec<Sample> {
        let client = MetricsClient::new(&autoscaler.spec.prometheus.address);
        let app_label = group.selector_ref.app_label().unwrap_or_default();
        let namespace = &autoscaler.metadata.namespace;

        let mut samples = Vec::with_capacity(autoscaler.spec.metrics.len());
        for metric in &autoscaler.spec.metrics {
            let query = metric
                .query
                .clone()
                .unwrap_or_else(|| default_query(metric.metric_type, app_label, namespace));

            let value = match client.query(&query, self.prom_query_timeout).await {
                Ok(v) => v,
                Err(e) => {
                    warn!(metric = ?metric.metric_type, "metrics query failed: {e}");
                    None
                }
            };
            samples.push(Sample { metric_type: metric.metric_type, value });
        }
        samples
    }

    async fn execute_action(
        &self,
        autoscaler: &mut LLMClusterAutoscaler,
        instances: Vec<LLMCluster>,
        decision: &decision::Decision,
        group: &ScaleGroup,
    ) -> ActionOutcome {
        let now = Utc::now();
        let key = ObjectKey::new("LLMClusterAutoscaler", &autoscaler.metadata.namespace, &autoscaler.metadata.name);

        if !decision.metrics_available {
            return ActionOutcome { action: ScaleAction::NoOp, reason: decision.reason.clone() };
        }

        if decision.want_scale_up {
            if instances.len() as u32 >= autoscaler.spec.max_instances {
                return ActionOutcome { action: ScaleAction::NoOp, reason: "at max".to_string() };
            }
            if !cooldown::scale_up_permitted(
                &autoscaler.metadata.annotations,
                now,
                autoscaler.spec.behavior.scale_up_stabilization_seconds,
            ) {
                return ActionOutcome { action: ScaleAction::NoOp, reason: "cooldown active".to_string() };
            }
            return self.scale_up(autoscaler, &instances, &key, now, group, decision).await;
        }

        if decision.want_scale_down {
            if instances.len() as u32 <= autoscaler.spec.min_instances {
                return ActionOutcome { action: ScaleAction::NoOp, reason: "at min".to_string() };
            }
            if !cooldown::scale_down_permitted(
                &autoscaler.metadata.annotations,
                now,
                autoscaler.spec.behavior.scale_down_stabilization_seconds,
            ) {
                return ActionOutcome { action: ScaleAction::NoOp, reason: "cooldown active".to_string() };
            }
            return self.scale_down(autoscaler, &instances, &key, now).await;
        }

        ActionOutcome { action: ScaleAction::NoOp, reason: decision.reason.clone() }
    }

    async fn scale_up(
        &self,
        autoscaler: &mut LLMClusterAutoscaler,
        instances: &[LLMCluster],
        autoscaler_key: &ObjectKey,
        now: chrono::DateTime<Utc>,
        group: &ScaleGroup,
        decision: &decision::Decision,
    ) -> ActionOutcome {
        let prefix = autoscaler.spec.resolved_name_prefix(group);
        let name = fleet::allocate_next_name(&prefix, instances);
        let labels = template::instance_labels(&autoscaler.spec, &group.selector_ref);
        let annotations = template::instance_annotations(&autoscaler.spec, &autoscaler.metadata.name);
        let spec = template::resolve_instance_spec(&autoscaler.spec.instance_template);

        let new_instance = LLMCluster {
            metadata: ObjectMeta {
                name: name.clone(),
                namespace: autoscaler.metadata.namespace.clone(),
                labels,
                annotations,
                creation_timestamp: Some(now),
                ..Default::default()
            },
            spec,
            status: LLMClusterStatus { phase: ClusterPhase::Pending, ..Default::default() },
        };

        let key = ObjectKey::new("LLMCluster", &autoscaler.metadata.namespace, &name);
        let value = match serde_json::to_value(&new_instance) {
            Ok(v) => v,
            Err(e) => return ActionOutcome { action: ScaleAction::Blocked, reason: e.to_string() },
        };

        match self.store.create(&key, value).await {
            Ok(()) => {
                cooldown::record_scale_up(&mut autoscaler.metadata.annotations, now);
                let reason = format!("created {name}: {}", decision.reason);
                self.events.record(
                    autoscaler_key.clone(),
                    EventType::Normal,
                    EventReason::ScaleUp,
                    reason.clone(),
                );
                info!(object = %autoscaler_key, instance = %name, "scaled up");
                ActionOutcome { action: ScaleAction::ScaleUp, reason }
            }
            Err(e) => {
                self.events.record(autoscaler_key.clone(), EventType::Warning, EventReason::ScaleFailed, e.to_string());
                ActionOutcome { action: ScaleAction::Blocked, reason: e.to_string() }
            }
        }
    }

    async fn scale_down(
        &self,
        autoscaler: &mut LLMClusterAutoscaler,
        instances: &[LLMCluster],
        autoscaler_key: &ObjectKey,
        now: chrono::DateTime<Utc>,
    ) -> ActionOutcome {
        let Some(victim) = fleet::scale_down_victim(instances) else {
            return ActionOutcome { action: ScaleAction::NoOp, reason: "no instances to remove".to_string() };
        };
        let victim_name = victim.metadata.name.clone();
        let victim_key = fleet::cluster_key(victim);

        let all_instances = match self.list_all_instances(autoscaler).await {
            Ok(v) => v,
            Err(e) => return ActionOutcome { action: ScaleAction::Blocked, reason: e.to_string() },
        };
        let remaining: Vec<LLMCluster> = all_instances
            .into_iter()
            .filter(|c| c.metadata.name != victim_name)
            .collect();
        let backends_without_victim = router::desired_backends(autoscaler, &remaining);
        if let Err(e) = router::reconcile_router_backends(self.store.as_ref(), autoscaler, backends_without_victim).await
        {
            self.events.record(autoscaler_key.clone(), EventType::Warning, EventReason::ScaleFailed, e.to_string());
            return ActionOutcome { action: ScaleAction::Blocked, reason: e.to_string() };
        }

        tokio::time::sleep(self.drain_delay).await;

        match self.store.delete(&victim_key).await {
            Ok(()) => {
                cooldown::record_scale_down(&mut autoscaler.metadata.annotations, now);
                self.events.record(
                    autoscaler_key.clone(),
                    EventType::Normal,
                    EventReason::ScaleDown,
                    format!("deleted {victim_name}"),
                );
                info!(object = %autoscaler_key, instance = %victim_name, "scaled down");
                ActionOutcome { action: ScaleAction::ScaleDown, reason: format!("deleted {victim_name}") }
            }
            Err(e) => {
                self.events.record(autoscaler_key.clone(), EventType::Warning, EventReason::ScaleFailed, e.to_string());
                ActionOutcome { action: ScaleAction::Blocked, reason: e.to_string() }
            }
        }
    }

    async fn mark_validation_failed(
        &self,
        key: &ObjectKey,
        autoscaler: &mut LLMClusterAutoscaler,
        err: &AutoscalerValidationError,
    ) -> Result<(), ReconcileError> {
        let now = Utc::now();
        set_condition(
            &mut autoscaler.status.conditions,
            Condition::new(CONDITION_READY, ConditionStatus::False, "ValidationFailed", err.to_string(), now),
        );
        self.events.record(key.clone(), EventType::Warning, EventReason::ValidationFailed, err.to_string());
        let status = serde_json::to_value(&autoscaler.status).map_err(|e| ReconcileError::Transient(e.to_string()))?;
        self.store
            .update_status(key, status)
            .await
            .map_err(|e| ReconcileError::Transient(e.to_string()))
    }

    async fn write_status(
        &self,
        key: &ObjectKey,
        autoscaler: &mut LLMClusterAutoscaler,
        current_instances: u32,
        group_outcomes: Vec<GroupOutcome>,
        overlap: &[String],
    ) -> Result<(), ReconcileError> {
        let now = Utc::now();
        autoscaler.status.current_instances = current_instances;
        autoscaler.status.desired_instances = current_instances;

        // The dominant action is the first group that actually did
        // something; an all-`NoOp` tick reports `NoOp`. Disaggregated
        // mode can only ever scale one phase per tick, so this is never
        // ambiguous in practice.
        let dominant = group_outcomes
            .iter()
            .find(|g| !matches!(g.outcome.action, ScaleAction::NoOp))
            .unwrap_or(&group_outcomes[0]);
        autoscaler.status.last_scale_action = dominant.outcome.action;
        if !matches!(dominant.outcome.action, ScaleAction::NoOp) {
            autoscaler.status.last_scale_time = Some(now);
        }

        // `observed_metrics` is keyed by metric type alone, with no room
        // for a per-phase dimension; a disaggregated policy's two groups
        // write into the same map and the later phase wins.
        let mut observed = HashMap::new();
        for g in &group_outcomes {
            observed.extend(g.decision.observed.clone());
        }
        autoscaler.status.observed_metrics = observed;

        let metrics_available = group_outcomes.iter().all(|g| g.decision.metrics_available);
        let ready_reason = group_outcomes
            .iter()
            .map(|g| match g.phase {
                Some(phase) => format!("{phase}: {}", g.outcome.reason),
                None => g.outcome.reason.clone(),
            })
            .collect::<Vec<_>>()
            .join("; ");
        let metrics_reason = group_outcomes
            .iter()
            .map(|g| match g.phase {
                Some(phase) => format!("{phase}: {}", g.decision.reason),
                None => g.decision.reason.clone(),
            })
            .collect::<Vec<_>>()
            .join("; ");

        set_condition(
            &mut autoscaler.status.conditions,
            Condition::new(CONDITION_READY, ConditionStatus::True, "ReconcileComplete", ready_reason, now),
        );
        set_condition(
            &mut autoscaler.status.conditions,
            Condition::new(
                CONDITION_METRICS_AVAILABLE,
                if metrics_available { ConditionStatus::True } else { ConditionStatus::False },
                if metrics_available { "SamplesCollected" } else { "NoSamples" },
                metrics_reason,
                now,
            ),
        );
        set_condition(
            &mut autoscaler.status.conditions,
            Condition::new(
                CONDITION_DEGRADED,
                if overlap.is_empty() { ConditionStatus::False } else { ConditionStatus::True },
                if overlap.is_empty() { "NoOverlap" } else { "ScaleTargetOverlap" },
                if overlap.is_empty() {
                    String::new()
                } else {
                    format!("scaleTargetRef also matches instances owned by another autoscaler: {}", overlap.join(", "))
                },
                now,
            ),
        );

        let status = serde_json::to_value(&autoscaler.status).map_err(|e| ReconcileError::Transient(e.to_string()))?;
        self.store
            .update_status(key, status)
            .await
            .map_err(|e| ReconcileError::Transient(e.to_string()))
    }
}

struct ActionOutcome {
    action: ScaleAction,
    reason: String,
}

/// One scale group's result for one reconcile tick, carried through to
/// `write_status` so a disaggregated policy's two groups can be reported
/// together.
struct GroupOutcome {
    phase: Option<&'static str>,
    outcome: ActionOutcome,
    decision: decision::Decision,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crd::autoscaler::{
        FlatInstanceTemplate, InstanceTemplate, MetricPolicy, MetricType, PrometheusSpec, RouterRef, ScaleTargetRef,
        ThresholdPair,
    };
    use crd::cluster::{LLMClusterSpec, RouterSpec};
    use runtime::InMemoryStore;
    use std::collections::HashMap;

    fn autoscaler(min: u32, max: u32) -> LLMClusterAutoscaler {
        LLMClusterAutoscaler {
            metadata: ObjectMeta {
                name: "llama-autoscaler".to_string(),
                namespace: "default".to_string(),
                ..Default::default()
            },
            spec: crd::autoscaler::LLMClusterAutoscalerSpec {
                mode: crd::autoscaler::AutoscalerMode::Monolithic,
                scale_target_ref: ScaleTargetRef::AppLabel { app_label: "llama".to_string() },
                min_instances: min,
                max_instances: max,
                metrics: vec![MetricPolicy {
                    metric_type: MetricType::QueueLength,
                    query: None,
                    threshold: ThresholdPair { scale_up: 100.0, scale_down: 20.0 },
                }],
                prometheus: PrometheusSpec { address: "http://prom:9090".to_string() },
                instance_template: InstanceTemplate {
                    spec: None,
                    flat: Some(FlatInstanceTemplate {
                        model: "llama-3-70b".to_string(),
                        model_size: None,
                        replicas: 2,
                        gpus_per_pod: 4,
                        tensor_parallel_size: Some(8),
                        image: "vllm/vllm-openai:latest".to_string(),
                    }),
                    name_prefix: None,
                    labels: HashMap::new(),
                    annotations: HashMap::new(),
                },
                router_ref: RouterRef {
                    name: "llama-router".to_string(),
                    backend_port: 8000,
                    backend_name_prefix: None,
                },
                behavior: Default::default(),
            },
            status: Default::default(),
        }
    }

    fn instance(name: &str, ts_offset_secs: i64) -> LLMCluster {
        LLMCluster {
            metadata: ObjectMeta {
                name: name.to_string(),
                namespace: "default".to_string(),
                labels: HashMap::from([
                    ("app".to_string(), "llama".to_string()),
                    ("role".to_string(), "instance".to_string()),
                ]),
                creation_timestamp: Some(Utc::now() + chrono::Duration::seconds(ts_offset_secs)),
                ..Default::default()
            },
            spec: LLMClusterSpec {
                model: "llama-3-70b".to_string(),
                model_size: None,
                image: "vllm/vllm-openai:latest".to_string(),
                inference_engine: Default::default(),
                replicas: 2,
                gpus_per_pod: 4,
                tensor_parallel_size: Some(8),
                inference_args: Default::default(),
                router: Default::default(),
                queue: Default::default(),
                autoscaling: Default::default(),
                coordination: Default::default(),
                scheduling: Default::default(),
                high_availability: Default::default(),
                network: Default::default(),
                security: Default::default(),
            },
            status: Default::default(),
        }
    }

    fn router_instance() -> LLMCluster {
        let mut router = instance("llama-router", -1000);
        router.spec.router = RouterSpec { enabled: true, replicas: 1, image: None, router_type: None, backends: vec![] };
        router
    }

    fn scale_up_decision(value: f64) -> decision::Decision {
        decision::evaluate(&autoscaler(2, 10).spec, &[decision::Sample { metric_type: MetricType::QueueLength, value: Some(value) }])
    }

    fn scale_down_decision(value: f64) -> decision::Decision {
        scale_up_decision(value)
    }

    fn reconciler(store: Arc<dyn ObjectStore>) -> FleetReconciler {
        FleetReconciler {
            store,
            events: Arc::new(EventRecorder::default()),
            prom_query_timeout: Duration::from_secs(10),
            drain_delay: Duration::from_millis(5),
        }
    }

    /// Scenario C: a metric above its scaleUp threshold, cooldown
    /// elapsed, current count below max creates a new instance named one
    /// past the highest existing suffix.
    #[tokio::test]
    async fn scale_up_creates_next_named_instance() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemoryStore::new());
        let mut a = autoscaler(2, 10);
        let instances = vec![instance("llama-instance-01", 0), instance("llama-instance-02", 1)];
        let decision = scale_up_decision(150.0);
        let group = a.spec.scale_groups().remove(0);

        let outcome = reconciler(store).execute_action(&mut a, instances, &decision, &group).await;

        assert_eq!(outcome.action, ScaleAction::ScaleUp);
        assert!(outcome.reason.contains("llama-instance-03"));
        assert!(outcome.reason.contains("QueueLength 150.00 > 100.00"));
        assert!(a.metadata.annotations.contains_key(crd::autoscaler::ANNOTATION_LAST_SCALE_UP_EPOCH));
    }

    #[tokio::test]
    async fn scale_up_blocked_at_max_instances() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemoryStore::new());
        let mut a = autoscaler(2, 2);
        let instances = vec![instance("llama-instance-01", 0), instance("llama-instance-02", 1)];
        let decision = scale_up_decision(150.0);
        let group = a.spec.scale_groups().remove(0);

        let outcome = reconciler(store).execute_action(&mut a, instances, &decision, &group).await;
        assert_eq!(outcome.action, ScaleAction::NoOp);
        assert_eq!(outcome.reason, "at max");
    }

    #[tokio::test]
    async fn scale_up_blocked_during_cooldown() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemoryStore::new());
        let mut a = autoscaler(2, 10);
        cooldown::record_scale_up(&mut a.metadata.annotations, Utc::now());
        let instances = vec![instance("llama-instance-01", 0)];
        let decision = scale_up_decision(150.0);
        let group = a.spec.scale_groups().remove(0);

        let outcome = reconciler(store).execute_action(&mut a, instances, &decision, &group).await;
        assert_eq!(outcome.action, ScaleAction::NoOp);
        assert_eq!(outcome.reason, "cooldown active");
    }

    /// Scenario D: scale-down rewrites the router's backend list to
    /// exclude the victim, sleeps the drain delay, then deletes the
    /// newest instance.
    #[tokio::test]
    async fn scale_down_drains_router_before_deleting_newest_instance() {
        let store = Arc::new(InMemoryStore::new());
        let store_dyn: Arc<dyn ObjectStore> = store.clone();
        let mut a = autoscaler(2, 10);

        let router = router_instance();
        let router_key = fleet::cluster_key(&router);
        store.create(&router_key, serde_json::to_value(&router).unwrap()).await.unwrap();

        let instances = vec![
            instance("llama-instance-01", 0),
            instance("llama-instance-02", 10),
            instance("llama-instance-03", 20),
            instance("llama-instance-04", 30),
        ];
        for inst in &instances {
            store.create(&fleet::cluster_key(inst), serde_json::to_value(inst).unwrap()).await.unwrap();
        }

        let decision = scale_down_decision(5.0);
        assert!(decision.want_scale_down);
        let group = a.spec.scale_groups().remove(0);

        let outcome = reconciler(store_dyn).execute_action(&mut a, instances, &decision, &group).await;

        assert_eq!(outcome.action, ScaleAction::ScaleDown);
        assert!(outcome.reason.contains("llama-instance-04"));
        assert!(a.metadata.annotations.contains_key(crd::autoscaler::ANNOTATION_LAST_SCALE_DOWN_EPOCH));

        let router_after: LLMCluster = serde_json::from_value(store.get(&router_key).await.unwrap().unwrap()).unwrap();
        let backend_names: Vec<_> = router_after.spec.router.backends.iter().map(|b| b.name.clone()).collect();
        assert_eq!(backend_names, vec!["llama-instance-01", "llama-instance-02", "llama-instance-03"]);

        let victim_key = ObjectKey::new("LLMCluster", "default", "llama-instance-04");
        assert!(store.get(&victim_key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn scale_down_blocked_at_min_instances() {
        let store: Arc<dyn ObjectStore> = Arc::new(InMemoryStore::new());
        let mut a = autoscaler(2, 10);
        let instances = vec![instance("llama-instance-01", 0), instance("llama-instance-02", 1)];
        let decision = scale_down_decision(5.0);
        let group = a.spec.scale_groups().remove(0);

        let outcome = reconciler(store).execute_action(&mut a, instances, &decision, &group).await;
        assert_eq!(outcome.action, ScaleAction::NoOp);
        assert_eq!(outcome.reason, "at min");
    }

    /// A validation failure (min > max) is terminal: the full public
    /// `reconcile` entry point never reaches metrics sampling, so this
    /// exercises the end-to-end path without any network dependency.
    #[tokio::test]
    async fn invalid_policy_is_terminal_for_the_generation() {
        let store = Arc::new(InMemoryStore::new());
        let store_dyn: Arc<dyn ObjectStore> = store.clone();
        let a = autoscaler(10, 2);
        let key = ObjectKey::new("LLMClusterAutoscaler", "default", "llama-autoscaler");
        store.create(&key, serde_json::to_value(&a).unwrap()).await.unwrap();

        let outcome = reconciler(store_dyn).reconcile(&key).await.unwrap();
        assert_eq!(outcome, ReconcileOutcome::TerminalForGeneration);

        let stored: LLMClusterAutoscaler = serde_json::from_value(store.get(&key).await.unwrap().unwrap()).unwrap();
        let ready = stored
            .status
            .conditions
            .iter()
            .find(|c| c.condition_type == CONDITION_READY)
            .unwrap();
        assert_eq!(ready.status, ConditionStatus::False);
        assert!(ready.message.contains("minInstances"));
    }
}

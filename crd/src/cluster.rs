use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::meta::{set_condition, Condition, ConditionStatus, ObjectMeta};

/// A fixed-shape serving instance: one ordered stateful pod set, its
/// routing service, and the optional router/queue/autoscaling/HA/network
/// objects that complete it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMCluster {
    pub metadata: ObjectMeta,
    pub spec: LLMClusterSpec,
    #[serde(default)]
    pub status: LLMClusterStatus,
}

impl LLMCluster {
    pub fn key(&self) -> (String, String) {
        (self.metadata.namespace.clone(), self.metadata.name.clone())
    }

    /// `replicas * gpusPerPod` — the effective tensor-parallel size this
    /// instance presents, regardless of whether the spec pins it.
    pub fn expected_tensor_parallel_size(&self) -> i64 {
        self.spec.replicas as i64 * self.spec.gpus_per_pod as i64
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LLMClusterSpec {
    pub model: String,
    #[serde(default)]
    pub model_size: Option<String>,
    pub image: String,
    #[serde(default)]
    pub inference_engine: InferenceEngine,
    pub replicas: u32,
    pub gpus_per_pod: u32,
    #[serde(default)]
    pub tensor_parallel_size: Option<u32>,
    #[serde(default)]
    pub inference_args: InferenceArgs,
    #[serde(default)]
    pub router: RouterSpec,
    #[serde(default)]
    pub queue: QueueSpec,
    #[serde(default)]
    pub autoscaling: PerInstanceAutoscalingSpec,
    #[serde(default)]
    pub coordination: CoordinationSpec,
    #[serde(default)]
    pub scheduling: SchedulingSpec,
    #[serde(default)]
    pub high_availability: HighAvailabilitySpec,
    #[serde(default)]
    pub network: NetworkSpec,
    #[serde(default)]
    pub security: SecuritySpec,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum InferenceEngine {
    #[serde(rename = "vllm")]
    Vllm,
    #[serde(rename = "tgi")]
    TextGenerationInference,
    #[serde(rename = "triton")]
    Triton,
}

impl Default for InferenceEngine {
    fn default() -> Self {
        InferenceEngine::Vllm
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InferenceArgs {
    #[serde(default = "default_max_context_length")]
    pub max_context_length: u32,
    #[serde(default = "default_block_size")]
    pub block_size: u32,
    #[serde(default)]
    pub dtype: Option<String>,
    #[serde(default = "default_gpu_memory_fraction")]
    pub gpu_memory_fraction: f64,
}

fn default_max_context_length() -> u32 {
    4096
}
fn default_block_size() -> u32 {
    16
}
fn default_gpu_memory_fraction() -> f64 {
    0.9
}

impl Default for InferenceArgs {
    fn default() -> Self {
        Self {
            max_context_length: default_max_context_length(),
            block_size: default_block_size(),
            dtype: None,
            gpu_memory_fraction: default_gpu_memory_fraction(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterSpec {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub replicas: u32,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub router_type: Option<String>,
    /// Populated and owned solely by the fleet autoscaler when this
    /// `LLMCluster` is acting as a fleet's router instance.
    #[serde(default)]
    pub backends: Vec<RouterBackend>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RouterBackend {
    pub name: String,
    pub service: String,
    pub port: u16,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueSpec {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub replicas: u32,
    #[serde(default)]
    pub backend: Option<String>,
    #[serde(default)]
    pub capacity: Option<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerInstanceAutoscalingSpec {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub min_replicas: Option<u32>,
    #[serde(default)]
    pub max_replicas: Option<u32>,
    #[serde(default)]
    pub target_cpu: Option<u32>,
    #[serde(default)]
    pub custom_metric: Option<String>,
    /// What this hook scales. The fixed-shape invariant forbids it from
    /// ever meaning the stateful model pod set; see `validate`.
    #[serde(default)]
    pub target: AutoscalingTarget,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AutoscalingTarget {
    StatefulSet,
    Router,
    Queue,
}

impl Default for AutoscalingTarget {
    fn default() -> Self {
        AutoscalingTarget::Router
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CoordinationSpec {
    #[serde(default)]
    pub leader_election: bool,
    #[serde(default)]
    pub pod_management_policy: PodManagementPolicy,
}

impl Default for CoordinationSpec {
    fn default() -> Self {
        Self {
            leader_election: false,
            pod_management_policy: PodManagementPolicy::OrderedReady,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum PodManagementPolicy {
    OrderedReady,
    Parallel,
}

impl Default for PodManagementPolicy {
    fn default() -> Self {
        PodManagementPolicy::OrderedReady
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulingSpec {
    #[serde(default)]
    pub node_selector: HashMap<String, String>,
    #[serde(default)]
    pub anti_affinity: bool,
    #[serde(default)]
    pub topology_spread: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HighAvailabilitySpec {
    #[serde(default)]
    pub disruption_budget: DisruptionBudgetSpec,
    #[serde(default = "default_termination_grace")]
    pub termination_grace_seconds: u32,
}

fn default_termination_grace() -> u32 {
    30
}

impl Default for HighAvailabilitySpec {
    fn default() -> Self {
        Self {
            disruption_budget: DisruptionBudgetSpec::default(),
            termination_grace_seconds: default_termination_grace(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DisruptionBudgetSpec {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default)]
    pub min_available: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpec {
    #[serde(default = "default_service_type")]
    pub service_type: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub network_policy_enabled: bool,
}

fn default_service_type() -> String {
    "ClusterIP".to_string()
}
fn default_port() -> u16 {
    8000
}

impl Default for NetworkSpec {
    fn default() -> Self {
        Self {
            service_type: default_service_type(),
            port: default_port(),
            network_policy_enabled: false,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecuritySpec {
    #[serde(default)]
    pub credentials_ref: Option<String>,
    #[serde(default)]
    pub service_identity: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LLMClusterStatus {
    #[serde(default)]
    pub phase: ClusterPhase,
    #[serde(default)]
    pub replicas: u32,
    #[serde(default)]
    pub ready_replicas: u32,
    #[serde(default)]
    pub observed_generation: i64,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    #[serde(default)]
    pub metrics: ClusterMetricsStatus,
    #[serde(default)]
    pub router_url: Option<String>,
    #[serde(default)]
    pub endpoints: Vec<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ClusterPhase {
    Pending,
    Creating,
    Progressing,
    Running,
    Degraded,
    Failed,
}

impl Default for ClusterPhase {
    fn default() -> Self {
        ClusterPhase::Pending
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterMetricsStatus {
    #[serde(default)]
    pub total_gpus: u32,
    #[serde(default)]
    pub queue_length: Option<u32>,
    #[serde(default)]
    pub avg_request_duration_ms: Option<f64>,
}

pub const CONDITION_READY: &str = "Ready";
pub const CONDITION_PROGRESSING: &str = "Progressing";
pub const CONDITION_VALIDATION_FAILED: &str = "ValidationFailed";

/// Terminal validation failure for the current `generation`. Distinct
/// variants so the ClusterReconciler can attach a precise reason and
/// message to the `ValidationFailed` condition.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ClusterValidationError {
    #[error(
        "tensorParallelSize {declared} does not match replicas * gpusPerPod = {expected}"
    )]
    TensorParallelMismatch { declared: u32, expected: u32 },
    #[error(
        "autoscaling.enabled targets the stateful model pod set, which violates the fixed-shape invariant"
    )]
    AutoscalingTargetsStatefulSet,
    #[error("replicas must be >= 1")]
    ZeroReplicas,
    #[error("gpusPerPod must be >= 1")]
    ZeroGpusPerPod,
}

impl LLMClusterSpec {
    /// The only validation that is terminal for a generation (TP
    /// mismatch) plus the two structural minimums and the closed
    /// per-instance-autoscaler gap from the design notes. All other
    /// spec review is advisory and does not block child creation.
    pub fn validate(&self) -> Result<(), ClusterValidationError> {
        if self.replicas == 0 {
            return Err(ClusterValidationError::ZeroReplicas);
        }
        if self.gpus_per_pod == 0 {
            return Err(ClusterValidationError::ZeroGpusPerPod);
        }
        let expected = self.replicas * self.gpus_per_pod;
        if let Some(declared) = self.tensor_parallel_size {
            if declared != expected {
                return Err(ClusterValidationError::TensorParallelMismatch {
                    declared,
                    expected,
                });
            }
        }
        if self.autoscaling.enabled
            && self.autoscaling.target == AutoscalingTarget::StatefulSet
        {
            return Err(ClusterValidationError::AutoscalingTargetsStatefulSet);
        }
        Ok(())
    }
}

impl LLMClusterStatus {
    pub fn mark_validation_failed(&mut self, err: &ClusterValidationError, now: DateTime<Utc>) {
        self.phase = ClusterPhase::Failed;
        set_condition(
            &mut self.conditions,
            Condition::new(
                CONDITION_VALIDATION_FAILED,
                ConditionStatus::True,
                "ValidationFailed",
                err.to_string(),
                now,
            ),
        );
        set_condition(
            &mut self.conditions,
            Condition::new(CONDITION_READY, ConditionStatus::False, "ValidationFailed", err.to_string(), now),
        );
    }

    pub fn mark_running(&mut self, now: DateTime<Utc>) {
        self.phase = ClusterPhase::Running;
        set_condition(
            &mut self.conditions,
            Condition::new(
                CONDITION_READY,
                ConditionStatus::True,
                "AllPodsReady",
                "all pods are ready",
                now,
            ),
        );
        set_condition(
            &mut self.conditions,
            Condition::new(
                CONDITION_PROGRESSING,
                ConditionStatus::False,
                "AllPodsReady",
                "rollout complete",
                now,
            ),
        );
    }

    pub fn mark_progressing(&mut self, now: DateTime<Utc>) {
        self.phase = ClusterPhase::Progressing;
        set_condition(
            &mut self.conditions,
            Condition::new(
                CONDITION_READY,
                ConditionStatus::False,
                "PodsNotReady",
                "waiting for all pods to become ready",
                now,
            ),
        );
        set_condition(
            &mut self.conditions,
            Condition::new(
                CONDITION_PROGRESSING,
                ConditionStatus::True,
                "PodsNotReady",
                "rollout in progress",
                now,
            ),
        );
    }
}

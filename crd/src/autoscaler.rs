use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cluster::LLMClusterSpec;
use crate::meta::{Condition, ObjectMeta};

/// A fleet-level scaling policy: watches external metrics and decides
/// how many whole `LLMCluster` instances should exist. Never mutates an
/// instance's internal shape.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LLMClusterAutoscaler {
    pub metadata: ObjectMeta,
    pub spec: LLMClusterAutoscalerSpec,
    #[serde(default)]
    pub status: LLMClusterAutoscalerStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LLMClusterAutoscalerSpec {
    #[serde(default)]
    pub mode: AutoscalerMode,
    pub scale_target_ref: ScaleTargetRef,
    pub min_instances: u32,
    pub max_instances: u32,
    pub metrics: Vec<MetricPolicy>,
    pub prometheus: PrometheusSpec,
    pub instance_template: InstanceTemplate,
    pub router_ref: RouterRef,
    #[serde(default)]
    pub behavior: ScalingBehavior,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "camelCase")]
pub enum AutoscalerMode {
    Monolithic,
    /// Carries independent prefill/decode selectors; the reference
    /// control logic applies the monolithic rules to each, per the
    /// design notes' Open Question resolution.
    Disaggregated {
        prefill: Box<ScaleTargetRef>,
        decode: Box<ScaleTargetRef>,
    },
}

impl Default for AutoscalerMode {
    fn default() -> Self {
        AutoscalerMode::Monolithic
    }
}

/// One independently-scaled slice of the fleet. Monolithic mode yields a
/// single unnamed group driven by `scaleTargetRef`; disaggregated mode
/// yields one group per phase, each driven by its own selector but
/// sharing the policy's cooldown annotations and metric thresholds
/// (§9's "two independent monolithic policies").
#[derive(Debug, Clone)]
pub struct ScaleGroup {
    pub phase: Option<&'static str>,
    pub selector_ref: ScaleTargetRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged, rename_all = "camelCase")]
pub enum ScaleTargetRef {
    LabelSelector { label_selector: HashMap<String, String> },
    AppLabel { app_label: String },
}

impl ScaleTargetRef {
    /// The default selector for an `appLabel` shorthand becomes
    /// `app=<appLabel>,role=instance`.
    pub fn resolved_selector(&self) -> HashMap<String, String> {
        match self {
            ScaleTargetRef::LabelSelector { label_selector } => label_selector.clone(),
            ScaleTargetRef::AppLabel { app_label } => {
                let mut m = HashMap::new();
                m.insert("app".to_string(), app_label.clone());
                m.insert("role".to_string(), "instance".to_string());
                m
            }
        }
    }

    pub fn app_label(&self) -> Option<&str> {
        match self {
            ScaleTargetRef::LabelSelector { label_selector } => {
                label_selector.get("app").map(|s| s.as_str())
            }
            ScaleTargetRef::AppLabel { app_label } => Some(app_label.as_str()),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MetricType {
    QueueLength,
    TTFT,
    TPOT,
    Latency,
    GPUUtilization,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricPolicy {
    #[serde(rename = "type")]
    pub metric_type: MetricType,
    #[serde(default)]
    pub query: Option<String>,
    pub threshold: ThresholdPair,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThresholdPair {
    pub scale_up: f64,
    pub scale_down: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrometheusSpec {
    pub address: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstanceTemplate {
    /// Either a fully embedded spec or a flat shorthand; see
    /// `resolved_spec`. The embedded spec is copied opaquely — the
    /// autoscaler never parses individual fields of it.
    #[serde(default)]
    pub spec: Option<LLMClusterSpec>,
    #[serde(default)]
    pub flat: Option<FlatInstanceTemplate>,
    #[serde(default = "default_name_prefix_placeholder")]
    pub name_prefix: Option<String>,
    #[serde(default)]
    pub labels: HashMap<String, String>,
    #[serde(default)]
    pub annotations: HashMap<String, String>,
}

fn default_name_prefix_placeholder() -> Option<String> {
    None
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FlatInstanceTemplate {
    pub model: String,
    #[serde(default)]
    pub model_size: Option<String>,
    pub replicas: u32,
    pub gpus_per_pod: u32,
    #[serde(default)]
    pub tensor_parallel_size: Option<u32>,
    pub image: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterRef {
    pub name: String,
    pub backend_port: u16,
    #[serde(default)]
    pub backend_name_prefix: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScalingBehavior {
    #[serde(default = "default_stabilization")]
    pub scale_up_stabilization_seconds: u32,
    #[serde(default = "default_stabilization")]
    pub scale_down_stabilization_seconds: u32,
}

fn default_stabilization() -> u32 {
    300
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LLMClusterAutoscalerStatus {
    #[serde(default)]
    pub current_instances: u32,
    #[serde(default)]
    pub desired_instances: u32,
    #[serde(default)]
    pub last_scale_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_scale_action: ScaleAction,
    #[serde(default)]
    pub observed_metrics: HashMap<MetricType, f64>,
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ScaleAction {
    ScaleUp,
    ScaleDown,
    NoOp,
    Blocked,
}

impl Default for ScaleAction {
    fn default() -> Self {
        ScaleAction::NoOp
    }
}

pub const CONDITION_READY: &str = "Ready";
pub const CONDITION_METRICS_AVAILABLE: &str = "MetricsAvailable";
/// Set True when `scaleTargetRef` overlaps another autoscaler's claimed
/// instances; the overlap is reported, never arbitrated away (§3.2).
pub const CONDITION_DEGRADED: &str = "Degraded";

pub const ANNOTATION_LAST_SCALE_UP_EPOCH: &str = "autoscaling.serving.ai/last-scale-up-epoch";
pub const ANNOTATION_LAST_SCALE_DOWN_EPOCH: &str = "autoscaling.serving.ai/last-scale-down-epoch";
pub const ANNOTATION_MANAGED_BY: &str = "autoscaling.serving.ai/managed-by";

/// Validation failures that are terminal for a policy's current
/// generation: zero bounds, inverted min/max, missing metrics, a
/// non-hysteretic threshold pair, or a metric with neither an explicit
/// query nor an inferable default.
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum AutoscalerValidationError {
    #[error("minInstances and maxInstances must both be non-zero")]
    ZeroBound,
    #[error("minInstances ({min}) must be <= maxInstances ({max})")]
    MinExceedsMax { min: u32, max: u32 },
    #[error("at least one metric must be configured")]
    NoMetrics,
    #[error("metric {metric:?} violates hysteresis: scaleUp ({scale_up}) must be > scaleDown ({scale_down})")]
    NonHystereticThreshold {
        metric: MetricType,
        scale_up: f64,
        scale_down: f64,
    },
    #[error("metric {metric:?} has no query and no appLabel to infer a default query from")]
    UnresolvableQuery { metric: MetricType },
}

impl LLMClusterAutoscalerSpec {
    /// The scale groups this policy drives — see `ScaleGroup`.
    pub fn scale_groups(&self) -> Vec<ScaleGroup> {
        match &self.mode {
            AutoscalerMode::Monolithic => vec![ScaleGroup {
                phase: None,
                selector_ref: self.scale_target_ref.clone(),
            }],
            AutoscalerMode::Disaggregated { prefill, decode } => vec![
                ScaleGroup {
                    phase: Some("prefill"),
                    selector_ref: (**prefill).clone(),
                },
                ScaleGroup {
                    phase: Some("decode"),
                    selector_ref: (**decode).clone(),
                },
            ],
        }
    }

    pub fn validate(&self) -> Result<(), AutoscalerValidationError> {
        if self.min_instances == 0 || self.max_instances == 0 {
            return Err(AutoscalerValidationError::ZeroBound);
        }
        if self.min_instances > self.max_instances {
            return Err(AutoscalerValidationError::MinExceedsMax {
                min: self.min_instances,
                max: self.max_instances,
            });
        }
        if self.metrics.is_empty() {
            return Err(AutoscalerValidationError::NoMetrics);
        }
        let groups = self.scale_groups();
        for metric in &self.metrics {
            if metric.threshold.scale_up <= metric.threshold.scale_down {
                return Err(AutoscalerValidationError::NonHystereticThreshold {
                    metric: metric.metric_type,
                    scale_up: metric.threshold.scale_up,
                    scale_down: metric.threshold.scale_down,
                });
            }
            if metric.query.is_none() && groups.iter().any(|g| g.selector_ref.app_label().is_none()) {
                return Err(AutoscalerValidationError::UnresolvableQuery {
                    metric: metric.metric_type,
                });
            }
        }
        Ok(())
    }

    /// `namePrefix` defaults to `<appLabel>-instance-`; an explicit
    /// override is suffixed with the phase name in disaggregated mode so
    /// the two groups never collide over the same instance names.
    pub fn resolved_name_prefix(&self, group: &ScaleGroup) -> String {
        if let Some(prefix) = &self.instance_template.name_prefix {
            return match group.phase {
                Some(phase) => format!("{prefix}{phase}-"),
                None => prefix.clone(),
            };
        }
        let app = group.selector_ref.app_label().unwrap_or("instance");
        format!("{app}-instance-")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_spec() -> LLMClusterAutoscalerSpec {
        LLMClusterAutoscalerSpec {
            mode: AutoscalerMode::Monolithic,
            scale_target_ref: ScaleTargetRef::AppLabel {
                app_label: "llama".to_string(),
            },
            min_instances: 2,
            max_instances: 10,
            metrics: vec![MetricPolicy {
                metric_type: MetricType::QueueLength,
                query: None,
                threshold: ThresholdPair {
                    scale_up: 100.0,
                    scale_down: 20.0,
                },
            }],
            prometheus: PrometheusSpec {
                address: "http://prometheus:9090".to_string(),
            },
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
            behavior: ScalingBehavior::default(),
        }
    }

    #[test]
    fn validate_accepts_well_formed_policy() {
        assert!(base_spec().validate().is_ok());
    }

    #[test]
    fn validate_rejects_min_greater_than_max() {
        let mut spec = base_spec();
        spec.min_instances = 20;
        assert_eq!(
            spec.validate().unwrap_err(),
            AutoscalerValidationError::MinExceedsMax { min: 20, max: 10 }
        );
    }

    #[test]
    fn validate_rejects_inverted_thresholds() {
        let mut spec = base_spec();
        spec.metrics[0].threshold.scale_up = 10.0;
        spec.metrics[0].threshold.scale_down = 50.0;
        assert!(matches!(
            spec.validate().unwrap_err(),
            AutoscalerValidationError::NonHystereticThreshold { .. }
        ));
    }

    #[test]
    fn validate_rejects_equal_thresholds() {
        let mut spec = base_spec();
        spec.metrics[0].threshold.scale_up = 50.0;
        spec.metrics[0].threshold.scale_down = 50.0;
        assert!(spec.validate().is_err());
    }

    #[test]
    fn validate_rejects_unresolvable_query() {
        let mut spec = base_spec();
        spec.scale_target_ref = ScaleTargetRef::LabelSelector {
            label_selector: HashMap::new(),
        };
        spec.metrics[0].query = None;
        assert_eq!(
            spec.validate().unwrap_err(),
            AutoscalerValidationError::UnresolvableQuery {
                metric: MetricType::QueueLength
            }
        );
    }

    #[test]
    fn resolved_name_prefix_defaults_from_app_label() {
        let spec = base_spec();
        let group = &spec.scale_groups()[0];
        assert_eq!(spec.resolved_name_prefix(group), "llama-instance-");
    }

    #[test]
    fn resolved_name_prefix_honors_explicit_override() {
        let mut spec = base_spec();
        spec.instance_template.name_prefix = Some("fleet-".to_string());
        let group = &spec.scale_groups()[0];
        assert_eq!(spec.resolved_name_prefix(group), "fleet-");
    }

    #[test]
    fn monolithic_mode_yields_a_single_unnamed_scale_group() {
        let groups = base_spec().scale_groups();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].phase, None);
    }

    #[test]
    fn disaggregated_mode_yields_one_scale_group_per_phase() {
        let mut spec = base_spec();
        spec.mode = AutoscalerMode::Disaggregated {
            prefill: Box::new(ScaleTargetRef::AppLabel { app_label: "llama-prefill".to_string() }),
            decode: Box::new(ScaleTargetRef::AppLabel { app_label: "llama-decode".to_string() }),
        };

        let groups = spec.scale_groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].phase, Some("prefill"));
        assert_eq!(groups[1].phase, Some("decode"));
        assert_eq!(spec.resolved_name_prefix(&groups[0]), "llama-prefill-instance-");
        assert_eq!(spec.resolved_name_prefix(&groups[1]), "llama-decode-instance-");
    }

    #[test]
    fn disaggregated_name_prefix_override_is_disambiguated_by_phase() {
        let mut spec = base_spec();
        spec.instance_template.name_prefix = Some("fleet-".to_string());
        spec.mode = AutoscalerMode::Disaggregated {
            prefill: Box::new(ScaleTargetRef::AppLabel { app_label: "llama-prefill".to_string() }),
            decode: Box::new(ScaleTargetRef::AppLabel { app_label: "llama-decode".to_string() }),
        };

        let groups = spec.scale_groups();
        assert_eq!(spec.resolved_name_prefix(&groups[0]), "fleet-prefill-");
        assert_eq!(spec.resolved_name_prefix(&groups[1]), "fleet-decode-");
    }

    #[test]
    fn validate_rejects_unresolvable_query_in_either_disaggregated_phase() {
        let mut spec = base_spec();
        spec.mode = AutoscalerMode::Disaggregated {
            prefill: Box::new(ScaleTargetRef::AppLabel { app_label: "llama-prefill".to_string() }),
            decode: Box::new(ScaleTargetRef::LabelSelector { label_selector: HashMap::new() }),
        };
        spec.metrics[0].query = None;
        assert_eq!(
            spec.validate().unwrap_err(),
            AutoscalerValidationError::UnresolvableQuery {
                metric: MetricType::QueueLength
            }
        );
    }
}

use std::collections::HashMap;

use crd::cluster::{LLMCluster, PodManagementPolicy};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Everything the ClusterReconciler owns, named and shaped the way
/// §4.1/§6.2 describe, represented as plain serializable structs since
/// the real orchestrator object kinds are out of this system's scope —
/// only the operations the core performs on them are specified here.
pub fn backend_service_name(parent: &str) -> String {
    format!("{parent}-backend")
}

pub fn per_instance_autoscaler_name(parent: &str) -> String {
    format!("{parent}-hpa")
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DesiredStatefulSet {
    pub name: String,
    pub namespace: String,
    pub service_name: String,
    pub replicas: u32,
    pub pod_management_policy: PodManagementPolicy,
    pub selector_labels: HashMap<String, String>,
    pub container: PodContainerSpec,
    pub node_selector: HashMap<String, String>,
    pub anti_affinity_label: String,
    pub scratch_volume_size_gi_b: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PodContainerSpec {
    pub image: String,
    pub args: Vec<String>,
    pub env: HashMap<String, String>,
    pub gpu_request: u32,
}

/// Ordered stateful pod set, always reconciled first: one container
/// running the inference engine on `0.0.0.0:8000`, `MASTER_ADDR` pointed
/// at ordinal 0 through the headless backend service, anti-affinity
/// keyed by hostname against `app=<parent>`, a 16GiB memory-backed
/// scratch volume.
pub fn desired_stateful_set(cluster: &LLMCluster) -> DesiredStatefulSet {
    let parent = &cluster.metadata.name;
    let namespace = &cluster.metadata.namespace;
    let service_name = backend_service_name(parent);
    let tp_size = cluster.expected_tensor_parallel_size();

    let mut selector_labels = HashMap::new();
    selector_labels.insert("app".to_string(), parent.clone());

    let master_addr = format!(
        "{parent}-0.{service_name}.{namespace}.svc.cluster.local"
    );

    let mut env = HashMap::new();
    env.insert("MASTER_ADDR".to_string(), master_addr);
    env.insert("MASTER_PORT".to_string(), "5000".to_string());
    // POD_NAME is bound from pod metadata by the orchestrator at admission time.
    env.insert("POD_NAME".to_string(), "$(POD_NAME)".to_string());

    DesiredStatefulSet {
        name: parent.clone(),
        namespace: namespace.clone(),
        service_name: service_name.clone(),
        replicas: cluster.spec.replicas,
        pod_management_policy: cluster.spec.coordination.pod_management_policy,
        selector_labels,
        container: PodContainerSpec {
            image: cluster.spec.image.clone(),
            args: vec![
                "--model".to_string(),
                cluster.spec.model.clone(),
                "--tensor-parallel-size".to_string(),
                tp_size.to_string(),
                "--host".to_string(),
                "0.0.0.0".to_string(),
                "--port".to_string(),
                "8000".to_string(),
            ],
            env,
            gpu_request: cluster.spec.gpus_per_pod,
        },
        node_selector: cluster.spec.scheduling.node_selector.clone(),
        anti_affinity_label: parent.clone(),
        scratch_volume_size_gi_b: 16,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DesiredService {
    pub name: String,
    pub namespace: String,
    pub headless: bool,
    pub selector_labels: HashMap<String, String>,
    pub port: u16,
}

pub fn desired_backend_service(cluster: &LLMCluster) -> DesiredService {
    let parent = &cluster.metadata.name;
    let mut selector_labels = HashMap::new();
    selector_labels.insert("app".to_string(), parent.clone());
    DesiredService {
        name: backend_service_name(parent),
        namespace: cluster.metadata.namespace.clone(),
        headless: true,
        selector_labels,
        port: cluster.spec.network.port,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DesiredDeployment {
    pub name: String,
    pub namespace: String,
    pub replicas: u32,
    pub image: String,
}

pub fn desired_router_deployment(cluster: &LLMCluster) -> Option<DesiredDeployment> {
    if !cluster.spec.router.enabled {
        return None;
    }
    Some(DesiredDeployment {
        name: format!("{}-router", cluster.metadata.name),
        namespace: cluster.metadata.namespace.clone(),
        replicas: cluster.spec.router.replicas,
        image: cluster
            .spec
            .router
            .image
            .clone()
            .unwrap_or_else(|| "serving-router:latest".to_string()),
    })
}

pub fn desired_router_service(cluster: &LLMCluster) -> Option<DesiredService> {
    if !cluster.spec.router.enabled {
        return None;
    }
    let mut selector_labels = HashMap::new();
    selector_labels.insert("app".to_string(), format!("{}-router", cluster.metadata.name));
    Some(DesiredService {
        name: format!("{}-router", cluster.metadata.name),
        namespace: cluster.metadata.namespace.clone(),
        headless: false,
        selector_labels,
        port: cluster.spec.network.port,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DesiredQueue {
    pub name: String,
    pub namespace: String,
    pub replicas: u32,
    pub backend: String,
    pub capacity: u32,
}

pub fn desired_queue_deployment(cluster: &LLMCluster) -> Option<DesiredQueue> {
    if !cluster.spec.queue.enabled {
        return None;
    }
    Some(DesiredQueue {
        name: format!("{}-queue", cluster.metadata.name),
        namespace: cluster.metadata.namespace.clone(),
        replicas: cluster.spec.queue.replicas,
        backend: cluster.spec.queue.backend.clone().unwrap_or_else(|| "redis".to_string()),
        capacity: cluster.spec.queue.capacity.unwrap_or(1000),
    })
}

pub fn desired_queue_service(cluster: &LLMCluster) -> Option<DesiredService> {
    if !cluster.spec.queue.enabled {
        return None;
    }
    let mut selector_labels = HashMap::new();
    selector_labels.insert("app".to_string(), format!("{}-queue", cluster.metadata.name));
    Some(DesiredService {
        name: format!("{}-queue", cluster.metadata.name),
        namespace: cluster.metadata.namespace.clone(),
        headless: false,
        selector_labels,
        port: 6379,
    })
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DesiredConfigRecord {
    pub name: String,
    pub namespace: String,
    pub data: HashMap<String, String>,
}

pub fn desired_config_record(cluster: &LLMCluster) -> DesiredConfigRecord {
    let mut data = HashMap::new();
    data.insert("model".to_string(), cluster.spec.model.clone());
    data.insert(
        "maxContextLength".to_string(),
        cluster.spec.inference_args.max_context_length.to_string(),
    );
    data.insert("blockSize".to_string(), cluster.spec.inference_args.block_size.to_string());
    data.insert(
        "gpuMemoryFraction".to_string(),
        cluster.spec.inference_args.gpu_memory_fraction.to_string(),
    );
    DesiredConfigRecord {
        name: format!("{}-config", cluster.metadata.name),
        namespace: cluster.metadata.namespace.clone(),
        data,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DesiredPerInstanceAutoscaler {
    pub name: String,
    pub namespace: String,
    pub target_name: String,
    pub min_replicas: u32,
    pub max_replicas: u32,
    pub target_cpu: Option<u32>,
    pub custom_metric: Option<String>,
}

/// Only ever bound to the router or queue deployments — never the
/// stateful pod set, which `LLMClusterSpec::validate` already refuses at
/// admission.
pub fn desired_per_instance_autoscaler(cluster: &LLMCluster) -> Option<DesiredPerInstanceAutoscaler> {
    if !cluster.spec.autoscaling.enabled {
        return None;
    }
    let target_name = match cluster.spec.autoscaling.target {
        crd::cluster::AutoscalingTarget::Router => format!("{}-router", cluster.metadata.name),
        crd::cluster::AutoscalingTarget::Queue => format!("{}-queue", cluster.metadata.name),
        crd::cluster::AutoscalingTarget::StatefulSet => unreachable!("rejected at validation"),
    };
    Some(DesiredPerInstanceAutoscaler {
        name: per_instance_autoscaler_name(&cluster.metadata.name),
        namespace: cluster.metadata.namespace.clone(),
        target_name,
        min_replicas: cluster.spec.autoscaling.min_replicas.unwrap_or(1),
        max_replicas: cluster.spec.autoscaling.max_replicas.unwrap_or(1),
        target_cpu: cluster.spec.autoscaling.target_cpu,
        custom_metric: cluster.spec.autoscaling.custom_metric.clone(),
    })
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DesiredDisruptionBudget {
    pub name: String,
    pub namespace: String,
    pub min_available: u32,
}

pub fn desired_disruption_budget(cluster: &LLMCluster) -> Option<DesiredDisruptionBudget> {
    if !cluster.spec.high_availability.disruption_budget.enabled {
        return None;
    }
    Some(DesiredDisruptionBudget {
        name: cluster.metadata.name.clone(),
        namespace: cluster.metadata.namespace.clone(),
        min_available: cluster
            .spec
            .high_availability
            .disruption_budget
            .min_available
            .unwrap_or(1),
    })
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DesiredNetworkPolicy {
    pub name: String,
    pub namespace: String,
    pub selector_labels: HashMap<String, String>,
}

pub fn desired_network_policy(cluster: &LLMCluster) -> Option<DesiredNetworkPolicy> {
    if !cluster.spec.network.network_policy_enabled {
        return None;
    }
    let mut selector_labels = HashMap::new();
    selector_labels.insert("app".to_string(), cluster.metadata.name.clone());
    Some(DesiredNetworkPolicy {
        name: format!("{}-netpol", cluster.metadata.name),
        namespace: cluster.metadata.namespace.clone(),
        selector_labels,
    })
}

/// Wraps any desired child in the envelope the store keeps: a `kind`
/// discriminator, an owner reference back to the parent, and the child's
/// own body — generalizing the ad hoc per-kind structs the teacher
/// scaffolds under `scale::scale` into one JSON envelope, since this
/// store is schema-less by design (§9).
pub fn envelope(kind: &str, owner: &LLMCluster, body: impl Serialize) -> Value {
    json!({
        "kind": kind,
        "ownerReferences": [crd::meta::OwnerReference::controller_of(
            "LLMCluster",
            &owner.metadata.name,
            &owner.metadata.resource_version,
        )],
        "body": body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crd::cluster::{LLMClusterSpec, LLMClusterStatus, RouterSpec};
    use crd::meta::ObjectMeta;

    fn cluster(replicas: u32, gpus_per_pod: u32) -> LLMCluster {
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
                tensor_parallel_size: Some(replicas * gpus_per_pod),
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

    #[test]
    fn stateful_set_master_addr_points_at_ordinal_zero() {
        let c = cluster(2, 4);
        let sts = desired_stateful_set(&c);
        assert_eq!(
            sts.container.env["MASTER_ADDR"],
            "llama-0.llama-backend.default.svc.cluster.local"
        );
        assert_eq!(sts.container.env["MASTER_PORT"], "5000");
        assert_eq!(sts.replicas, 2);
        assert_eq!(sts.container.gpu_request, 4);
    }

    #[test]
    fn stateful_set_args_carry_the_effective_tensor_parallel_size() {
        let c = cluster(2, 4);
        let sts = desired_stateful_set(&c);
        assert!(sts.container.args.contains(&"8".to_string()));
    }

    #[test]
    fn backend_service_name_is_parent_suffixed() {
        assert_eq!(backend_service_name("llama"), "llama-backend");
    }

    #[test]
    fn router_objects_are_none_when_disabled() {
        let c = cluster(2, 4);
        assert!(desired_router_deployment(&c).is_none());
        assert!(desired_router_service(&c).is_none());
    }

    #[test]
    fn router_objects_present_when_enabled() {
        let mut c = cluster(2, 4);
        c.spec.router = RouterSpec {
            enabled: true,
            replicas: 2,
            image: Some("router:latest".to_string()),
            router_type: None,
            backends: vec![],
        };
        assert!(desired_router_deployment(&c).is_some());
        assert!(desired_router_service(&c).is_some());
    }
}

use std::collections::HashMap;

use crd::autoscaler::{LLMClusterAutoscaler, ScaleTargetRef, ANNOTATION_MANAGED_BY};
use crd::cluster::LLMCluster;
use runtime::{ObjectKey, ObjectStore, StoreError};

/// The live, selectable fleet for one autoscaler: every `LLMCluster` in
/// its namespace matching `selector_ref` (the policy's `scaleTargetRef`,
/// or one phase's selector in disaggregated mode), minus anything
/// already being deleted, minus the router instance itself, and minus
/// anything already claimed by a *different* autoscaler's `managed-by`
/// annotation, oldest first (§4.2 step 2, §3.2 "at most one fleet
/// autoscaler may select a given LLMCluster"). An instance with no
/// `managed-by` annotation yet is fair game; once claimed, the
/// annotation makes the claim visible to every other autoscaler's next
/// list call, so the first one to create or adopt it wins and no
/// instance is ever driven by two policies at once.
pub async fn list_managed_instances(
    store: &dyn ObjectStore,
    autoscaler: &LLMClusterAutoscaler,
    selector_ref: &ScaleTargetRef,
) -> Result<Vec<LLMCluster>, StoreError> {
    let mut instances = matching_instances(store, autoscaler, selector_ref).await?;
    instances.retain(|c| owned_by(c, &autoscaler.metadata.name));
    instances.sort_by_key(|c| c.metadata.creation_timestamp);
    Ok(instances)
}

/// Selector-matching instances already claimed by some *other* named
/// autoscaler — surfaced so the reconciler can report the overlap as a
/// `Degraded` condition without ever treating the instance as part of
/// this fleet (§3.2).
pub async fn detect_ownership_overlap(
    store: &dyn ObjectStore,
    autoscaler: &LLMClusterAutoscaler,
    selector_ref: &ScaleTargetRef,
) -> Result<Vec<String>, StoreError> {
    let instances = matching_instances(store, autoscaler, selector_ref).await?;
    Ok(instances
        .iter()
        .filter(|c| !owned_by(c, &autoscaler.metadata.name))
        .map(|c| c.metadata.name.clone())
        .collect())
}

async fn matching_instances(
    store: &dyn ObjectStore,
    autoscaler: &LLMClusterAutoscaler,
    selector_ref: &ScaleTargetRef,
) -> Result<Vec<LLMCluster>, StoreError> {
    let selector = selector_ref.resolved_selector();
    let raw = store
        .list("LLMCluster", &autoscaler.metadata.namespace)
        .await?;

    Ok(raw
        .into_iter()
        .filter_map(|v| serde_json::from_value::<LLMCluster>(v).ok())
        .filter(|c| !c.metadata.is_deleting())
        .filter(|c| c.metadata.name != autoscaler.spec.router_ref.name)
        .filter(|c| matches_selector(&c.metadata.labels, &selector))
        .collect())
}

/// Ownership is recorded in an annotation, not a label (§3.2, the
/// glossary) — the claim must never become something a `scaleTargetRef`
/// selector can accidentally match or exclude on.
fn owned_by(instance: &LLMCluster, autoscaler_name: &str) -> bool {
    match instance.metadata.annotations.get(ANNOTATION_MANAGED_BY) {
        None => true,
        Some(owner) => owner == autoscaler_name,
    }
}

fn matches_selector(labels: &HashMap<String, String>, selector: &HashMap<String, String>) -> bool {
    selector
        .iter()
        .all(|(k, v)| labels.get(k).map(|lv| lv == v).unwrap_or(false))
}

/// Allocates the next instance name of the form `<prefix><NN>` by
/// scanning the current set for the highest trailing integer and taking
/// `max + 1`, zero-padded to width 2 (§4.2 step 5).
pub fn allocate_next_name(prefix: &str, existing: &[LLMCluster]) -> String {
    let max = existing
        .iter()
        .filter_map(|c| c.metadata.name.strip_prefix(prefix))
        .filter_map(|suffix| suffix.parse::<u32>().ok())
        .max()
        .unwrap_or(0);
    format!("{prefix}{:02}", max + 1)
}

/// "Newest first": the scale-down victim is always the most recently
/// created managed instance (§4.2 "Scale-down victim policy", §9).
pub fn scale_down_victim(instances: &[LLMCluster]) -> Option<&LLMCluster> {
    instances.last()
}

pub fn cluster_key(cluster: &LLMCluster) -> ObjectKey {
    ObjectKey::new("LLMCluster", &cluster.metadata.namespace, &cluster.metadata.name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crd::meta::ObjectMeta;
    use std::collections::HashMap as StdHashMap;

    fn instance(name: &str, ts_offset_secs: i64) -> LLMCluster {
        crd::cluster::LLMCluster {
            metadata: ObjectMeta {
                name: name.to_string(),
                namespace: "default".to_string(),
                creation_timestamp: Some(chrono::Utc::now() + chrono::Duration::seconds(ts_offset_secs)),
                ..Default::default()
            },
            spec: test_spec(),
            status: Default::default(),
        }
    }

    fn test_spec() -> crd::cluster::LLMClusterSpec {
        crd::cluster::LLMClusterSpec {
            model: "llama".to_string(),
            model_size: None,
            image: "img".to_string(),
            inference_engine: Default::default(),
            replicas: 1,
            gpus_per_pod: 1,
            tensor_parallel_size: Some(1),
            inference_args: Default::default(),
            router: Default::default(),
            queue: Default::default(),
            autoscaling: Default::default(),
            coordination: Default::default(),
            scheduling: Default::default(),
            high_availability: Default::default(),
            network: Default::default(),
            security: Default::default(),
        }
    }

    #[test]
    fn allocate_next_name_takes_max_plus_one_zero_padded() {
        let instances = vec![instance("llama-instance-01", 0), instance("llama-instance-03", 1)];
        assert_eq!(allocate_next_name("llama-instance-", &instances), "llama-instance-04");
    }

    #[test]
    fn allocate_next_name_starts_at_one_when_empty() {
        assert_eq!(allocate_next_name("llama-instance-", &[]), "llama-instance-01");
    }

    #[test]
    fn scale_down_victim_is_newest_by_creation_timestamp() {
        let mut instances = vec![instance("a", 0), instance("b", 100), instance("c", 50)];
        instances.sort_by_key(|c| c.metadata.creation_timestamp);
        assert_eq!(scale_down_victim(&instances).unwrap().metadata.name, "b");
    }

    #[test]
    fn matches_selector_requires_all_keys_present_and_equal() {
        let mut labels = StdHashMap::new();
        labels.insert("app".to_string(), "llama".to_string());
        labels.insert("role".to_string(), "instance".to_string());

        let mut selector = StdHashMap::new();
        selector.insert("app".to_string(), "llama".to_string());
        selector.insert("role".to_string(), "instance".to_string());
        assert!(matches_selector(&labels, &selector));

        selector.insert("extra".to_string(), "x".to_string());
        assert!(!matches_selector(&labels, &selector));
    }

    #[test]
    fn unclaimed_instance_is_owned_by_anyone() {
        let c = instance("a", 0);
        assert!(owned_by(&c, "fleet-a"));
        assert!(owned_by(&c, "fleet-b"));
    }

    #[test]
    fn claimed_instance_is_owned_only_by_its_claimant() {
        let mut c = instance("a", 0);
        c.metadata.annotations.insert(ANNOTATION_MANAGED_BY.to_string(), "fleet-a".to_string());
        assert!(owned_by(&c, "fleet-a"));
        assert!(!owned_by(&c, "fleet-b"));
    }
}

use crd::autoscaler::LLMClusterAutoscaler;
use crd::cluster::{LLMCluster, RouterBackend};
use runtime::{ObjectKey, ObjectStore, StoreError};

/// Builds the backend list for the fleet's router instance: one entry
/// per managed instance, in creation order, `{name, service, port}` with
/// `name` trimmed of `backendNamePrefix` (§4.2 step 6).
pub fn desired_backends(autoscaler: &LLMClusterAutoscaler, instances: &[LLMCluster]) -> Vec<RouterBackend> {
    let prefix = autoscaler
        .spec
        .router_ref
        .backend_name_prefix
        .as_deref()
        .unwrap_or("");
    let port = autoscaler.spec.router_ref.backend_port;

    instances
        .iter()
        .map(|instance| {
            let name = instance
                .metadata
                .name
                .strip_prefix(prefix)
                .unwrap_or(&instance.metadata.name)
                .to_string();
            RouterBackend {
                name,
                service: instance.metadata.name.clone(),
                port,
            }
        })
        .collect()
}

/// Writes the backend list into the router `LLMCluster`'s spec.
/// Unconditional on every reconcile, even a `NoOp` cycle, to repair
/// drift (§4.2 step 6) — this is the only field of another `LLMCluster`
/// a fleet autoscaler is permitted to write.
pub async fn reconcile_router_backends(
    store: &dyn ObjectStore,
    autoscaler: &LLMClusterAutoscaler,
    backends: Vec<RouterBackend>,
) -> Result<(), StoreError> {
    let key = ObjectKey::new(
        "LLMCluster",
        &autoscaler.metadata.namespace,
        &autoscaler.spec.router_ref.name,
    );
    let Some(raw) = store.get(&key).await? else {
        return Ok(());
    };
    let mut router: LLMCluster = match serde_json::from_value(raw) {
        Ok(r) => r,
        Err(_) => return Ok(()),
    };
    if router.spec.router.backends == backends {
        return Ok(());
    }
    router.spec.router.backends = backends;
    let value = serde_json::to_value(&router).map_err(|e| StoreError::Backend(e.to_string()))?;
    store.update(&key, value).await
}

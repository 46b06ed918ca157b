use std::collections::HashMap;

use crd::autoscaler::{InstanceTemplate, LLMClusterAutoscalerSpec, ScaleTargetRef, ANNOTATION_MANAGED_BY};
use crd::cluster::{InferenceEngine, LLMClusterSpec};

/// Resolves `instanceTemplate` into a concrete spec for a new instance.
/// An embedded `spec` is deep-copied opaquely (it round-trips through
/// `serde_json::Value` without field-specific parsing, per §9's "keep
/// the deep-copy path free of field-specific parsing"); the flat
/// shorthand is synthesized with the safe defaults the spec calls for:
/// router disabled, queue disabled, inference engine `vllm` (§4.2 step 5).
pub fn resolve_instance_spec(template: &InstanceTemplate) -> LLMClusterSpec {
    if let Some(spec) = &template.spec {
        return deep_copy(spec);
    }
    let flat = template
        .flat
        .as_ref()
        .expect("validate() guarantees either spec or flat is present before this is called");

    LLMClusterSpec {
        model: flat.model.clone(),
        model_size: flat.model_size.clone(),
        image: flat.image.clone(),
        inference_engine: InferenceEngine::Vllm,
        replicas: flat.replicas,
        gpus_per_pod: flat.gpus_per_pod,
        tensor_parallel_size: flat.tensor_parallel_size,
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

fn deep_copy(spec: &LLMClusterSpec) -> LLMClusterSpec {
    let value = serde_json::to_value(spec).expect("LLMClusterSpec always serializes");
    serde_json::from_value(value).expect("a just-serialized LLMClusterSpec always deserializes back")
}

/// Whether `instanceTemplate` carries enough information to synthesize a
/// spec at all — checked once during policy validation, not here.
pub fn template_is_well_formed(template: &InstanceTemplate) -> bool {
    template.spec.is_some() || template.flat.is_some()
}

/// Labels applied to every instance this autoscaler creates: the
/// template's own labels, merged with `app=<appLabel>` and
/// `role=instance` where absent (§4.2 step 5). Filled in against
/// `selector_ref` — the group's own selector, not necessarily the
/// policy's top-level `scaleTargetRef` — so a created instance always
/// matches the selector that is about to re-list it on the next tick,
/// including each phase's own selector in disaggregated mode.
pub fn instance_labels(
    policy: &LLMClusterAutoscalerSpec,
    selector_ref: &ScaleTargetRef,
) -> HashMap<String, String> {
    let mut labels = policy.instance_template.labels.clone();
    if !labels.contains_key("app") {
        if let Some(app) = selector_ref.app_label() {
            labels.insert("app".to_string(), app.to_string());
        }
    }
    if !labels.contains_key("role") {
        labels.insert("role".to_string(), "instance".to_string());
    }
    labels
}

/// Annotations applied to every instance this autoscaler creates: the
/// template's own annotations plus the `managed-by` ownership marker
/// (§3.2, the glossary) — kept out of the label set so it never
/// interferes with selector matching.
pub fn instance_annotations(
    policy: &LLMClusterAutoscalerSpec,
    autoscaler_name: &str,
) -> HashMap<String, String> {
    let mut annotations = policy.instance_template.annotations.clone();
    annotations.insert(ANNOTATION_MANAGED_BY.to_string(), autoscaler_name.to_string());
    annotations
}

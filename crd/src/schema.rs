/// Static wire-format facts about the two kinds. No packaging (CRD YAML
/// generation) lives in this crate — that belongs to a manifest layer
/// out of this system's scope — but a packaging layer can read these
/// constants to build one.
pub const GROUP: &str = "serving.ai";
pub const VERSION: &str = "v1alpha1";

pub const LLM_CLUSTER_KIND: &str = "LLMCluster";
pub const LLM_CLUSTER_PLURAL: &str = "llmclusters";
pub const LLM_CLUSTER_SHORT_NAMES: &[&str] = &["llm", "llmc"];

pub const LLM_CLUSTER_AUTOSCALER_KIND: &str = "LLMClusterAutoscaler";
pub const LLM_CLUSTER_AUTOSCALER_PLURAL: &str = "llmclusterautoscalers";
pub const LLM_CLUSTER_AUTOSCALER_SHORT_NAMES: &[&str] = &["llmca"];

#[derive(Debug, Clone, Copy)]
pub struct PrintedColumn {
    pub name: &'static str,
    pub json_path: &'static str,
}

pub const fn llm_cluster_printed_columns() -> &'static [PrintedColumn] {
    &[
        PrintedColumn { name: "Model", json_path: ".spec.model" },
        PrintedColumn { name: "Replicas", json_path: ".status.replicas" },
        PrintedColumn { name: "TP-Size", json_path: ".spec.tensorParallelSize" },
        PrintedColumn { name: "Phase", json_path: ".status.phase" },
        PrintedColumn { name: "Age", json_path: ".metadata.creationTimestamp" },
    ]
}

use crd::autoscaler::MetricType;

/// The canonical default query per metric type, parameterized by
/// `appLabel` and `namespace`, substituted whenever a metric omits
/// `query` (§4.2 step 1, §6.3).
pub fn default_query(metric_type: MetricType, app_label: &str, namespace: &str) -> String {
    match metric_type {
        MetricType::QueueLength => {
            format!(r#"sum(redis_queue_length{{app="{app_label}",queue="request_queue"}})"#)
        }
        MetricType::TTFT => format!(
            r#"histogram_quantile(0.95, sum(rate(llm_ttft_seconds_bucket{{app="{app_label}"}}[2m])) by (le)) * 1000"#
        ),
        MetricType::TPOT => format!(
            r#"histogram_quantile(0.95, sum(rate(llm_tpot_seconds_bucket{{app="{app_label}"}}[2m])) by (le)) * 1000"#
        ),
        MetricType::Latency => format!(
            r#"histogram_quantile(0.95, sum(rate(llm_request_latency_seconds_bucket{{app="{app_label}"}}[2m])) by (le)) * 1000"#
        ),
        MetricType::GPUUtilization => {
            format!(r#"avg(DCGM_FI_DEV_GPU_UTIL{{namespace="{namespace}"}})"#)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_length_default_query_mentions_app_label() {
        let q = default_query(MetricType::QueueLength, "llama", "default");
        assert!(q.contains(r#"app="llama""#));
        assert!(q.contains("request_queue"));
    }

    #[test]
    fn gpu_utilization_default_query_mentions_namespace() {
        let q = default_query(MetricType::GPUUtilization, "llama", "prod");
        assert!(q.contains(r#"namespace="prod""#));
    }
}

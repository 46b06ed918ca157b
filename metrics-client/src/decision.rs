use std::collections::HashMap;

use crd::autoscaler::{LLMClusterAutoscalerSpec, MetricType};

/// One sampled metric, or the absence of a sample — modeled as a
/// first-class state (§7: "missing metric data is modeled as a
/// first-class state, not an error").
#[derive(Debug, Clone, Copy)]
pub struct Sample {
    pub metric_type: MetricType,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub want_scale_up: bool,
    pub want_scale_down: bool,
    /// The first metric whose sample crossed its `scaleUp` threshold.
    pub trigger: Option<TriggerReason>,
    pub reason: String,
    pub metrics_available: bool,
    pub observed: HashMap<MetricType, f64>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TriggerReason {
    pub metric_type: MetricType,
    pub value: f64,
    pub threshold: f64,
}

/// The pure hysteresis rules from §4.3/§4.2 step 3: no I/O, exhaustively
/// unit-testable. `wantScaleUp` is true as soon as any metric exceeds
/// its `scaleUp` threshold (strictly); `wantScaleDown` is true only when
/// every metric is strictly below its `scaleDown` threshold. A metric
/// with a missing sample makes the whole cycle
/// `metricsAvailable=false` and forces `NoOp`, per §8's boundary
/// behaviors.
pub fn evaluate(policy: &LLMClusterAutoscalerSpec, samples: &[Sample]) -> Decision {
    let mut observed = HashMap::new();
    for sample in samples {
        if let Some(value) = sample.value {
            observed.insert(sample.metric_type, value);
        }
    }

    let any_missing = policy
        .metrics
        .iter()
        .any(|m| !observed.contains_key(&m.metric_type));

    if any_missing || observed.is_empty() {
        return Decision {
            want_scale_up: false,
            want_scale_down: false,
            trigger: None,
            reason: "no metrics returned".to_string(),
            metrics_available: false,
            observed,
        };
    }

    let mut trigger = None;
    for metric in &policy.metrics {
        let value = observed[&metric.metric_type];
        if value > metric.threshold.scale_up && trigger.is_none() {
            trigger = Some(TriggerReason {
                metric_type: metric.metric_type,
                value,
                threshold: metric.threshold.scale_up,
            });
        }
    }
    let want_scale_up = trigger.is_some();

    let want_scale_down = !want_scale_up
        && policy
            .metrics
            .iter()
            .all(|m| observed[&m.metric_type] < m.threshold.scale_down);

    let reason = if let Some(t) = trigger {
        format!(
            "{:?} {:.2} > {:.2}",
            t.metric_type, t.value, t.threshold
        )
    } else if want_scale_down {
        "all metrics below scaleDown thresholds".to_string()
    } else {
        "within thresholds".to_string()
    };

    Decision {
        want_scale_up,
        want_scale_down,
        trigger,
        reason,
        metrics_available: true,
        observed,
    }
}

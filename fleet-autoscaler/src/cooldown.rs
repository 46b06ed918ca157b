use chrono::{DateTime, Utc};
use crd::autoscaler::{ANNOTATION_LAST_SCALE_DOWN_EPOCH, ANNOTATION_LAST_SCALE_UP_EPOCH};

/// Cooldown state lives entirely on the autoscaler's own annotations
/// (§6.5: "no local persistent state"). A missing or unparsable
/// annotation is treated as "cooldown expired" (§4.2 step 4).
pub fn scale_up_permitted(annotations: &std::collections::HashMap<String, String>, now: DateTime<Utc>, stabilization_seconds: u32) -> bool {
    cooldown_elapsed(annotations.get(ANNOTATION_LAST_SCALE_UP_EPOCH), now, stabilization_seconds)
}

pub fn scale_down_permitted(annotations: &std::collections::HashMap<String, String>, now: DateTime<Utc>, stabilization_seconds: u32) -> bool {
    cooldown_elapsed(annotations.get(ANNOTATION_LAST_SCALE_DOWN_EPOCH), now, stabilization_seconds)
}

fn cooldown_elapsed(epoch: Option<&String>, now: DateTime<Utc>, stabilization_seconds: u32) -> bool {
    let Some(epoch) = epoch.and_then(|s| s.parse::<i64>().ok()) else {
        return true;
    };
    let elapsed = now.timestamp() - epoch;
    elapsed >= stabilization_seconds as i64
}

pub fn record_scale_up(annotations: &mut std::collections::HashMap<String, String>, now: DateTime<Utc>) {
    annotations.insert(ANNOTATION_LAST_SCALE_UP_EPOCH.to_string(), now.timestamp().to_string());
}

pub fn record_scale_down(annotations: &mut std::collections::HashMap<String, String>, now: DateTime<Utc>) {
    annotations.insert(ANNOTATION_LAST_SCALE_DOWN_EPOCH.to_string(), now.timestamp().to_string());
}

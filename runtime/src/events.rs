use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::store::ObjectKey;

/// The closed set of event reasons this system emits, per §7's
/// propagation policy (status conditions, then events, then logs).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventReason {
    Created,
    ValidationFailed,
    Degraded,
    ScaleDownBlocked,
    ScaleUp,
    ScaleDown,
    ScaleFailed,
}

impl EventReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventReason::Created => "Created",
            EventReason::ValidationFailed => "ValidationFailed",
            EventReason::Degraded => "Degraded",
            EventReason::ScaleDownBlocked => "ScaleDownBlocked",
            EventReason::ScaleUp => "ScaleUp",
            EventReason::ScaleDown => "ScaleDown",
            EventReason::ScaleFailed => "ScaleFailed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Normal,
    Warning,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub involved_object: ObjectKey,
    pub event_type: EventType,
    pub reason: EventReason,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Attaches events to a parent object. The reference implementation
/// keeps an in-memory ring of recent events per object (bounded so a
/// noisy reconcile loop cannot grow it unboundedly) and always logs
/// through `tracing` as the third, lowest-priority propagation channel.
pub struct EventRecorder {
    capacity: usize,
    events: std::sync::Mutex<std::collections::HashMap<ObjectKey, Vec<Event>>>,
}

impl Default for EventRecorder {
    fn default() -> Self {
        Self::new(100)
    }
}

impl EventRecorder {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            events: std::sync::Mutex::new(std::collections::HashMap::new()),
        }
    }

    pub fn record(
        &self,
        involved_object: ObjectKey,
        event_type: EventType,
        reason: EventReason,
        message: impl Into<String>,
    ) {
        let message = message.into();
        match event_type {
            EventType::Normal => info!(object = %involved_object, reason = reason.as_str(), %message, "event"),
            EventType::Warning => {
                tracing::warn!(object = %involved_object, reason = reason.as_str(), %message, "event")
            }
        }

        let event = Event {
            involved_object: involved_object.clone(),
            event_type,
            reason,
            message,
            timestamp: Utc::now(),
        };

        let mut events = self.events.lock().unwrap();
        let bucket = events.entry(involved_object).or_default();
        bucket.push(event);
        if bucket.len() > self.capacity {
            let excess = bucket.len() - self.capacity;
            bucket.drain(0..excess);
        }
    }

    pub fn events_for(&self, key: &ObjectKey) -> Vec<Event> {
        self.events.lock().unwrap().get(key).cloned().unwrap_or_default()
    }
}

pub mod client;
pub mod decision;
pub mod default_queries;

pub use client::{MetricsClient, MetricsClientError};
pub use decision::{evaluate, Decision, Sample, TriggerReason};
pub use default_queries::default_query;

pub mod error;
pub mod events;
pub mod leader;
pub mod logging;
pub mod probes;
pub mod queue;
pub mod store;

pub use error::ReconcileError;
pub use events::{Event, EventRecorder, EventReason, EventType};
pub use leader::{pod_identity, LeaderElector, LeaseConfig};
pub use queue::WorkQueue;
pub use store::{InMemoryStore, ObjectKey, ObjectStore, StoreError};

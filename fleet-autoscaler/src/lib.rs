pub mod cooldown;
pub mod fleet;
pub mod reconcile;
pub mod router;
pub mod template;

pub use reconcile::{FleetReconciler, ReconcileOutcome};

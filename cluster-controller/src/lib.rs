pub mod children;
pub mod reconcile;

pub use reconcile::{ClusterReconciler, ReconcileOutcome};

/// The error taxonomy from the error-handling design: validation errors
/// are terminal for a generation, transient errors are retried by
/// requeue, execution failures become `Blocked` actions with the error
/// as reason.
#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("transient error, will requeue: {0}")]
    Transient(String),
    #[error("execution failed: {0}")]
    ExecutionFailed(String),
}

impl ReconcileError {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ReconcileError::Validation(_))
    }
}

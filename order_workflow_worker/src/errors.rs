use order_workflow_engine::WorkflowError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Could not initialize the worker. {0}")]
    InitializeError(String),
    #[error("Could not run database migrations. {0}")]
    MigrationError(String),
    #[error("Could not recover interrupted workflow tasks. {0}")]
    RecoveryError(#[from] WorkflowError),
    #[error("The dispatcher stopped unexpectedly. {0}")]
    DispatcherStopped(String),
    #[error("An I/O error happened in the worker. {0}")]
    IOError(#[from] std::io::Error),
}

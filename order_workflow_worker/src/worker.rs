use log::*;
use order_workflow_engine::{SqliteDatabase, WorkflowEngine};

use crate::{config::WorkerConfig, dispatcher::start_dispatcher, errors::WorkerError, hooks::create_logging_event_handlers};

const MAX_DB_CONNECTIONS: u32 = 25;

/// Connects to the database, recovers interrupted tasks and runs the dispatcher until Ctrl-C is received.
pub async fn run_worker(config: WorkerConfig) -> Result<(), WorkerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, MAX_DB_CONNECTIONS)
        .await
        .map_err(|e| WorkerError::InitializeError(e.to_string()))?;
    if config.run_migrations {
        db.run_migrations().await.map_err(|e| WorkerError::MigrationError(e.to_string()))?;
        info!("🚀️ Database migrations complete");
    }
    let handlers = create_logging_event_handlers(config.event_buffer_size);
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let engine = WorkflowEngine::new(db, config.workflow.clone(), producers);
    let recovered = engine.recover_interrupted_tasks().await?;
    if !recovered.completed.is_empty() || !recovered.requeued.is_empty() {
        info!(
            "🚀️ Recovered {} interrupted tasks: {} completed, {} requeued",
            recovered.completed.len() + recovered.requeued.len(),
            recovered.completed.len(),
            recovered.requeued.len()
        );
    }
    let stats = engine.workflow_stats().await?;
    info!("🚀️ Workflow tasks on startup: {stats}");

    let mut dispatcher = start_dispatcher(engine, config.poll_interval);
    tokio::select! {
        signal = tokio::signal::ctrl_c() => {
            signal?;
            info!("🚀️ Shutdown requested. Stopping the dispatcher");
            dispatcher.abort();
            Ok(())
        },
        result = &mut dispatcher => {
            let reason = match result {
                Ok(()) => "the dispatch loop exited".to_string(),
                Err(e) => e.to_string(),
            };
            Err(WorkerError::DispatcherStopped(reason))
        },
    }
}

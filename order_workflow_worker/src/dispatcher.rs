use chrono::Duration;
use log::*;
use order_workflow_engine::{SqliteDatabase, WorkflowEngine};
use tokio::{task::JoinHandle, time::MissedTickBehavior};

const MIN_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_millis(10);

/// Starts the workflow dispatcher. Do not await the returned JoinHandle, as it will run indefinitely.
///
/// Each tick runs one dispatch round. A round that takes longer than the poll interval delays the next tick rather
/// than bunching ticks up.
pub fn start_dispatcher(engine: WorkflowEngine<SqliteDatabase>, poll_interval: Duration) -> JoinHandle<()> {
    let period = poll_interval.to_std().unwrap_or(MIN_POLL_INTERVAL).max(MIN_POLL_INTERVAL);
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!("🕰️ Workflow dispatcher started. Polling every {}ms", period.as_millis());
        loop {
            timer.tick().await;
            trace!("🕰️ Running dispatch round");
            match engine.process_due_tasks().await {
                Ok(summary) if summary.total() > 0 => info!("🕰️ Dispatch round complete: {summary}"),
                Ok(_) => trace!("🕰️ No workflow tasks were due"),
                Err(e) => error!("🕰️ Error running dispatch round: {e}"),
            }
        }
    })
}

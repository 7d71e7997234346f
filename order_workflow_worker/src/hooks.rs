//! Event hooks installed by the worker. They write a line to the log for every committed order change and every task
//! that fails for good, so an operator can follow the workflow without querying the database.
use futures_util::future::BoxFuture;
use log::*;
use order_workflow_engine::events::{EventHandlers, EventHooks, OrderChangedEvent, TaskFailedEvent};

pub fn create_logging_event_handlers(buffer_size: usize) -> EventHandlers {
    let mut hooks = EventHooks::default();
    hooks.on_order_changed(|ev| log_order_change(ev));
    hooks.on_task_failed(|ev| log_task_failure(ev));
    EventHandlers::new(buffer_size, hooks)
}

fn log_order_change(ev: OrderChangedEvent) -> BoxFuture<'static, ()> {
    let order = &ev.new_order;
    match &ev.old_order {
        None => info!("📬️ New {} order {} from exchange {}", order.order_type, order.order_id, order.exchange_id),
        Some(old) if ev.status_changed() => {
            info!("📬️ Order {} moved from {} to {}", order.order_id, old.status, order.status)
        },
        Some(_) => debug!("📬️ Order {} was edited", order.order_id),
    }
    Box::pin(async {})
}

fn log_task_failure(ev: TaskFailedEvent) -> BoxFuture<'static, ()> {
    let TaskFailedEvent { task, error } = ev;
    warn!(
        "📬️ Workflow task #{} could not move order {} to {} after {} attempts. {error}",
        task.id,
        task.order_id,
        task.target_status,
        task.retry_count + 1
    );
    Box::pin(async {})
}

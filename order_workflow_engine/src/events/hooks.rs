use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{EventHandler, EventProducer, Handler, OrderChangedEvent, TaskFailedEvent};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_changed_producer: Vec<EventProducer<OrderChangedEvent>>,
    pub task_failed_producer: Vec<EventProducer<TaskFailedEvent>>,
}

impl EventProducers {
    pub async fn publish_order_changed(&self, event: OrderChangedEvent) {
        for producer in &self.order_changed_producer {
            producer.publish_event(event.clone()).await;
        }
    }

    pub async fn publish_task_failed(&self, event: TaskFailedEvent) {
        for producer in &self.task_failed_producer {
            producer.publish_event(event.clone()).await;
        }
    }
}

pub struct EventHandlers {
    pub on_order_changed: Option<EventHandler<OrderChangedEvent>>,
    pub on_task_failed: Option<EventHandler<TaskFailedEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_order_changed = hooks.on_order_changed.map(|f| EventHandler::new(buffer_size, f));
        let on_task_failed = hooks.on_task_failed.map(|f| EventHandler::new(buffer_size, f));
        Self { on_order_changed, on_task_failed }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_changed {
            result.order_changed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_task_failed {
            result.task_failed_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_order_changed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_task_failed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_changed: Option<Handler<OrderChangedEvent>>,
    pub on_task_failed: Option<Handler<TaskFailedEvent>>,
}

impl EventHooks {
    pub fn on_order_changed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderChangedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_changed = Some(Arc::new(f));
        self
    }

    pub fn on_task_failed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(TaskFailedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_task_failed = Some(Arc::new(f));
        self
    }
}

//! Simple stateless pub-sub event handler
//!
//! This module provides a simple hook system that allows components of the system to subscribe to workflow events and
//! react to them. The event handler is stateless, i.e. the handlers have no access to the internal state of the
//! engine. All that is received is the event itself.
//!
//! The handlers can be async. Events are handled one at a time, in the order they were received, so a handler sees
//! the changes to any one order in the order they were committed.
//!
//! Delivery is at-least-once in the sense that a publisher never drops an event: when the channel is full,
//! [`EventProducer::publish_event`] waits for capacity.
use std::{future::Future, pin::Pin, sync::Arc};

use log::*;
use tokio::sync::mpsc;

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventHandler<E: Send + Sync + 'static> {
    listener: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    handler: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    pub fn new(buffer_size: usize, handler: Handler<E>) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size.max(1));
        Self { listener: receiver, sender, handler }
    }

    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer::new(self.sender.clone())
    }

    /// Runs until every producer has been dropped and the remaining events have been handled.
    pub async fn start_handler(mut self) {
        debug!("📬️ Starting event handler");
        // drop the internal sender so that when the last producer is dropped, the handler shuts down
        drop(self.sender);
        let mut handled = 0u64;
        while let Some(ev) = self.listener.recv().await {
            trace!("📬️ Handling event");
            (self.handler)(ev).await;
            handled += 1;
            trace!("📬️ Event handled");
        }
        debug!("📬️ Event handler has shut down after handling {handled} events");
    }
}

#[derive(Clone)]
pub struct EventProducer<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventProducer<E> {
    pub fn new(sender: mpsc::Sender<E>) -> Self {
        Self { sender }
    }

    pub async fn publish_event(&self, event: E) {
        if let Err(e) = self.sender.send(event).await {
            error!("📬️ Failed to send event: {e}");
        }
    }
}

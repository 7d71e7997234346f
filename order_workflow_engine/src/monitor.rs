//! Live order monitoring.
//!
//! [`OrderMonitor`] keeps per-order subscriber lists and forwards each committed order change to the subscribers of
//! that order. It is fed from the engine's order-changed event stream: register [`OrderMonitor::handler`] with
//! [`crate::events::EventHooks::on_order_changed`].
//!
//! The engine does not know about the monitor. It only publishes committed changes.
use std::{
    collections::HashMap,
    fmt::Display,
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use log::*;
use tokio::sync::RwLock;

use crate::{
    db_types::{Order, OrderId},
    events::{Handler, OrderChangedEvent},
};

/// Something that wants to hear about updates to a value.
///
/// Any `Fn(T) -> impl Future<Output = ()>` closure is a subscriber.
pub trait Subscriber<T>: Send + Sync {
    fn on_update(&self, value: T) -> Pin<Box<dyn Future<Output = ()> + Send>>;
}

impl<T, F, Fut> Subscriber<T> for F
where
    F: Fn(T) -> Fut + Send + Sync,
    Fut: Future<Output = ()> + Send + 'static,
{
    fn on_update(&self, value: T) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(self(value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(u64);

impl Display for SubscriptionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

type SubscriberList = Vec<(SubscriptionId, Arc<dyn Subscriber<Order>>)>;

#[derive(Clone, Default)]
pub struct OrderMonitor {
    subscribers: Arc<RwLock<HashMap<OrderId, SubscriberList>>>,
    next_id: Arc<AtomicU64>,
}

impl OrderMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `subscriber` for updates to the given order. The subscriber receives the order as it is after each
    /// committed change, until [`Self::unsubscribe`] is called with the returned id.
    pub async fn subscribe<S>(&self, order_id: &OrderId, subscriber: S) -> SubscriptionId
    where S: Subscriber<Order> + 'static {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut subs = self.subscribers.write().await;
        subs.entry(order_id.clone()).or_default().push((id, Arc::new(subscriber)));
        debug!("👀️ {id} is watching order {order_id}");
        id
    }

    /// Removes a subscription. Returns `false` if there was no such subscription.
    pub async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut subs = self.subscribers.write().await;
        let mut found = false;
        subs.retain(|_, list| {
            let before = list.len();
            list.retain(|(sid, _)| *sid != id);
            found |= list.len() != before;
            !list.is_empty()
        });
        if found {
            debug!("👀️ {id} unsubscribed");
        } else {
            warn!("👀️ Tried to remove subscription {id}, but it does not exist");
        }
        found
    }

    pub async fn subscriber_count(&self, order_id: &OrderId) -> usize {
        self.subscribers.read().await.get(order_id).map(Vec::len).unwrap_or(0)
    }

    /// Delivers the new state of the order to everyone watching it. Subscribers are called one after the other.
    pub async fn notify(&self, event: &OrderChangedEvent) -> usize {
        let targets = {
            let subs = self.subscribers.read().await;
            match subs.get(event.order_id()) {
                Some(list) => list.iter().map(|(_, s)| Arc::clone(s)).collect::<Vec<_>>(),
                None => return 0,
            }
        };
        trace!("👀️ Pushing update for order {} to {} subscribers", event.order_id(), targets.len());
        for subscriber in &targets {
            subscriber.on_update(event.new_order.clone()).await;
        }
        targets.len()
    }

    /// An event handler that forwards order-changed events to this monitor.
    pub fn handler(&self) -> Handler<OrderChangedEvent> {
        let monitor = self.clone();
        Arc::new(move |event: OrderChangedEvent| {
            let monitor = monitor.clone();
            Box::pin(async move {
                monitor.notify(&event).await;
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        })
    }
}

#[cfg(test)]
mod test {
    use std::sync::Mutex;

    use chrono::Utc;

    use super::*;
    use crate::{
        db_types::{Amount, Milestones, OrderStatus, OrderType, Priority},
        events::{EventHandlers, EventHooks},
    };

    fn order(id: &str, status: OrderStatus) -> Order {
        Order {
            id: 1,
            order_id: OrderId::from(id),
            exchange_id: "ex-1".into(),
            owner_id: "owner-1".into(),
            order_type: OrderType::Outgoing,
            status,
            submitted_amount: Amount::from_major(10),
            commission: Amount::from(0),
            priority: Priority::Normal,
            notes: None,
            reason: None,
            screenshots: vec![],
            timestamps: Milestones::new(Utc::now()),
        }
    }

    fn recorder() -> (Arc<Mutex<Vec<OrderStatus>>>, impl Subscriber<Order>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let s2 = seen.clone();
        let sub = move |o: Order| {
            let seen = s2.clone();
            async move {
                seen.lock().unwrap().push(o.status);
            }
        };
        (seen, sub)
    }

    #[tokio::test]
    async fn only_watchers_of_the_order_are_notified() {
        let monitor = OrderMonitor::new();
        let (seen_a, sub_a) = recorder();
        let (seen_b, sub_b) = recorder();
        monitor.subscribe(&OrderId::from("A"), sub_a).await;
        monitor.subscribe(&OrderId::from("B"), sub_b).await;
        let ev = OrderChangedEvent::modified(order("A", OrderStatus::Submitted), order("A", OrderStatus::Processing));
        assert_eq!(monitor.notify(&ev).await, 1);
        assert_eq!(*seen_a.lock().unwrap(), vec![OrderStatus::Processing]);
        assert!(seen_b.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unsubscribe_stops_updates() {
        let monitor = OrderMonitor::new();
        let (seen, sub) = recorder();
        let oid = OrderId::from("A");
        let id = monitor.subscribe(&oid, sub).await;
        assert_eq!(monitor.subscriber_count(&oid).await, 1);
        assert!(monitor.unsubscribe(id).await);
        assert!(!monitor.unsubscribe(id).await);
        assert_eq!(monitor.subscriber_count(&oid).await, 0);
        monitor.notify(&OrderChangedEvent::created(order("A", OrderStatus::Submitted))).await;
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn fed_by_event_handler_in_order() {
        let monitor = OrderMonitor::new();
        let (seen, sub) = recorder();
        monitor.subscribe(&OrderId::from("A"), sub).await;
        let mut hooks = EventHooks::default();
        let handler = monitor.handler();
        hooks.on_order_changed(move |ev| (handler)(ev));
        let handlers = EventHandlers::new(2, hooks);
        let producers = handlers.producers();
        let on_changed = handlers.on_order_changed.expect("handler is configured");
        let statuses = [OrderStatus::Submitted, OrderStatus::Processing, OrderStatus::Completed];
        tokio::spawn(async move {
            let mut prev = order("A", OrderStatus::Submitted);
            producers.publish_order_changed(OrderChangedEvent::created(prev.clone())).await;
            for status in &statuses[1..] {
                let next = order("A", *status);
                producers.publish_order_changed(OrderChangedEvent::modified(prev, next.clone())).await;
                prev = next;
            }
        });
        on_changed.start_handler().await;
        assert_eq!(*seen.lock().unwrap(), statuses.to_vec());
    }
}

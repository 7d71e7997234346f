//! Auto-transition rules.
//!
//! After a task moves an order to a new status, the engine looks up the rules registered for that status and fires the
//! first one whose predicate holds. The resulting transition is scheduled through the normal validated path, acting as
//! the system principal.
use std::{collections::HashMap, fmt::Debug, future::Future, pin::Pin, sync::Arc};

use chrono::Duration;

use crate::db_types::{Order, OrderStatus, OrderType};

pub type RulePredicate = Arc<dyn Fn(Order) -> Pin<Box<dyn Future<Output = bool> + Send>> + Send + Sync>;

#[derive(Clone)]
pub struct AutoTransitionRule {
    pub name: String,
    /// The status that triggers this rule
    pub on_status: OrderStatus,
    pub target: OrderStatus,
    pub delay: Option<Duration>,
    predicate: RulePredicate,
}

impl Debug for AutoTransitionRule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AutoTransitionRule({}: {} -> {})", self.name, self.on_status, self.target)
    }
}

impl AutoTransitionRule {
    pub fn new<S, F, Fut>(name: S, on_status: OrderStatus, target: OrderStatus, predicate: F) -> Self
    where
        S: Into<String>,
        F: Fn(Order) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let predicate: RulePredicate = Arc::new(move |order| Box::pin(predicate(order)));
        Self { name: name.into(), on_status, target, delay: None, predicate }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub async fn matches(&self, order: &Order) -> bool {
        order.status == self.on_status && (self.predicate)(order.clone()).await
    }
}

/// The rule table, keyed by the status that triggers each rule. Rules for a status are tried in registration order.
#[derive(Debug, Clone, Default)]
pub struct AutoTransitionRules {
    rules: HashMap<OrderStatus, Vec<AutoTransitionRule>>,
}

impl AutoTransitionRules {
    pub fn empty() -> Self {
        Self::default()
    }

    /// The brokerage's rules:
    /// * incoming orders submitted with proof of payment move to review,
    /// * approved outgoing orders move straight to processing.
    pub fn standard(delay: Duration) -> Self {
        let mut rules = Self::empty();
        rules
            .add_rule(
                AutoTransitionRule::new(
                    "incoming_with_proof_to_review",
                    OrderStatus::Submitted,
                    OrderStatus::PendingReview,
                    |order: Order| async move { order.order_type == OrderType::Incoming && order.has_screenshots() },
                )
                .with_delay(delay),
            )
            .add_rule(
                AutoTransitionRule::new(
                    "approved_outgoing_to_processing",
                    OrderStatus::Approved,
                    OrderStatus::Processing,
                    |order: Order| async move { order.order_type == OrderType::Outgoing },
                )
                .with_delay(delay),
            );
        rules
    }

    pub fn add_rule(&mut self, rule: AutoTransitionRule) -> &mut Self {
        self.rules.entry(rule.on_status).or_default().push(rule);
        self
    }

    pub fn rules_for(&self, status: OrderStatus) -> &[AutoTransitionRule] {
        self.rules.get(&status).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.rules.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The first rule for the order's current status whose predicate holds.
    pub async fn first_match(&self, order: &Order) -> Option<&AutoTransitionRule> {
        for rule in self.rules_for(order.status) {
            if rule.matches(order).await {
                return Some(rule);
            }
        }
        None
    }
}

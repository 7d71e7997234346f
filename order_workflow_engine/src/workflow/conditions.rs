//! Evaluates declarative [`WorkflowCondition`]s against an order.
//!
//! Supported fields are `amount` (major units), `type`, `priority`, `exchangeId` and `created_hours_ago`.
//! Numeric comparisons and `contains` only apply to operands of the right kind. When they do not apply, the condition
//! passes.
use chrono::{DateTime, Utc};
use log::*;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::db_types::{ConditionOperator, Order, WorkflowCondition};

const FLOAT_TOLERANCE: f64 = 1e-9;

/// What to do with a condition that names a field the evaluator does not know.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownFieldPolicy {
    /// The condition passes (fail-open).
    #[default]
    Pass,
    /// The condition fails (fail-closed).
    Fail,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConditionOutcome {
    pub passed: bool,
    /// Description of the first condition that failed
    pub failed_condition: Option<String>,
}

impl ConditionOutcome {
    pub fn pass() -> Self {
        Self { passed: true, failed_condition: None }
    }

    pub fn fail<S: Into<String>>(description: S) -> Self {
        Self { passed: false, failed_condition: Some(description.into()) }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum FieldValue {
    Number(f64),
    Text(String),
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ConditionEvaluator {
    unknown_field_policy: UnknownFieldPolicy,
}

impl ConditionEvaluator {
    pub fn new(unknown_field_policy: UnknownFieldPolicy) -> Self {
        Self { unknown_field_policy }
    }

    pub fn evaluate(&self, order: &Order, condition: &WorkflowCondition) -> bool {
        self.evaluate_at(order, condition, Utc::now())
    }

    /// Evaluates a condition with an explicit clock, for time-based fields.
    pub fn evaluate_at(&self, order: &Order, condition: &WorkflowCondition, now: DateTime<Utc>) -> bool {
        let value = match field_value(order, &condition.field, now) {
            Some(v) => v,
            None => {
                let pass = self.unknown_field_policy == UnknownFieldPolicy::Pass;
                warn!(
                    "⚖️ Condition '{}' on order {} names unknown field '{}'. Treating it as {}.",
                    condition.description,
                    order.order_id,
                    condition.field,
                    if pass { "passed" } else { "failed" }
                );
                return pass;
            },
        };
        let result = apply_operator(condition.operator, &value, &condition.value);
        trace!(
            "⚖️ Condition '{}' ({} {} {}) on order {}: {result}",
            condition.description,
            condition.field,
            condition.operator,
            condition.value,
            order.order_id
        );
        result
    }

    /// Evaluates the conditions in order, stopping at the first failure. An empty list passes.
    pub fn evaluate_all(&self, order: &Order, conditions: &[WorkflowCondition]) -> ConditionOutcome {
        self.evaluate_all_at(order, conditions, Utc::now())
    }

    pub fn evaluate_all_at(
        &self,
        order: &Order,
        conditions: &[WorkflowCondition],
        now: DateTime<Utc>,
    ) -> ConditionOutcome {
        conditions
            .iter()
            .find(|c| !self.evaluate_at(order, c, now))
            .map(|c| ConditionOutcome::fail(c.description.clone()))
            .unwrap_or_else(ConditionOutcome::pass)
    }
}

/// `None` means the field is unknown.
fn field_value(order: &Order, field: &str, now: DateTime<Utc>) -> Option<FieldValue> {
    match field {
        "amount" => Some(FieldValue::Number(order.submitted_amount.as_major())),
        "type" => Some(FieldValue::Text(order.order_type.to_string())),
        "priority" => Some(FieldValue::Text(order.priority.to_string())),
        "exchangeId" => Some(FieldValue::Text(order.exchange_id.clone())),
        "created_hours_ago" => Some(FieldValue::Number(order.hours_since_created(now).unwrap_or(0.0))),
        _ => None,
    }
}

fn apply_operator(operator: ConditionOperator, field: &FieldValue, expected: &Value) -> bool {
    match (operator, field) {
        (ConditionOperator::Equals, FieldValue::Number(n)) => {
            expected.as_f64().map(|e| (n - e).abs() < FLOAT_TOLERANCE).unwrap_or(false)
        },
        (ConditionOperator::Equals, FieldValue::Text(s)) => expected.as_str().map(|e| s == e).unwrap_or(false),
        (ConditionOperator::GreaterThan, FieldValue::Number(n)) => expected.as_f64().map(|e| *n > e).unwrap_or(true),
        (ConditionOperator::LessThan, FieldValue::Number(n)) => expected.as_f64().map(|e| *n < e).unwrap_or(true),
        (ConditionOperator::GreaterThan | ConditionOperator::LessThan, FieldValue::Text(_)) => true,
        (ConditionOperator::Contains, FieldValue::Text(s)) => expected.as_str().map(|e| s.contains(e)).unwrap_or(true),
        (ConditionOperator::Contains, FieldValue::Number(_)) => true,
    }
}

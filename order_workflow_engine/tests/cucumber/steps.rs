use cucumber::{then, when};
use order_workflow_engine::{
    db_types::{
        Actor,
        ActorRole,
        Amount,
        ConditionOperator,
        ConditionType,
        EventType,
        NewOrder,
        OrderStatus,
        OrderType,
        WorkflowCondition,
    },
    TransitionOptions,
};

use crate::cucumber::WorkflowWorld;

#[when(expr = "exchange '{word}' submits an {word} order for {int}")]
async fn submit_order(world: &mut WorkflowWorld, exchange: String, order_type: String, amount: i64) {
    let order_type = order_type.parse::<OrderType>().expect("Not a valid order type");
    let order = NewOrder::new(exchange.as_str(), exchange.as_str(), order_type, Amount::from_major(amount));
    let order = world.engine().submit_order(order).await.expect("Error submitting order");
    world.order_id = Some(order.order_id);
}

#[when(expr = "exchange '{word}' submits an {word} order for {int} with proof of payment")]
async fn submit_order_with_proof(world: &mut WorkflowWorld, exchange: String, order_type: String, amount: i64) {
    let order_type = order_type.parse::<OrderType>().expect("Not a valid order type");
    let order = NewOrder::new(exchange.as_str(), exchange.as_str(), order_type, Amount::from_major(amount))
        .with_screenshot("uploads/proof.png");
    let order = world.engine().submit_order(order).await.expect("Error submitting order");
    world.order_id = Some(order.order_id);
}

#[when(expr = "{word} '{word}' moves the order to {word}")]
async fn move_order(world: &mut WorkflowWorld, role: String, actor_id: String, status: String) {
    request_transition(world, role, actor_id, status, TransitionOptions::default()).await;
}

#[when(expr = "{word} '{word}' moves the order to {word} if {word} {word} {int}")]
async fn move_order_with_condition(
    world: &mut WorkflowWorld,
    role: String,
    actor_id: String,
    status: String,
    field: String,
    operator: String,
    value: i64,
) {
    let operator = operator.parse::<ConditionOperator>().expect("Not a valid operator");
    let description = format!("{field} {operator} {value}");
    let condition = WorkflowCondition::new(ConditionType::AmountBased, field, operator, value, description);
    let options = TransitionOptions::default().with_condition(condition);
    request_transition(world, role, actor_id, status, options).await;
}

async fn request_transition(
    world: &mut WorkflowWorld,
    role: String,
    actor_id: String,
    status: String,
    options: TransitionOptions,
) {
    let role = role.parse::<ActorRole>().expect("Not a valid role");
    let target = status.parse::<OrderStatus>().expect("Not a valid order status");
    let order_id = world.order_id().clone();
    let result = world.engine().execute_status_transition(&order_id, target, Actor::new(actor_id, role), options).await;
    world.last_error = result.err().map(|e| e.to_string());
}

#[when("the dispatcher runs")]
async fn dispatcher_runs(world: &mut WorkflowWorld) {
    world.engine().process_due_tasks().await.expect("Error processing tasks");
}

#[when(expr = "the dispatcher runs {int} times")]
async fn dispatcher_runs_n(world: &mut WorkflowWorld, n: u32) {
    for _ in 0..n {
        world.engine().process_due_tasks().await.expect("Error processing tasks");
    }
}

#[then(expr = "the order status is {word}")]
async fn order_status_is(world: &mut WorkflowWorld, status: String) {
    let expected = status.parse::<OrderStatus>().expect("Not a valid order status");
    let order = world.engine().fetch_order(world.order_id()).await.expect("Error fetching order");
    assert_eq!(order.status, expected);
}

#[then(expr = "the transition is rejected with {string}")]
async fn transition_rejected(world: &mut WorkflowWorld, message: String) {
    let error = world.last_error.as_deref().expect("The transition was accepted");
    assert!(error.contains(&message), "'{error}' does not contain '{message}'");
}

#[then("the transition is accepted")]
async fn transition_accepted(world: &mut WorkflowWorld) {
    assert!(world.last_error.is_none(), "Transition failed: {:?}", world.last_error);
}

#[then(expr = "the order has {int} {word} event(s)")]
async fn event_count(world: &mut WorkflowWorld, count: usize, event_type: String) {
    let event_type = event_type.parse::<EventType>().expect("Not a valid event type");
    let events = world.engine().order_events(world.order_id()).await.expect("Error fetching events");
    let n = events.iter().filter(|e| e.event_type == event_type).count();
    assert_eq!(n, count);
}

#[then(expr = "the order has {int} workflow task(s)")]
async fn task_count(world: &mut WorkflowWorld, count: usize) {
    let tasks = world.engine().order_tasks(world.order_id()).await.expect("Error fetching tasks");
    assert_eq!(tasks.len(), count);
}

#[then(expr = "the latest task was requested by {word}")]
async fn latest_task_actor(world: &mut WorkflowWorld, role: String) {
    let role = role.parse::<ActorRole>().expect("Not a valid role");
    let tasks = world.engine().order_tasks(world.order_id()).await.expect("Error fetching tasks");
    let task = tasks.last().expect("The order has no tasks");
    assert_eq!(task.actor.role, role);
}

#[then(expr = "'{word}' has {int} notification(s) mentioning {string}")]
async fn notifications_mentioning(world: &mut WorkflowWorld, recipient: String, count: usize, text: String) {
    let notifications = world.engine().notifications_for(&recipient, false).await.expect("Error fetching notifications");
    let n = notifications.iter().filter(|n| n.title.contains(&text) || n.message.contains(&text)).count();
    assert_eq!(n, count);
}

#[then(expr = "the {word} milestone is recorded")]
async fn milestone_recorded(world: &mut WorkflowWorld, status: String) {
    let status = status.parse::<OrderStatus>().expect("Not a valid order status");
    let order = world.engine().fetch_order(world.order_id()).await.expect("Error fetching order");
    assert!(order.timestamps.for_status(status).is_some(), "No {status} milestone on the order");
}

use chrono::{TimeZone, Utc};
use order_workflow_engine::{
    db_types::*,
    helpers::order_id_period,
    test_utils::prepare_env::{new_test_database, tear_down},
    traits::{
        ModifyOrderRequest,
        OrderManagement,
        OrderQueryFilter,
        OrderSort,
        OrderSortField,
        OrderStoreError,
        Pagination,
        SortDirection,
        StatusUpdate,
        WorkflowStorage,
    },
};

fn order(exchange: &str, order_type: OrderType, amount: i64) -> NewOrder {
    NewOrder::new(exchange, "owner-1", order_type, Amount::from_major(amount))
}

#[tokio::test]
async fn order_ids_follow_the_monthly_sequence() {
    let db = new_test_database().await;
    let period = order_id_period(Utc::now());
    for i in 1..=3 {
        let o = db.insert_order(order("exchange-1", OrderType::Incoming, 100)).await.unwrap();
        assert_eq!(o.order_id.as_str(), format!("T{period}{i:04}"));
        assert_eq!(o.status, OrderStatus::Submitted);
    }
    let january = Utc.with_ymd_and_hms(2024, 1, 15, 10, 0, 0).unwrap();
    let old = db.insert_order(order("exchange-1", OrderType::Incoming, 100).with_created_at(january)).await.unwrap();
    assert_eq!(old.order_id.as_str(), "T24010001");
    assert_eq!(old.timestamps.created(), Some(january));
    let next = db.insert_order(order("exchange-2", OrderType::Outgoing, 100)).await.unwrap();
    assert_eq!(next.order_id.as_str(), format!("T{period}0004"));
    tear_down(db).await;
}

#[tokio::test]
async fn new_orders_are_stored_with_commission() {
    let db = new_test_database().await;
    let new_order = order("exchange-1", OrderType::Outgoing, 1000)
        .with_commission_rate(150)
        .with_priority(Priority::High)
        .with_notes("Urgent transfer")
        .with_screenshot("proof/a.png");
    let stored = db.insert_order(new_order).await.unwrap();
    assert_eq!(stored.submitted_amount, Amount::from_major(1000));
    assert_eq!(stored.commission, Amount::from_major(15));
    assert_eq!(stored.priority, Priority::High);
    assert_eq!(stored.notes.as_deref(), Some("Urgent transfer"));
    assert_eq!(stored.screenshots, vec!["proof/a.png".to_string()]);
    assert!(stored.timestamps.for_status(OrderStatus::Submitted).is_some());

    let fetched = db.fetch_order(&stored.order_id).await.unwrap().expect("Order should exist");
    assert_eq!(fetched, stored);
    assert!(db.fetch_order(&OrderId::from("T00000000")).await.unwrap().is_none());
    tear_down(db).await;
}

#[tokio::test]
async fn status_updates_are_validated_and_audited() {
    let db = new_test_database().await;
    let o = db.insert_order(order("exchange-1", OrderType::Outgoing, 100)).await.unwrap();

    let err = db
        .update_order_status(StatusUpdate::new(o.order_id.clone(), OrderStatus::Completed, Actor::admin("admin-1")))
        .await
        .expect_err("Submitted orders cannot be completed directly");
    assert!(matches!(err, OrderStoreError::InvalidTransition { from: OrderStatus::Submitted, .. }));
    let err = db
        .update_order_status(StatusUpdate::new(o.order_id.clone(), OrderStatus::Processing, Actor::exchange("ex")))
        .await
        .expect_err("Exchanges cannot start processing");
    assert!(matches!(err, OrderStoreError::InvalidTransition { role: ActorRole::Exchange, .. }));
    assert!(db.fetch_workflow_actions(&o.order_id).await.unwrap().is_empty());

    let update = StatusUpdate::new(o.order_id.clone(), OrderStatus::Processing, Actor::admin("admin-1"))
        .with_notes(Some("Funds verified".into()));
    let changed = db.update_order_status(update).await.unwrap();
    assert!(changed.status_changed());
    assert_eq!(changed.old_order.status, OrderStatus::Submitted);
    assert_eq!(changed.new_order.status, OrderStatus::Processing);
    // transition notes go to the audit trail, not onto the order
    assert!(changed.new_order.notes.is_none());
    assert_eq!(changed.new_order.timestamps.created(), o.timestamps.created());
    assert!(changed.new_order.timestamps.for_status(OrderStatus::Processing).is_some());

    let update = StatusUpdate::new(o.order_id.clone(), OrderStatus::Cancelled, Actor::admin("admin-2"))
        .with_reason(Some("Beneficiary closed the account".into()));
    let changed = db.update_order_status(update).await.unwrap();
    assert!(changed.new_order.notes.is_none());
    assert_eq!(changed.new_order.reason.as_deref(), Some("Beneficiary closed the account"));

    let actions = db.fetch_workflow_actions(&o.order_id).await.unwrap();
    assert_eq!(actions.len(), 2);
    assert_eq!((actions[0].from_status, actions[0].to_status), (OrderStatus::Submitted, OrderStatus::Processing));
    assert_eq!((actions[1].from_status, actions[1].to_status), (OrderStatus::Processing, OrderStatus::Cancelled));
    assert_eq!(actions[0].notes.as_deref(), Some("Funds verified"));
    assert_eq!(actions[1].actor_id, "admin-2");
    assert_eq!(actions[1].reason.as_deref(), Some("Beneficiary closed the account"));

    let err = db
        .update_order_status(StatusUpdate::new(o.order_id.clone(), OrderStatus::Processing, Actor::admin("admin-1")))
        .await
        .expect_err("Cancelled is terminal");
    assert!(matches!(err, OrderStoreError::InvalidTransition { .. }));

    let err = db
        .update_order_status(StatusUpdate::new("T00000000".into(), OrderStatus::Processing, Actor::admin("admin-1")))
        .await
        .expect_err("Unknown order");
    assert!(matches!(err, OrderStoreError::OrderNotFound(_)));
    tear_down(db).await;
}

#[tokio::test]
async fn only_submitted_orders_can_be_modified() {
    let db = new_test_database().await;
    let o = db.insert_order(order("exchange-1", OrderType::Incoming, 1000).with_commission_rate(200)).await.unwrap();
    assert_eq!(o.commission, Amount::from_major(20));

    let err = db.modify_order(&o.order_id, ModifyOrderRequest::default()).await.expect_err("Empty edit");
    assert!(matches!(err, OrderStoreError::OrderModificationNoOp));

    // the commission is rescaled at the existing rate when only the amount changes
    let changed = db
        .modify_order(&o.order_id, ModifyOrderRequest::default().with_amount(Amount::from_major(500)))
        .await
        .unwrap();
    assert_eq!(changed.new_order.submitted_amount, Amount::from_major(500));
    assert_eq!(changed.new_order.commission, Amount::from_major(10));
    assert!(!changed.status_changed());

    let changed = db
        .modify_order(
            &o.order_id,
            ModifyOrderRequest::default()
                .with_commission_rate(100)
                .with_notes("Rate renegotiated")
                .with_priority(Priority::Critical)
                .with_screenshot("proof/1.png")
                .with_screenshot("proof/2.png"),
        )
        .await
        .unwrap();
    let modified = changed.new_order;
    assert_eq!(modified.commission, Amount::from_major(5));
    assert_eq!(modified.notes.as_deref(), Some("Rate renegotiated"));
    assert_eq!(modified.priority, Priority::Critical);
    assert_eq!(modified.screenshots.len(), 2);
    assert_eq!(modified.status, OrderStatus::Submitted);
    assert!(modified.timestamps.updated() >= o.timestamps.updated());

    db.update_order_status(StatusUpdate::new(o.order_id.clone(), OrderStatus::Processing, Actor::admin("admin-1")))
        .await
        .unwrap();
    let err = db
        .modify_order(&o.order_id, ModifyOrderRequest::default().with_notes("Too late"))
        .await
        .expect_err("Processing orders are locked");
    assert!(matches!(err, OrderStoreError::OrderNotEditable(_, OrderStatus::Processing)));
    tear_down(db).await;
}

#[tokio::test]
async fn search_filters_sorts_and_pages() {
    let db = new_test_database().await;
    for (exchange, order_type, amount) in [
        ("exchange-a", OrderType::Incoming, 300),
        ("exchange-a", OrderType::Outgoing, 100),
        ("exchange-b", OrderType::Incoming, 500),
        ("exchange-a", OrderType::Incoming, 200),
        ("exchange-b", OrderType::Outgoing, 400),
    ] {
        db.insert_order(order(exchange, order_type, amount)).await.unwrap();
    }

    let by_amount = OrderSort::new(OrderSortField::Amount, SortDirection::Ascending);
    let page = db
        .search_orders(OrderQueryFilter::default().with_exchange_id("exchange-a"), by_amount, Pagination::default())
        .await
        .unwrap();
    assert_eq!(page.total, 3);
    let amounts = page.orders.iter().map(|o| o.submitted_amount.value() / 100).collect::<Vec<_>>();
    assert_eq!(amounts, vec![100, 200, 300]);
    assert!(!page.has_more());

    let filter = OrderQueryFilter::default().with_order_type(OrderType::Incoming);
    let desc = OrderSort::new(OrderSortField::Amount, SortDirection::Descending);
    let first = db.search_orders(filter.clone(), desc, Pagination::new(0, 2)).await.unwrap();
    assert_eq!(first.total, 3);
    assert_eq!(first.orders.len(), 2);
    assert!(first.has_more());
    assert_eq!(first.orders[0].submitted_amount, Amount::from_major(500));
    let second = db.search_orders(filter, desc, Pagination::new(1, 2)).await.unwrap();
    assert_eq!(second.orders.len(), 1);
    assert_eq!(second.orders[0].submitted_amount, Amount::from_major(200));
    assert!(!second.has_more());

    let none = db
        .search_orders(
            OrderQueryFilter::default().with_status(OrderStatus::Completed),
            OrderSort::default(),
            Pagination::default(),
        )
        .await
        .unwrap();
    assert_eq!(none.total, 0);
    assert!(none.orders.is_empty());
    tear_down(db).await;
}

#[tokio::test]
async fn task_status_changes_are_guarded() {
    let db = new_test_database().await;
    let o = db.insert_order(order("exchange-1", OrderType::Outgoing, 100)).await.unwrap();
    let task = db
        .insert_task(NewWorkflowTask {
            order_id: o.order_id.clone(),
            target_status: OrderStatus::Processing,
            actor: Actor::admin("admin-1"),
            priority: Priority::High,
            scheduled_at: Utc::now(),
            retry_count: 0,
            max_retries: 2,
            metadata: TaskMetadata { notes: Some("go".into()), ..Default::default() },
            dependencies: vec![],
            conditions: vec![WorkflowCondition::new(
                ConditionType::AmountBased,
                "amount",
                ConditionOperator::LessThan,
                1000,
                "Small orders only",
            )],
        })
        .await
        .unwrap();
    assert_eq!(task.status, TaskStatus::Pending);
    assert_eq!(task.action, TaskAction::StartProcessing);
    assert_eq!(task.conditions.len(), 1);
    assert_eq!(task.metadata.notes.as_deref(), Some("go"));

    let err = db.mark_task_completed(task.id).await.expect_err("Pending tasks cannot complete");
    assert!(matches!(err, OrderStoreError::TaskStatusMismatch { expected: TaskStatus::Executing, .. }));

    let executing = db.mark_task_executing(task.id).await.unwrap();
    assert_eq!(executing.status, TaskStatus::Executing);
    assert!(executing.executed_at.is_some());
    let err = db.cancel_pending_task(task.id).await.expect_err("Executing tasks cannot be cancelled");
    assert!(matches!(err, OrderStoreError::TaskStatusMismatch { actual: TaskStatus::Executing, .. }));

    let failed = db.mark_task_failed(task.id, "Boom").await.unwrap();
    assert_eq!(failed.status, TaskStatus::Failed);
    assert_eq!(failed.last_error.as_deref(), Some("Boom"));
    assert!(failed.failed_at.is_some());

    let err = db.mark_task_executing(9999).await.expect_err("Unknown task");
    assert!(matches!(err, OrderStoreError::TaskNotFound(9999)));

    let pending = db.fetch_tasks_by_status(TaskStatus::Pending).await.unwrap();
    assert!(pending.is_empty());
    let counts = db.task_status_counts().await.unwrap();
    assert_eq!(counts.failed, 1);
    assert_eq!(counts.total(), 1);
    tear_down(db).await;
}

#[tokio::test]
async fn only_one_active_task_per_order_is_stored() {
    let db = new_test_database().await;
    let o = db.insert_order(order("exchange-1", OrderType::Outgoing, 100)).await.unwrap();
    let new_task = |target| NewWorkflowTask {
        order_id: o.order_id.clone(),
        target_status: target,
        actor: Actor::admin("admin-1"),
        priority: Priority::Normal,
        scheduled_at: Utc::now(),
        retry_count: 0,
        max_retries: 3,
        metadata: TaskMetadata::default(),
        dependencies: vec![],
        conditions: vec![],
    };
    let first = db.insert_task(new_task(OrderStatus::Processing)).await.unwrap();
    let err = db.insert_task(new_task(OrderStatus::Rejected)).await.expect_err("Second pending task");
    assert!(matches!(err, OrderStoreError::TaskAlreadyActive(ref id) if id == &o.order_id));

    db.mark_task_executing(first.id).await.unwrap();
    let err = db.insert_task(new_task(OrderStatus::Rejected)).await.expect_err("Task is still executing");
    assert!(matches!(err, OrderStoreError::TaskAlreadyActive(_)));

    db.mark_task_failed(first.id, "Boom").await.unwrap();
    let retry = db.insert_task(new_task(OrderStatus::Processing)).await.unwrap();
    assert_eq!(retry.status, TaskStatus::Pending);
    assert_eq!(db.fetch_tasks_for_order(&o.order_id).await.unwrap().len(), 2);
    tear_down(db).await;
}

#[tokio::test]
async fn event_log_is_append_only() {
    let db = new_test_database().await;
    let o = db.insert_order(order("exchange-1", OrderType::Outgoing, 100)).await.unwrap();
    let event = db
        .insert_event(
            NewWorkflowEvent::new(o.order_id.clone(), EventType::StatusChanged, Severity::Info)
                .with_detail("from_status", "submitted")
                .with_detail("to_status", "processing"),
        )
        .await
        .unwrap();
    assert_eq!(event.details["to_status"], serde_json::json!("processing"));

    let result = sqlx::query("UPDATE workflow_events SET severity = 'critical' WHERE id = $1")
        .bind(event.id)
        .execute(db.pool())
        .await;
    assert!(result.is_err());
    let result = sqlx::query("DELETE FROM workflow_events").execute(db.pool()).await;
    assert!(result.is_err());

    let events = db.fetch_events_for_order(&o.order_id).await.unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0], event);
    tear_down(db).await;
}

#[tokio::test]
async fn notifications_are_listed_newest_first() {
    let db = new_test_database().await;
    let order_id = OrderId::from("T25010001");
    for title in ["first", "second", "third"] {
        db.insert_notification(NewNotification::new(
            "user-1",
            order_id.clone(),
            NotificationType::StatusUpdate,
            title,
            "body",
        ))
        .await
        .unwrap();
    }
    db.insert_notification(
        NewNotification::new("admin", order_id.clone(), NotificationType::WorkflowFailure, "alert", "body")
            .with_priority(Priority::High)
            .with_action_url("/orders/T25010001"),
    )
    .await
    .unwrap();

    let all = db.fetch_notifications_for_user("user-1", false).await.unwrap();
    let titles = all.iter().map(|n| n.title.as_str()).collect::<Vec<_>>();
    assert_eq!(titles, vec!["third", "second", "first"]);
    assert!(all.iter().all(|n| !n.read));

    let read = db.mark_notification_read(all[1].id).await.unwrap();
    assert!(read.read);
    let unread = db.fetch_notifications_for_user("user-1", true).await.unwrap();
    assert_eq!(unread.len(), 2);
    assert!(unread.iter().all(|n| n.title != "second"));

    let admin = db.fetch_notifications_for_user("admin", false).await.unwrap();
    assert_eq!(admin.len(), 1);
    assert_eq!(admin[0].priority, Priority::High);
    assert_eq!(admin[0].action_url.as_deref(), Some("/orders/T25010001"));

    let err = db.mark_notification_read(4242).await.expect_err("Unknown notification");
    assert!(matches!(err, OrderStoreError::NotificationNotFound(4242)));
    tear_down(db).await;
}

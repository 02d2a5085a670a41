//! End-to-end tests for the order lifecycle: creation, status transitions,
//! cancellation, delivery and deletion.

mod common;

use assert_matches::assert_matches;
use common::TestApp;
use prodboard::{
    errors::ServiceError,
    events::Event,
    models::{OrderStatus, Priority, UserRole},
    services::{NewOrder, NewOrderItem, OrderPatch, TransitionOptions},
};
use rust_decimal_macros::dec;

#[tokio::test]
async fn new_order_starts_pending_with_totals() {
    let app = TestApp::new().await;
    let order = app.seed_order(&app.admin, 5, dec!(80.00)).await;

    assert_eq!(order.status, OrderStatus::Pending);
    assert_eq!(order.production_progress, 0);
    assert_eq!(order.total_amount, dec!(400.00));
    assert_eq!(order.total_quantity, 5);
    assert_eq!(order.customer_name, "Maria Souza");
    assert_eq!(order.seller_id, app.admin.user_id);
    assert!(order.order_number.starts_with("ORD-"));
    assert!(order.id.starts_with("order-"));
}

#[tokio::test]
async fn order_numbers_are_unique() {
    let app = TestApp::new().await;
    let mut numbers = std::collections::HashSet::new();
    for _ in 0..5 {
        let order = app.seed_order(&app.admin, 1, dec!(10)).await;
        assert!(numbers.insert(order.order_number));
    }
}

#[tokio::test]
async fn awaiting_approval_orders_start_on_hold() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Loja Azul").await;
    let product = app.seed_product("Avental", "AV-01", dec!(25)).await;

    let order = app
        .ctx
        .orders
        .create_order(
            NewOrder {
                customer_id: customer.id,
                items: vec![NewOrderItem::new(product.id, 2, Some(dec!(30)))],
                priority: Priority::Urgent,
                awaiting_approval: true,
                ..Default::default()
            },
            &app.admin,
        )
        .await
        .unwrap();

    assert_eq!(order.status, OrderStatus::AwaitingApproval);
    assert_eq!(order.total_amount, dec!(60));

    let confirmed = app
        .ctx
        .orders
        .transition(&order.id, OrderStatus::Confirmed, TransitionOptions::default(), &app.admin)
        .await
        .unwrap();
    assert_eq!(confirmed.production_progress, 10);
}

#[tokio::test]
async fn create_order_validates_input() {
    let app = TestApp::new().await;
    let customer = app.seed_customer("Ana").await;

    let no_items = app
        .ctx
        .orders
        .create_order(
            NewOrder {
                customer_id: customer.id.clone(),
                ..Default::default()
            },
            &app.admin,
        )
        .await;
    assert_matches!(no_items, Err(ServiceError::ValidationError(_)));

    let unknown_customer = app
        .ctx
        .orders
        .create_order(
            NewOrder {
                customer_id: "cust-missing".into(),
                items: vec![NewOrderItem::new("prod-1", 1, None)],
                ..Default::default()
            },
            &app.admin,
        )
        .await;
    assert_matches!(unknown_customer, Err(ServiceError::ValidationError(_)));

    let zero_quantity = app
        .ctx
        .orders
        .create_order(
            NewOrder {
                customer_id: customer.id,
                items: vec![NewOrderItem::new("prod-1", 0, None)],
                ..Default::default()
            },
            &app.admin,
        )
        .await;
    assert_matches!(zero_quantity, Err(ServiceError::ValidationError(_)));

    assert!(app.ctx.orders.all_orders().await.unwrap().is_empty());
}

#[tokio::test]
async fn walking_the_pipeline_updates_progress() {
    let app = TestApp::new().await;
    let order = app.seed_order(&app.admin, 5, dec!(80)).await;
    let mut events = app.ctx.events.subscribe();

    let steps = [
        (OrderStatus::Confirmed, 10),
        (OrderStatus::InProduction, 50),
        (OrderStatus::QualityCheck, 80),
        (OrderStatus::Ready, 95),
        (OrderStatus::Delivered, 100),
    ];
    for (status, progress) in steps {
        let updated = app
            .ctx
            .orders
            .transition(&order.id, status, TransitionOptions::with_operator("João"), &app.admin)
            .await
            .unwrap();
        assert_eq!(updated.status, status);
        assert_eq!(updated.production_progress, progress);
    }

    let delivered = app.ctx.orders.get_order(&order.id).await.unwrap();
    assert!(delivered.completed_date.is_some());
    assert_eq!(delivered.assigned_operator.as_deref(), Some("João"));

    let mut status_changes = 0;
    while let Ok(event) = events.try_recv() {
        if let Event::OrderStatusChanged { order_id, .. } = event {
            assert_eq!(order_id, order.id);
            status_changes += 1;
        }
    }
    assert_eq!(status_changes, 5);
}

#[tokio::test]
async fn illegal_transitions_leave_the_order_untouched() {
    let app = TestApp::new().await;
    let order = app.seed_order(&app.admin, 3, dec!(10)).await;

    let skipped = app
        .ctx
        .orders
        .transition(&order.id, OrderStatus::Ready, TransitionOptions::default(), &app.admin)
        .await;
    assert_matches!(
        skipped,
        Err(ServiceError::InvalidTransition {
            from: OrderStatus::Pending,
            to: OrderStatus::Ready
        })
    );

    let same = app
        .ctx
        .orders
        .transition(&order.id, OrderStatus::Pending, TransitionOptions::default(), &app.admin)
        .await;
    assert_matches!(same, Err(ServiceError::InvalidTransition { .. }));

    let stored = app.ctx.orders.get_order(&order.id).await.unwrap();
    assert_eq!(stored.status, OrderStatus::Pending);
    assert_eq!(stored.production_progress, 0);
}

#[tokio::test]
async fn cancelling_records_the_reason() {
    let app = TestApp::new().await;
    let order = app.seed_order(&app.admin, 2, dec!(50)).await;
    app.ctx
        .orders
        .update_order(
            &order.id,
            OrderPatch {
                notes: Some(Some("Entregar na portaria".into())),
                ..Default::default()
            },
            &app.admin,
        )
        .await
        .unwrap();
    app.ctx
        .orders
        .transition(&order.id, OrderStatus::Confirmed, TransitionOptions::default(), &app.admin)
        .await
        .unwrap();

    let missing_reason = app
        .ctx
        .orders
        .transition(&order.id, OrderStatus::Cancelled, TransitionOptions::default(), &app.admin)
        .await;
    assert_matches!(missing_reason, Err(ServiceError::ValidationError(_)));

    let cancelled = app
        .ctx
        .orders
        .transition(
            &order.id,
            OrderStatus::Cancelled,
            TransitionOptions::cancel("Cliente cancelou"),
            &app.admin,
        )
        .await
        .unwrap();

    assert_eq!(cancelled.status, OrderStatus::Cancelled);
    assert_eq!(cancelled.production_progress, 0);
    assert_eq!(
        cancelled.notes.as_deref(),
        Some("Cliente cancelou\n\nEntregar na portaria")
    );
    let cancellation = cancelled.cancellation.expect("cancellation recorded");
    assert_eq!(cancellation.reason, "Cliente cancelou");

    let reopen = app
        .ctx
        .orders
        .transition(&order.id, OrderStatus::Confirmed, TransitionOptions::default(), &app.admin)
        .await;
    assert_matches!(reopen, Err(ServiceError::InvalidTransition { .. }));
}

#[tokio::test]
async fn quality_check_cannot_be_cancelled() {
    let app = TestApp::new().await;
    let order = app.seed_order(&app.admin, 1, dec!(10)).await;
    for status in [
        OrderStatus::Confirmed,
        OrderStatus::InProduction,
        OrderStatus::QualityCheck,
    ] {
        app.ctx
            .orders
            .transition(&order.id, status, TransitionOptions::default(), &app.admin)
            .await
            .unwrap();
    }

    let result = app
        .ctx
        .orders
        .transition(
            &order.id,
            OrderStatus::Cancelled,
            TransitionOptions::cancel("tarde demais"),
            &app.admin,
        )
        .await;
    assert_matches!(result, Err(ServiceError::InvalidTransition { .. }));
}

#[tokio::test]
async fn editing_items_recomputes_totals() {
    let app = TestApp::new().await;
    let order = app.seed_order(&app.admin, 5, dec!(80)).await;
    let product = app.seed_product("Boné", "BN-01", dec!(15)).await;

    let updated = app
        .ctx
        .orders
        .update_order(
            &order.id,
            OrderPatch {
                items: Some(vec![NewOrderItem::new(product.id, 4, None)]),
                priority: Some(Priority::High),
                ..Default::default()
            },
            &app.admin,
        )
        .await
        .unwrap();

    assert_eq!(updated.total_amount, dec!(60));
    assert_eq!(updated.total_quantity, 4);
    assert_eq!(updated.priority, Priority::High);
    assert_eq!(updated.status, OrderStatus::Pending);
}

#[tokio::test]
async fn delete_is_unconditional() {
    let app = TestApp::new().await;
    let order = app.seed_order(&app.admin, 1, dec!(10)).await;
    app.ctx
        .orders
        .transition(&order.id, OrderStatus::Confirmed, TransitionOptions::default(), &app.admin)
        .await
        .unwrap();

    assert!(app.ctx.orders.delete_order(&order.id, &app.admin).await.unwrap());
    assert_matches!(
        app.ctx.orders.get_order(&order.id).await,
        Err(ServiceError::NotFound(_))
    );
    assert!(!app.ctx.orders.delete_order(&order.id, &app.admin).await.unwrap());
}

#[tokio::test]
async fn sellers_only_list_their_own_orders() {
    let app = TestApp::new().await;
    let ana = app.session_for("ana@oficina.com", UserRole::Seller, &[]).await;
    let bia = app.session_for("bia@oficina.com", UserRole::Seller, &[]).await;

    let own = app.seed_order(&ana, 1, dec!(10)).await;
    app.seed_order(&bia, 1, dec!(10)).await;

    let visible = app.ctx.orders.list_orders(&ana).await.unwrap();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, own.id);

    assert_eq!(app.ctx.orders.list_orders(&app.admin).await.unwrap().len(), 2);
}

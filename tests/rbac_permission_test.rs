//! Permission checks across roles, token forms and the session manager.

mod common;

use assert_matches::assert_matches;
use common::TestApp;
use prodboard::{
    auth::{Action, Module, Permission},
    errors::ServiceError,
    models::{Customer, OrderStatus, UserRole},
    services::{users::NewUser, SettingsScope, TransitionOptions},
};
use rust_decimal_macros::dec;
use serde_json::json;

#[tokio::test]
async fn orders_full_grants_every_order_action() {
    let app = TestApp::new().await;
    let clerk = app
        .session_for("clerk@oficina.com", UserRole::Operator, &["orders-full"])
        .await;

    for action in [Action::View, Action::Create, Action::Edit, Action::Delete] {
        assert!(clerk.can(Permission::new(Module::Orders, action)));
    }

    let order = app.seed_order(&clerk, 1, dec!(10)).await;
    app.ctx
        .orders
        .transition(&order.id, OrderStatus::Confirmed, TransitionOptions::default(), &clerk)
        .await
        .unwrap();
    assert!(app.ctx.orders.delete_order(&order.id, &clerk).await.unwrap());

    assert_matches!(
        app.ctx.customers.list_customers(&clerk).await,
        Err(ServiceError::Forbidden(_))
    );
}

#[tokio::test]
async fn legacy_tokens_still_work() {
    let app = TestApp::new().await;
    let legacy = app
        .session_for("old@oficina.com", UserRole::Seller, &["orders:read", "view_customers"])
        .await;

    assert!(app.ctx.orders.list_orders(&legacy).await.is_ok());
    assert!(app.ctx.customers.list_customers(&legacy).await.is_ok());
    assert_matches!(
        app.ctx
            .customers
            .create_customer(Customer::new("Novo"), &legacy)
            .await,
        Err(ServiceError::Forbidden(_))
    );
}

#[tokio::test]
async fn operators_move_orders_through_production_only() {
    let app = TestApp::new().await;
    let operator = app
        .session_for("op@oficina.com", UserRole::Operator, &[])
        .await;
    let order = app.seed_order(&app.admin, 2, dec!(10)).await;

    let moved = app
        .ctx
        .orders
        .transition(
            &order.id,
            OrderStatus::Confirmed,
            TransitionOptions::with_operator("Carlos"),
            &operator,
        )
        .await
        .unwrap();
    assert_eq!(moved.assigned_operator.as_deref(), Some("Carlos"));

    assert_matches!(
        app.ctx.orders.delete_order(&order.id, &operator).await,
        Err(ServiceError::Forbidden(_))
    );
}

#[tokio::test]
async fn only_admins_create_users() {
    let app = TestApp::new().await;
    let seller = app
        .session_for("seller@oficina.com", UserRole::Seller, &["all"])
        .await;

    let attempt = app
        .ctx
        .users
        .create_user(
            NewUser {
                email: "x@oficina.com".into(),
                name: "X".into(),
                role: UserRole::Seller,
                permissions: vec![],
            },
            &seller,
        )
        .await;
    assert_matches!(attempt, Err(ServiceError::Forbidden(_)));

    let duplicate = app
        .ctx
        .users
        .create_user(
            NewUser {
                email: "SELLER@oficina.com".into(),
                name: "Again".into(),
                role: UserRole::Seller,
                permissions: vec![],
            },
            &app.admin,
        )
        .await;
    assert_matches!(duplicate, Err(ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn bootstrap_is_refused_once_users_exist() {
    let app = TestApp::new().await;
    assert_matches!(
        app.ctx.users.bootstrap_admin("second@oficina.com", "Second").await,
        Err(ServiceError::Forbidden(_))
    );
}

#[tokio::test]
async fn role_defaults_are_applied_on_creation() {
    let app = TestApp::new().await;
    let seller = app
        .session_for("default@oficina.com", UserRole::Seller, &[])
        .await;

    assert!(seller.permissions.iter().any(|p| p == "orders:create"));
    assert!(seller.can(Permission::new(Module::Customers, Action::Delete)));
    assert!(!seller.can(Permission::new(Module::Users, Action::View)));
}

#[tokio::test]
async fn session_manager_signs_in_and_out() {
    let app = TestApp::new().await;
    let sessions = &app.ctx.sessions;

    assert!(sessions.current_user().await.unwrap().is_none());
    assert_matches!(
        sessions
            .require(Permission::new(Module::Orders, Action::View))
            .await,
        Err(ServiceError::Unauthenticated)
    );

    let session = sessions.sign_in("ADMIN@oficina.com").await.unwrap();
    assert_eq!(session.user_id, app.admin.user_id);
    assert_eq!(
        sessions.current_user().await.unwrap().map(|s| s.user_id),
        Some(app.admin.user_id.clone())
    );
    assert!(sessions
        .require(Permission::new(Module::Settings, Action::Manage))
        .await
        .is_ok());

    sessions.sign_out().await.unwrap();
    assert!(sessions.current_user().await.unwrap().is_none());

    assert_matches!(
        sessions.sign_in("nobody@oficina.com").await,
        Err(ServiceError::Unauthenticated)
    );
}

#[tokio::test]
async fn deactivated_users_cannot_sign_in() {
    let app = TestApp::new().await;
    let seller = app
        .session_for("gone@oficina.com", UserRole::Seller, &[])
        .await;
    app.ctx
        .users
        .set_active(&seller.user_id, false, &app.admin)
        .await
        .unwrap();

    assert_matches!(
        app.ctx.sessions.sign_in("gone@oficina.com").await,
        Err(ServiceError::Forbidden(_))
    );
}

#[tokio::test]
async fn settings_need_edit_permission() {
    let app = TestApp::new().await;
    let operator = app
        .session_for("op2@oficina.com", UserRole::Operator, &[])
        .await;

    assert_matches!(
        app.ctx
            .settings
            .merge(SettingsScope::Company, json!({"name": "Oficina"}), &operator)
            .await,
        Err(ServiceError::Forbidden(_))
    );

    app.ctx
        .settings
        .merge(SettingsScope::Company, json!({"name": "Oficina"}), &app.admin)
        .await
        .unwrap();
    let merged = app
        .ctx
        .settings
        .merge(SettingsScope::Company, json!({"cnpj": "00.000.000/0001-00"}), &app.admin)
        .await
        .unwrap();
    assert_eq!(merged["name"], "Oficina");
    assert_eq!(
        app.ctx.settings.get(SettingsScope::Company).await.unwrap(),
        merged
    );
}

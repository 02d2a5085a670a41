use chrono::{DateTime, Datelike, Utc};
use rand::Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{info, instrument, warn};
use validator::{Validate, ValidationError};

use crate::auth::{Action, Module, Permission, Session};
use crate::errors::{Result, ServiceError};
use crate::models::{Customer, Order, OrderProduct, OrderStatus, Priority, Product};
use crate::repositories::Repository;
use crate::services::order_status::{OrderStatusService, TransitionOptions};
use crate::store::ListQuery;

const ORDERS_VIEW: Permission = Permission::new(Module::Orders, Action::View);
const ORDERS_CREATE: Permission = Permission::new(Module::Orders, Action::Create);
const ORDERS_EDIT: Permission = Permission::new(Module::Orders, Action::Edit);
const ORDERS_DELETE: Permission = Permission::new(Module::Orders, Action::Delete);
const PRODUCTION_EDIT: Permission = Permission::new(Module::Production, Action::Edit);

fn validate_non_negative(value: &Decimal) -> std::result::Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ValidationError::new("negative_price"));
    }
    Ok(())
}

/// One requested line item.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct NewOrderItem {
    #[validate(length(min = 1, message = "Product is required"))]
    pub product_id: String,
    #[validate(range(min = 1, message = "Quantity must be greater than zero"))]
    pub quantity: i64,
    /// Defaults to the product's base price.
    #[validate(custom = "validate_non_negative")]
    pub unit_price: Option<Decimal>,
    pub model: Option<String>,
    pub size: Option<String>,
    pub color: Option<String>,
    pub fabric: Option<String>,
}

impl NewOrderItem {
    pub fn new(product_id: impl Into<String>, quantity: i64, unit_price: Option<Decimal>) -> Self {
        Self {
            product_id: product_id.into(),
            quantity,
            unit_price,
            model: None,
            size: None,
            color: None,
            fabric: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct NewOrder {
    #[validate(length(min = 1, message = "Select a customer"))]
    pub customer_id: String,
    #[validate(length(min = 1, message = "Add at least one product"))]
    pub items: Vec<NewOrderItem>,
    #[serde(default)]
    pub priority: Priority,
    pub scheduled_date: Option<DateTime<Utc>>,
    pub delivery_date: Option<DateTime<Utc>>,
    pub assigned_operator: Option<String>,
    pub notes: Option<String>,
    /// Start in `awaiting_approval` instead of `pending`.
    #[serde(default)]
    pub awaiting_approval: bool,
}

/// Edit-form fields. Status changes go through [`OrderService::transition`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderPatch {
    pub priority: Option<Priority>,
    pub scheduled_date: Option<DateTime<Utc>>,
    pub delivery_date: Option<Option<DateTime<Utc>>>,
    pub assigned_operator: Option<Option<String>>,
    pub notes: Option<Option<String>>,
    /// Replaces every line item when present.
    pub items: Option<Vec<NewOrderItem>>,
}

/// `ORD-<year>-<NNNN>` with a random four digit suffix.
pub fn generate_order_number<R: Rng + ?Sized>(rng: &mut R, year: i32) -> String {
    format!("ORD-{}-{:04}", year, rng.gen_range(0..10_000))
}

/// Draws order numbers until one is not in `taken`, giving up after
/// `attempts` draws.
pub fn unique_order_number<R: Rng + ?Sized>(
    rng: &mut R,
    year: i32,
    taken: &HashSet<String>,
    attempts: u32,
) -> Option<String> {
    (0..attempts.max(1))
        .map(|_| generate_order_number(rng, year))
        .find(|candidate| !taken.contains(candidate))
}

#[derive(Clone)]
pub struct OrderService {
    orders: Repository<Order>,
    customers: Repository<Customer>,
    products: Repository<Product>,
    status: OrderStatusService,
    order_number_attempts: u32,
}

impl OrderService {
    pub fn new(
        orders: Repository<Order>,
        customers: Repository<Customer>,
        products: Repository<Product>,
        status: OrderStatusService,
        order_number_attempts: u32,
    ) -> Self {
        Self {
            orders,
            customers,
            products,
            status,
            order_number_attempts,
        }
    }

    /// Orders visible to the session, newest first. Non-admins only see the
    /// orders they sold.
    #[instrument(skip(self, session), fields(user_id = %session.user_id))]
    pub async fn list_orders(&self, session: &Session) -> Result<Vec<Order>> {
        session.require(ORDERS_VIEW)?;
        let mut query = ListQuery::all().newest_first();
        if !session.is_admin() {
            query = query.where_eq("seller_id", session.user_id.clone());
        }
        self.orders.list(&query).await
    }

    /// Every order regardless of seller, for reports and the calendar.
    pub async fn all_orders(&self) -> Result<Vec<Order>> {
        self.orders.list(&ListQuery::all().newest_first()).await
    }

    pub async fn get_order(&self, id: &str) -> Result<Order> {
        self.orders.get(id).await
    }

    #[instrument(skip(self, input, session), fields(user_id = %session.user_id, customer_id = %input.customer_id))]
    pub async fn create_order(&self, input: NewOrder, session: &Session) -> Result<Order> {
        session.require(ORDERS_CREATE)?;
        input.validate()?;

        let customer = self.customers.find(&input.customer_id).await?.ok_or_else(|| {
            ServiceError::ValidationError(format!("Customer {} not found", input.customer_id))
        })?;
        let products = self.resolve_items(&input.items).await?;

        let now = Utc::now();
        let mut order: Order = serde_json::from_value(serde_json::json!({}))?;
        order.order_number = self.next_order_number(now.year()).await?;
        order.customer_id = customer.id.clone();
        order.customer_name = customer.name.clone();
        order.customer_phone = customer.phone.clone();
        order.customer_email = customer.email.clone();
        order.seller_id = session.user_id.clone();
        order.seller_name = session.name.clone();
        order.status = if input.awaiting_approval {
            OrderStatus::AwaitingApproval
        } else {
            OrderStatus::Pending
        };
        order.priority = input.priority;
        order.production_progress = 0;
        order.scheduled_date = input.scheduled_date.unwrap_or(now);
        order.delivery_date = input.delivery_date;
        order.assigned_operator = input.assigned_operator;
        order.notes = input.notes.filter(|n| !n.trim().is_empty());
        order.products = products;
        order.recompute_totals();

        let created = self.orders.create(&order).await?;
        info!(
            order_id = %created.id,
            order_number = %created.order_number,
            total_amount = %created.total_amount,
            "order created"
        );
        Ok(created)
    }

    #[instrument(skip(self, patch, session), fields(order_id = %id))]
    pub async fn update_order(&self, id: &str, patch: OrderPatch, session: &Session) -> Result<Order> {
        session.require(ORDERS_EDIT)?;
        let mut order = self.orders.get(id).await?;

        if let Some(priority) = patch.priority {
            order.priority = priority;
        }
        if let Some(scheduled) = patch.scheduled_date {
            order.scheduled_date = scheduled;
        }
        if let Some(delivery) = patch.delivery_date {
            order.delivery_date = delivery;
        }
        if let Some(operator) = patch.assigned_operator {
            order.assigned_operator = operator;
        }
        if let Some(notes) = patch.notes {
            order.notes = notes;
        }
        if let Some(items) = patch.items {
            if items.is_empty() {
                return Err(ServiceError::ValidationError(
                    "Add at least one product".into(),
                ));
            }
            order.products = self.resolve_items(&items).await?;
            order.recompute_totals();
            if !order.fragments_cover_quantity() {
                return Err(ServiceError::QuantityMismatch {
                    expected: order.fragment_quantity(),
                    actual: order.total_quantity,
                });
            }
        }

        self.orders.save(&order).await
    }

    /// Unconditional removal, whatever the order's status.
    #[instrument(skip(self, session), fields(order_id = %id))]
    pub async fn delete_order(&self, id: &str, session: &Session) -> Result<bool> {
        session.require(ORDERS_DELETE)?;
        Ok(self.orders.delete(id).await)
    }

    /// Moves an order through the pipeline. Sellers need `orders:edit`;
    /// operators may use `production:edit` instead.
    pub async fn transition(
        &self,
        id: &str,
        to: OrderStatus,
        opts: TransitionOptions,
        session: &Session,
    ) -> Result<Order> {
        if !session.can(ORDERS_EDIT) {
            session.require(PRODUCTION_EDIT)?;
        }
        self.status.transition(id, to, opts).await
    }

    async fn resolve_items(&self, items: &[NewOrderItem]) -> Result<Vec<OrderProduct>> {
        let mut lines = Vec::with_capacity(items.len());
        for item in items {
            item.validate()?;
            let product = self.products.find(&item.product_id).await?.ok_or_else(|| {
                ServiceError::ValidationError(format!("Product {} not found", item.product_id))
            })?;
            if !product.is_active() {
                warn!(product_id = %product.id, "ordering an inactive product");
            }

            let mut line = OrderProduct::new(
                product.id.clone(),
                product.name.clone(),
                item.quantity,
                item.unit_price.unwrap_or(product.base_price),
            );
            line.model = item.model.clone();
            line.size = item.size.clone();
            line.color = item.color.clone();
            line.fabric = item.fabric.clone();
            lines.push(line);
        }
        Ok(lines)
    }

    async fn next_order_number(&self, year: i32) -> Result<String> {
        let taken: HashSet<String> = self
            .orders
            .list(&ListQuery::all())
            .await?
            .into_iter()
            .map(|o| o.order_number)
            .collect();

        unique_order_number(&mut rand::thread_rng(), year, &taken, self.order_number_attempts)
            .ok_or_else(|| {
                ServiceError::InternalError(format!(
                    "no free order number after {} attempts",
                    self.order_number_attempts
                ))
            })
    }
}

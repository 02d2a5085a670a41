use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::auth::{Action, Module, Permission, Session};
use crate::errors::{Result, ServiceError};
use crate::events::{Event, EventBus};
use crate::models::{FragmentStatus, Order, OrderFragment, OrderStatus};
use crate::repositories::Repository;
use crate::services::order_status::{OrderStatusService, TransitionOptions};

const ORDERS_EDIT: Permission = Permission::new(Module::Orders, Action::Edit);
const PRODUCTION_EDIT: Permission = Permission::new(Module::Production, Action::Edit);

/// Caller-supplied shape of one fragment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FragmentSpec {
    pub quantity: i64,
    pub scheduled_date: DateTime<Utc>,
    /// Defaults to the fragment's pro-rata share of the order total.
    pub value: Option<Decimal>,
    pub assigned_operator: Option<String>,
}

impl FragmentSpec {
    pub fn new(quantity: i64, scheduled_date: DateTime<Utc>) -> Self {
        Self {
            quantity,
            scheduled_date,
            value: None,
            assigned_operator: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FragmentUpdate {
    pub status: Option<FragmentStatus>,
    /// Clamped to `0..=100`. Ignored when `status` forces a value.
    pub progress: Option<i64>,
    pub operator: Option<String>,
}

/// Splits `order` into fragments, replacing any existing ones.
///
/// Quantities must be positive and, whenever the order has a quantity, add
/// up to it exactly. An empty list removes fragmentation.
pub fn allocate(order: &Order, specs: &[FragmentSpec]) -> Result<Order> {
    let mut next = order.clone();
    let line_quantity: i64 = order.products.iter().map(|p| p.quantity).sum();

    if specs.is_empty() {
        next.fragments.clear();
        next.is_fragmented = false;
        next.recompute_totals();
        return Ok(next);
    }

    if let Some(bad) = specs.iter().position(|s| s.quantity <= 0) {
        return Err(ServiceError::ValidationError(format!(
            "Fragment {} must have a positive quantity",
            bad + 1
        )));
    }

    let sum: i64 = specs.iter().map(|s| s.quantity).sum();
    let expected = if line_quantity > 0 {
        line_quantity
    } else {
        order.total_quantity
    };
    if expected > 0 && sum != expected {
        return Err(ServiceError::QuantityMismatch {
            expected,
            actual: sum,
        });
    }

    next.fragments = specs
        .iter()
        .enumerate()
        .map(|(index, spec)| OrderFragment {
            id: Uuid::new_v4().to_string(),
            fragment_number: index as u32 + 1,
            quantity: spec.quantity,
            scheduled_date: spec.scheduled_date,
            status: FragmentStatus::Pending,
            progress: 0,
            value: spec
                .value
                .unwrap_or_else(|| pro_rata(order.total_amount, spec.quantity, sum)),
            assigned_operator: spec.assigned_operator.clone(),
        })
        .collect();
    next.is_fragmented = true;
    next.total_quantity = sum;
    Ok(next)
}

fn pro_rata(total: Decimal, quantity: i64, sum: i64) -> Decimal {
    if sum == 0 {
        return Decimal::ZERO;
    }
    (total * Decimal::from(quantity) / Decimal::from(sum)).round_dp(2)
}

/// Applies an update to one fragment, identified by its number.
pub fn apply_fragment_update(
    order: &Order,
    fragment_number: u32,
    update: &FragmentUpdate,
) -> Result<Order> {
    let mut next = order.clone();
    let fragment = next
        .fragments
        .iter_mut()
        .find(|f| f.fragment_number == fragment_number)
        .ok_or_else(|| {
            ServiceError::NotFound(format!(
                "Fragment {} of order {} not found",
                fragment_number, order.id
            ))
        })?;

    if let Some(status) = update.status {
        fragment.status = status;
    }
    if let Some(progress) = update.progress {
        fragment.progress = progress.clamp(0, 100) as u8;
    }
    match fragment.status {
        FragmentStatus::Completed => fragment.progress = 100,
        FragmentStatus::Pending => fragment.progress = 0,
        FragmentStatus::InProduction => {}
    }
    if let Some(operator) = update.operator.as_deref().map(str::trim) {
        if !operator.is_empty() {
            fragment.assigned_operator = Some(operator.to_string());
        }
    }

    Ok(next)
}

#[derive(Clone)]
pub struct FragmentService {
    orders: Repository<Order>,
    status: OrderStatusService,
    events: EventBus,
    auto_advance: bool,
}

impl FragmentService {
    pub fn new(
        orders: Repository<Order>,
        status: OrderStatusService,
        events: EventBus,
        auto_advance: bool,
    ) -> Self {
        Self {
            orders,
            status,
            events,
            auto_advance,
        }
    }

    fn authorize(session: &Session) -> Result<()> {
        if session.can(ORDERS_EDIT) {
            return Ok(());
        }
        session.require(PRODUCTION_EDIT)
    }

    #[instrument(skip(self, specs, session), fields(order_id = %order_id, fragments = specs.len()))]
    pub async fn allocate(
        &self,
        order_id: &str,
        specs: Vec<FragmentSpec>,
        session: &Session,
    ) -> Result<Order> {
        Self::authorize(session)?;
        let order = self.orders.get(order_id).await?;
        let next = allocate(&order, &specs)?;
        let saved = self.orders.save(&next).await?;

        info!(total_quantity = saved.total_quantity, "fragments allocated");
        self.events.publish(Event::FragmentsAllocated {
            order_id: saved.id.clone(),
            fragment_count: saved.fragments.len(),
        });
        Ok(saved)
    }

    #[instrument(skip(self, update, session), fields(order_id = %order_id))]
    pub async fn update_fragment(
        &self,
        order_id: &str,
        fragment_number: u32,
        update: FragmentUpdate,
        session: &Session,
    ) -> Result<Order> {
        Self::authorize(session)?;
        let order = self.orders.get(order_id).await?;
        let next = apply_fragment_update(&order, fragment_number, &update)?;
        let mut saved = self.orders.save(&next).await?;

        self.events.publish(Event::FragmentUpdated {
            order_id: saved.id.clone(),
            fragment_number,
        });

        if self.auto_advance && saved.all_fragments_completed() {
            saved = self.advance_to_ready(saved, update.operator).await?;
        }
        Ok(saved)
    }

    /// Walks an order forward to `ready` through the regular transition path.
    async fn advance_to_ready(&self, mut order: Order, operator: Option<String>) -> Result<Order> {
        loop {
            let next = match order.status {
                OrderStatus::InProduction => OrderStatus::QualityCheck,
                OrderStatus::QualityCheck => OrderStatus::Ready,
                _ => return Ok(order),
            };
            let opts = TransitionOptions {
                operator: operator.clone(),
                ..Default::default()
            };
            order = self.status.transition(&order.id, next, opts).await?;
            info!(order_id = %order.id, status = %order.status, "advanced by completed fragments");
        }
    }
}

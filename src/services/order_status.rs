use chrono::{DateTime, Utc};
use strum::IntoEnumIterator;
use tracing::{error, info, instrument};

use crate::errors::{Result, ServiceError};
use crate::events::{Event, EventBus};
use crate::models::{Cancellation, Order, OrderStatus};
use crate::repositories::Repository;

/// Production progress an order takes on when it enters `status`.
///
/// This is the single table every caller uses.
pub fn progress_for(status: OrderStatus) -> u8 {
    match status {
        OrderStatus::AwaitingApproval => 0,
        OrderStatus::Pending => 0,
        OrderStatus::Confirmed => 10,
        OrderStatus::InProduction => 50,
        OrderStatus::QualityCheck => 80,
        OrderStatus::Ready => 95,
        OrderStatus::Delivered => 100,
        OrderStatus::Cancelled => 0,
    }
}

/// Whether an order may move from `from` to `to`.
pub fn is_valid_transition(from: OrderStatus, to: OrderStatus) -> bool {
    use OrderStatus::*;
    matches!(
        (from, to),
        (AwaitingApproval, Confirmed)
            | (AwaitingApproval, Cancelled)
            | (Pending, Confirmed)
            | (Pending, Cancelled)
            | (Confirmed, InProduction)
            | (Confirmed, Cancelled)
            | (InProduction, QualityCheck)
            | (InProduction, Cancelled)
            | (QualityCheck, Ready)
            | (Ready, Delivered)
    )
}

/// Statuses reachable from `from` in one step.
pub fn allowed_transitions(from: OrderStatus) -> Vec<OrderStatus> {
    OrderStatus::iter()
        .filter(|to| is_valid_transition(from, *to))
        .collect()
}

#[derive(Debug, Clone, Default)]
pub struct TransitionOptions {
    /// Recorded as the order's assigned operator. Not checked against any roster.
    pub operator: Option<String>,
    /// Required when cancelling.
    pub cancel_reason: Option<String>,
    pub cancel_code: Option<String>,
}

impl TransitionOptions {
    pub fn with_operator(operator: impl Into<String>) -> Self {
        Self {
            operator: Some(operator.into()),
            ..Default::default()
        }
    }

    pub fn cancel(reason: impl Into<String>) -> Self {
        Self {
            cancel_reason: Some(reason.into()),
            ..Default::default()
        }
    }
}

/// Computes the order that results from moving `order` to `to`.
///
/// The input is left untouched so a failed write never leaves a half-applied
/// order behind.
pub fn apply_transition(
    order: &Order,
    to: OrderStatus,
    opts: &TransitionOptions,
    at: DateTime<Utc>,
) -> Result<Order> {
    let from = order.status;
    if !is_valid_transition(from, to) {
        return Err(ServiceError::InvalidTransition { from, to });
    }

    let mut next = order.clone();
    next.status = to;
    next.production_progress = progress_for(to);
    next.updated_at = at;

    if let Some(operator) = opts.operator.as_deref().map(str::trim) {
        if !operator.is_empty() {
            next.assigned_operator = Some(operator.to_string());
        }
    }

    match to {
        OrderStatus::Delivered => {
            next.completed_date = Some(at);
        }
        OrderStatus::Cancelled => {
            let reason = opts
                .cancel_reason
                .as_deref()
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .ok_or_else(|| {
                    ServiceError::ValidationError("A cancellation reason is required".into())
                })?;

            next.notes = Some(match order.notes.as_deref().map(str::trim) {
                Some(previous) if !previous.is_empty() => format!("{}\n\n{}", reason, previous),
                _ => reason.to_string(),
            });
            next.cancellation = Some(Cancellation {
                reason: reason.to_string(),
                code: opts.cancel_code.clone(),
                cancelled_at: at,
            });
        }
        _ => {}
    }

    Ok(next)
}

/// Executes status transitions against the order store.
#[derive(Clone)]
pub struct OrderStatusService {
    orders: Repository<Order>,
    events: EventBus,
}

impl OrderStatusService {
    pub fn new(orders: Repository<Order>, events: EventBus) -> Self {
        Self { orders, events }
    }

    /// Moves an order to `to`, persisting the result and publishing
    /// [`Event::OrderStatusChanged`].
    #[instrument(skip(self, opts), fields(order_id = %order_id, to = %to))]
    pub async fn transition(
        &self,
        order_id: &str,
        to: OrderStatus,
        opts: TransitionOptions,
    ) -> Result<Order> {
        let order = self.orders.get(order_id).await?;
        let from = order.status;
        let now = Utc::now();

        let next = apply_transition(&order, to, &opts, now).map_err(|e| {
            error!(%from, %to, error = %e, "rejected status transition");
            e
        })?;
        let saved = self.orders.save(&next).await?;

        info!(%from, %to, progress = saved.production_progress, "order status changed");
        self.events.publish(Event::OrderStatusChanged {
            order_id: saved.id.clone(),
            old_status: from,
            new_status: to,
            operator: opts.operator,
            at: now,
        });
        Ok(saved)
    }

    pub async fn get_status(&self, order_id: &str) -> Result<OrderStatus> {
        Ok(self.orders.get(order_id).await?.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn order_in(status: OrderStatus) -> Order {
        let mut order: Order = serde_json::from_value(json!({"id": "o1"})).unwrap();
        order.status = status;
        order
    }

    #[rstest]
    #[case(OrderStatus::Pending, OrderStatus::Confirmed, 10)]
    #[case(OrderStatus::Confirmed, OrderStatus::InProduction, 50)]
    #[case(OrderStatus::InProduction, OrderStatus::QualityCheck, 80)]
    #[case(OrderStatus::QualityCheck, OrderStatus::Ready, 95)]
    #[case(OrderStatus::Ready, OrderStatus::Delivered, 100)]
    #[case(OrderStatus::AwaitingApproval, OrderStatus::Confirmed, 10)]
    fn legal_transitions_set_canonical_progress(
        #[case] from: OrderStatus,
        #[case] to: OrderStatus,
        #[case] progress: u8,
    ) {
        let next =
            apply_transition(&order_in(from), to, &TransitionOptions::default(), Utc::now()).unwrap();
        assert_eq!(next.status, to);
        assert_eq!(next.production_progress, progress);
    }

    #[rstest]
    #[case(OrderStatus::Pending, OrderStatus::InProduction)]
    #[case(OrderStatus::Delivered, OrderStatus::Pending)]
    #[case(OrderStatus::Cancelled, OrderStatus::Confirmed)]
    #[case(OrderStatus::QualityCheck, OrderStatus::Cancelled)]
    #[case(OrderStatus::Ready, OrderStatus::Ready)]
    #[case(OrderStatus::AwaitingApproval, OrderStatus::Pending)]
    fn illegal_transitions_are_rejected(#[case] from: OrderStatus, #[case] to: OrderStatus) {
        let err = apply_transition(&order_in(from), to, &TransitionOptions::cancel("x"), Utc::now())
            .unwrap_err();
        assert!(matches!(err, ServiceError::InvalidTransition { .. }));
    }

    #[test]
    fn every_legal_pair_matches_the_progress_table() {
        for from in OrderStatus::iter() {
            for to in allowed_transitions(from) {
                let next = apply_transition(&order_in(from), to, &TransitionOptions::cancel("r"), Utc::now())
                    .unwrap();
                assert_eq!(next.production_progress, progress_for(to));
            }
        }
    }

    #[test]
    fn terminal_states_have_no_exits() {
        assert!(allowed_transitions(OrderStatus::Delivered).is_empty());
        assert!(allowed_transitions(OrderStatus::Cancelled).is_empty());
    }

    #[test]
    fn delivery_stamps_completion_date() {
        let at = Utc::now();
        let next = apply_transition(
            &order_in(OrderStatus::Ready),
            OrderStatus::Delivered,
            &TransitionOptions::default(),
            at,
        )
        .unwrap();
        assert_eq!(next.completed_date, Some(at));
    }

    #[test]
    fn cancelling_requires_a_reason_and_prefixes_notes() {
        let mut order = order_in(OrderStatus::Confirmed);
        assert!(matches!(
            apply_transition(&order, OrderStatus::Cancelled, &TransitionOptions::cancel("  "), Utc::now()),
            Err(ServiceError::ValidationError(_))
        ));

        order.notes = Some("Entregar pela manhã".into());
        let next = apply_transition(
            &order,
            OrderStatus::Cancelled,
            &TransitionOptions::cancel("Cliente cancelou"),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(next.production_progress, 0);
        assert_eq!(
            next.notes.as_deref(),
            Some("Cliente cancelou\n\nEntregar pela manhã")
        );
        assert_eq!(next.cancellation.unwrap().reason, "Cliente cancelou");
        assert_eq!(order.status, OrderStatus::Confirmed);
    }

    #[test]
    fn operator_is_recorded() {
        let next = apply_transition(
            &order_in(OrderStatus::Confirmed),
            OrderStatus::InProduction,
            &TransitionOptions::with_operator("Joana"),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(next.assigned_operator.as_deref(), Some("Joana"));
    }
}

//! Read-only views over orders: CSV export, dashboard summary and the
//! production calendar.

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::models::{Order, OrderStatus, Priority};

pub const CSV_HEADER: &str =
    "Pedido,Cliente,Vendedor,Status,Prioridade,Data Produção,Data Entrega,Valor,Progresso";

/// Criteria used by the order list and the CSV export.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OrderFilter {
    pub status: Option<OrderStatus>,
    pub priority: Option<Priority>,
    pub seller_id: Option<String>,
    /// Case-insensitive match on order number or customer name.
    pub search: Option<String>,
}

impl OrderFilter {
    pub fn matches(&self, order: &Order) -> bool {
        if self.status.map_or(false, |s| s != order.status) {
            return false;
        }
        if self.priority.map_or(false, |p| p != order.priority) {
            return false;
        }
        if let Some(seller) = &self.seller_id {
            if &order.seller_id != seller {
                return false;
            }
        }
        match self.search.as_deref().map(str::trim) {
            Some(term) if !term.is_empty() => {
                let term = term.to_lowercase();
                order.order_number.to_lowercase().contains(&term)
                    || order.customer_name.to_lowercase().contains(&term)
            }
            _ => true,
        }
    }

    pub fn apply<'a>(&self, orders: &'a [Order]) -> Vec<&'a Order> {
        orders.iter().filter(|o| self.matches(o)).collect()
    }
}

fn csv_field(raw: &str) -> String {
    if raw.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", raw.replace('"', "\"\""))
    } else {
        raw.to_string()
    }
}

fn br_date(dt: &DateTime<Utc>) -> String {
    dt.format("%d/%m/%Y").to_string()
}

pub fn format_money(amount: Decimal) -> String {
    format!("{:.2}", amount.round_dp(2))
}

/// One CSV row per order, header first.
pub fn orders_to_csv<'a>(orders: impl IntoIterator<Item = &'a Order>) -> String {
    let mut lines = vec![CSV_HEADER.to_string()];
    for order in orders {
        let fields = [
            order.order_number.clone(),
            order.customer_name.clone(),
            order.seller_name.clone(),
            order.status.label().to_string(),
            order.priority.label().to_string(),
            br_date(&order.scheduled_date),
            order.delivery_date.as_ref().map(br_date).unwrap_or_default(),
            format_money(order.total_amount),
            format!("{}%", order.production_progress),
        ];
        lines.push(
            fields
                .iter()
                .map(|f| csv_field(f))
                .collect::<Vec<_>>()
                .join(","),
        );
    }
    lines.join("\n")
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DashboardSummary {
    pub total_orders: usize,
    pub by_status: BTreeMap<String, usize>,
    /// Sum of every order that was not cancelled.
    pub revenue: Decimal,
    pub in_progress: usize,
    pub overdue: Vec<String>,
}

pub fn summarize(orders: &[Order], now: DateTime<Utc>) -> DashboardSummary {
    let mut by_status = BTreeMap::new();
    for order in orders {
        *by_status.entry(order.status.to_string()).or_insert(0) += 1;
    }

    DashboardSummary {
        total_orders: orders.len(),
        by_status,
        revenue: orders
            .iter()
            .filter(|o| o.status != OrderStatus::Cancelled)
            .map(|o| o.total_amount)
            .sum(),
        in_progress: orders.iter().filter(|o| o.status.is_in_progress()).count(),
        overdue: orders
            .iter()
            .filter(|o| o.is_overdue(now))
            .map(|o| o.order_number.clone())
            .collect(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalendarEntry {
    pub order_id: String,
    pub order_number: String,
    pub customer_name: String,
    pub status: OrderStatus,
    pub priority: Priority,
    /// Set when the entry is one fragment of a fragmented order.
    pub fragment_number: Option<u32>,
    pub quantity: i64,
}

/// Production entries per day within `from..=to`. Fragmented orders appear
/// once per fragment, on the fragment's date.
pub fn calendar(
    orders: &[Order],
    from: NaiveDate,
    to: NaiveDate,
) -> BTreeMap<NaiveDate, Vec<CalendarEntry>> {
    let mut days: BTreeMap<NaiveDate, Vec<CalendarEntry>> = BTreeMap::new();
    let in_range = |day: NaiveDate| day >= from && day <= to;

    for order in orders {
        let base = CalendarEntry {
            order_id: order.id.clone(),
            order_number: order.order_number.clone(),
            customer_name: order.customer_name.clone(),
            status: order.status,
            priority: order.priority,
            fragment_number: None,
            quantity: order.total_quantity,
        };

        if order.is_fragmented && !order.fragments.is_empty() {
            for fragment in &order.fragments {
                let day = fragment.scheduled_date.date_naive();
                if in_range(day) {
                    days.entry(day).or_default().push(CalendarEntry {
                        fragment_number: Some(fragment.fragment_number),
                        quantity: fragment.quantity,
                        ..base.clone()
                    });
                }
            }
        } else {
            let day = order.scheduled_date.date_naive();
            if in_range(day) {
                days.entry(day).or_default().push(base);
            }
        }
    }
    days
}

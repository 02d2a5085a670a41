use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString};

use super::{now, Document};
use crate::normalize::FieldSpec;
use crate::store::Collection;

/// Status of an order in the production pipeline.
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum OrderStatus {
    /// Holding state before the order enters the pipeline.
    AwaitingApproval,
    #[default]
    Pending,
    Confirmed,
    InProduction,
    QualityCheck,
    Ready,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    /// Label shown to shop staff.
    pub fn label(&self) -> &'static str {
        match self {
            Self::AwaitingApproval => "Aguardando aprovação",
            Self::Pending => "Pendente",
            Self::Confirmed => "Confirmado",
            Self::InProduction => "Em produção",
            Self::QualityCheck => "Controle de qualidade",
            Self::Ready => "Pronto",
            Self::Delivered => "Entregue",
            Self::Cancelled => "Cancelado",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Delivered | Self::Cancelled)
    }

    /// Orders that have been accepted and are not finished yet.
    pub fn is_in_progress(&self) -> bool {
        matches!(
            self,
            Self::Confirmed | Self::InProduction | Self::QualityCheck | Self::Ready
        )
    }
}

#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Low => "Baixa",
            Self::Medium => "Média",
            Self::High => "Alta",
            Self::Urgent => "Urgente",
        }
    }
}

/// Status of a single production fragment. Independent of [`OrderStatus`].
#[derive(
    Clone,
    Copy,
    Debug,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumIter,
    EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum FragmentStatus {
    #[default]
    Pending,
    InProduction,
    Completed,
}

/// Line item of an order. `total_price` is always `quantity * unit_price`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderProduct {
    #[serde(default)]
    pub product_id: String,
    #[serde(default)]
    pub product_name: String,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub fabric: Option<String>,
    #[serde(default)]
    pub quantity: i64,
    #[serde(default)]
    pub unit_price: Decimal,
    #[serde(default)]
    pub total_price: Decimal,
}

impl OrderProduct {
    pub fn new(
        product_id: impl Into<String>,
        product_name: impl Into<String>,
        quantity: i64,
        unit_price: Decimal,
    ) -> Self {
        Self {
            product_id: product_id.into(),
            product_name: product_name.into(),
            model: None,
            size: None,
            color: None,
            fabric: None,
            quantity,
            unit_price,
            total_price: unit_price * Decimal::from(quantity),
        }
    }

    pub fn set_quantity(&mut self, quantity: i64) {
        self.quantity = quantity;
        self.recompute();
    }

    pub fn set_unit_price(&mut self, unit_price: Decimal) {
        self.unit_price = unit_price;
        self.recompute();
    }

    pub fn recompute(&mut self) {
        self.total_price = self.unit_price * Decimal::from(self.quantity);
    }
}

/// A production sub-batch of an order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OrderFragment {
    #[serde(default)]
    pub id: String,
    pub fragment_number: u32,
    #[serde(default)]
    pub quantity: i64,
    pub scheduled_date: DateTime<Utc>,
    #[serde(default)]
    pub status: FragmentStatus,
    #[serde(default)]
    pub progress: u8,
    #[serde(default)]
    pub value: Decimal,
    #[serde(default)]
    pub assigned_operator: Option<String>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Cancellation {
    pub reason: String,
    #[serde(default)]
    pub code: Option<String>,
    pub cancelled_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Order {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub order_number: String,

    #[serde(default)]
    pub customer_id: String,
    #[serde(default)]
    pub customer_name: String,
    #[serde(default)]
    pub customer_phone: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,

    #[serde(default)]
    pub seller_id: String,
    #[serde(default)]
    pub seller_name: String,

    #[serde(default)]
    pub status: OrderStatus,
    #[serde(default)]
    pub priority: Priority,

    #[serde(default)]
    pub products: Vec<OrderProduct>,
    #[serde(default)]
    pub total_amount: Decimal,
    #[serde(default)]
    pub total_quantity: i64,
    #[serde(default)]
    pub production_progress: u8,

    #[serde(default = "now")]
    pub scheduled_date: DateTime<Utc>,
    #[serde(default)]
    pub delivery_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub completed_date: Option<DateTime<Utc>>,

    #[serde(default)]
    pub assigned_operator: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,

    #[serde(default)]
    pub is_fragmented: bool,
    #[serde(default)]
    pub fragments: Vec<OrderFragment>,

    #[serde(default)]
    pub cancellation: Option<Cancellation>,

    #[serde(default = "now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "now")]
    pub updated_at: DateTime<Utc>,
}

const LINE_FIELDS: FieldSpec = FieldSpec {
    integers: &["quantity"],
    money: &["unit_price", "total_price"],
    ..FieldSpec::EMPTY
};

const FRAGMENT_FIELDS: FieldSpec = FieldSpec {
    integers: &["fragment_number", "quantity"],
    percentages: &["progress"],
    money: &["value"],
    dates: &["scheduled_date"],
    ..FieldSpec::EMPTY
};

const ORDER_FIELDS: FieldSpec = FieldSpec {
    integers: &["total_quantity"],
    percentages: &["production_progress"],
    money: &["total_amount"],
    floats: &[],
    dates: &["scheduled_date", "created_at", "updated_at"],
    optional_dates: &["delivery_date", "completed_date"],
    nested: &[("products", &LINE_FIELDS), ("fragments", &FRAGMENT_FIELDS)],
};

impl Document for Order {
    const COLLECTION: Collection = Collection::Orders;
    const FIELDS: &'static FieldSpec = &ORDER_FIELDS;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Order {
    /// Recomputes every line total and the order aggregates.
    pub fn recompute_totals(&mut self) {
        for line in &mut self.products {
            line.recompute();
        }
        self.total_amount = self.products.iter().map(|p| p.total_price).sum();
        self.total_quantity = self.products.iter().map(|p| p.quantity).sum();
    }

    pub fn add_product(&mut self, line: OrderProduct) {
        self.products.push(line);
        self.recompute_totals();
    }

    /// Removes the line at `index`, returning it when it existed.
    pub fn remove_product(&mut self, index: usize) -> Option<OrderProduct> {
        if index >= self.products.len() {
            return None;
        }
        let removed = self.products.remove(index);
        self.recompute_totals();
        Some(removed)
    }

    pub fn set_line_quantity(&mut self, index: usize, quantity: i64) -> bool {
        match self.products.get_mut(index) {
            Some(line) => {
                line.set_quantity(quantity);
                self.recompute_totals();
                true
            }
            None => false,
        }
    }

    pub fn set_line_unit_price(&mut self, index: usize, unit_price: Decimal) -> bool {
        match self.products.get_mut(index) {
            Some(line) => {
                line.set_unit_price(unit_price);
                self.recompute_totals();
                true
            }
            None => false,
        }
    }

    pub fn fragment_quantity(&self) -> i64 {
        self.fragments.iter().map(|f| f.quantity).sum()
    }

    /// False when the order is split and its fragments no longer add up to
    /// the order quantity.
    pub fn fragments_cover_quantity(&self) -> bool {
        !self.is_fragmented || self.fragment_quantity() == self.total_quantity
    }

    pub fn all_fragments_completed(&self) -> bool {
        !self.fragments.is_empty()
            && self
                .fragments
                .iter()
                .all(|f| f.status == FragmentStatus::Completed)
    }

    /// Past its delivery date and still open.
    pub fn is_overdue(&self, at: DateTime<Utc>) -> bool {
        !self.status.is_terminal() && self.delivery_date.map(|d| d < at).unwrap_or(false)
    }
}

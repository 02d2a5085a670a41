use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{now, Document};
use crate::normalize::FieldSpec;
use crate::store::Collection;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum CustomerType {
    #[default]
    Individual,
    Company,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
pub struct Customer {
    #[serde(default)]
    pub id: String,
    #[validate(length(min = 1, max = 200, message = "Customer name is required"))]
    pub name: String,
    #[serde(default)]
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default, rename = "type")]
    pub customer_type: CustomerType,
    /// CPF or CNPJ depending on `customer_type`.
    #[serde(default)]
    pub document: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub zip_code: Option<String>,
    #[serde(default)]
    pub default_discount: Option<Decimal>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default = "now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "now")]
    pub updated_at: DateTime<Utc>,
}

const CUSTOMER_FIELDS: FieldSpec = FieldSpec {
    money: &["default_discount"],
    dates: &["created_at", "updated_at"],
    ..FieldSpec::EMPTY
};

impl Document for Customer {
    const COLLECTION: Collection = Collection::Customers;
    const FIELDS: &'static FieldSpec = &CUSTOMER_FIELDS;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Customer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            email: None,
            phone: None,
            customer_type: CustomerType::Individual,
            document: None,
            address: None,
            city: None,
            state: None,
            zip_code: None,
            default_discount: None,
            notes: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }
}

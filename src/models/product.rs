use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

use super::{now, Document};
use crate::normalize::FieldSpec;
use crate::store::Collection;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ProductStatus {
    #[default]
    Active,
    Inactive,
}

/// A variant of a catalog product with its own options and stock.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductModel {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub sizes: Vec<String>,
    #[serde(default)]
    pub colors: Vec<String>,
    #[serde(default)]
    pub fabrics: Vec<String>,
    #[serde(default)]
    pub stock: i64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
pub struct Product {
    #[serde(default)]
    pub id: String,
    #[validate(length(min = 1, message = "Product name is required"))]
    pub name: String,
    #[serde(default)]
    pub sku: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    #[validate(custom = "validate_non_negative")]
    pub base_price: Decimal,
    #[serde(default)]
    #[validate(custom = "validate_non_negative")]
    pub cost_price: Decimal,
    /// Markup over cost, in percent.
    #[serde(default)]
    pub margin: f64,
    #[serde(default)]
    pub models: Vec<ProductModel>,
    #[serde(default)]
    pub status: ProductStatus,
    #[serde(default = "now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "now")]
    pub updated_at: DateTime<Utc>,
}

fn validate_non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ValidationError::new("negative_price"));
    }
    Ok(())
}

const MODEL_FIELDS: FieldSpec = FieldSpec {
    integers: &["stock"],
    ..FieldSpec::EMPTY
};

const PRODUCT_FIELDS: FieldSpec = FieldSpec {
    money: &["base_price", "cost_price"],
    floats: &["margin"],
    dates: &["created_at", "updated_at"],
    nested: &[("models", &MODEL_FIELDS)],
    ..FieldSpec::EMPTY
};

impl Document for Product {
    const COLLECTION: Collection = Collection::Products;
    const FIELDS: &'static FieldSpec = &PRODUCT_FIELDS;

    fn id(&self) -> &str {
        &self.id
    }
}

impl Product {
    pub fn new(name: impl Into<String>, sku: impl Into<String>, base_price: Decimal) -> Self {
        Self {
            id: String::new(),
            name: name.into(),
            sku: sku.into(),
            category: None,
            base_price,
            cost_price: Decimal::ZERO,
            margin: 0.0,
            models: Vec::new(),
            status: ProductStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    /// Recomputes `margin` from the two prices. A zero cost leaves it at 0.
    pub fn recompute_margin(&mut self) {
        use rust_decimal::prelude::ToPrimitive;
        self.margin = if self.cost_price.is_zero() {
            0.0
        } else {
            ((self.base_price - self.cost_price) / self.cost_price * Decimal::ONE_HUNDRED)
                .round_dp(2)
                .to_f64()
                .unwrap_or(0.0)
        };
    }

    pub fn total_stock(&self) -> i64 {
        self.models.iter().map(|m| m.stock).sum()
    }

    pub fn is_active(&self) -> bool {
        self.status == ProductStatus::Active
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize_document;
    use rust_decimal_macros::dec;
    use serde_json::json;

    #[test]
    fn margin_from_prices() {
        let mut product = Product::new("Camiseta", "CAM-01", dec!(50));
        product.cost_price = dec!(40);
        product.recompute_margin();
        assert_eq!(product.margin, 25.0);

        product.cost_price = Decimal::ZERO;
        product.recompute_margin();
        assert_eq!(product.margin, 0.0);
    }

    #[test]
    fn nested_models_are_normalized() {
        let mut raw = json!({
            "name": "Jaqueta",
            "base_price": "199,90",
            "margin": "35",
            "models": [{"name": "Slim", "stock": "4"}, {"name": "Regular", "stock": 2.0}],
        });
        normalize_document(&mut raw, Product::FIELDS);
        let product: Product = serde_json::from_value(raw).unwrap();
        assert_eq!(product.base_price, dec!(199.90));
        assert_eq!(product.margin, 35.0);
        assert_eq!(product.total_stock(), 6);
    }

    #[test]
    fn negative_prices_fail_validation() {
        let mut product = Product::new("Boné", "BON", dec!(-1));
        assert!(product.validate().is_err());
        product.base_price = dec!(0);
        assert!(product.validate().is_ok());
    }
}

//! Typed records persisted through the document gateway.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::normalize::FieldSpec;
use crate::store::Collection;

pub mod customer;
pub mod order;
pub mod product;
pub mod user;

pub use customer::{Customer, CustomerType};
pub use order::{
    Cancellation, FragmentStatus, Order, OrderFragment, OrderProduct, OrderStatus, Priority,
};
pub use product::{Product, ProductModel, ProductStatus};
pub use user::{User, UserRole};

/// A record that lives in one collection of the document store.
///
/// `FIELDS` lists the loosely-typed fields that are coerced before the raw
/// document is deserialized.
pub trait Document: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const COLLECTION: Collection;
    const FIELDS: &'static FieldSpec;

    fn id(&self) -> &str;
}

/// Shared fallback for `created_at`/`updated_at` on drafts.
pub(crate) fn now() -> chrono::DateTime<chrono::Utc> {
    chrono::Utc::now()
}

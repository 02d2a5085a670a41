use sea_orm::entity::prelude::*;
use serde::{Deserialize, Serialize};

/// One JSON document of the remote store. Collections share the table and
/// are told apart by `collection`.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "documents")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,

    /// Collection name (`users`, `customers`, `products`, `orders`).
    pub collection: String,

    /// Document body, including nested arrays such as order line items.
    #[sea_orm(column_type = "Json")]
    pub data: Json,

    pub created_at: DateTimeUtc,
    pub updated_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

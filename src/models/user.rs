use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::{now, Document};
use crate::normalize::FieldSpec;
use crate::store::Collection;

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
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum UserRole {
    Admin,
    #[default]
    Seller,
    Operator,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, Validate)]
pub struct User {
    #[serde(default)]
    pub id: String,
    #[validate(email(message = "Invalid email format"))]
    pub email: String,
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[serde(default)]
    pub role: UserRole,
    /// Raw permission tokens as stored. Parsed by `auth::permissions`.
    #[serde(default)]
    pub permissions: Vec<String>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(default = "now")]
    pub created_at: DateTime<Utc>,
    #[serde(default = "now")]
    pub updated_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

const USER_FIELDS: FieldSpec = FieldSpec {
    dates: &["created_at", "updated_at"],
    ..FieldSpec::EMPTY
};

impl Document for User {
    const COLLECTION: Collection = Collection::Users;
    const FIELDS: &'static FieldSpec = &USER_FIELDS;

    fn id(&self) -> &str {
        &self.id
    }
}

impl User {
    pub fn new(email: impl Into<String>, name: impl Into<String>, role: UserRole) -> Self {
        Self {
            id: String::new(),
            email: email.into(),
            name: name.into(),
            role,
            permissions: Vec::new(),
            active: true,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    pub fn is_admin(&self) -> bool {
        self.role == UserRole::Admin
    }
}

use serde::Serialize;

use crate::cache::CacheError;
use crate::models::OrderStatus;

#[derive(Debug, thiserror::Error, Serialize)]
pub enum ServiceError {
    #[error("Database error: {0}")]
    DatabaseError(
        #[from]
        #[serde(skip)]
        sea_orm::error::DbErr,
    ),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Cannot transition order from '{from}' to '{to}'")]
    InvalidTransition { from: OrderStatus, to: OrderStatus },

    #[error("Fragment quantities sum to {actual} but the order total is {expected}")]
    QuantityMismatch { expected: i64, actual: i64 },

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not signed in")]
    Unauthenticated,

    #[error("Store error: {0}")]
    StoreError(String),

    #[error("Cache error: {0}")]
    CacheError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::SerializationError(err.to_string())
    }
}

impl From<CacheError> for ServiceError {
    fn from(err: CacheError) -> Self {
        ServiceError::CacheError(err.to_string())
    }
}

impl ServiceError {
    /// Whether the message can be shown to the person who triggered the
    /// operation. Everything else is reported as an unexpected error.
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::NotFound(_)
                | Self::ValidationError(_)
                | Self::InvalidTransition { .. }
                | Self::QuantityMismatch { .. }
                | Self::Forbidden(_)
                | Self::Unauthenticated
        )
    }

    /// Message suitable for a notification. Internal errors return a generic
    /// message so backend details do not leak.
    pub fn response_message(&self) -> String {
        if self.is_user_facing() {
            self.to_string()
        } else {
            "Unexpected error, please try again".to_string()
        }
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_facing_errors_keep_their_message() {
        assert_eq!(
            ServiceError::NotFound("Order x not found".into()).response_message(),
            "Not found: Order x not found"
        );
        assert_eq!(
            ServiceError::InvalidTransition {
                from: OrderStatus::Delivered,
                to: OrderStatus::Pending,
            }
            .response_message(),
            "Cannot transition order from 'delivered' to 'pending'"
        );
    }

    #[test]
    fn internal_errors_are_hidden() {
        assert_eq!(
            ServiceError::StoreError("connection refused".into()).response_message(),
            "Unexpected error, please try again"
        );
        assert_eq!(
            ServiceError::CacheError("poisoned".into()).response_message(),
            "Unexpected error, please try again"
        );
        assert!(!ServiceError::InternalError("x".into()).is_user_facing());
    }

    #[test]
    fn quantity_mismatch_reports_both_sides() {
        let err = ServiceError::QuantityMismatch {
            expected: 10,
            actual: 7,
        };
        assert_eq!(
            err.to_string(),
            "Fragment quantities sum to 7 but the order total is 10"
        );
    }
}

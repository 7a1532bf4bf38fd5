use sea_orm::error::DbErr;
use uuid::Uuid;

/// Error taxonomy for the core services.
///
/// Every variant is raised synchronously from the operation that detects it
/// and aborts the enclosing database transaction. The embedding layer maps
/// these kinds onto its own wire representation; the core only guarantees
/// that the kinds stay distinguishable.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    /// Malformed input that reached the core (non-positive quantity,
    /// empty item list). Detected before any mutation.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Business-rule violation on a stock reduction: the requested quantity
    /// exceeds what the (product, branch) record holds.
    #[error("Insufficient stock for product {product_id}: requested {requested}, available {available}")]
    InsufficientStock {
        product_id: Uuid,
        requested: i32,
        available: i32,
    },

    /// Illegal state transition, e.g. approving a non-pending transaction
    /// or cancelling an approved one.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// An action the core itself refuses on business-rule grounds, distinct
    /// from authentication concerns (which live outside the core).
    #[error("Unauthorized action: {0}")]
    UnauthorizedAction(String),

    /// Infrastructure fault from the backing store. Not a business error;
    /// always fatal for the enclosing unit of work.
    #[error("Database error: {0}")]
    DatabaseError(#[from] DbErr),

    #[error("Event error: {0}")]
    EventError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl From<validator::ValidationErrors> for ServiceError {
    fn from(err: validator::ValidationErrors) -> Self {
        ServiceError::ValidationError(err.to_string())
    }
}

impl ServiceError {
    pub fn db_error(error: DbErr) -> Self {
        ServiceError::DatabaseError(error)
    }

    /// True for violations of business rules, false for system faults.
    /// The edge layer uses this to pick 4xx-equivalent reporting.
    pub fn is_business_error(&self) -> bool {
        !matches!(
            self,
            ServiceError::DatabaseError(_)
                | ServiceError::EventError(_)
                | ServiceError::InternalError(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_stock_message_names_product_and_quantities() {
        let product_id = Uuid::new_v4();
        let err = ServiceError::InsufficientStock {
            product_id,
            requested: 200,
            available: 100,
        };
        let msg = err.to_string();
        assert!(msg.contains(&product_id.to_string()));
        assert!(msg.contains("requested 200"));
        assert!(msg.contains("available 100"));
    }

    #[test]
    fn business_error_classification() {
        assert!(ServiceError::ValidationError("x".into()).is_business_error());
        assert!(ServiceError::InvalidOperation("x".into()).is_business_error());
        assert!(ServiceError::NotFound("x".into()).is_business_error());
        assert!(ServiceError::UnauthorizedAction("x".into()).is_business_error());
        assert!(!ServiceError::DatabaseError(DbErr::Custom("down".into())).is_business_error());
        assert!(!ServiceError::InternalError("x".into()).is_business_error());
    }
}

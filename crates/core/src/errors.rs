use thiserror::Error;

use crate::commerce::inventory::ReservationFailure;
use crate::domain::session::SessionField;

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum DomainError {
    #[error("order is missing required fields: {fields:?}")]
    MissingRequiredFields { fields: Vec<SessionField> },
    #[error(transparent)]
    Reservation(#[from] ReservationFailure),
    #[error("domain invariant violation: {0}")]
    InvariantViolation(String),
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum ApplicationError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("persistence failure: {0}")]
    Persistence(String),
    /// Language model or messaging platform did not answer in time or refused the call.
    #[error("external collaborator failure: {0}")]
    External(String),
    #[error("configuration failure: {0}")]
    Configuration(String),
}

/// Where a failed turn sits in the failure taxonomy. Every class is confined to the
/// conversation that raised it.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureClass {
    IncompleteOrder,
    StockConflict,
    UnresolvedProduct,
    /// Stock writes failed part way; compensation has already run.
    StockWrite,
    Invariant,
    Persistence,
    TransientExternal,
    Configuration,
}

impl FailureClass {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::IncompleteOrder => "incomplete_order",
            Self::StockConflict => "stock_conflict",
            Self::UnresolvedProduct => "unresolved_product",
            Self::StockWrite => "stock_write",
            Self::Invariant => "invariant",
            Self::Persistence => "persistence",
            Self::TransientExternal => "transient_external",
            Self::Configuration => "configuration",
        }
    }
}

impl ApplicationError {
    pub fn class(&self) -> FailureClass {
        match self {
            Self::Domain(DomainError::MissingRequiredFields { .. }) => {
                FailureClass::IncompleteOrder
            }
            Self::Domain(DomainError::Reservation(failure)) => match failure {
                ReservationFailure::ProductNotFound { .. } => FailureClass::UnresolvedProduct,
                ReservationFailure::StockConflict { .. } => FailureClass::StockConflict,
                ReservationFailure::MutationFailed { .. } => FailureClass::StockWrite,
            },
            Self::Domain(DomainError::InvariantViolation(_)) => FailureClass::Invariant,
            Self::Persistence(_) => FailureClass::Persistence,
            Self::External(_) => FailureClass::TransientExternal,
            Self::Configuration(_) => FailureClass::Configuration,
        }
    }

    /// Stock and catalog problems are told to the customer as-is; everything else is not.
    pub fn is_customer_visible(&self) -> bool {
        matches!(
            self.class(),
            FailureClass::IncompleteOrder
                | FailureClass::StockConflict
                | FailureClass::UnresolvedProduct
        )
    }

    pub fn into_interface(self, correlation_id: impl Into<String>) -> InterfaceError {
        let correlation_id = correlation_id.into();
        match self.class() {
            FailureClass::IncompleteOrder
            | FailureClass::StockConflict
            | FailureClass::UnresolvedProduct
            | FailureClass::Invariant => InterfaceError::BadRequest {
                message: self.to_string(),
                correlation_id,
            },
            FailureClass::StockWrite
            | FailureClass::Persistence
            | FailureClass::TransientExternal => {
                InterfaceError::ServiceUnavailable { message: self.to_string(), correlation_id }
            }
            FailureClass::Configuration => {
                InterfaceError::Internal { message: self.to_string(), correlation_id }
            }
        }
    }
}

/// Error as seen from an outer surface. `message` is for logs; callers show
/// [`InterfaceError::user_message`] instead.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum InterfaceError {
    #[error("bad request: {message}")]
    BadRequest { message: String, correlation_id: String },
    #[error("service unavailable: {message}")]
    ServiceUnavailable { message: String, correlation_id: String },
    #[error("internal error: {message}")]
    Internal { message: String, correlation_id: String },
}

impl InterfaceError {
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::BadRequest { .. } => {
                "The request could not be processed. Check inputs and try again."
            }
            Self::ServiceUnavailable { .. } => {
                "The service is temporarily unavailable. Please retry shortly."
            }
            Self::Internal { .. } => "An unexpected internal error occurred.",
        }
    }

    pub fn correlation_id(&self) -> &str {
        match self {
            Self::BadRequest { correlation_id, .. }
            | Self::ServiceUnavailable { correlation_id, .. }
            | Self::Internal { correlation_id, .. } => correlation_id,
        }
    }
}

//! # Cart Error Types
//!
//! Errors raised by the cart runtime.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Cart Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Mutation       │  │   Resolvers     │  │     Persistence         │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  Core(..)       │  │  CouponRejected │  │  Database               │ │
//! │  │  (quantity,     │  │  DeliveryZone-  │  │  Serialization          │ │
//! │  │   validation)   │  │   Unserviceable │  │  UnsupportedVersion     │ │
//! │  │                 │  │  DeliveryLookup-│  │                         │ │
//! │  │                 │  │   Failed        │  │                         │ │
//! │  └─────────────────┘  └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ServiceError: what a coupon / delivery service answered. Resolvers     │
//! │  translate it into a CartError; it never reaches the UI directly.       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every error leaves the cart in its previous consistent state.

use acai_core::{CoreError, ValidationError};
use thiserror::Error;

/// Result type alias for cart operations.
pub type CartResult<T> = Result<T, CartError>;

/// Result type alias for persistence operations.
pub type PersistenceResult<T> = Result<T, PersistenceError>;

// =============================================================================
// Cart Error
// =============================================================================

/// Cart runtime error.
#[derive(Debug, Error)]
pub enum CartError {
    // =========================================================================
    // Mutation Errors
    // =========================================================================
    /// A cart rule rejected the mutation.
    #[error(transparent)]
    Core(#[from] CoreError),

    // =========================================================================
    // Resolver Errors
    // =========================================================================
    /// The coupon was refused; the cart is unchanged.
    #[error("Coupon {code} rejected: {reason}")]
    CouponRejected { code: String, reason: String },

    /// No delivery to this neighborhood.
    #[error("Delivery is not available in {neighborhood}")]
    DeliveryZoneUnserviceable { neighborhood: String },

    /// The lookup failed for another reason (network, server error).
    #[error("Could not get the delivery fee for {neighborhood}: {reason}")]
    DeliveryLookupFailed { neighborhood: String, reason: String },

    // =========================================================================
    // Persistence / Configuration Errors
    // =========================================================================
    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),
}

impl From<ValidationError> for CartError {
    fn from(err: ValidationError) -> Self {
        CartError::Core(CoreError::Validation(err))
    }
}

impl From<toml::ser::Error> for CartError {
    fn from(err: toml::ser::Error) -> Self {
        CartError::Config(err.to_string())
    }
}

impl From<url::ParseError> for CartError {
    fn from(err: url::ParseError) -> Self {
        CartError::Config(format!("invalid URL: {}", err))
    }
}

impl From<reqwest::Error> for CartError {
    fn from(err: reqwest::Error) -> Self {
        CartError::Config(format!("HTTP client: {}", err))
    }
}

// =============================================================================
// Service Error
// =============================================================================

/// Outcome of a failed round trip to the coupon or delivery service.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// The resource does not exist (unknown coupon, unserviced neighborhood).
    #[error("Not found")]
    NotFound,

    /// The service understood the request and said no.
    #[error("{message}")]
    Rejected { message: String },

    /// The request never got an answer (connection, timeout).
    #[error("Network error: {0}")]
    Transport(String),

    /// The answer could not be understood.
    #[error("Unexpected response: {0}")]
    Decode(String),

    /// Any other non-success status.
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
}

impl ServiceError {
    /// Human-readable reason, suitable for a rejection message.
    pub fn reason(&self) -> String {
        match self {
            ServiceError::Rejected { message } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Returns true if the service gave a definitive "no" (as opposed to
    /// failing to answer).
    pub fn is_definitive(&self) -> bool {
        matches!(self, ServiceError::NotFound | ServiceError::Rejected { .. })
    }
}

impl From<reqwest::Error> for ServiceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ServiceError::Decode(err.to_string())
        } else {
            ServiceError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ServiceError {
    fn from(err: serde_json::Error) -> Self {
        ServiceError::Decode(err.to_string())
    }
}

// =============================================================================
// Persistence Error
// =============================================================================

/// Failure to read, write or understand a saved cart.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PersistenceError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization failed: {0}")]
    Serialization(String),

    /// Record written by a newer version of the storefront.
    #[error("Unsupported cart record version: {0}")]
    UnsupportedVersion(u32),
}

impl From<sqlx::Error> for PersistenceError {
    fn from(err: sqlx::Error) -> Self {
        PersistenceError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(err: serde_json::Error) -> Self {
        PersistenceError::Serialization(err.to_string())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

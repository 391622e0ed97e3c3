//! # Error Types
//!
//! Domain-specific error types for acai-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  acai-core errors (this file)                                          │
//! │  ├── CoreError        - Cart rule violations                           │
//! │  └── ValidationError  - Input validation failures                      │
//! │                                                                         │
//! │  acai-cart errors (separate crate)                                     │
//! │  ├── CartError        - Resolver / persistence outcomes                │
//! │  └── ServiceError     - What the storefront API answered               │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → CartError → UI message            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! None of these are fatal: every one is recovered at the mutation boundary
//! and the cart keeps its previous consistent state.

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Cart rule violations raised by a mutation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CoreError {
    /// Quantity is zero or negative on an operation that requires a
    /// positive one (adding a line).
    ///
    /// `update_item_quantity` never returns this: a non-positive quantity
    /// there means "remove the line".
    #[error("Invalid quantity {quantity}: must be at least 1")]
    InvalidQuantity { quantity: i64 },

    /// Item quantity exceeds maximum allowed.
    #[error("Quantity {requested} exceeds maximum allowed ({max})")]
    QuantityTooLarge { requested: i64, max: i64 },

    /// Cart has exceeded maximum allowed lines.
    #[error("Cart cannot have more than {max} items")]
    CartTooLarge { max: usize },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Input validation errors.
///
/// These are raised once, where loosely-shaped input (UI selections, API
/// payloads) becomes one of the closed domain types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// Field value is too long.
    #[error("{field} must be at most {max} characters")]
    TooLong { field: String, max: usize },

    /// Numeric value is out of range.
    #[error("{field} must be between {min} and {max}")]
    OutOfRange { field: String, min: i64, max: i64 },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },

    /// Value must not be negative.
    #[error("{field} must not be negative")]
    MustBeNonNegative { field: String },

    /// Invalid format (e.g., coupon code with spaces).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Size id is not one of the product's variants.
    #[error("Product {product_id} has no size '{size_id}'")]
    UnknownSize { product_id: String, size_id: String },

    /// A category with a free allowance was neither chosen nor skipped.
    #[error("Choose at least one topping from '{category}' or skip it")]
    MissingCategorySelection { category: String },

    /// Toppings were selected from a category the buyer declined.
    #[error("Category '{category}' was skipped but has selected toppings")]
    SkippedCategorySelected { category: String },

    /// The same topping id appears with different free-state.
    #[error("Topping '{topping_id}' appears both free and paid under the same id")]
    ConflictingTopping { topping_id: String },
}

impl ValidationError {
    /// Creates a Required error.
    pub fn required(field: impl Into<String>) -> Self {
        ValidationError::Required {
            field: field.into(),
        }
    }

    /// Creates a MustBeNonNegative error.
    pub fn non_negative(field: impl Into<String>) -> Self {
        ValidationError::MustBeNonNegative {
            field: field.into(),
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

//! # Validation Module
//!
//! Input validation for everything that crosses into the cart from outside:
//! product-page selections, coupon codes typed by the buyer, resolved fees.
//!
//! ## Where Validation Happens
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Validation Layers                                  │
//! │                                                                         │
//! │  Layer 1: Product page / cart page                                     │
//! │  ├── Required selections, obvious format checks                        │
//! │  └── Immediate feedback to the buyer                                   │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 2: Cart mutation (Rust)                                         │
//! │  ├── THIS MODULE: shape and business-rule validation                   │
//! │  └── Rejected input leaves the cart untouched                          │
//! │           │                                                             │
//! │           ▼                                                             │
//! │  Layer 3: Storefront backend                                           │
//! │  └── Authoritative re-pricing at order placement                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use crate::error::ValidationError;
use crate::money::Money;
use crate::types::{Customization, Product};
use crate::{MAX_COUPON_CODE_LENGTH, MAX_NOTE_LENGTH};

/// Result type for validation operations.
pub type ValidationResult<T> = Result<T, ValidationError>;

// =============================================================================
// String Validators
// =============================================================================

/// Normalizes a coupon code as typed by the buyer.
///
/// ## Rules
/// - Surrounding whitespace is ignored
/// - Must not be empty
/// - At most 20 characters
/// - Letters, numbers, hyphens and underscores only
///
/// Returns the uppercased code, which is the form sent to the backend and
/// stored on the cart.
///
/// ## Example
/// ```rust
/// use acai_core::validation::normalize_coupon_code;
///
/// assert_eq!(normalize_coupon_code("  dez10 ").unwrap(), "DEZ10");
/// assert!(normalize_coupon_code("").is_err());
/// assert!(normalize_coupon_code("TEM ESPACO").is_err());
/// ```
pub fn normalize_coupon_code(code: &str) -> ValidationResult<String> {
    let code = code.trim();

    if code.is_empty() {
        return Err(ValidationError::required("coupon code"));
    }

    if code.chars().count() > MAX_COUPON_CODE_LENGTH {
        return Err(ValidationError::TooLong {
            field: "coupon code".to_string(),
            max: MAX_COUPON_CODE_LENGTH,
        });
    }

    if !code
        .chars()
        .all(|c| c.is_alphanumeric() || c == '-' || c == '_')
    {
        return Err(ValidationError::InvalidFormat {
            field: "coupon code".to_string(),
            reason: "must contain only letters, numbers, hyphens, and underscores".to_string(),
        });
    }

    Ok(code.to_uppercase())
}

/// Normalizes the kitchen note.
///
/// Trims whitespace; an empty note becomes `None`. Length is counted in
/// characters, not bytes ("açaí" is 4).
pub fn normalize_note(note: Option<&str>) -> ValidationResult<Option<String>> {
    let Some(note) = note.map(str::trim).filter(|n| !n.is_empty()) else {
        return Ok(None);
    };

    if note.chars().count() > MAX_NOTE_LENGTH {
        return Err(ValidationError::TooLong {
            field: "note".to_string(),
            max: MAX_NOTE_LENGTH,
        });
    }

    Ok(Some(note.to_string()))
}

// =============================================================================
// Amount Validators
// =============================================================================

/// Validates a resolved delivery fee.
///
/// ## Example
/// ```rust
/// use acai_core::money::Money;
/// use acai_core::validation::validate_delivery_fee;
///
/// assert!(validate_delivery_fee(Money::from_cents(500)).is_ok());
/// assert!(validate_delivery_fee(Money::zero()).is_ok());
/// assert!(validate_delivery_fee(Money::from_cents(-1)).is_err());
/// ```
pub fn validate_delivery_fee(fee: Money) -> ValidationResult<()> {
    if fee.is_negative() {
        return Err(ValidationError::non_negative("delivery fee"));
    }
    Ok(())
}

// =============================================================================
// Customization Validators
// =============================================================================

/// Validates a customization against the product it is attached to.
///
/// ## Rules
/// - The selected size, if any, must be one of the product's variants
/// - Every topping needs a quantity of at least 1
/// - An id may not appear both free and paid
/// - The note fits [`MAX_NOTE_LENGTH`]
///
/// Category rules (allowances, skipped categories) are enforced earlier, by
/// [`crate::toppings::build_customization`], where categories are known.
pub fn validate_customization(product: &Product, customization: &Customization) -> ValidationResult<()> {
    if let Some(size_id) = customization.size_id.as_deref() {
        if product.size(size_id).is_none() {
            return Err(ValidationError::UnknownSize {
                product_id: product.id.clone(),
                size_id: size_id.to_string(),
            });
        }
    }

    let mut free_state: HashMap<&str, bool> = HashMap::new();
    for topping in &customization.toppings {
        if topping.quantity == 0 {
            return Err(ValidationError::MustBePositive {
                field: format!("quantity of topping '{}'", topping.id),
            });
        }

        if let Some(previous) = free_state.insert(topping.id.as_str(), topping.is_free) {
            if previous != topping.is_free {
                return Err(ValidationError::ConflictingTopping {
                    topping_id: topping.id.clone(),
                });
            }
        }
    }

    if let Some(note) = customization.note.as_deref() {
        if note.chars().count() > MAX_NOTE_LENGTH {
            return Err(ValidationError::TooLong {
                field: "note".to_string(),
                max: MAX_NOTE_LENGTH,
            });
        }
    }

    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SelectedTopping;

    #[test]
    fn test_normalize_coupon_code() {
        assert_eq!(normalize_coupon_code("dez10").unwrap(), "DEZ10");
        assert_eq!(normalize_coupon_code(" frete_gratis ").unwrap(), "FRETE_GRATIS");
        assert_eq!(normalize_coupon_code("A".repeat(20).as_str()).unwrap().len(), 20);

        assert!(normalize_coupon_code("").is_err());
        assert!(normalize_coupon_code("   ").is_err());
        assert!(normalize_coupon_code("DEZ 10").is_err());
        assert!(normalize_coupon_code("DEZ%").is_err());
        assert!(normalize_coupon_code(&"A".repeat(21)).is_err());
    }

    #[test]
    fn test_normalize_note() {
        assert_eq!(normalize_note(None).unwrap(), None);
        assert_eq!(normalize_note(Some("   ")).unwrap(), None);
        assert_eq!(
            normalize_note(Some("  sem granola ")).unwrap(),
            Some("sem granola".to_string())
        );

        let limit = "ç".repeat(MAX_NOTE_LENGTH);
        assert!(normalize_note(Some(&limit)).is_ok());

        let too_long = "a".repeat(MAX_NOTE_LENGTH + 1);
        assert!(matches!(
            normalize_note(Some(&too_long)),
            Err(ValidationError::TooLong { max: 500, .. })
        ));
    }

    #[test]
    fn test_validate_customization_size() {
        let product = Product::new("acai", "Açaí", Money::from_cents(1500))
            .with_size("300ml", "Pequeno", Money::from_cents(1500));

        let ok = Customization {
            size_id: Some("300ml".to_string()),
            ..Default::default()
        };
        assert!(validate_customization(&product, &ok).is_ok());

        let bad = Customization {
            size_id: Some("1l".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            validate_customization(&product, &bad),
            Err(ValidationError::UnknownSize { .. })
        ));
    }

    #[test]
    fn test_validate_customization_conflicting_topping() {
        let product = Product::new("acai", "Açaí", Money::from_cents(1500));
        let custom = Customization {
            toppings: vec![
                SelectedTopping::paid("granola", "Granola", Money::from_cents(200), 1),
                SelectedTopping::free("granola", "Granola", Money::from_cents(200), 1),
            ],
            ..Default::default()
        };

        assert_eq!(
            validate_customization(&product, &custom),
            Err(ValidationError::ConflictingTopping {
                topping_id: "granola".to_string()
            })
        );
    }

    #[test]
    fn test_validate_customization_zero_topping_quantity() {
        let product = Product::new("acai", "Açaí", Money::from_cents(1500));
        let custom = Customization {
            toppings: vec![SelectedTopping::paid("kiwi", "Kiwi", Money::from_cents(200), 0)],
            ..Default::default()
        };
        assert!(validate_customization(&product, &custom).is_err());
    }

    #[test]
    fn test_validate_delivery_fee() {
        assert!(validate_delivery_fee(Money::from_cents(700)).is_ok());
        assert!(validate_delivery_fee(Money::from_cents(-700)).is_err());
    }
}

//! # Coupon Resolver
//!
//! Validates a coupon code with the storefront backend and folds the answer
//! into the cart.
//!
//! ## Round Trip
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Coupon Validation                                    │
//! │                                                                         │
//! │  apply_code("dez10")                                                   │
//! │       │  normalize ──► "DEZ10"                                          │
//! │       │  issue token (coupon seq + content revision)                    │
//! │       ▼                                                                 │
//! │  CouponValidator::validate { code, subtotal, itemIds }    (await)      │
//! │       │                                                                 │
//! │       ├── token stale ─────────────► Superseded (cart untouched)        │
//! │       ├── invalid / error ─────────► CouponRejected (cart untouched)    │
//! │       ├── below minimum ───────────► CouponRejected                     │
//! │       └── valid ───────────────────► apply_coupon ──► Applied           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The discount shown to the buyer is always the one computed locally. The
//! server's figure is only compared and logged; the backend re-prices the
//! order at checkout.

use std::sync::Arc;

use acai_core::money::Money;
use acai_core::pricing;
use acai_core::types::{AppliedCoupon, CouponKind, DiscountRate};
use acai_core::validation::normalize_coupon_code;
use async_trait::async_trait;
use rust_decimal::Decimal;
use tracing::{debug, info, warn};

use crate::error::{CartError, CartResult, ServiceError};
use crate::store::{CartStore, CouponToken};

// =============================================================================
// Validator Contract
// =============================================================================

/// What is sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CouponValidationRequest {
    pub code: String,
    pub subtotal: Money,
    /// Product ids of the cart lines (coupons may target products).
    pub item_ids: Vec<String>,
}

/// Coupon terms as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CouponDescriptor {
    pub kind: CouponKind,
    pub min_order_value: Option<Money>,
    pub max_discount: Option<Money>,
}

/// The backend's verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CouponValidation {
    pub valid: bool,
    pub discount_amount: Money,
    pub coupon: Option<CouponDescriptor>,
    pub message: Option<String>,
}

impl CouponValidation {
    /// A negative verdict.
    pub fn invalid(message: impl Into<String>) -> Self {
        CouponValidation {
            valid: false,
            discount_amount: Money::zero(),
            coupon: None,
            message: Some(message.into()),
        }
    }
}

/// Coupon validation service.
#[async_trait]
pub trait CouponValidator: Send + Sync {
    async fn validate(&self, request: CouponValidationRequest) -> Result<CouponValidation, ServiceError>;
}

/// Maps a wire coupon type onto [`CouponKind`].
///
/// Accepts `percentage`, `fixed`, and `freeDelivery` (or `free_delivery`).
/// Returns `None` for unknown types and out-of-range values.
pub fn parse_coupon_kind(kind: &str, value: Decimal) -> Option<CouponKind> {
    match kind {
        "percentage" => DiscountRate::from_percent(value).map(|rate| CouponKind::Percentage { rate }),
        "fixed" => Money::from_decimal(value)
            .filter(|amount| !amount.is_negative())
            .map(|amount| CouponKind::Fixed { amount }),
        "freeDelivery" | "free_delivery" => Some(CouponKind::FreeDelivery),
        _ => None,
    }
}

// =============================================================================
// Outcomes
// =============================================================================

/// Result of [`CouponResolver::apply_code`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CouponOutcome {
    /// The coupon is on the cart.
    Applied {
        coupon: AppliedCoupon,
        server_discount: Money,
        client_discount: Money,
    },
    /// A newer coupon action or a cart change made this answer irrelevant.
    Superseded,
}

/// Result of [`CouponResolver::revalidate_restored`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevalidationOutcome {
    /// The cart had no restored coupon.
    NothingToRevalidate,
    /// The backend accepted the coupon again; it is now applied.
    Confirmed(AppliedCoupon),
    /// The backend refused the coupon; it was removed from the cart.
    Dropped { code: String, reason: String },
    /// The answer arrived after something newer happened.
    Superseded,
}

// =============================================================================
// Resolver
// =============================================================================

/// Applies coupon codes through a [`CouponValidator`].
#[derive(Clone)]
pub struct CouponResolver {
    validator: Arc<dyn CouponValidator>,
}

impl CouponResolver {
    pub fn new(validator: Arc<dyn CouponValidator>) -> Self {
        CouponResolver { validator }
    }

    /// Validates `code` and, if accepted, applies it.
    ///
    /// ## Errors
    /// - `Core(Validation)`: malformed code (nothing sent)
    /// - `CouponRejected`: empty cart, backend refusal, network failure, or
    ///   subtotal below the coupon minimum
    ///
    /// The cart is never modified on error.
    pub async fn apply_code(&self, store: &CartStore, code: &str) -> CartResult<CouponOutcome> {
        let code = normalize_coupon_code(code)?;
        if store.state().is_empty() {
            return Err(rejected(&code, "cart is empty"));
        }

        let (token, state) = store.issue_coupon_token();
        let request = CouponValidationRequest {
            code: code.clone(),
            subtotal: state.subtotal,
            item_ids: state.product_ids(),
        };
        debug!(code = %code, subtotal = %state.subtotal, "Validating coupon");

        let result = self.validator.validate(request).await;

        if !store.coupon_token_is_current(token) {
            warn!(code = %code, "Dropping stale coupon validation");
            return Ok(CouponOutcome::Superseded);
        }

        let validation = match result {
            Ok(validation) => validation,
            Err(e) => {
                warn!(code = %code, error = %e, "Coupon validation failed");
                return Err(rejected(&code, &e.reason()));
            }
        };

        if !validation.valid {
            let reason = rejection_message(&validation);
            warn!(code = %code, reason = %reason, "Coupon rejected");
            return Err(rejected(&code, &reason));
        }

        let coupon = coupon_from_validation(&code, &validation);
        if !pricing::coupon_threshold_met(&coupon, state.subtotal) {
            return Err(rejected(&code, &below_minimum(&coupon)));
        }

        let client_discount = pricing::coupon_discount(Some(&coupon), state.subtotal);
        if !store.apply_coupon_if_current(token, coupon.clone()) {
            warn!(code = %code, "Dropping stale coupon validation");
            return Ok(CouponOutcome::Superseded);
        }

        if !coupon.waives_delivery() && client_discount != validation.discount_amount {
            warn!(
                code = %code,
                server = %validation.discount_amount,
                client = %client_discount,
                "Server and client disagree on coupon discount"
            );
        }

        info!(code = %code, discount = %client_discount, "Coupon applied");
        Ok(CouponOutcome::Applied {
            coupon,
            server_discount: validation.discount_amount,
            client_discount,
        })
    }

    /// Re-validates the coupon carried over from a previous session.
    ///
    /// A definitive refusal drops the coupon and emits
    /// `CartNotice::RestoredCouponDropped`. When the backend cannot be
    /// reached the coupon stays unconfirmed (granting nothing) and
    /// `CouponRejected` is returned, so the caller may try again later.
    pub async fn revalidate_restored(&self, store: &CartStore) -> CartResult<RevalidationOutcome> {
        if store.state().unconfirmed_coupon.is_none() {
            return Ok(RevalidationOutcome::NothingToRevalidate);
        }

        let (token, state) = store.issue_coupon_token();
        let Some(restored) = state.unconfirmed_coupon.clone() else {
            return Ok(RevalidationOutcome::NothingToRevalidate);
        };
        let code = restored.code.clone();

        if state.is_empty() {
            return Ok(drop_restored(store, token, code, "cart is empty".to_string()));
        }

        let request = CouponValidationRequest {
            code: code.clone(),
            subtotal: state.subtotal,
            item_ids: state.product_ids(),
        };
        debug!(code = %code, "Re-validating restored coupon");

        let result = self.validator.validate(request).await;

        if !store.coupon_token_is_current(token) {
            warn!(code = %code, "Dropping stale coupon re-validation");
            return Ok(RevalidationOutcome::Superseded);
        }

        let validation = match result {
            Ok(validation) => validation,
            Err(e) if e.is_definitive() => {
                return Ok(drop_restored(store, token, code, e.reason()));
            }
            Err(e) => {
                warn!(code = %code, error = %e, "Could not re-validate restored coupon");
                return Err(rejected(&code, &e.reason()));
            }
        };

        if !validation.valid {
            let reason = rejection_message(&validation);
            return Ok(drop_restored(store, token, code, reason));
        }

        let coupon = coupon_from_validation(&code, &validation);
        if !pricing::coupon_threshold_met(&coupon, state.subtotal) {
            let reason = below_minimum(&coupon);
            return Ok(drop_restored(store, token, code, reason));
        }

        if !store.apply_coupon_if_current(token, coupon.clone()) {
            return Ok(RevalidationOutcome::Superseded);
        }

        info!(code = %code, "Restored coupon confirmed");
        Ok(RevalidationOutcome::Confirmed(coupon))
    }
}

// =============================================================================
// Helpers
// =============================================================================

fn rejected(code: &str, reason: &str) -> CartError {
    CartError::CouponRejected {
        code: code.to_string(),
        reason: reason.to_string(),
    }
}

fn rejection_message(validation: &CouponValidation) -> String {
    validation
        .message
        .clone()
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| "coupon is not valid".to_string())
}

fn below_minimum(coupon: &AppliedCoupon) -> String {
    format!(
        "minimum order value is {}",
        coupon.min_order_value.unwrap_or_default()
    )
}

/// Builds the coupon to install. Without terms from the backend, the
/// reported discount becomes a fixed coupon.
fn coupon_from_validation(code: &str, validation: &CouponValidation) -> AppliedCoupon {
    match &validation.coupon {
        Some(terms) => {
            let mut coupon = AppliedCoupon::new(code, terms.kind);
            coupon.min_order_value = terms.min_order_value;
            coupon.max_discount = terms.max_discount;
            coupon
        }
        None => AppliedCoupon::new(
            code,
            CouponKind::Fixed {
                amount: validation.discount_amount.non_negative(),
            },
        ),
    }
}

fn drop_restored(
    store: &CartStore,
    token: CouponToken,
    code: String,
    reason: String,
) -> RevalidationOutcome {
    match store.drop_unconfirmed_if_current(token, &reason) {
        Some(_) => {
            warn!(code = %code, reason = %reason, "Restored coupon dropped");
            RevalidationOutcome::Dropped { code, reason }
        }
        None => RevalidationOutcome::Superseded,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

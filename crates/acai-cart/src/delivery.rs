//! # Delivery Fee Resolver
//!
//! Looks up the delivery fee for a neighborhood and stores it on the cart.
//! Only the latest lookup counts: if the buyer picks "Centro" and then
//! "Aldeota", a late answer for "Centro" is thrown away.

use std::sync::Arc;

use acai_core::money::Money;
use acai_core::ValidationError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{CartError, CartResult, ServiceError};
use crate::store::CartStore;

/// Shown when the backend does not estimate a delivery time.
pub const DEFAULT_ESTIMATED_TIME: &str = "30-40 min";

/// Fee and estimate for one neighborhood.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryQuote {
    pub neighborhood: String,
    pub fee: Money,
    pub estimated_time: String,
}

/// Delivery fee service.
#[async_trait]
pub trait DeliveryFeeLookup: Send + Sync {
    /// `Err(ServiceError::NotFound)` means the neighborhood is not served.
    async fn lookup(&self, neighborhood: &str) -> Result<DeliveryQuote, ServiceError>;
}

/// Result of [`DeliveryFeeResolver::resolve`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The fee is on the cart.
    Applied(DeliveryQuote),
    /// A newer lookup (or a manual fee, or a cleared cart) won.
    Superseded,
}

/// Resolves delivery fees through a [`DeliveryFeeLookup`].
#[derive(Clone)]
pub struct DeliveryFeeResolver {
    lookup: Arc<dyn DeliveryFeeLookup>,
}

impl DeliveryFeeResolver {
    pub fn new(lookup: Arc<dyn DeliveryFeeLookup>) -> Self {
        DeliveryFeeResolver { lookup }
    }

    /// Looks up `neighborhood` and stores the fee.
    ///
    /// ## Errors
    /// - `Core(Validation)`: blank neighborhood
    /// - `DeliveryZoneUnserviceable`: the backend does not deliver there
    /// - `DeliveryLookupFailed`: any other failure
    ///
    /// On error the previous fee stays in place. A lookup overtaken by a
    /// newer one returns `Superseded`, whatever the backend answered.
    pub async fn resolve(&self, store: &CartStore, neighborhood: &str) -> CartResult<DeliveryOutcome> {
        let neighborhood = neighborhood.trim();
        if neighborhood.is_empty() {
            return Err(ValidationError::required("neighborhood").into());
        }

        let token = store.issue_delivery_token();
        debug!(neighborhood, "Looking up delivery fee");

        let result = self.lookup.lookup(neighborhood).await;

        if !store.delivery_token_is_current(token) {
            warn!(neighborhood, "Dropping stale delivery lookup");
            return Ok(DeliveryOutcome::Superseded);
        }

        let quote = match result {
            Ok(quote) => quote,
            Err(ServiceError::NotFound) => {
                warn!(neighborhood, "Neighborhood not served");
                return Err(CartError::DeliveryZoneUnserviceable {
                    neighborhood: neighborhood.to_string(),
                });
            }
            Err(e) => {
                warn!(neighborhood, error = %e, "Delivery fee lookup failed");
                return Err(CartError::DeliveryLookupFailed {
                    neighborhood: neighborhood.to_string(),
                    reason: e.reason(),
                });
            }
        };

        if !store.set_delivery_fee_if_current(token, quote.fee)? {
            warn!(neighborhood, "Dropping stale delivery fee");
            return Ok(DeliveryOutcome::Superseded);
        }

        info!(
            neighborhood = %quote.neighborhood,
            fee = %quote.fee,
            estimated_time = %quote.estimated_time,
            "Delivery fee resolved"
        );
        Ok(DeliveryOutcome::Applied(quote))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use acai_core::types::{AppliedCoupon, CouponKind, Product};
    use acai_core::CoreError;

    struct TableLookup {
        fees: HashMap<String, Result<DeliveryQuote, ServiceError>>,
    }

    #[async_trait]
    impl DeliveryFeeLookup for TableLookup {
        async fn lookup(&self, neighborhood: &str) -> Result<DeliveryQuote, ServiceError> {
            self.fees
                .get(neighborhood)
                .cloned()
                .unwrap_or(Err(ServiceError::NotFound))
        }
    }

    fn resolver() -> DeliveryFeeResolver {
        let mut fees = HashMap::new();
        fees.insert(
            "Centro".to_string(),
            Ok(DeliveryQuote {
                neighborhood: "Centro".to_string(),
                fee: Money::from_cents(500),
                estimated_time: DEFAULT_ESTIMATED_TIME.to_string(),
            }),
        );
        fees.insert(
            "Aldeota".to_string(),
            Err(ServiceError::Http {
                status: 503,
                message: "Service Unavailable".to_string(),
            }),
        );
        DeliveryFeeResolver::new(Arc::new(TableLookup { fees }))
    }

    #[tokio::test]
    async fn test_resolve_sets_fee() {
        let store = CartStore::new();
        store
            .add_item(Product::new("acai", "Açaí", Money::from_cents(2000)), 1, None)
            .unwrap();

        let outcome = resolver().resolve(&store, "  Centro ").await.unwrap();

        assert!(matches!(outcome, DeliveryOutcome::Applied(ref q) if q.fee.cents() == 500));
        let state = store.state();
        assert_eq!(state.delivery_fee.cents(), 500);
        assert_eq!(state.total.cents(), 2500);
    }

    #[tokio::test]
    async fn test_failures_keep_previous_fee() {
        let store = CartStore::new();
        store.set_delivery_fee(Money::from_cents(300)).unwrap();

        assert!(matches!(
            resolver().resolve(&store, "Messejana").await,
            Err(CartError::DeliveryZoneUnserviceable { ref neighborhood }) if neighborhood == "Messejana"
        ));
        assert!(matches!(
            resolver().resolve(&store, "Aldeota").await,
            Err(CartError::DeliveryLookupFailed { .. })
        ));
        assert!(matches!(
            resolver().resolve(&store, "   ").await,
            Err(CartError::Core(CoreError::Validation(_)))
        ));

        assert_eq!(store.state().delivery_fee.cents(), 300);
    }

    #[tokio::test]
    async fn test_free_delivery_keeps_fee_for_display() {
        let store = CartStore::new();
        store
            .add_item(Product::new("acai", "Açaí", Money::from_cents(2000)), 1, None)
            .unwrap();
        store.apply_coupon(AppliedCoupon::new("FRETE", CouponKind::FreeDelivery));

        resolver().resolve(&store, "Centro").await.unwrap();

        let state = store.state();
        assert_eq!(state.delivery_fee.cents(), 500);
        assert!(state.effective_delivery_fee.is_zero());
        assert_eq!(state.total.cents(), 2000);
    }
}

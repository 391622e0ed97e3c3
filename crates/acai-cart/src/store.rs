//! # Cart Store
//!
//! The single writer of cart state.
//!
//! ## Thread Safety
//! The cart lives behind one `Mutex`, held for a whole transition and never
//! across an `.await`. Every mutation therefore runs to completion before
//! the next one starts, whichever task it comes from.
//!
//! ## Publication Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Cart Store Operations                                │
//! │                                                                         │
//! │  Caller                 CartStore                 Published             │
//! │  ──────                 ─────────                 ─────────             │
//! │                                                                         │
//! │  add_item ─────────┐                                                    │
//! │  remove_item ──────┤    lock ──► Cart transition                        │
//! │  update_quantity ──┤               │ (acai-core, pure)                  │
//! │  replace_custom. ──┤               ▼                                    │
//! │  clear_cart ───────┤    changed? ──► watch<CartState>   (latest state)  │
//! │  apply_coupon ─────┤               ├─► broadcast<CartNotice>            │
//! │  remove_coupon ────┤               └─► PersistenceWriter (queued)       │
//! │  set_delivery_fee ─┘    unlock                                          │
//! │                                                                         │
//! │  Resolvers go through the token-checked `*_if_current` entry points     │
//! │  so that a late answer cannot overwrite a newer decision.               │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Request Tokens
//! | Resource | Sequence bumped by                                   | Also checked     |
//! |----------|------------------------------------------------------|------------------|
//! | Coupon   | new validation, apply/remove_coupon, clear_cart      | content revision |
//! | Delivery | new lookup, set_delivery_fee, clear_cart             | -                |

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use acai_core::cart::{Cart, CartNotice, CartState};
use acai_core::money::Money;
use acai_core::types::{AppliedCoupon, CartItem, Customization, Product};
use tokio::sync::{broadcast, watch};
use tracing::debug;

use crate::error::CartResult;
use crate::persistence::{self, CartStorage, PersistenceWriter};

/// Capacity of the notice channel. Slow subscribers lose the oldest notices.
const NOTICE_CAPACITY: usize = 64;

// =============================================================================
// Request Tokens
// =============================================================================

/// Identifies one coupon validation round trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct CouponToken {
    seq: u64,
    content_revision: u64,
}

/// Identifies one delivery-fee lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct DeliveryToken {
    seq: u64,
}

// =============================================================================
// Store
// =============================================================================

struct StoreState {
    cart: Cart,
    coupon_seq: u64,
    delivery_seq: u64,
}

impl StoreState {
    fn coupon_is_current(&self, token: CouponToken) -> bool {
        self.coupon_seq == token.seq && self.cart.content_revision() == token.content_revision
    }
}

struct StoreInner {
    state: Mutex<StoreState>,
    state_tx: watch::Sender<CartState>,
    notice_tx: broadcast::Sender<CartNotice>,
    writer: Option<PersistenceWriter>,
}

/// Shared handle to the cart.
///
/// Cloning is cheap; all clones drive the same cart.
#[derive(Clone)]
pub struct CartStore {
    inner: Arc<StoreInner>,
}

impl std::fmt::Debug for CartStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CartStore")
            .field("state", &*self.inner.state_tx.borrow())
            .field("persistent", &self.inner.writer.is_some())
            .finish()
    }
}

impl Default for CartStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CartStore {
    /// Creates a store around an empty cart, without persistence.
    pub fn new() -> Self {
        Self::from_cart(Cart::new())
    }

    /// Creates a store around an existing cart, without persistence.
    pub fn from_cart(cart: Cart) -> Self {
        let (notice_tx, _) = broadcast::channel(NOTICE_CAPACITY);
        Self::build(cart, notice_tx, None)
    }

    /// Creates a store whose every change is saved under `key`.
    ///
    /// Spawns the background writer, so this must run inside a Tokio
    /// runtime.
    pub fn with_persistence(cart: Cart, storage: Arc<dyn CartStorage>, key: impl Into<String>) -> Self {
        let (notice_tx, _) = broadcast::channel(NOTICE_CAPACITY);
        let writer = PersistenceWriter::spawn(storage, key, notice_tx.clone());
        Self::build(cart, notice_tx, Some(writer))
    }

    /// Restores the saved cart (empty if there is none) and keeps saving
    /// to the same key.
    pub async fn open(storage: Arc<dyn CartStorage>, key: impl Into<String>) -> Self {
        let key = key.into();
        let cart = persistence::restore(storage.as_ref(), &key).await;
        Self::with_persistence(cart, storage, key)
    }

    fn build(cart: Cart, notice_tx: broadcast::Sender<CartNotice>, writer: Option<PersistenceWriter>) -> Self {
        let (state_tx, _) = watch::channel(cart.state());
        CartStore {
            inner: Arc::new(StoreInner {
                state: Mutex::new(StoreState {
                    cart,
                    coupon_seq: 0,
                    delivery_seq: 0,
                }),
                state_tx,
                notice_tx,
                writer,
            }),
        }
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Current snapshot.
    pub fn state(&self) -> CartState {
        self.inner.state_tx.borrow().clone()
    }

    /// Looks up one line.
    pub fn get_item(&self, line_id: &str) -> Option<CartItem> {
        self.lock().cart.get_item(line_id).cloned()
    }

    /// Receiver that always holds the latest state.
    pub fn subscribe(&self) -> watch::Receiver<CartState> {
        self.inner.state_tx.subscribe()
    }

    /// Receiver of notices (coupon invalidated, restored coupon dropped,
    /// persistence failure). Only notices sent after subscribing arrive.
    pub fn subscribe_notices(&self) -> broadcast::Receiver<CartNotice> {
        self.inner.notice_tx.subscribe()
    }

    /// Waits until every snapshot queued so far has been written.
    ///
    /// Returns immediately for a store without persistence.
    pub async fn flush(&self) {
        if let Some(writer) = &self.inner.writer {
            writer.flush().await;
        }
    }

    // =========================================================================
    // Item Mutations
    // =========================================================================

    /// Adds a new line and returns its id.
    pub fn add_item(
        &self,
        product: Product,
        quantity: i64,
        customization: Option<Customization>,
    ) -> CartResult<String> {
        let mut state = self.lock();
        let product_id = product.id.clone();
        let line_id = state.cart.add_item(product, quantity, customization)?;

        debug!(
            line_id = %line_id,
            product_id = %product_id,
            quantity,
            subtotal = %state.cart.totals().subtotal,
            "Item added"
        );
        self.commit(&mut state);
        Ok(line_id)
    }

    /// Removes a line. Removing an absent line is a no-op and publishes
    /// nothing.
    pub fn remove_item(&self, line_id: &str) -> bool {
        let mut state = self.lock();
        if !state.cart.remove_item(line_id) {
            return false;
        }

        debug!(line_id, subtotal = %state.cart.totals().subtotal, "Item removed");
        self.commit(&mut state);
        true
    }

    /// Sets a line's quantity; zero or less removes the line.
    ///
    /// Returns whether the cart changed.
    pub fn update_item_quantity(&self, line_id: &str, quantity: i64) -> CartResult<bool> {
        let mut state = self.lock();
        if !state.cart.update_item_quantity(line_id, quantity)? {
            return Ok(false);
        }

        debug!(line_id, quantity, subtotal = %state.cart.totals().subtotal, "Quantity updated");
        self.commit(&mut state);
        Ok(true)
    }

    /// Replaces a line's customization in one step. Returns the new line id,
    /// or `None` if the line does not exist.
    pub fn replace_item_customization(
        &self,
        line_id: &str,
        customization: Option<Customization>,
    ) -> CartResult<Option<String>> {
        let mut state = self.lock();
        let Some(new_id) = state.cart.replace_item_customization(line_id, customization)? else {
            return Ok(None);
        };

        debug!(old_line_id = line_id, line_id = %new_id, "Customization replaced");
        self.commit(&mut state);
        Ok(Some(new_id))
    }

    /// Empties the cart and invalidates every request in flight.
    pub fn clear_cart(&self) {
        let mut state = self.lock();
        state.cart.clear();
        state.coupon_seq += 1;
        state.delivery_seq += 1;

        debug!("Cart cleared");
        self.commit(&mut state);
    }

    // =========================================================================
    // Coupon & Delivery Mutations
    // =========================================================================

    /// Installs an already validated coupon.
    ///
    /// Any validation still in flight is superseded.
    pub fn apply_coupon(&self, coupon: AppliedCoupon) {
        let mut state = self.lock();
        state.coupon_seq += 1;

        debug!(code = %coupon.code, "Coupon applied");
        state.cart.apply_coupon(coupon);
        self.commit(&mut state);
    }

    /// Removes the applied coupon. Returns false if there was none.
    pub fn remove_coupon(&self) -> bool {
        let mut state = self.lock();
        state.coupon_seq += 1;
        if !state.cart.remove_coupon() {
            return false;
        }

        debug!("Coupon removed");
        self.commit(&mut state);
        true
    }

    /// Stores a delivery fee. Negative fees are rejected.
    ///
    /// Any lookup still in flight is superseded.
    pub fn set_delivery_fee(&self, fee: Money) -> CartResult<()> {
        let mut state = self.lock();
        state.cart.set_delivery_fee(fee)?;
        state.delivery_seq += 1;

        debug!(fee = %fee, "Delivery fee set");
        self.commit(&mut state);
        Ok(())
    }

    // =========================================================================
    // Resolver Entry Points
    // =========================================================================

    /// Starts a coupon validation: supersedes earlier ones and returns the
    /// state the request must be built from.
    pub(crate) fn issue_coupon_token(&self) -> (CouponToken, CartState) {
        let mut state = self.lock();
        state.coupon_seq += 1;
        let token = CouponToken {
            seq: state.coupon_seq,
            content_revision: state.cart.content_revision(),
        };
        (token, state.cart.state())
    }

    /// True if no newer coupon decision or item change happened since
    /// `token` was issued.
    pub(crate) fn coupon_token_is_current(&self, token: CouponToken) -> bool {
        self.lock().coupon_is_current(token)
    }

    /// Installs `coupon` if `token` is still current.
    pub(crate) fn apply_coupon_if_current(&self, token: CouponToken, coupon: AppliedCoupon) -> bool {
        let mut state = self.lock();
        if !state.coupon_is_current(token) {
            return false;
        }

        state.cart.apply_coupon(coupon);
        self.commit(&mut state);
        true
    }

    /// Drops the restored coupon if `token` is still current, and tells
    /// subscribers why.
    pub(crate) fn drop_unconfirmed_if_current(&self, token: CouponToken, reason: &str) -> Option<AppliedCoupon> {
        let mut state = self.lock();
        if !state.coupon_is_current(token) {
            return None;
        }

        let dropped = state.cart.drop_unconfirmed_coupon()?;
        let _ = self.inner.notice_tx.send(CartNotice::RestoredCouponDropped {
            code: dropped.code.clone(),
            reason: reason.to_string(),
        });
        self.commit(&mut state);
        Some(dropped)
    }

    /// Starts a delivery lookup, superseding earlier ones.
    pub(crate) fn issue_delivery_token(&self) -> DeliveryToken {
        let mut state = self.lock();
        state.delivery_seq += 1;
        DeliveryToken {
            seq: state.delivery_seq,
        }
    }

    /// True if no newer lookup or manual fee happened since `token` was
    /// issued.
    pub(crate) fn delivery_token_is_current(&self, token: DeliveryToken) -> bool {
        self.lock().delivery_seq == token.seq
    }

    /// Stores `fee` if `token` is still the latest lookup.
    ///
    /// `Ok(false)` means the lookup was superseded and nothing changed.
    pub(crate) fn set_delivery_fee_if_current(&self, token: DeliveryToken, fee: Money) -> CartResult<bool> {
        let mut state = self.lock();
        if state.delivery_seq != token.seq {
            return Ok(false);
        }

        state.cart.set_delivery_fee(fee)?;
        self.commit(&mut state);
        Ok(true)
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        // Transitions never leave the cart half-updated, so a poisoned lock
        // still guards a consistent cart.
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Publishes the cart after a change. Called with the lock held so that
    /// publications keep the order of mutations.
    fn commit(&self, state: &mut StoreState) {
        for notice in state.cart.drain_notices() {
            let _ = self.inner.notice_tx.send(notice);
        }

        self.inner.state_tx.send_replace(state.cart.state());

        if let Some(writer) = &self.inner.writer {
            writer.enqueue(&state.cart);
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use acai_core::types::{CouponKind, DiscountRate};
    use acai_core::{CoreError, ValidationError};

    use crate::error::CartError;
    use crate::persistence::{MemoryCartStorage, PersistedCart};

    fn product(id: &str, cents: i64) -> Product {
        Product::new(id, format!("Produto {}", id), Money::from_cents(cents))
    }

    fn ten_percent_over_30() -> AppliedCoupon {
        AppliedCoupon::new(
            "DEZ",
            CouponKind::Percentage {
                rate: DiscountRate::from_bps(1000),
            },
        )
        .with_min_order(Money::from_cents(3000))
    }

    #[test]
    fn test_mutations_publish_state() {
        let store = CartStore::new();
        let mut rx = store.subscribe();

        let id = store.add_item(product("acai", 1800), 2, None).unwrap();
        assert!(rx.has_changed().unwrap());
        let state = rx.borrow_and_update().clone();
        assert_eq!(state.subtotal.cents(), 3600);
        assert_eq!(state.item(&id).map(|i| i.quantity), Some(2));

        assert!(store.update_item_quantity(&id, 3).unwrap());
        assert_eq!(rx.borrow_and_update().subtotal.cents(), 5400);
    }

    #[test]
    fn test_no_op_does_not_publish() {
        let store = CartStore::new();
        let id = store.add_item(product("acai", 1800), 1, None).unwrap();
        let mut rx = store.subscribe();
        rx.borrow_and_update();

        assert!(store.remove_item(&id));
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        assert!(!store.remove_item(&id));
        assert!(!store.update_item_quantity("missing", 4).unwrap());
        assert!(!store.remove_coupon());
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_errors_leave_state_untouched() {
        let store = CartStore::new();
        let id = store.add_item(product("acai", 1800), 1, None).unwrap();
        let before = store.state();

        assert!(matches!(
            store.update_item_quantity(&id, 1000),
            Err(CartError::Core(CoreError::QuantityTooLarge { .. }))
        ));
        assert!(matches!(
            store.add_item(product("acai", 1800), 0, None),
            Err(CartError::Core(CoreError::InvalidQuantity { quantity: 0 }))
        ));
        assert!(matches!(
            store.set_delivery_fee(Money::from_cents(-1)),
            Err(CartError::Core(CoreError::Validation(ValidationError::MustBeNonNegative { .. })))
        ));

        assert_eq!(store.state(), before);
    }

    #[test]
    fn test_update_to_zero_removes() {
        let store = CartStore::new();
        let id = store.add_item(product("acai", 1800), 2, None).unwrap();

        assert!(store.update_item_quantity(&id, 0).unwrap());
        assert!(store.state().is_empty());
        assert!(store.get_item(&id).is_none());
    }

    #[test]
    fn test_coupon_invalidated_notice() {
        let store = CartStore::new();
        let mut notices = store.subscribe_notices();

        let a = store.add_item(product("a", 2500), 1, None).unwrap();
        store.add_item(product("b", 2500), 1, None).unwrap();
        store.apply_coupon(ten_percent_over_30());
        assert_eq!(store.state().discount.cents(), 500);

        store.remove_item(&a);

        let state = store.state();
        assert!(state.applied_coupon.is_none());
        assert!(state.discount.is_zero());
        assert_eq!(
            notices.try_recv().unwrap(),
            CartNotice::CouponInvalidated {
                code: "DEZ".to_string(),
                min_order_value: Money::from_cents(3000),
                subtotal: Money::from_cents(2500),
            }
        );
    }

    #[test]
    fn test_clear_cart_supersedes_requests() {
        let store = CartStore::new();
        store.add_item(product("a", 5000), 1, None).unwrap();

        let (coupon_token, _) = store.issue_coupon_token();
        let delivery_token = store.issue_delivery_token();
        store.clear_cart();

        assert!(!store.coupon_token_is_current(coupon_token));
        assert!(!store.apply_coupon_if_current(coupon_token, ten_percent_over_30()));
        assert!(!store
            .set_delivery_fee_if_current(delivery_token, Money::from_cents(500))
            .unwrap());
        assert!(store.state().delivery_fee.is_zero());
    }

    #[test]
    fn test_coupon_token_tracks_content() {
        let store = CartStore::new();
        let id = store.add_item(product("a", 5000), 1, None).unwrap();

        let (token, state) = store.issue_coupon_token();
        assert_eq!(state.subtotal.cents(), 5000);

        store.update_item_quantity(&id, 2).unwrap();
        assert!(!store.apply_coupon_if_current(token, ten_percent_over_30()));
        assert!(store.state().applied_coupon.is_none());

        let (token, _) = store.issue_coupon_token();
        assert!(store.apply_coupon_if_current(token, ten_percent_over_30()));
        assert_eq!(store.state().discount.cents(), 1000);
    }

    #[test]
    fn test_direct_fee_supersedes_lookup() {
        let store = CartStore::new();
        let token = store.issue_delivery_token();
        store.set_delivery_fee(Money::from_cents(700)).unwrap();

        assert!(!store
            .set_delivery_fee_if_current(token, Money::from_cents(300))
            .unwrap());
        assert_eq!(store.state().delivery_fee.cents(), 700);
    }

    #[test]
    fn test_drop_unconfirmed_emits_notice() {
        let cart = Cart::restored(Vec::new(), Some(ten_percent_over_30()), Money::zero());
        let store = CartStore::from_cart(cart);
        let mut notices = store.subscribe_notices();

        let (token, _) = store.issue_coupon_token();
        let dropped = store.drop_unconfirmed_if_current(token, "Cupom expirado");

        assert_eq!(dropped.map(|c| c.code), Some("DEZ".to_string()));
        assert!(store.state().unconfirmed_coupon.is_none());
        assert_eq!(
            notices.try_recv().unwrap(),
            CartNotice::RestoredCouponDropped {
                code: "DEZ".to_string(),
                reason: "Cupom expirado".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_changes_are_persisted() {
        let storage = Arc::new(MemoryCartStorage::new());
        let store = CartStore::with_persistence(Cart::new(), storage.clone(), "cart");

        store.add_item(product("acai", 1800), 2, None).unwrap();
        store.set_delivery_fee(Money::from_cents(500)).unwrap();
        store.flush().await;

        let saved = PersistedCart::decode(&storage.get("cart").unwrap()).unwrap();
        assert_eq!(saved.items.len(), 1);
        assert_eq!(saved.delivery_fee.cents(), 500);

        let reopened = CartStore::open(storage, "cart").await;
        assert_eq!(reopened.state().total.cents(), 4100);
    }
}

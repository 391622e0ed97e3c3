//! # Cart State Machine
//!
//! The cart as a pure value: every mutation is a synchronous transition
//! that leaves the cart consistent, with all derived fields recomputed.
//!
//! ## Cart Operations Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Cart Transitions                                     │
//! │                                                                         │
//! │  Operation                    Items change?   Coupon threshold check    │
//! │  ─────────                    ─────────────   ──────────────────────    │
//! │  add_item ──────────────────► push            yes                       │
//! │  remove_item ───────────────► retain          yes                       │
//! │  update_item_quantity ──────► set / remove    yes                       │
//! │  replace_item_customization ► swap in place   yes                       │
//! │  clear ─────────────────────► clear           (coupon dropped)          │
//! │  apply_coupon / remove ─────► -               -                         │
//! │  set_delivery_fee ──────────► -               -                         │
//! │                                                                         │
//! │  Every transition ends in recompute(): totals come from                 │
//! │  pricing::recompute_totals and nothing else.                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Invariants
//! - Line ids are unique (UUID v4 per line, not per product)
//! - Every line has `1 <= quantity <= MAX_ITEM_QUANTITY`
//! - At most `MAX_CART_LINES` lines
//! - An applied coupon always meets its minimum order value
//!
//! Publication, persistence and network requests live in `acai-cart`; this
//! type knows nothing about them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ts_rs::TS;
use uuid::Uuid;

use crate::error::{CoreError, CoreResult};
use crate::money::Money;
use crate::pricing;
use crate::types::{AppliedCoupon, CartItem, CartTotals, Customization, Product};
use crate::validation::{validate_customization, validate_delivery_fee};
use crate::{MAX_CART_LINES, MAX_ITEM_QUANTITY};

// =============================================================================
// Published State
// =============================================================================

/// Snapshot of the cart handed to the UI after every transition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CartState {
    pub items: Vec<CartItem>,
    pub subtotal: Money,
    pub discount: Money,

    /// Fee as resolved for the buyer's neighborhood (shown even when waived).
    pub delivery_fee: Money,

    /// Fee as charged: zero under a free-delivery coupon.
    pub effective_delivery_fee: Money,

    pub total: Money,
    pub item_count: i64,
    pub applied_coupon: Option<AppliedCoupon>,

    /// Coupon carried over from a previous session, not yet re-validated.
    pub unconfirmed_coupon: Option<AppliedCoupon>,

    pub content_revision: u64,

    #[ts(as = "String")]
    pub updated_at: DateTime<Utc>,
}

impl CartState {
    /// Returns true if the cart has no lines.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Looks up a line by id.
    pub fn item(&self, line_id: &str) -> Option<&CartItem> {
        self.items.iter().find(|i| i.id == line_id)
    }

    /// Product ids of the lines, in cart order.
    pub fn product_ids(&self) -> Vec<String> {
        self.items.iter().map(|i| i.product.id.clone()).collect()
    }
}

/// Things the buyer should be told that are not errors.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CartNotice {
    /// The coupon was removed because the subtotal fell below its minimum.
    #[serde(rename_all = "camelCase")]
    CouponInvalidated {
        code: String,
        min_order_value: Money,
        subtotal: Money,
    },

    /// A coupon restored from a previous session failed re-validation.
    #[serde(rename_all = "camelCase")]
    RestoredCouponDropped { code: String, reason: String },

    /// Saving the cart failed; the in-memory cart is unaffected.
    PersistenceFailed { reason: String },
}

// =============================================================================
// Cart
// =============================================================================

/// The cart and its derived totals.
#[derive(Debug, Clone)]
pub struct Cart {
    items: Vec<CartItem>,
    coupon: Option<AppliedCoupon>,
    unconfirmed_coupon: Option<AppliedCoupon>,
    delivery_fee: Money,
    totals: CartTotals,
    content_revision: u64,
    updated_at: DateTime<Utc>,
    notices: Vec<CartNotice>,
}

impl Default for Cart {
    fn default() -> Self {
        Self::new()
    }
}

impl Cart {
    /// Creates an empty cart.
    pub fn new() -> Self {
        Cart {
            items: Vec::new(),
            coupon: None,
            unconfirmed_coupon: None,
            delivery_fee: Money::zero(),
            totals: CartTotals::default(),
            content_revision: 0,
            updated_at: Utc::now(),
            notices: Vec::new(),
        }
    }

    /// Rebuilds a cart from a saved session.
    ///
    /// Lines are re-priced from their own snapshots; lines with a quantity
    /// outside `1..=MAX_ITEM_QUANTITY` and lines past `MAX_CART_LINES` are
    /// dropped. The coupon comes back unconfirmed and grants nothing until
    /// it is validated again.
    pub fn restored(items: Vec<CartItem>, coupon: Option<AppliedCoupon>, delivery_fee: Money) -> Self {
        let items = items
            .into_iter()
            .filter(|item| (1..=MAX_ITEM_QUANTITY).contains(&item.quantity))
            .take(MAX_CART_LINES)
            .map(CartItem::repriced)
            .collect();

        let mut cart = Cart {
            items,
            unconfirmed_coupon: coupon,
            delivery_fee: delivery_fee.non_negative(),
            ..Cart::new()
        };
        cart.recompute();
        cart
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    pub fn items(&self) -> &[CartItem] {
        &self.items
    }

    pub fn get_item(&self, line_id: &str) -> Option<&CartItem> {
        self.items.iter().find(|i| i.id == line_id)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn applied_coupon(&self) -> Option<&AppliedCoupon> {
        self.coupon.as_ref()
    }

    pub fn unconfirmed_coupon(&self) -> Option<&AppliedCoupon> {
        self.unconfirmed_coupon.as_ref()
    }

    /// Resolved delivery fee (before any free-delivery waiver).
    pub fn delivery_fee(&self) -> Money {
        self.delivery_fee
    }

    pub fn totals(&self) -> CartTotals {
        self.totals
    }

    /// Counter bumped whenever the set of lines or a quantity changes.
    pub fn content_revision(&self) -> u64 {
        self.content_revision
    }

    /// Builds the published snapshot.
    pub fn state(&self) -> CartState {
        CartState {
            items: self.items.clone(),
            subtotal: self.totals.subtotal,
            discount: self.totals.discount,
            delivery_fee: self.delivery_fee,
            effective_delivery_fee: self.totals.delivery_fee,
            total: self.totals.total,
            item_count: self.totals.item_count,
            applied_coupon: self.coupon.clone(),
            unconfirmed_coupon: self.unconfirmed_coupon.clone(),
            content_revision: self.content_revision,
            updated_at: self.updated_at,
        }
    }

    /// Takes the notices raised since the last call.
    pub fn drain_notices(&mut self) -> Vec<CartNotice> {
        std::mem::take(&mut self.notices)
    }

    // -------------------------------------------------------------------------
    // Item Transitions
    // -------------------------------------------------------------------------

    /// Adds a new line and returns its id.
    ///
    /// Adding the same product twice creates two lines: customizations
    /// differ per line, so lines are never merged.
    pub fn add_item(
        &mut self,
        product: Product,
        quantity: i64,
        customization: Option<Customization>,
    ) -> CoreResult<String> {
        check_quantity(quantity)?;

        if self.items.len() >= MAX_CART_LINES {
            return Err(CoreError::CartTooLarge { max: MAX_CART_LINES });
        }

        if let Some(custom) = customization.as_ref() {
            validate_customization(&product, custom)?;
        }

        let line_id = Uuid::new_v4().to_string();
        self.items
            .push(CartItem::new(line_id.clone(), product, quantity, customization));
        self.content_changed();
        Ok(line_id)
    }

    /// Removes a line. Returns false (and changes nothing) if it is absent.
    pub fn remove_item(&mut self, line_id: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|i| i.id != line_id);

        if self.items.len() == before {
            return false;
        }
        self.content_changed();
        true
    }

    /// Sets a line's quantity.
    ///
    /// ## Behavior
    /// - `quantity <= 0`: removes the line
    /// - `quantity > MAX_ITEM_QUANTITY`: `QuantityTooLarge`, nothing changes
    /// - unknown line id: no-op
    ///
    /// Returns whether the cart changed.
    pub fn update_item_quantity(&mut self, line_id: &str, quantity: i64) -> CoreResult<bool> {
        if quantity <= 0 {
            return Ok(self.remove_item(line_id));
        }

        if quantity > MAX_ITEM_QUANTITY {
            return Err(CoreError::QuantityTooLarge {
                requested: quantity,
                max: MAX_ITEM_QUANTITY,
            });
        }

        let Some(index) = self.position(line_id) else {
            return Ok(false);
        };
        if self.items[index].quantity == quantity {
            return Ok(false);
        }

        let updated = self.items[index].with_quantity(quantity);
        self.items[index] = updated;
        self.content_changed();
        Ok(true)
    }

    /// Swaps a line's customization: remove + add, in place, in one step.
    ///
    /// The line gets a new id and keeps its position and quantity. Returns
    /// `None` if the line does not exist.
    pub fn replace_item_customization(
        &mut self,
        line_id: &str,
        customization: Option<Customization>,
    ) -> CoreResult<Option<String>> {
        let Some(index) = self.position(line_id) else {
            return Ok(None);
        };

        let old = &self.items[index];
        if let Some(custom) = customization.as_ref() {
            validate_customization(&old.product, custom)?;
        }

        let new_id = Uuid::new_v4().to_string();
        let replacement = CartItem::new(new_id.clone(), old.product.clone(), old.quantity, customization);
        self.items[index] = replacement;
        self.content_changed();
        Ok(Some(new_id))
    }

    /// Empties the cart, drops both coupons and resets the delivery fee.
    pub fn clear(&mut self) {
        self.items.clear();
        self.coupon = None;
        self.unconfirmed_coupon = None;
        self.delivery_fee = Money::zero();
        self.content_revision += 1;
        self.recompute();
    }

    // -------------------------------------------------------------------------
    // Coupon & Delivery Transitions
    // -------------------------------------------------------------------------

    /// Installs a validated coupon, replacing any previous one.
    ///
    /// Also settles any unconfirmed coupon: the buyer now has exactly one.
    pub fn apply_coupon(&mut self, coupon: AppliedCoupon) {
        self.coupon = Some(coupon);
        self.unconfirmed_coupon = None;
        self.recompute();
    }

    /// Removes the applied coupon. Returns false if there was none.
    pub fn remove_coupon(&mut self) -> bool {
        if self.coupon.take().is_none() {
            return false;
        }
        self.recompute();
        true
    }

    /// Drops the coupon restored from a previous session.
    pub fn drop_unconfirmed_coupon(&mut self) -> Option<AppliedCoupon> {
        let dropped = self.unconfirmed_coupon.take();
        if dropped.is_some() {
            self.recompute();
        }
        dropped
    }

    /// Stores the resolved delivery fee.
    pub fn set_delivery_fee(&mut self, fee: Money) -> CoreResult<()> {
        validate_delivery_fee(fee)?;
        self.delivery_fee = fee;
        self.recompute();
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Internals
    // -------------------------------------------------------------------------

    fn position(&self, line_id: &str) -> Option<usize> {
        self.items.iter().position(|i| i.id == line_id)
    }

    fn content_changed(&mut self) {
        self.content_revision += 1;
        self.recompute();
        self.enforce_coupon_threshold();
    }

    /// Drops an applied coupon whose minimum is no longer met.
    fn enforce_coupon_threshold(&mut self) {
        let Some(coupon) = self.coupon.as_ref() else {
            return;
        };
        if pricing::coupon_threshold_met(coupon, self.totals.subtotal) {
            return;
        }

        if let Some(coupon) = self.coupon.take() {
            self.notices.push(CartNotice::CouponInvalidated {
                code: coupon.code,
                min_order_value: coupon.min_order_value.unwrap_or_default(),
                subtotal: self.totals.subtotal,
            });
            self.recompute();
        }
    }

    fn recompute(&mut self) {
        self.totals = pricing::recompute_totals(&self.items, self.coupon.as_ref(), self.delivery_fee);
        self.updated_at = Utc::now();
    }
}

fn check_quantity(quantity: i64) -> CoreResult<()> {
    if quantity < 1 {
        return Err(CoreError::InvalidQuantity { quantity });
    }
    if quantity > MAX_ITEM_QUANTITY {
        return Err(CoreError::QuantityTooLarge {
            requested: quantity,
            max: MAX_ITEM_QUANTITY,
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

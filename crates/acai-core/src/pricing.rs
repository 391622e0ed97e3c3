//! # Pricing Engine
//!
//! Pure, deterministic pricing for cart lines and cart totals. No I/O, no
//! state: the cart calls these after every transition and replaces all
//! derived fields with the result.
//!
//! ## Calculation Pipeline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Pricing Pipeline                                │
//! │                                                                         │
//! │  Per line                                                              │
//! │  ────────                                                              │
//! │  base     = size price  (fallback: product price)                      │
//! │  toppings = Σ unit_price × qty   over NON-free toppings                │
//! │  line     = (base + toppings) × quantity          (≥ 0)                │
//! │                                                                         │
//! │  Per cart                                                              │
//! │  ────────                                                              │
//! │  subtotal = Σ line                                                     │
//! │  discount = coupon rule, 0 below min order, clamped to [0, subtotal]   │
//! │  delivery = resolved fee, or 0 under a free-delivery coupon            │
//! │  total    = max(subtotal - discount + delivery, 0)                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! All amounts are integer centavos, so sums are exact. The only fractional
//! step is the percentage discount, rounded half-up by [`Money::portion`].

use crate::money::Money;
use crate::types::{AppliedCoupon, CartItem, CartTotals, CouponKind, Customization, Product};

// =============================================================================
// Line Pricing
// =============================================================================

/// Base price for the selected size.
///
/// Falls back to the product price when no size is selected or the product
/// has no variant with that id.
pub fn base_price(product: &Product, customization: Option<&Customization>) -> Money {
    customization
        .and_then(|c| c.size_id.as_deref())
        .and_then(|size_id| product.size(size_id))
        .map_or(product.price, |size| size.price)
}

/// Sum of paid toppings for one unit of the item.
pub fn toppings_charge(customization: Option<&Customization>) -> Money {
    customization
        .map(|c| c.toppings.iter().map(|t| t.charge()).sum())
        .unwrap_or_default()
}

/// Price of one unit of the item: base plus paid toppings.
pub fn unit_price(product: &Product, customization: Option<&Customization>) -> Money {
    (base_price(product, customization) + toppings_charge(customization)).non_negative()
}

/// Price of a whole cart line.
///
/// ## Example
/// ```rust
/// use acai_core::money::Money;
/// use acai_core::pricing::price_for_item;
/// use acai_core::types::Product;
///
/// let product = Product::new("acai-300", "Açaí 300ml", Money::from_cents(1800));
/// assert_eq!(price_for_item(&product, 2, None).cents(), 3600);
/// ```
pub fn price_for_item(product: &Product, quantity: i64, customization: Option<&Customization>) -> Money {
    unit_price(product, customization)
        .multiply_quantity(quantity.max(0))
        .non_negative()
}

// =============================================================================
// Coupon Rules
// =============================================================================

/// Returns true if the subtotal reaches the coupon's minimum order value.
pub fn coupon_threshold_met(coupon: &AppliedCoupon, subtotal: Money) -> bool {
    coupon.min_order_value.map_or(true, |min| subtotal >= min)
}

/// Discount on goods granted by a coupon for a given subtotal.
///
/// | Kind          | Discount                                        |
/// |---------------|-------------------------------------------------|
/// | percentage    | `subtotal × rate`, capped by `max_discount`     |
/// | fixed         | `min(amount, subtotal)`                         |
/// | free-delivery | 0 (the fee is waived in [`recompute_totals`])   |
///
/// Always within `[0, subtotal]`.
pub fn coupon_discount(coupon: Option<&AppliedCoupon>, subtotal: Money) -> Money {
    let Some(coupon) = coupon else {
        return Money::zero();
    };

    if !coupon_threshold_met(coupon, subtotal) {
        return Money::zero();
    }

    let raw = match coupon.kind {
        CouponKind::Percentage { rate } => subtotal.portion(rate),
        CouponKind::Fixed { amount } => amount,
        CouponKind::FreeDelivery => Money::zero(),
    };

    let capped = match coupon.max_discount {
        Some(cap) => raw.min(cap),
        None => raw,
    };

    capped.non_negative().min(subtotal.non_negative())
}

// =============================================================================
// Cart Totals
// =============================================================================

/// Recomputes every derived total from scratch.
///
/// This is the only place totals are produced; nothing patches them
/// incrementally.
///
/// ## Example
/// ```rust
/// use acai_core::money::Money;
/// use acai_core::pricing::recompute_totals;
/// use acai_core::types::{AppliedCoupon, CartItem, CouponKind, DiscountRate, Product};
///
/// let item = CartItem::new("l1", Product::new("p", "Açaí", Money::from_cents(2500)), 2, None);
/// let coupon = AppliedCoupon::new("DEZ", CouponKind::Percentage { rate: DiscountRate::from_bps(1000) })
///     .with_min_order(Money::from_cents(3000));
///
/// let totals = recompute_totals(&[item], Some(&coupon), Money::zero());
/// assert_eq!(totals.discount.cents(), 500);
/// assert_eq!(totals.total.cents(), 4500);
/// ```
pub fn recompute_totals(
    items: &[CartItem],
    coupon: Option<&AppliedCoupon>,
    delivery_fee: Money,
) -> CartTotals {
    let subtotal: Money = items.iter().map(|item| item.total_price).sum();
    let item_count: i64 = items.iter().map(|item| item.quantity).sum();

    let discount = coupon_discount(coupon, subtotal);

    let delivery_fee = if coupon.is_some_and(AppliedCoupon::waives_delivery) {
        Money::zero()
    } else {
        delivery_fee.non_negative()
    };

    let total = (subtotal - discount + delivery_fee).non_negative();

    CartTotals {
        subtotal,
        discount,
        delivery_fee,
        total,
        item_count,
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

//! # Domain Types
//!
//! Core domain types used throughout the cart engine.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │    Product      │   │    CartItem     │   │  AppliedCoupon  │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id             │◄──│  product (copy) │   │  code           │       │
//! │  │  price          │   │  quantity       │   │  kind ──────────┼──┐    │
//! │  │  sizes[]        │   │  customization  │   │  min_order      │  │    │
//! │  └─────────────────┘   │  total_price    │   └─────────────────┘  │    │
//! │                        └────────┬────────┘                        │    │
//! │                                 │                                 ▼    │
//! │                        ┌────────┴────────┐   ┌─────────────────────┐   │
//! │                        │  Customization  │   │    CouponKind       │   │
//! │                        │  ─────────────  │   │  Percentage{rate}   │   │
//! │                        │  size_id        │   │  Fixed{amount}      │   │
//! │                        │  toppings[]     │   │  FreeDelivery       │   │
//! │                        │  note, cutlery  │   └─────────────────────┘   │
//! │                        └─────────────────┘                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Snapshot Pattern
//! A cart line owns a copy of the product taken when it was added. Catalog
//! price changes after that never reach an existing line; the backend
//! re-prices authoritatively at order placement.

use std::collections::BTreeSet;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::pricing;

// =============================================================================
// Discount Rate
// =============================================================================

/// Percentage discount represented in basis points (bps).
///
/// ## Why Basis Points?
/// 1 basis point = 0.01%, so 1000 bps = 10% and 1250 bps = 12.5%.
/// Integer storage keeps the pricing engine free of floats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DiscountRate(u32);

impl DiscountRate {
    /// 100%, the largest meaningful rate.
    pub const FULL: DiscountRate = DiscountRate(10_000);

    /// Creates a rate from basis points.
    #[inline]
    pub const fn from_bps(bps: u32) -> Self {
        DiscountRate(bps)
    }

    /// Creates a rate from a decimal percentage (`10` = 10%).
    ///
    /// Returns `None` for negative rates or rates above 100%.
    ///
    /// ## Example
    /// ```rust
    /// use acai_core::types::DiscountRate;
    /// use rust_decimal::Decimal;
    ///
    /// let rate = DiscountRate::from_percent(Decimal::new(125, 1)).unwrap(); // 12.5%
    /// assert_eq!(rate.bps(), 1250);
    /// ```
    pub fn from_percent(percent: Decimal) -> Option<Self> {
        if percent.is_sign_negative() && !percent.is_zero() {
            return None;
        }
        let mut bps = (percent * Decimal::ONE_HUNDRED)
            .round_dp_with_strategy(0, rust_decimal::RoundingStrategy::MidpointAwayFromZero);
        bps.rescale(0);
        let bps = u32::try_from(bps.mantissa()).ok()?;
        (bps <= Self::FULL.0).then_some(DiscountRate(bps))
    }

    /// Returns the rate in basis points.
    #[inline]
    pub const fn bps(&self) -> u32 {
        self.0
    }

    /// Returns the rate as a decimal percentage (for wire payloads).
    pub fn as_percent(&self) -> Decimal {
        Decimal::new(i64::from(self.0), 2)
    }
}

// =============================================================================
// Product
// =============================================================================

/// A size variant with its own price (e.g. 300ml / 500ml / 700ml cups).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SizeVariant {
    pub id: String,
    pub name: String,
    pub price: Money,
}

/// A catalog product, as snapshotted into a cart line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    /// Catalog identifier.
    pub id: String,

    /// Display name.
    pub name: String,

    /// Base price, used when the product has no size variants.
    pub price: Money,

    /// Catalog category (e.g. "monte-seu", "bebidas").
    #[serde(default)]
    pub category: Option<String>,

    /// Size variants, in display order. Empty for single-size products.
    #[serde(default)]
    pub sizes: Vec<SizeVariant>,
}

impl Product {
    /// Creates a single-size product.
    pub fn new(id: impl Into<String>, name: impl Into<String>, price: Money) -> Self {
        Product {
            id: id.into(),
            name: name.into(),
            price,
            category: None,
            sizes: Vec::new(),
        }
    }

    /// Adds a size variant (builder style).
    pub fn with_size(mut self, id: impl Into<String>, name: impl Into<String>, price: Money) -> Self {
        self.sizes.push(SizeVariant {
            id: id.into(),
            name: name.into(),
            price,
        });
        self
    }

    /// Looks up a size variant by id.
    pub fn size(&self, size_id: &str) -> Option<&SizeVariant> {
        self.sizes.iter().find(|s| s.id == size_id)
    }

    /// Returns true if the product is sold in several sizes.
    #[inline]
    pub fn has_sizes(&self) -> bool {
        !self.sizes.is_empty()
    }
}

// =============================================================================
// Toppings & Customization
// =============================================================================

/// A topping chosen for one cart line.
///
/// ## Invariant
/// A topping with `is_free = true` contributes nothing to the line price,
/// whatever its `unit_price` says. The unit price is kept so the UI can show
/// "R$ 5,00 → grátis".
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct SelectedTopping {
    pub id: String,
    pub name: String,
    pub unit_price: Money,
    pub quantity: u32,
    pub is_free: bool,
    /// Catalog id this free instance discounts, when `id` is a derived id.
    #[serde(default)]
    pub original_id: Option<String>,
}

impl SelectedTopping {
    /// A paid topping.
    pub fn paid(id: impl Into<String>, name: impl Into<String>, unit_price: Money, quantity: u32) -> Self {
        SelectedTopping {
            id: id.into(),
            name: name.into(),
            unit_price,
            quantity,
            is_free: false,
            original_id: None,
        }
    }

    /// A free topping granted by an allowance.
    pub fn free(id: impl Into<String>, name: impl Into<String>, unit_price: Money, quantity: u32) -> Self {
        SelectedTopping {
            is_free: true,
            ..SelectedTopping::paid(id, name, unit_price, quantity)
        }
    }

    /// Catalog id of the topping (the original id for free instances).
    pub fn catalog_id(&self) -> &str {
        self.original_id.as_deref().unwrap_or(&self.id)
    }

    /// Price this topping adds to one unit of the item.
    pub fn charge(&self) -> Money {
        if self.is_free {
            Money::zero()
        } else {
            self.unit_price * self.quantity
        }
    }
}

/// Per-line customization. Immutable once the line exists.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct Customization {
    #[serde(default)]
    pub size_id: Option<String>,

    #[serde(default)]
    pub toppings: Vec<SelectedTopping>,

    #[serde(default)]
    pub wants_cutlery: bool,

    /// Free-text note for the kitchen.
    #[serde(default)]
    pub note: Option<String>,

    /// Categories the buyer explicitly declined.
    #[serde(default)]
    pub skipped_categories: BTreeSet<String>,
}

// =============================================================================
// Cart Item
// =============================================================================

/// One cart line: a product snapshot, its customization and quantity.
///
/// `unit_price` and `total_price` are derived. They are computed by
/// [`CartItem::new`] and [`CartItem::with_quantity`] and never set directly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    /// Line id, unique per cart line (not per product).
    pub id: String,

    /// Product snapshot taken at add time.
    pub product: Product,

    pub quantity: i64,

    #[serde(default)]
    pub customization: Option<Customization>,

    /// Price of one unit including paid toppings.
    pub unit_price: Money,

    /// `unit_price × quantity`.
    pub total_price: Money,
}

impl CartItem {
    /// Builds a line and prices it.
    pub fn new(
        id: impl Into<String>,
        product: Product,
        quantity: i64,
        customization: Option<Customization>,
    ) -> Self {
        let unit_price = pricing::unit_price(&product, customization.as_ref());
        let total_price = pricing::price_for_item(&product, quantity, customization.as_ref());
        CartItem {
            id: id.into(),
            product,
            quantity,
            customization,
            unit_price,
            total_price,
        }
    }

    /// Returns a copy with a new quantity and re-derived price.
    pub fn with_quantity(&self, quantity: i64) -> Self {
        CartItem::new(
            self.id.clone(),
            self.product.clone(),
            quantity,
            self.customization.clone(),
        )
    }

    /// Re-derives the price from the line's own data.
    pub fn repriced(self) -> Self {
        CartItem::new(self.id, self.product, self.quantity, self.customization)
    }
}

// =============================================================================
// Coupons
// =============================================================================

/// How a coupon discounts the order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum CouponKind {
    /// Percentage off the subtotal.
    Percentage { rate: DiscountRate },
    /// Fixed amount off the subtotal.
    Fixed { amount: Money },
    /// Delivery fee waived; goods are not discounted.
    FreeDelivery,
}

/// A validated coupon installed on the cart.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct AppliedCoupon {
    /// Normalized (uppercase) code.
    pub code: String,

    pub kind: CouponKind,

    /// Subtotal the cart must reach for the coupon to apply.
    #[serde(default)]
    pub min_order_value: Option<Money>,

    /// Cap on the discount a percentage coupon may grant.
    #[serde(default)]
    pub max_discount: Option<Money>,
}

impl AppliedCoupon {
    /// Creates a coupon without threshold or cap.
    pub fn new(code: impl Into<String>, kind: CouponKind) -> Self {
        AppliedCoupon {
            code: code.into(),
            kind,
            min_order_value: None,
            max_discount: None,
        }
    }

    /// Sets the minimum order value (builder style).
    pub fn with_min_order(mut self, min: Money) -> Self {
        self.min_order_value = Some(min);
        self
    }

    /// Sets the discount cap (builder style).
    pub fn with_max_discount(mut self, max: Money) -> Self {
        self.max_discount = Some(max);
        self
    }

    /// Returns true for delivery-fee waivers.
    #[inline]
    pub fn waives_delivery(&self) -> bool {
        matches!(self.kind, CouponKind::FreeDelivery)
    }
}

// =============================================================================
// Totals
// =============================================================================

/// Derived monetary totals for a cart.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
#[serde(rename_all = "camelCase")]
pub struct CartTotals {
    pub subtotal: Money,
    pub discount: Money,
    /// Delivery fee as charged (zero under a free-delivery coupon).
    pub delivery_fee: Money,
    pub total: Money,
    pub item_count: i64,
}

// =============================================================================
// Unit Tests
// =============================================================================

//! # Money Module
//!
//! Provides the `Money` type for handling monetary values safely.
//!
//! ## Why Integer Money?
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  THE FLOATING POINT PROBLEM                                             │
//! │                                                                         │
//! │  In JavaScript/floating point:                                          │
//! │    18.9 * 3 = 56.699999999999996  ❌ WRONG!                             │
//! │                                                                         │
//! │  A cart that re-sums floats after every edit drifts by fractions of    │
//! │  a centavo and stops reconciling with the backend total.               │
//! │                                                                         │
//! │  OUR SOLUTION: Integer Centavos                                         │
//! │    1890 centavos × 3 = 5670 centavos, exactly, every time              │
//! │    Fractions only appear when a percentage is applied, and they are    │
//! │    rounded half-up to the centavo right there.                         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```rust
//! use acai_core::money::Money;
//!
//! // Create from centavos (preferred)
//! let price = Money::from_cents(1800); // R$ 18,00
//!
//! // Arithmetic operations
//! let doubled = price * 2_i64;                 // R$ 36,00
//! let total = price + Money::from_cents(500);  // R$ 23,00
//! assert_eq!(doubled.cents(), 3600);
//! assert_eq!(total.cents(), 2300);
//! ```
//!
//! Decimal amounts coming from the storefront API enter through
//! [`Money::from_decimal`] and nowhere else.
//!
//! Arithmetic saturates at the `i64` bounds instead of panicking.

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::iter::Sum;
use std::ops::{Add, AddAssign, Mul, Sub, SubAssign};
use ts_rs::TS;

use crate::types::DiscountRate;

// =============================================================================
// Money Type
// =============================================================================

/// A monetary value in centavos (the minor unit of BRL).
///
/// ## Design Decisions
/// - **i64 (signed)**: intermediate results may go negative
///   (`subtotal - discount`) before the engine clamps them
/// - **Single field tuple struct**: zero-cost abstraction over i64
/// - **Serialized as centavos**: the persisted cart and the published state
///   never carry decimal amounts
///
/// ## Where Money Flows
/// ```text
/// Product.price ──► price_for_item ──► CartItem.total_price
///                                           │
///                                           ▼
///              Σ total_price = subtotal ──► discount ──► total
///                                                          ▲
///                          resolved delivery fee ──────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct Money(i64);

impl Money {
    /// Creates a Money value from centavos.
    ///
    /// ## Example
    /// ```rust
    /// use acai_core::money::Money;
    ///
    /// let price = Money::from_cents(1890); // R$ 18,90
    /// assert_eq!(price.cents(), 1890);
    /// ```
    #[inline]
    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    /// Creates a Money value from reais and centavos.
    ///
    /// For negative amounts only the major unit should be negative:
    /// `from_reais(-5, 50)` is -R$ 5,50.
    #[inline]
    pub const fn from_reais(reais: i64, centavos: i64) -> Self {
        if reais < 0 {
            Money(reais * 100 - centavos)
        } else {
            Money(reais * 100 + centavos)
        }
    }

    /// Converts a decimal amount in reais into Money.
    ///
    /// Rounds half-up (midpoint away from zero) to the centavo. Returns
    /// `None` when the amount does not fit in an `i64` of centavos.
    ///
    /// ## Example
    /// ```rust
    /// use acai_core::money::Money;
    /// use rust_decimal::Decimal;
    ///
    /// let fee = Money::from_decimal(Decimal::new(5005, 3)).unwrap(); // 5.005
    /// assert_eq!(fee.cents(), 501);
    /// ```
    pub fn from_decimal(amount: Decimal) -> Option<Self> {
        let mut rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        rounded.rescale(2);
        i64::try_from(rounded.mantissa()).ok().map(Money)
    }

    /// Returns the amount in reais as a decimal (for wire payloads).
    #[inline]
    pub fn to_decimal(&self) -> Decimal {
        Decimal::new(self.0, 2)
    }

    /// Returns the value in centavos.
    #[inline]
    pub const fn cents(&self) -> i64 {
        self.0
    }

    /// Returns the whole-reais portion.
    #[inline]
    pub const fn reais(&self) -> i64 {
        self.0 / 100
    }

    /// Returns the centavos portion (always 0-99).
    #[inline]
    pub const fn centavos_part(&self) -> i64 {
        (self.0 % 100).abs()
    }

    /// Returns zero money value.
    #[inline]
    pub const fn zero() -> Self {
        Money(0)
    }

    /// Checks if the value is zero.
    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Checks if the value is positive (greater than zero).
    #[inline]
    pub const fn is_positive(&self) -> bool {
        self.0 > 0
    }

    /// Checks if the value is negative (less than zero).
    #[inline]
    pub const fn is_negative(&self) -> bool {
        self.0 < 0
    }

    /// Clamps negative values to zero.
    #[inline]
    pub const fn non_negative(self) -> Self {
        if self.0 < 0 {
            Money(0)
        } else {
            self
        }
    }

    /// Returns the portion of this amount covered by a discount rate.
    ///
    /// ## Rounding
    /// Round half-up on the centavo, done in integer math:
    /// `(centavos × bps + 5000) / 10000`. Negative amounts round half away
    /// from zero so the function is symmetric.
    ///
    /// ## Example
    /// ```rust
    /// use acai_core::money::Money;
    /// use acai_core::types::DiscountRate;
    ///
    /// let subtotal = Money::from_cents(5000);   // R$ 50,00
    /// let rate = DiscountRate::from_bps(1000);  // 10%
    /// assert_eq!(subtotal.portion(rate).cents(), 500);
    ///
    /// // R$ 0,05 at 10% = 0.5 centavo → rounds up to 1
    /// assert_eq!(Money::from_cents(5).portion(rate).cents(), 1);
    /// ```
    pub fn portion(&self, rate: DiscountRate) -> Money {
        // i128 keeps centavos × bps from overflowing on absurd carts
        let scaled = self.0 as i128 * rate.bps() as i128;
        let rounded = if scaled >= 0 {
            (scaled + 5000) / 10000
        } else {
            (scaled - 5000) / 10000
        };
        Money(rounded as i64)
    }

    /// Multiplies money by a quantity (saturating).
    #[inline]
    pub const fn multiply_quantity(&self, qty: i64) -> Self {
        Money(self.0.saturating_mul(qty))
    }
}

// =============================================================================
// Trait Implementations
// =============================================================================

/// Shows money the way the storefront prints it: `R$ 36,00`.
impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        write!(
            f,
            "{}R$ {},{:02}",
            sign,
            self.reais().abs(),
            self.centavos_part()
        )
    }
}

impl Default for Money {
    fn default() -> Self {
        Money::zero()
    }
}

impl Add for Money {
    type Output = Self;

    #[inline]
    fn add(self, other: Self) -> Self {
        Money(self.0.saturating_add(other.0))
    }
}

impl AddAssign for Money {
    #[inline]
    fn add_assign(&mut self, other: Self) {
        self.0 = self.0.saturating_add(other.0);
    }
}

impl Sub for Money {
    type Output = Self;

    #[inline]
    fn sub(self, other: Self) -> Self {
        Money(self.0.saturating_sub(other.0))
    }
}

impl SubAssign for Money {
    #[inline]
    fn sub_assign(&mut self, other: Self) {
        self.0 = self.0.saturating_sub(other.0);
    }
}

impl Mul<i64> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: i64) -> Self {
        self.multiply_quantity(qty)
    }
}

impl Mul<u32> for Money {
    type Output = Self;

    #[inline]
    fn mul(self, qty: u32) -> Self {
        self.multiply_quantity(i64::from(qty))
    }
}

impl Sum for Money {
    fn sum<I: Iterator<Item = Money>>(iter: I) -> Self {
        iter.fold(Money::zero(), Add::add)
    }
}

impl<'a> Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Money>>(iter: I) -> Self {
        iter.copied().sum()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

//! # acai-core: Pure Cart Logic for the Açaí Storefront
//!
//! Everything the cart computes, with zero I/O. The store, the resolvers and
//! persistence live in `acai-cart` and call into this crate.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Storefront Cart Architecture                       │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    Storefront UI                                │   │
//! │  │    Product page ──► Cart page ──► Checkout (out of scope)      │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │ mutations / subscriptions              │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    acai-cart                                    │   │
//! │  │    CartStore, coupon + delivery resolvers, persistence         │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ acai-core (THIS CRATE) ★                        │   │
//! │  │                                                                 │   │
//! │  │   ┌─────────┐ ┌─────────┐ ┌──────────┐ ┌────────┐ ┌─────────┐  │   │
//! │  │   │  types  │ │  money  │ │ pricing  │ │  cart  │ │toppings │  │   │
//! │  │   │ Product │ │  Money  │ │ totals   │ │  Cart  │ │allowance│  │   │
//! │  │   │ Coupon  │ │ portion │ │ discount │ │ State  │ │ policy  │  │   │
//! │  │   └─────────┘ └─────────┘ └──────────┘ └────────┘ └─────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Domain types (Product, CartItem, AppliedCoupon, ...)
//! - [`money`] - Money in integer centavos
//! - [`pricing`] - Line prices and cart totals
//! - [`toppings`] - Free-topping allowance policy
//! - [`cart`] - The cart state machine
//! - [`validation`] - Input validation
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use acai_core::cart::Cart;
//! use acai_core::money::Money;
//! use acai_core::types::Product;
//!
//! let mut cart = Cart::new();
//! cart.add_item(Product::new("acai-300", "Açaí 300ml", Money::from_cents(1800)), 2, None)
//!     .unwrap();
//!
//! assert_eq!(cart.totals().total.to_string(), "R$ 36,00");
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod cart;
pub mod error;
pub mod money;
pub mod pricing;
pub mod toppings;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use cart::{Cart, CartNotice, CartState};
pub use error::{CoreError, CoreResult, ValidationError};
pub use money::Money;
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Maximum quantity of a single cart line.
///
/// ## Business Reason
/// Catches a fat-fingered "1000" instead of "10" before it reaches checkout.
pub const MAX_ITEM_QUANTITY: i64 = 999;

/// Maximum number of lines in a cart.
pub const MAX_CART_LINES: usize = 100;

/// Maximum length of the kitchen note, in characters.
pub const MAX_NOTE_LENGTH: usize = 500;

/// Maximum length of a coupon code, in characters.
pub const MAX_COUPON_CODE_LENGTH: usize = 20;

//! # acai-cart: Cart Runtime for the Açaí Storefront
//!
//! Wraps the pure cart from `acai-core` in a shared store and connects it to
//! the outside world: the coupon service, the delivery-fee service and local
//! persistence.
//!
//! ## Request Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Typical Session                                      │
//! │                                                                         │
//! │  1. CartStore::open(storage, key)                                       │
//! │     └─► restore saved cart (coupon comes back unconfirmed)              │
//! │                                                                         │
//! │  2. CouponResolver::revalidate_restored(&store)                         │
//! │     └─► confirm or drop the carried-over coupon                         │
//! │                                                                         │
//! │  3. store.add_item / update_item_quantity / remove_item                 │
//! │     └─► watch<CartState> updated, snapshot queued for SQLite            │
//! │                                                                         │
//! │  4. CouponResolver::apply_code(&store, "DEZ10")                         │
//! │     DeliveryFeeResolver::resolve(&store, "Centro")                      │
//! │     └─► late answers for superseded requests are dropped                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`store`] - CartStore: single writer, publication
//! - [`coupon`] - Coupon validation and the CouponValidator contract
//! - [`delivery`] - Delivery fee lookup and the DeliveryFeeLookup contract
//! - [`api`] - HTTP client for the storefront backend
//! - [`persistence`] - Saved cart record, SQLite storage, background writer
//! - [`config`] - Configuration (TOML + environment)
//! - [`error`] - Error types

pub mod api;
pub mod config;
pub mod coupon;
pub mod delivery;
pub mod error;
pub mod persistence;
pub mod store;

pub use api::StorefrontClient;
pub use config::CartConfig;
pub use coupon::{CouponOutcome, CouponResolver, CouponValidator, RevalidationOutcome};
pub use delivery::{DeliveryFeeLookup, DeliveryFeeResolver, DeliveryOutcome, DeliveryQuote};
pub use error::{CartError, CartResult, PersistenceError, ServiceError};
pub use persistence::{CartStorage, MemoryCartStorage, PersistedCart, SqliteCartStorage};
pub use store::CartStore;

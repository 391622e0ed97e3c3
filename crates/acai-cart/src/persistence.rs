//! # Cart Persistence
//!
//! Keeps the cart across sessions: a versioned JSON record stored under a
//! stable key, written in the background after every change.
//!
//! ## Write Path
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Persistence Flow                                   │
//! │                                                                         │
//! │  CartStore mutation                                                    │
//! │       │  PersistedCart::from_cart (cheap clone, under the cart lock)    │
//! │       ▼                                                                 │
//! │  mpsc (unbounded) ──► PersistenceWriter task                           │
//! │                          │  drain queue, keep newest snapshot           │
//! │                          │  encode JSON                                 │
//! │                          ▼                                              │
//! │                       CartStorage::save(key, payload)                  │
//! │                          │                                              │
//! │                          └─ failure: warn! + CartNotice, never retried │
//! │                                                                         │
//! │  The UI never waits on any of this.                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Record Versions
//! | Version | Shape                                                          |
//! |---------|----------------------------------------------------------------|
//! | 1       | Legacy storefront record: amounts in decimal reais, coupon as |
//! |         | `{type, value}`, optionally wrapped in `{state, version}`      |
//! | 2       | [`PersistedCart`]: amounts in centavos, tagged coupon kind     |

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, PoisonError};

use acai_core::cart::{Cart, CartNotice};
use acai_core::money::Money;
use acai_core::toppings::FREE_ID_SUFFIX;
use acai_core::types::{AppliedCoupon, CartItem, Customization, Product, SelectedTopping};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::coupon::parse_coupon_kind;
use crate::error::{PersistenceError, PersistenceResult};

/// Version written by this build.
pub const CURRENT_VERSION: u32 = 2;

// =============================================================================
// Persisted Record
// =============================================================================

/// The saved cart.
///
/// Derived totals are not stored: they are recomputed on restore. The coupon
/// is stored whether it was confirmed or not and always comes back
/// unconfirmed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedCart {
    pub version: u32,
    pub items: Vec<CartItem>,
    pub applied_coupon: Option<AppliedCoupon>,
    pub delivery_fee: Money,
    pub saved_at: DateTime<Utc>,
}

impl PersistedCart {
    /// Snapshots a cart.
    pub fn from_cart(cart: &Cart) -> Self {
        PersistedCart {
            version: CURRENT_VERSION,
            items: cart.items().to_vec(),
            applied_coupon: cart
                .applied_coupon()
                .or_else(|| cart.unconfirmed_coupon())
                .cloned(),
            delivery_fee: cart.delivery_fee(),
            saved_at: Utc::now(),
        }
    }

    /// Encodes the record as JSON.
    pub fn encode(&self) -> PersistenceResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Decodes a stored payload, migrating older versions.
    pub fn decode(payload: &str) -> PersistenceResult<Self> {
        let value: serde_json::Value = serde_json::from_str(payload)?;

        // Legacy records may be wrapped in a `{ state, version }` envelope.
        if let Some(state) = value.get("state") {
            let legacy: LegacyCart = serde_json::from_value(state.clone())?;
            return Ok(legacy.migrate());
        }

        let version = match value.get("version") {
            None => 1,
            Some(v) => v
                .as_u64()
                .and_then(|v| u32::try_from(v).ok())
                .ok_or_else(|| PersistenceError::Serialization(format!("invalid version: {}", v)))?,
        };

        match version {
            1 => {
                let legacy: LegacyCart = serde_json::from_value(value)?;
                Ok(legacy.migrate())
            }
            CURRENT_VERSION => Ok(serde_json::from_value(value)?),
            newer => Err(PersistenceError::UnsupportedVersion(newer)),
        }
    }

    /// Rebuilds the cart: prices recomputed, coupon unconfirmed.
    pub fn into_cart(self) -> Cart {
        Cart::restored(self.items, self.applied_coupon, self.delivery_fee)
    }
}

// =============================================================================
// Legacy Record (version 1)
// =============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct LegacyCart {
    items: Vec<LegacyItem>,
    applied_coupon: Option<LegacyCoupon>,
    delivery_fee: Option<Decimal>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyItem {
    id: String,
    product: LegacyProduct,
    quantity: i64,
    #[serde(default)]
    customization: Option<LegacyCustomization>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyProduct {
    id: String,
    name: String,
    price: Decimal,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct LegacyCustomization {
    size_id: Option<String>,
    toppings: Vec<LegacyTopping>,
    wants_cutlery: bool,
    observations: Option<String>,
    skipped_categories: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyTopping {
    topping_id: String,
    name: String,
    quantity: u32,
    unit_price: Decimal,
    #[serde(default)]
    is_free: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LegacyCoupon {
    code: String,
    #[serde(rename = "type")]
    kind: String,
    value: Decimal,
    #[serde(default)]
    min_order_value: Option<Decimal>,
}

fn legacy_money(amount: Decimal) -> Money {
    Money::from_decimal(amount).unwrap_or_default()
}

impl LegacyCart {
    fn migrate(self) -> PersistedCart {
        let items = self.items.into_iter().map(LegacyItem::migrate).collect();

        let applied_coupon = self.applied_coupon.and_then(|c| {
            let Some(kind) = parse_coupon_kind(&c.kind, c.value) else {
                warn!(code = %c.code, kind = %c.kind, "Dropping legacy coupon with unknown kind");
                return None;
            };
            let mut coupon = AppliedCoupon::new(c.code.to_uppercase(), kind);
            coupon.min_order_value = c.min_order_value.map(legacy_money);
            Some(coupon)
        });

        debug!("Migrated version 1 cart record");
        PersistedCart {
            version: CURRENT_VERSION,
            items,
            applied_coupon,
            delivery_fee: self.delivery_fee.map(legacy_money).unwrap_or_default(),
            saved_at: Utc::now(),
        }
    }
}

impl LegacyItem {
    fn migrate(self) -> CartItem {
        let product = Product::new(self.product.id, self.product.name, legacy_money(self.product.price));
        let customization = self.customization.map(|c| Customization {
            size_id: c.size_id,
            toppings: c.toppings.into_iter().map(LegacyTopping::migrate).collect(),
            wants_cutlery: c.wants_cutlery,
            note: c.observations.filter(|n| !n.trim().is_empty()),
            skipped_categories: c.skipped_categories.into_iter().collect(),
        });
        CartItem::new(self.id, product, self.quantity, customization)
    }
}

impl LegacyTopping {
    fn migrate(self) -> SelectedTopping {
        let unit_price = legacy_money(self.unit_price);
        if self.is_free {
            // Old records reused the catalog id for free and paid instances.
            let mut free = SelectedTopping::free(
                format!("{}{}", self.topping_id, FREE_ID_SUFFIX),
                self.name,
                unit_price,
                self.quantity,
            );
            free.original_id = Some(self.topping_id);
            free
        } else {
            SelectedTopping::paid(self.topping_id, self.name, unit_price, self.quantity)
        }
    }
}

// =============================================================================
// Storage Trait
// =============================================================================

/// Key-value storage for the cart record.
#[async_trait]
pub trait CartStorage: Send + Sync {
    async fn load(&self, key: &str) -> PersistenceResult<Option<String>>;

    async fn save(&self, key: &str, payload: &str) -> PersistenceResult<()>;

    async fn remove(&self, key: &str) -> PersistenceResult<()>;
}

// =============================================================================
// SQLite Storage
// =============================================================================

/// Cart records in a local SQLite file.
///
/// ## Schema
/// ```sql
/// CREATE TABLE cart_snapshots (
///     key      TEXT PRIMARY KEY,
///     payload  TEXT NOT NULL,
///     saved_at TEXT NOT NULL
/// );
/// ```
#[derive(Debug, Clone)]
pub struct SqliteCartStorage {
    pool: SqlitePool,
}

impl SqliteCartStorage {
    /// Opens (creating if needed) the database file.
    ///
    /// WAL mode, NORMAL synchronous: the cart is a convenience copy, losing
    /// the very last write on a crash is acceptable.
    pub async fn open(path: &Path) -> PersistenceResult<Self> {
        info!(path = %path.display(), "Opening cart database");

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PersistenceError::Database(e.to_string()))?;
        }

        let connect_url = format!("sqlite://{}?mode=rwc", path.display());
        let options = SqliteConnectOptions::from_str(&connect_url)?
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await?;

        Self::init(pool).await
    }

    /// In-memory database (for tests).
    pub async fn in_memory() -> PersistenceResult<Self> {
        // One connection: every new in-memory connection is a new database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Self::init(pool).await
    }

    async fn init(pool: SqlitePool) -> PersistenceResult<Self> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS cart_snapshots (
                key TEXT PRIMARY KEY,
                payload TEXT NOT NULL,
                saved_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await?;

        debug!("cart_snapshots table ready");
        Ok(SqliteCartStorage { pool })
    }

    /// Closes the pool.
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

#[async_trait]
impl CartStorage for SqliteCartStorage {
    async fn load(&self, key: &str) -> PersistenceResult<Option<String>> {
        let payload = sqlx::query_scalar::<_, String>("SELECT payload FROM cart_snapshots WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(payload)
    }

    async fn save(&self, key: &str, payload: &str) -> PersistenceResult<()> {
        sqlx::query(
            "INSERT INTO cart_snapshots (key, payload, saved_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET payload = excluded.payload, saved_at = excluded.saved_at",
        )
        .bind(key)
        .bind(payload)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove(&self, key: &str) -> PersistenceResult<()> {
        sqlx::query("DELETE FROM cart_snapshots WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// =============================================================================
// In-Memory Storage
// =============================================================================

/// Storage backed by a map. Used where no database is wanted (tests,
/// previews).
#[derive(Debug, Default)]
pub struct MemoryCartStorage {
    records: Mutex<HashMap<String, String>>,
}

impl MemoryCartStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-filled with one record.
    pub fn with_record(key: impl Into<String>, payload: impl Into<String>) -> Self {
        let storage = Self::default();
        storage
            .records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.into(), payload.into());
        storage
    }

    /// Current payload under a key.
    pub fn get(&self, key: &str) -> Option<String> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }
}

#[async_trait]
impl CartStorage for MemoryCartStorage {
    async fn load(&self, key: &str) -> PersistenceResult<Option<String>> {
        Ok(self.get(key))
    }

    async fn save(&self, key: &str, payload: &str) -> PersistenceResult<()> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), payload.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> PersistenceResult<()> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(())
    }
}

// =============================================================================
// Restore
// =============================================================================

/// Loads the saved cart.
///
/// Never fails: a missing record, an unreadable one, or a storage error all
/// give an empty cart (logged).
pub async fn restore(storage: &dyn CartStorage, key: &str) -> Cart {
    let payload = match storage.load(key).await {
        Ok(Some(payload)) => payload,
        Ok(None) => {
            debug!(key, "No saved cart");
            return Cart::new();
        }
        Err(e) => {
            warn!(key, error = %e, "Could not read saved cart, starting empty");
            return Cart::new();
        }
    };

    match PersistedCart::decode(&payload) {
        Ok(record) => {
            let cart = record.into_cart();
            info!(
                key,
                lines = cart.items().len(),
                has_coupon = cart.unconfirmed_coupon().is_some(),
                "Restored saved cart"
            );
            cart
        }
        Err(e) => {
            warn!(key, error = %e, "Saved cart is corrupt, starting empty");
            Cart::new()
        }
    }
}

// =============================================================================
// Background Writer
// =============================================================================

enum WriterMessage {
    Save(PersistedCart),
    Flush(oneshot::Sender<()>),
}

/// Fire-and-forget writer for cart snapshots.
///
/// Cloning shares the same background task.
#[derive(Debug, Clone)]
pub struct PersistenceWriter {
    tx: mpsc::UnboundedSender<WriterMessage>,
}

impl PersistenceWriter {
    /// Spawns the writer task. Must be called inside a Tokio runtime.
    ///
    /// Write failures are reported on `notices` as
    /// [`CartNotice::PersistenceFailed`].
    pub fn spawn(
        storage: Arc<dyn CartStorage>,
        key: impl Into<String>,
        notices: broadcast::Sender<CartNotice>,
    ) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(storage, key.into(), rx, notices));
        PersistenceWriter { tx }
    }

    /// Queues a snapshot of the cart.
    pub fn enqueue(&self, cart: &Cart) {
        if self
            .tx
            .send(WriterMessage::Save(PersistedCart::from_cart(cart)))
            .is_err()
        {
            warn!("Persistence writer has stopped, snapshot dropped");
        }
    }

    /// Waits until everything queued so far has been written (or failed).
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(WriterMessage::Flush(done_tx)).is_err() {
            return;
        }
        // A dropped sender means the task ended; nothing left to wait for.
        let _ = done_rx.await;
    }
}

async fn run_writer(
    storage: Arc<dyn CartStorage>,
    key: String,
    mut rx: mpsc::UnboundedReceiver<WriterMessage>,
    notices: broadcast::Sender<CartNotice>,
) {
    debug!(key = %key, "Persistence writer started");

    while let Some(first) = rx.recv().await {
        let mut latest = None;
        let mut waiters = Vec::new();

        let mut next = Some(first);
        while let Some(message) = next {
            match message {
                WriterMessage::Save(record) => latest = Some(record),
                WriterMessage::Flush(done) => waiters.push(done),
            }
            next = rx.try_recv().ok();
        }

        if let Some(record) = latest {
            if let Err(e) = write_record(storage.as_ref(), &key, &record).await {
                warn!(key = %key, error = %e, "Failed to save cart");
                let _ = notices.send(CartNotice::PersistenceFailed {
                    reason: e.to_string(),
                });
            }
        }

        for done in waiters {
            let _ = done.send(());
        }
    }

    debug!(key = %key, "Persistence writer stopped");
}

async fn write_record(storage: &dyn CartStorage, key: &str, record: &PersistedCart) -> PersistenceResult<()> {
    let payload = record.encode()?;
    storage.save(key, &payload).await?;
    debug!(key, lines = record.items.len(), "Cart saved");
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

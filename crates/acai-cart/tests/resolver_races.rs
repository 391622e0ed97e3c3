//! Late answers from the coupon and delivery services must never overwrite
//! a newer decision.
//!
//! The fake services below park every request until the test releases it,
//! so completion order is fully controlled.

use std::collections::HashMap;
use std::sync::Arc;

use acai_cart::coupon::{
    CouponDescriptor, CouponOutcome, CouponResolver, CouponValidation, CouponValidationRequest, CouponValidator,
};
use acai_cart::delivery::{DeliveryFeeLookup, DeliveryFeeResolver, DeliveryOutcome, DeliveryQuote};
use acai_cart::error::ServiceError;
use acai_cart::store::CartStore;
use acai_core::money::Money;
use acai_core::types::{CouponKind, DiscountRate, Product};
use async_trait::async_trait;
use tokio::sync::{mpsc, Notify};

/// Answers per key, each released by its own gate.
struct Gated<T> {
    answers: HashMap<String, (Arc<Notify>, T)>,
    started: mpsc::UnboundedSender<String>,
}

impl<T: Clone> Gated<T> {
    async fn answer(&self, key: &str) -> T {
        let (gate, answer) = &self.answers[key];
        let _ = self.started.send(key.to_string());
        gate.notified().await;
        answer.clone()
    }
}

#[async_trait]
impl CouponValidator for Gated<CouponValidation> {
    async fn validate(&self, request: CouponValidationRequest) -> Result<CouponValidation, ServiceError> {
        Ok(self.answer(&request.code).await)
    }
}

#[async_trait]
impl DeliveryFeeLookup for Gated<Result<DeliveryQuote, ServiceError>> {
    async fn lookup(&self, neighborhood: &str) -> Result<DeliveryQuote, ServiceError> {
        self.answer(neighborhood).await
    }
}

struct Harness<T> {
    service: Arc<Gated<T>>,
    gates: HashMap<String, Arc<Notify>>,
    started: mpsc::UnboundedReceiver<String>,
}

impl<T> Harness<T> {
    fn new(answers: Vec<(&str, T)>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut gates = HashMap::new();
        let mut table = HashMap::new();
        for (key, answer) in answers {
            let gate = Arc::new(Notify::new());
            gates.insert(key.to_string(), gate.clone());
            table.insert(key.to_string(), (gate, answer));
        }
        Harness {
            service: Arc::new(Gated {
                answers: table,
                started: tx,
            }),
            gates,
            started: rx,
        }
    }

    /// Waits until the service has received the request for `key`.
    async fn wait_started(&mut self, key: &str) {
        let got = self.started.recv().await.unwrap();
        assert_eq!(got, key);
    }

    fn release(&self, key: &str) {
        self.gates[key].notify_one();
    }
}

fn percent(pct: u32) -> CouponValidation {
    CouponValidation {
        valid: true,
        discount_amount: Money::zero(),
        coupon: Some(CouponDescriptor {
            kind: CouponKind::Percentage {
                rate: DiscountRate::from_bps(pct * 100),
            },
            min_order_value: None,
            max_discount: None,
        }),
        message: None,
    }
}

fn quote(name: &str, cents: i64) -> DeliveryQuote {
    DeliveryQuote {
        neighborhood: name.to_string(),
        fee: Money::from_cents(cents),
        estimated_time: "30-40 min".to_string(),
    }
}

fn served(name: &str, cents: i64) -> Result<DeliveryQuote, ServiceError> {
    Ok(quote(name, cents))
}

fn store_with_item() -> CartStore {
    let store = CartStore::new();
    store
        .add_item(Product::new("acai", "Açaí 500ml", Money::from_cents(5000)), 1, None)
        .unwrap();
    store
}

#[tokio::test]
async fn test_coupon_dropped_when_cart_changes_mid_flight() {
    let mut harness = Harness::new(vec![("DEZ", percent(10))]);
    let resolver = CouponResolver::new(harness.service.clone());
    let store = store_with_item();

    let task = tokio::spawn({
        let store = store.clone();
        async move { resolver.apply_code(&store, "DEZ").await }
    });
    harness.wait_started("DEZ").await;

    store
        .add_item(Product::new("agua", "Água", Money::from_cents(300)), 1, None)
        .unwrap();
    harness.release("DEZ");

    assert_eq!(task.await.unwrap().unwrap(), CouponOutcome::Superseded);
    let state = store.state();
    assert!(state.applied_coupon.is_none());
    assert!(state.discount.is_zero());
}

#[tokio::test]
async fn test_last_issued_coupon_wins() {
    let mut harness = Harness::new(vec![("DEZ", percent(10)), ("VINTE", percent(20))]);
    let resolver = CouponResolver::new(harness.service.clone());
    let store = store_with_item();

    let first = tokio::spawn({
        let (store, resolver) = (store.clone(), resolver.clone());
        async move { resolver.apply_code(&store, "DEZ").await }
    });
    harness.wait_started("DEZ").await;

    let second = tokio::spawn({
        let (store, resolver) = (store.clone(), resolver.clone());
        async move { resolver.apply_code(&store, "VINTE").await }
    });
    harness.wait_started("VINTE").await;

    // Newer request answers first, older one straggles in afterwards.
    harness.release("VINTE");
    assert!(matches!(
        second.await.unwrap().unwrap(),
        CouponOutcome::Applied { .. }
    ));
    harness.release("DEZ");
    assert_eq!(first.await.unwrap().unwrap(), CouponOutcome::Superseded);

    let state = store.state();
    assert_eq!(state.applied_coupon.map(|c| c.code), Some("VINTE".to_string()));
    assert_eq!(state.discount.cents(), 1000);
}

#[tokio::test]
async fn test_older_coupon_answer_arriving_first_is_dropped() {
    let mut harness = Harness::new(vec![("DEZ", percent(10)), ("VINTE", percent(20))]);
    let resolver = CouponResolver::new(harness.service.clone());
    let store = store_with_item();

    let first = tokio::spawn({
        let (store, resolver) = (store.clone(), resolver.clone());
        async move { resolver.apply_code(&store, "DEZ").await }
    });
    harness.wait_started("DEZ").await;
    let second = tokio::spawn({
        let (store, resolver) = (store.clone(), resolver.clone());
        async move { resolver.apply_code(&store, "VINTE").await }
    });
    harness.wait_started("VINTE").await;

    harness.release("DEZ");
    assert_eq!(first.await.unwrap().unwrap(), CouponOutcome::Superseded);
    assert!(store.state().applied_coupon.is_none());

    harness.release("VINTE");
    assert!(matches!(
        second.await.unwrap().unwrap(),
        CouponOutcome::Applied { .. }
    ));
    assert_eq!(store.state().discount.cents(), 1000);
}

#[tokio::test]
async fn test_clear_cart_supersedes_coupon_validation() {
    let mut harness = Harness::new(vec![("DEZ", percent(10))]);
    let resolver = CouponResolver::new(harness.service.clone());
    let store = store_with_item();

    let task = tokio::spawn({
        let store = store.clone();
        async move { resolver.apply_code(&store, "DEZ").await }
    });
    harness.wait_started("DEZ").await;

    store.clear_cart();
    harness.release("DEZ");

    assert_eq!(task.await.unwrap().unwrap(), CouponOutcome::Superseded);
    assert!(store.state().applied_coupon.is_none());
}

#[tokio::test]
async fn test_last_issued_delivery_lookup_wins() {
    let mut harness = Harness::new(vec![("Centro", served("Centro", 500)), ("Aldeota", served("Aldeota", 800))]);
    let resolver = DeliveryFeeResolver::new(harness.service.clone());
    let store = store_with_item();

    let first = tokio::spawn({
        let (store, resolver) = (store.clone(), resolver.clone());
        async move { resolver.resolve(&store, "Centro").await }
    });
    harness.wait_started("Centro").await;
    let second = tokio::spawn({
        let (store, resolver) = (store.clone(), resolver.clone());
        async move { resolver.resolve(&store, "Aldeota").await }
    });
    harness.wait_started("Aldeota").await;

    harness.release("Aldeota");
    assert_eq!(
        second.await.unwrap().unwrap(),
        DeliveryOutcome::Applied(quote("Aldeota", 800))
    );
    harness.release("Centro");
    assert_eq!(first.await.unwrap().unwrap(), DeliveryOutcome::Superseded);

    let state = store.state();
    assert_eq!(state.delivery_fee.cents(), 800);
    assert_eq!(state.total.cents(), 5800);
}

#[tokio::test]
async fn test_manual_fee_supersedes_lookup() {
    let mut harness = Harness::new(vec![("Centro", served("Centro", 500))]);
    let resolver = DeliveryFeeResolver::new(harness.service.clone());
    let store = store_with_item();

    let task = tokio::spawn({
        let store = store.clone();
        async move { resolver.resolve(&store, "Centro").await }
    });
    harness.wait_started("Centro").await;

    store.set_delivery_fee(Money::from_cents(0)).unwrap();
    harness.release("Centro");

    assert_eq!(task.await.unwrap().unwrap(), DeliveryOutcome::Superseded);
    assert!(store.state().delivery_fee.is_zero());
}

#[tokio::test]
async fn test_unserviceable_answer_for_older_lookup_is_dropped() {
    let mut harness = Harness::new(vec![("Longe", Err(ServiceError::NotFound)), ("Centro", served("Centro", 500))]);
    let resolver = DeliveryFeeResolver::new(harness.service.clone());
    let store = store_with_item();

    let first = tokio::spawn({
        let (store, resolver) = (store.clone(), resolver.clone());
        async move { resolver.resolve(&store, "Longe").await }
    });
    harness.wait_started("Longe").await;
    let second = tokio::spawn({
        let (store, resolver) = (store.clone(), resolver.clone());
        async move { resolver.resolve(&store, "Centro").await }
    });
    harness.wait_started("Centro").await;

    harness.release("Centro");
    assert_eq!(
        second.await.unwrap().unwrap(),
        DeliveryOutcome::Applied(quote("Centro", 500))
    );
    harness.release("Longe");
    assert_eq!(first.await.unwrap().unwrap(), DeliveryOutcome::Superseded);

    assert_eq!(store.state().delivery_fee.cents(), 500);
}

//! Courier quote cache integration tests: buffer math, cache lifetime,
//! address-change eviction, and fallback estimates.

mod common;

use std::sync::Arc;

use common::{address, package, MockCourierClient};
use craftmarket_checkout::config::QuoteConfig;
use craftmarket_checkout::delivery::CourierQuoteService;
use craftmarket_checkout::events::EventSender;
use rust_decimal_macros::dec;
use uuid::Uuid;

fn service(client: Arc<MockCourierClient>) -> CourierQuoteService {
    CourierQuoteService::new(client, QuoteConfig::default(), None)
}

#[tokio::test]
async fn charged_amount_is_always_estimate_plus_buffer() {
    let client = Arc::new(MockCourierClient::quoting(dec!(14.50)));
    let quotes = service(client);
    let seller = Uuid::new_v4();

    let quote = quotes
        .get_quote(seller, &address("10 Atelier Way"), &address("1 Main"), &package(), None)
        .await
        .unwrap();

    assert_eq!(quote.buffer_percent, 20);
    assert_eq!(quote.buffer_amount, dec!(2.90));
    assert_eq!(quote.charged_amount, quote.estimated_fee + quote.buffer_amount);
    assert_eq!(quote.charged_amount, dec!(17.40));
    assert!(!quote.estimated);
}

#[tokio::test]
async fn live_quotes_are_served_from_cache() {
    let client = Arc::new(MockCourierClient::quoting(dec!(12.00)));
    let quotes = service(client.clone());
    let seller = Uuid::new_v4();
    let dropoff = address("1 Main");

    let first = quotes
        .get_quote(seller, &address("10 Atelier Way"), &dropoff, &package(), None)
        .await
        .unwrap();
    let second = quotes
        .get_quote(seller, &address("10 Atelier Way"), &dropoff, &package(), None)
        .await
        .unwrap();

    assert_eq!(first.quote_id, second.quote_id);
    assert_eq!(client.call_count(), 1);
}

#[tokio::test]
async fn changing_the_dropoff_address_evicts_prior_quotes() {
    let client = Arc::new(MockCourierClient::quoting(dec!(12.00)));
    let (events, mut rx) = EventSender::channel(16);
    let quotes = CourierQuoteService::new(client.clone(), QuoteConfig::default(), Some(events));
    let seller = Uuid::new_v4();
    let dropoff = address("1 Main");

    let original = quotes
        .get_quote(seller, &address("10 Atelier Way"), &dropoff, &package(), None)
        .await
        .unwrap();

    let evicted = quotes.invalidate_all("active address changed").await;
    assert_eq!(evicted, 1);
    assert!(quotes.live_quote(seller, &dropoff).is_none());

    let fresh = quotes
        .get_quote(seller, &address("10 Atelier Way"), &dropoff, &package(), None)
        .await
        .unwrap();
    assert_ne!(original.quote_id, fresh.quote_id);
    assert_eq!(client.call_count(), 2);

    let mut evictions = 0;
    while let Ok(event) = rx.try_recv() {
        if let craftmarket_checkout::events::Event::QuotesEvicted { count, .. } = event {
            evictions += count;
        }
    }
    assert_eq!(evictions, 1);
}

#[tokio::test]
async fn a_different_dropoff_is_a_different_cache_entry() {
    let client = Arc::new(MockCourierClient::quoting(dec!(12.00)));
    let quotes = service(client.clone());
    let seller = Uuid::new_v4();

    quotes
        .get_quote(seller, &address("10 Atelier Way"), &address("1 Main"), &package(), None)
        .await
        .unwrap();
    quotes
        .get_quote(seller, &address("10 Atelier Way"), &address("2 Other"), &package(), None)
        .await
        .unwrap();

    assert_eq!(client.call_count(), 2);
}

#[tokio::test]
async fn quoting_failure_degrades_to_an_uncached_fallback_estimate() {
    let client = Arc::new(MockCourierClient::quoting(dec!(12.00)));
    client.set_failing(true);
    let quotes = service(client.clone());
    let seller = Uuid::new_v4();
    let dropoff = address("1 Main");

    let fallback = quotes
        .get_quote(seller, &address("10 Atelier Way"), &dropoff, &package(), None)
        .await
        .unwrap();
    assert!(fallback.estimated);
    assert_eq!(
        fallback.charged_amount,
        fallback.estimated_fee + fallback.buffer_amount
    );
    // Fallbacks are never cached as authoritative.
    assert!(quotes.live_quote(seller, &dropoff).is_none());

    // Service recovers: the next invocation retries and caches.
    client.set_failing(false);
    let real = quotes
        .get_quote(seller, &address("10 Atelier Way"), &dropoff, &package(), None)
        .await
        .unwrap();
    assert!(!real.estimated);
    assert_eq!(quotes.live_quote(seller, &dropoff).unwrap().quote_id, real.quote_id);
}

#[tokio::test]
async fn an_expired_quote_is_evicted_and_repriced() {
    let client = Arc::new(MockCourierClient {
        fee: dec!(12.00),
        ttl_secs: -1, // every quote is already expired when it lands
        failing: std::sync::atomic::AtomicBool::new(false),
        calls: std::sync::atomic::AtomicUsize::new(0),
    });
    let quotes = service(client.clone());
    let seller = Uuid::new_v4();
    let dropoff = address("1 Main");
    let pickup = address("10 Atelier Way");

    let stale = quotes
        .get_quote(seller, &pickup, &dropoff, &package(), None)
        .await
        .unwrap();
    // Expired entries never serve from cache.
    quotes
        .get_quote(seller, &pickup, &dropoff, &package(), None)
        .await
        .unwrap();
    assert_eq!(client.call_count(), 2);

    let repriced = quotes
        .validate_for_payment(&stale, &pickup, &dropoff, &package())
        .await
        .unwrap();
    assert_ne!(repriced.quote_id, stale.quote_id);
    assert!(!repriced.estimated);
    assert_eq!(client.call_count(), 3);
}

#[tokio::test]
async fn an_expired_quote_without_a_reachable_service_fails_as_expired() {
    let client = Arc::new(MockCourierClient {
        fee: dec!(12.00),
        ttl_secs: -1,
        failing: std::sync::atomic::AtomicBool::new(false),
        calls: std::sync::atomic::AtomicUsize::new(0),
    });
    let quotes = service(client.clone());
    let seller = Uuid::new_v4();
    let dropoff = address("1 Main");
    let pickup = address("10 Atelier Way");

    let stale = quotes
        .get_quote(seller, &pickup, &dropoff, &package(), None)
        .await
        .unwrap();

    client.set_failing(true);
    let err = quotes
        .validate_for_payment(&stale, &pickup, &dropoff, &package())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        craftmarket_checkout::CheckoutError::QuoteExpired { quote_id, .. } if quote_id == stale.quote_id
    ));
}

#[tokio::test]
async fn payment_validation_reprices_estimated_quotes() {
    let client = Arc::new(MockCourierClient::quoting(dec!(12.00)));
    client.set_failing(true);
    let quotes = service(client.clone());
    let seller = Uuid::new_v4();
    let dropoff = address("1 Main");
    let pickup = address("10 Atelier Way");

    let fallback = quotes
        .get_quote(seller, &pickup, &dropoff, &package(), None)
        .await
        .unwrap();

    client.set_failing(false);
    let validated = quotes
        .validate_for_payment(&fallback, &pickup, &dropoff, &package())
        .await
        .unwrap();
    assert!(!validated.estimated);
    assert_eq!(validated.estimated_fee, dec!(12.00));
}

#[tokio::test]
async fn payment_validation_fails_when_repricing_is_impossible() {
    let client = Arc::new(MockCourierClient::quoting(dec!(12.00)));
    client.set_failing(true);
    let quotes = service(client);
    let seller = Uuid::new_v4();
    let dropoff = address("1 Main");
    let pickup = address("10 Atelier Way");

    let fallback = quotes
        .get_quote(seller, &pickup, &dropoff, &package(), None)
        .await
        .unwrap();
    let err = quotes
        .validate_for_payment(&fallback, &pickup, &dropoff, &package())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        craftmarket_checkout::CheckoutError::QuoteServiceUnavailable(_)
    ));
}

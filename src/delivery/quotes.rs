use std::sync::Arc;

use chrono::{Duration, Utc};
use dashmap::DashMap;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::clients::{CourierClient, PackageDetails};
use crate::config::QuoteConfig;
use crate::errors::CheckoutError;
use crate::events::{Event, EventSender};
use crate::geo::haversine_km;
use crate::models::{CourierQuote, DeliveryAddress};

/// Requests, buffers, and caches courier quotes per seller.
///
/// Quotes are keyed by seller plus the normalized dropoff fingerprint, so a
/// quote can never be charged against a different address than it was priced
/// for. Any change to the active address evicts everything.
pub struct CourierQuoteService {
    client: Arc<dyn CourierClient>,
    config: QuoteConfig,
    cache: DashMap<String, CourierQuote>,
    events: Option<EventSender>,
}

impl CourierQuoteService {
    pub fn new(
        client: Arc<dyn CourierClient>,
        config: QuoteConfig,
        events: Option<EventSender>,
    ) -> Self {
        Self {
            client,
            config,
            cache: DashMap::new(),
            events,
        }
    }

    fn cache_key(seller_id: Uuid, dropoff: &DeliveryAddress) -> String {
        format!("{}:{}", seller_id, dropoff.fingerprint())
    }

    /// Returns the priced, buffered quote for one seller's shipment, serving
    /// from cache while the cached quote is still live. Quoting-service
    /// failures degrade to a locally estimated fallback fee that is never
    /// cached as authoritative.
    #[instrument(skip(self, pickup, dropoff, package), fields(seller_id = %seller_id))]
    pub async fn get_quote(
        &self,
        seller_id: Uuid,
        pickup: &DeliveryAddress,
        dropoff: &DeliveryAddress,
        package: &PackageDetails,
        buffer_percent: Option<u32>,
    ) -> Result<CourierQuote, CheckoutError> {
        let percent = buffer_percent.unwrap_or(self.config.buffer_percent);
        let key = Self::cache_key(seller_id, dropoff);

        if let Some(cached) = self.cache.get(&key) {
            if !cached.is_expired(Utc::now()) {
                return Ok(cached.clone());
            }
        }
        self.cache.remove(&key);

        match self
            .client
            .quote(pickup, dropoff, package, percent)
            .await
        {
            Ok(response) => {
                let buffer_amount =
                    (response.estimated_fee * Decimal::from(percent) / Decimal::from(100))
                        .round_dp(2);
                let charged_amount = response.estimated_fee + buffer_amount;
                if response.charged_amount != charged_amount {
                    warn!(
                        service_charged = %response.charged_amount,
                        local_charged = %charged_amount,
                        "courier service charged amount disagrees with local buffer math, using local"
                    );
                }
                let quote = CourierQuote {
                    quote_id: response.quote_id,
                    seller_id,
                    estimated_fee: response.estimated_fee,
                    buffer_percent: percent,
                    buffer_amount,
                    charged_amount,
                    expires_at: response.expires_at,
                    estimated: false,
                };
                self.cache.insert(key, quote.clone());
                self.emit(Event::QuoteFetched {
                    seller_id,
                    quote_id: quote.quote_id,
                    charged_amount: quote.charged_amount,
                    estimated: false,
                })
                .await;
                Ok(quote)
            }
            Err(e) => {
                warn!(error = %e, "courier quoting failed, producing fallback estimate");
                let quote = self.fallback_quote(seller_id, pickup, dropoff, percent);
                self.emit(Event::QuoteFetched {
                    seller_id,
                    quote_id: quote.quote_id,
                    charged_amount: quote.charged_amount,
                    estimated: true,
                })
                .await;
                Ok(quote)
            }
        }
    }

    /// Fetches quotes for several sellers against the same dropoff.
    pub async fn get_quotes(
        &self,
        requests: &[(Uuid, DeliveryAddress)],
        dropoff: &DeliveryAddress,
        package: &PackageDetails,
    ) -> Vec<Result<CourierQuote, CheckoutError>> {
        let futures = requests.iter().map(|(seller_id, pickup)| {
            self.get_quote(*seller_id, pickup, dropoff, package, None)
        });
        futures::future::join_all(futures).await
    }

    /// Re-validates a quote at payment time. Expired or fallback quotes are
    /// re-priced; payment never proceeds against a stale or estimated fee.
    #[instrument(skip(self, quote, pickup, dropoff, package), fields(seller_id = %quote.seller_id, quote_id = %quote.quote_id))]
    pub async fn validate_for_payment(
        &self,
        quote: &CourierQuote,
        pickup: &DeliveryAddress,
        dropoff: &DeliveryAddress,
        package: &PackageDetails,
    ) -> Result<CourierQuote, CheckoutError> {
        let expired = quote.is_expired(Utc::now());
        if !expired && !quote.estimated {
            return Ok(quote.clone());
        }

        let key = Self::cache_key(quote.seller_id, dropoff);
        self.cache.remove(&key);

        let fresh = self
            .get_quote(
                quote.seller_id,
                pickup,
                dropoff,
                package,
                Some(quote.buffer_percent),
            )
            .await?;
        if fresh.estimated {
            // Could not re-price authoritatively.
            return if expired {
                Err(CheckoutError::QuoteExpired {
                    seller_id: quote.seller_id,
                    quote_id: quote.quote_id,
                })
            } else {
                Err(CheckoutError::QuoteServiceUnavailable(
                    "quote could not be re-priced before payment".to_string(),
                ))
            };
        }
        Ok(fresh)
    }

    /// Evicts every cached quote. Called whenever the active delivery address
    /// changes or the checkout is abandoned mid-payment.
    pub async fn invalidate_all(&self, reason: &str) -> usize {
        let count = self.cache.len();
        self.cache.clear();
        if count > 0 {
            self.emit(Event::QuotesEvicted {
                count,
                reason: reason.to_string(),
            })
            .await;
        }
        count
    }

    /// Evicts any cached quote for one seller.
    pub async fn invalidate_seller(&self, seller_id: Uuid, reason: &str) -> usize {
        let prefix = format!("{}:", seller_id);
        let before = self.cache.len();
        self.cache.retain(|key, _| !key.starts_with(&prefix));
        let evicted = before - self.cache.len();
        if evicted > 0 {
            self.emit(Event::QuotesEvicted {
                count: evicted,
                reason: reason.to_string(),
            })
            .await;
        }
        evicted
    }

    /// The live cached quote for a seller and dropoff, if any.
    pub fn live_quote(&self, seller_id: Uuid, dropoff: &DeliveryAddress) -> Option<CourierQuote> {
        let key = Self::cache_key(seller_id, dropoff);
        self.cache
            .get(&key)
            .filter(|quote| !quote.is_expired(Utc::now()))
            .map(|quote| quote.clone())
    }

    fn fallback_quote(
        &self,
        seller_id: Uuid,
        pickup: &DeliveryAddress,
        dropoff: &DeliveryAddress,
        percent: u32,
    ) -> CourierQuote {
        let distance_fee = match (pickup.coordinates(), dropoff.coordinates()) {
            (Some(from), Some(to)) => haversine_km(from, to)
                .ok()
                .and_then(Decimal::from_f64)
                .map(|km| (km * self.config.fallback_per_km_rate).round_dp(2))
                .unwrap_or(Decimal::ZERO),
            _ => Decimal::ZERO,
        };
        let estimated_fee = self.config.fallback_base_fee + distance_fee;
        let buffer_amount =
            (estimated_fee * Decimal::from(percent) / Decimal::from(100)).round_dp(2);
        CourierQuote {
            quote_id: Uuid::new_v4(),
            seller_id,
            estimated_fee,
            buffer_percent: percent,
            buffer_amount,
            charged_amount: estimated_fee + buffer_amount,
            expires_at: Utc::now() + Duration::seconds(self.config.ttl_secs as i64),
            estimated: true,
        }
    }

    async fn emit(&self, event: Event) {
        if let Some(events) = &self.events {
            if let Err(e) = events.send(event).await {
                warn!(error = %e, "failed to publish quote event");
            }
        }
    }
}

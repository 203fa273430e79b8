use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{instrument, warn};

use crate::errors::CheckoutError;
use crate::geo::Coordinates;
use crate::models::DeliveryAddress;

#[derive(Debug, Clone, PartialEq)]
pub struct GeocodeResult {
    pub coordinates: Coordinates,
    pub confidence: f64,
}

/// Address-to-coordinates resolution, consumed as a black-box service.
#[async_trait]
pub trait GeocodingClient: Send + Sync {
    async fn geocode(&self, address: &DeliveryAddress) -> Result<GeocodeResult, CheckoutError>;
}

/// Outcome of a rate-limited geocode attempt. `Pending` means checkout keeps
/// going with address validation deferred; it never blocks on the geocoder.
#[derive(Debug, Clone, PartialEq)]
pub enum GeocodeOutcome {
    Resolved(GeocodeResult),
    Pending,
}

/// Wraps a [`GeocodingClient`] with a fixed minimum interval between
/// requests. Calls arriving inside the interval, and upstream failures,
/// degrade to [`GeocodeOutcome::Pending`].
pub struct RateLimitedGeocoder {
    inner: Arc<dyn GeocodingClient>,
    min_interval: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl RateLimitedGeocoder {
    pub fn new(inner: Arc<dyn GeocodingClient>, min_interval: Duration) -> Self {
        Self {
            inner,
            min_interval,
            last_request: Mutex::new(None),
        }
    }

    #[instrument(skip(self, address), fields(city = %address.city))]
    pub async fn geocode(&self, address: &DeliveryAddress) -> GeocodeOutcome {
        {
            let mut last = self.last_request.lock().await;
            if let Some(previous) = *last {
                if previous.elapsed() < self.min_interval {
                    return GeocodeOutcome::Pending;
                }
            }
            *last = Some(Instant::now());
        }

        match self.inner.geocode(address).await {
            Ok(result) => GeocodeOutcome::Resolved(result),
            Err(e) => {
                warn!(error = %e, "geocoding failed, address validation stays pending");
                GeocodeOutcome::Pending
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedGeocoder {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl GeocodingClient for FixedGeocoder {
        async fn geocode(
            &self,
            _address: &DeliveryAddress,
        ) -> Result<GeocodeResult, CheckoutError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(GeocodeResult {
                coordinates: Coordinates::new(45.5, -73.5),
                confidence: 0.9,
            })
        }
    }

    fn address() -> DeliveryAddress {
        DeliveryAddress {
            street: "1 Main".into(),
            city: "Montreal".into(),
            state: "QC".into(),
            postal_code: "H2Y 1G1".into(),
            country: "CA".into(),
            latitude: None,
            longitude: None,
        }
    }

    #[tokio::test]
    async fn second_request_inside_interval_is_pending() {
        let inner = Arc::new(FixedGeocoder {
            calls: AtomicUsize::new(0),
        });
        let geocoder = RateLimitedGeocoder::new(inner.clone(), Duration::from_secs(60));

        let first = geocoder.geocode(&address()).await;
        assert!(matches!(first, GeocodeOutcome::Resolved(_)));

        let second = geocoder.geocode(&address()).await;
        assert_eq!(second, GeocodeOutcome::Pending);
        assert_eq!(inner.calls.load(Ordering::SeqCst), 1);
    }
}

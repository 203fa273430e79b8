use config::{Config, ConfigError, Environment, File};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::Deserialize;
use tracing::info;
use validator::Validate;

/// Default values for configuration
const DEFAULT_CURRENCY: &str = "CAD";
const DEFAULT_BUFFER_PERCENT: u32 = 20;
const DEFAULT_QUOTE_TTL_SECS: u64 = 15 * 60;
const DEFAULT_GEOCODE_MIN_INTERVAL_MS: u64 = 1_500;
const DEFAULT_SLOT_LOOKAHEAD_DAYS: u32 = 14;
const DEFAULT_LOG_LEVEL: &str = "info";
const CONFIG_FILE: &str = "config/checkout";
const ENV_PREFIX: &str = "CHECKOUT";

/// Courier quote pricing and caching configuration.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct QuoteConfig {
    /// Surcharge applied to the courier's estimated fee to absorb price
    /// volatility between quoting and fulfillment.
    #[serde(default = "default_buffer_percent")]
    #[validate(range(min = 0, max = 100))]
    pub buffer_percent: u32,

    /// Cache lifetime used when the quoting service does not supply an expiry.
    #[serde(default = "default_quote_ttl_secs")]
    pub ttl_secs: u64,

    /// Flat component of the locally estimated fallback fee.
    #[serde(default = "default_fallback_base_fee")]
    pub fallback_base_fee: Decimal,

    /// Per-kilometre component of the locally estimated fallback fee.
    #[serde(default = "default_fallback_per_km_rate")]
    pub fallback_per_km_rate: Decimal,
}

impl Default for QuoteConfig {
    fn default() -> Self {
        Self {
            buffer_percent: default_buffer_percent(),
            ttl_secs: default_quote_ttl_secs(),
            fallback_base_fee: default_fallback_base_fee(),
            fallback_per_km_rate: default_fallback_per_km_rate(),
        }
    }
}

/// Geocoding rate-limit configuration.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct GeocodingConfig {
    /// Minimum spacing between geocoding requests. Requests arriving earlier
    /// degrade to "validation pending" instead of queueing.
    #[serde(default = "default_geocode_min_interval_ms")]
    pub min_interval_ms: u64,
}

impl Default for GeocodingConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: default_geocode_min_interval_ms(),
        }
    }
}

/// Pickup slot generation configuration.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct ScheduleConfig {
    /// How many calendar days ahead to enumerate bookable pickup slots.
    #[serde(default = "default_slot_lookahead_days")]
    #[validate(range(min = 1, max = 90))]
    pub slot_lookahead_days: u32,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            slot_lookahead_days: default_slot_lookahead_days(),
        }
    }
}

/// Top-level checkout engine configuration, loadable from `config/checkout.*`
/// with `CHECKOUT__`-prefixed environment overrides.
#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(deny_unknown_fields)]
pub struct CheckoutConfig {
    /// ISO 4217 currency for all fees, totals, and gateway intents.
    #[serde(default = "default_currency")]
    #[validate(length(min = 3, max = 3))]
    pub currency: String,

    #[serde(default)]
    #[validate]
    pub quotes: QuoteConfig,

    #[serde(default)]
    pub geocoding: GeocodingConfig,

    #[serde(default)]
    #[validate]
    pub schedule: ScheduleConfig,

    /// Logging level for the tracing subscriber.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for CheckoutConfig {
    fn default() -> Self {
        Self {
            currency: default_currency(),
            quotes: QuoteConfig::default(),
            geocoding: GeocodingConfig::default(),
            schedule: ScheduleConfig::default(),
            log_level: default_log_level(),
        }
    }
}

impl CheckoutConfig {
    /// Loads configuration from the optional config file and the environment,
    /// falling back to defaults for anything unset.
    pub fn load() -> Result<Self, ConfigError> {
        let config: CheckoutConfig = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?
            .try_deserialize()?;

        config
            .validate()
            .map_err(|e| ConfigError::Message(e.to_string()))?;

        info!(
            currency = %config.currency,
            buffer_percent = config.quotes.buffer_percent,
            quote_ttl_secs = config.quotes.ttl_secs,
            "checkout configuration loaded"
        );
        Ok(config)
    }
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

fn default_buffer_percent() -> u32 {
    DEFAULT_BUFFER_PERCENT
}

fn default_quote_ttl_secs() -> u64 {
    DEFAULT_QUOTE_TTL_SECS
}

fn default_fallback_base_fee() -> Decimal {
    dec!(5.00)
}

fn default_fallback_per_km_rate() -> Decimal {
    dec!(1.20)
}

fn default_geocode_min_interval_ms() -> u64 {
    DEFAULT_GEOCODE_MIN_INTERVAL_MS
}

fn default_slot_lookahead_days() -> u32 {
    DEFAULT_SLOT_LOOKAHEAD_DAYS
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

use std::{env, time::Duration};

use anyhow::Context;
use secrecy::SecretString;

use crate::{dto::checkout::PaymentInstructions, models::PaymentMethod};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub database_url: Option<String>,
    pub jwt_secret: SecretString,
    pub asset_base_url: String,
    pub core: CoreConfig,
    pub idempotency: IdempotencyConfig,
    pub payment: PaymentConfig,
}

/// Connection settings for the upstream Core service.
#[derive(Debug, Clone)]
pub struct CoreConfig {
    pub base_url: String,
    pub internal_key: SecretString,
    pub timeout: Duration,
}

#[derive(Debug, Clone)]
pub struct IdempotencyConfig {
    pub ttl: Duration,
    /// How long a duplicate request waits on an in-flight original before giving up.
    pub in_flight_wait: Duration,
}

#[derive(Debug, Clone)]
pub struct PaymentConfig {
    /// Methods offered when Core's quote does not list any.
    pub enabled_methods: Vec<PaymentMethod>,
    /// Fallback for fields Core leaves out of a bank transfer placement.
    pub bank_transfer: PaymentInstructions,
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(86_400),
            in_flight_wait: Duration::from_millis(15_000),
        }
    }
}

impl Default for PaymentConfig {
    fn default() -> Self {
        Self {
            enabled_methods: PaymentMethod::ALL.to_vec(),
            bank_transfer: PaymentInstructions::default(),
        }
    }
}

impl AppConfig {
    /// How long a placement claim stays locked without being settled: the two Core calls of
    /// a commit plus the time a duplicate is willing to wait.
    pub fn claim_lease(&self) -> Duration {
        self.core
            .timeout
            .saturating_mul(2)
            .saturating_add(self.idempotency.in_flight_wait)
    }

    pub fn from_env() -> anyhow::Result<Self> {
        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .ok()
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);
        let database_url = env::var("DATABASE_URL").ok().filter(|v| !v.trim().is_empty());
        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET is not set")?;
        let asset_base_url = env::var("ASSET_BASE_URL").unwrap_or_default();

        let core = CoreConfig {
            base_url: env::var("CORE_BASE_URL").context("CORE_BASE_URL is not set")?,
            internal_key: SecretString::from(
                env::var("CORE_INTERNAL_KEY").context("CORE_INTERNAL_KEY is not set")?,
            ),
            timeout: Duration::from_millis(parse_or("CORE_TIMEOUT_MS", 10_000)?),
        };

        let idempotency = IdempotencyConfig {
            ttl: Duration::from_secs(parse_or("IDEMPOTENCY_TTL_SECS", 86_400)?),
            in_flight_wait: Duration::from_millis(parse_or("IDEMPOTENCY_WAIT_MS", 15_000)?),
        };

        let enabled_methods = match env::var("PAYMENT_METHODS") {
            Ok(raw) => parse_methods(&raw)?,
            Err(_) => PaymentMethod::ALL.to_vec(),
        };
        let payment = PaymentConfig {
            enabled_methods,
            bank_transfer: PaymentInstructions {
                image_url: env::var("BANK_QR_IMAGE_URL").unwrap_or_default(),
                note: env::var("BANK_TRANSFER_NOTE").unwrap_or_default(),
                phone: env::var("BANK_TRANSFER_PHONE").unwrap_or_default(),
                note_hint: env::var("BANK_TRANSFER_NOTE_HINT").unwrap_or_default(),
            },
        };

        Ok(Self {
            host,
            port,
            database_url,
            jwt_secret: SecretString::from(jwt_secret),
            asset_base_url,
            core,
            idempotency,
            payment,
        })
    }
}

fn parse_or(name: &str, default: u64) -> anyhow::Result<u64> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse::<u64>()
            .with_context(|| format!("{name} must be a non-negative integer")),
        Err(_) => Ok(default),
    }
}

fn parse_methods(raw: &str) -> anyhow::Result<Vec<PaymentMethod>> {
    let mut methods = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let method = part
            .parse::<PaymentMethod>()
            .map_err(|e| anyhow::anyhow!("PAYMENT_METHODS: {e}"))?;
        if !methods.contains(&method) {
            methods.push(method);
        }
    }
    if methods.is_empty() {
        anyhow::bail!("PAYMENT_METHODS must list at least one method");
    }
    Ok(methods)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_methods_dedupes_and_keeps_order() {
        let methods = parse_methods("vnpay, cod ,VNPAY").unwrap();
        assert_eq!(methods, vec![PaymentMethod::Vnpay, PaymentMethod::Cod]);
    }

    #[test]
    fn parse_methods_rejects_unknown_and_empty() {
        assert!(parse_methods("COD,PAYPAL").is_err());
        assert!(parse_methods(" , ").is_err());
    }
}

//! Gateway configuration, read from the environment.

use std::net::SocketAddr;
use std::str::FromStr;

use anyhow::{Context, Result, bail};

use crate::hub::HubConfig;
use crate::relay::channel_for;

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub host: String,
    pub port: u16,
    pub bus: BusConfig,
    pub market_data: MarketDataConfig,
    pub database: DatabaseConfig,
    pub jwt_secret: String,
    pub hub: HubConfig,
    pub rate_limit: RateLimitConfig,
    pub log_level: String,
}

#[derive(Debug, Clone)]
pub struct BusConfig {
    pub nats_url: String,
    pub command_subject: String,
    pub event_subject: String,
}

#[derive(Debug, Clone)]
pub struct MarketDataConfig {
    pub redis_url: String,
    pub channel_prefix: String,
    pub symbols: Vec<String>,
}

impl MarketDataConfig {
    pub fn channels(&self) -> Vec<String> {
        self.symbols
            .iter()
            .map(|symbol| channel_for(&self.channel_prefix, symbol))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// `None` selects the in-memory store.
    pub url: Option<String>,
    pub max_connections: u32,
}

/// Token bucket applied per user to the order endpoints.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitConfig {
    pub capacity: u32,
    pub refill_per_sec: f64,
}

impl GatewayConfig {
    /// Load from the process environment, after an optional `.env` file.
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let symbols: Vec<String> = var("MARKET_SYMBOLS", "BTC/USDT")
            .split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        let config = Self {
            host: var("GATEWAY_HOST", "0.0.0.0"),
            port: parse_or(&lookup, "GATEWAY_PORT", 8080)?,
            bus: BusConfig {
                nats_url: var("NATS_URL", "nats://localhost:4222"),
                command_subject: var("COMMAND_SUBJECT", "orders"),
                event_subject: var("EVENT_SUBJECT", "events"),
            },
            market_data: MarketDataConfig {
                redis_url: var("REDIS_URL", "redis://localhost:6379"),
                channel_prefix: var("MARKET_CHANNEL_PREFIX", "ob_update"),
                symbols,
            },
            database: DatabaseConfig {
                url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
                max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 25)?,
            },
            jwt_secret: lookup("JWT_SECRET").unwrap_or_default(),
            hub: HubConfig {
                client_queue_capacity: parse_or(&lookup, "HUB_CLIENT_QUEUE", 256)?,
            },
            rate_limit: RateLimitConfig {
                capacity: parse_or(&lookup, "ORDER_RATE_CAPACITY", 20)?,
                refill_per_sec: parse_or(&lookup, "ORDER_RATE_REFILL", 20.0)?,
            },
            log_level: var("LOG_LEVEL", "info"),
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.jwt_secret.is_empty() {
            bail!("JWT_SECRET must be set");
        }
        if self.hub.client_queue_capacity == 0 {
            bail!("HUB_CLIENT_QUEUE must be at least 1");
        }
        if self.database.max_connections == 0 {
            bail!("DATABASE_MAX_CONNECTIONS must be at least 1");
        }
        if self.rate_limit.capacity == 0 || self.rate_limit.refill_per_sec <= 0.0 {
            bail!("ORDER_RATE_CAPACITY and ORDER_RATE_REFILL must be positive");
        }
        if self.bus.command_subject.is_empty() || self.bus.event_subject.is_empty() {
            bail!("COMMAND_SUBJECT and EVENT_SUBJECT must not be empty");
        }
        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("Invalid listen address {}:{}", self.host, self.port))
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {key}: {raw:?}")),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn load(vars: &[(&str, &str)]) -> Result<GatewayConfig> {
        let env: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        GatewayConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = load(&[("JWT_SECRET", "s3cret")]).unwrap();

        assert_eq!(config.port, 8080);
        assert_eq!(config.bus.command_subject, "orders");
        assert_eq!(config.bus.event_subject, "events");
        assert_eq!(config.market_data.channels(), vec!["ob_update:BTC/USDT"]);
        assert_eq!(config.database.url, None);
        assert_eq!(config.database.max_connections, 25);
        assert_eq!(config.hub.client_queue_capacity, 256);
        assert_eq!(config.socket_addr().unwrap().port(), 8080);
    }

    #[test]
    fn test_overrides_and_symbol_list() {
        let config = load(&[
            ("JWT_SECRET", "s3cret"),
            ("GATEWAY_PORT", "9000"),
            ("MARKET_SYMBOLS", "BTC/USDT, ETH/USDT,,SOL/USDT"),
            ("MARKET_CHANNEL_PREFIX", "book"),
            ("DATABASE_URL", "postgres://localhost/dex"),
        ])
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(
            config.market_data.channels(),
            vec!["book:BTC/USDT", "book:ETH/USDT", "book:SOL/USDT"]
        );
        assert_eq!(config.database.url.as_deref(), Some("postgres://localhost/dex"));
    }

    #[test]
    fn test_invalid_number_reports_key() {
        let err = load(&[("JWT_SECRET", "s3cret"), ("GATEWAY_PORT", "eighty")]).unwrap_err();
        assert!(err.to_string().contains("GATEWAY_PORT"));
    }

    #[test]
    fn test_missing_secret_rejected() {
        let err = load(&[]).unwrap_err();
        assert!(err.to_string().contains("JWT_SECRET"));
    }
}

use std::env;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

use crate::lending::calculator::RateCard;

/// Distinguishes runtime behavior for different stages of the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppEnvironment {
    Development,
    Test,
    Production,
}

impl AppEnvironment {
    fn from_str(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "prod" | "production" => Self::Production,
            "test" | "ci" => Self::Test,
            _ => Self::Development,
        }
    }
}

/// Top-level configuration for the application.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub environment: AppEnvironment,
    pub server: ServerConfig,
    pub telemetry: TelemetryConfig,
    pub lending: LendingConfig,
}

impl AppConfig {
    pub fn load() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let environment = AppEnvironment::from_str(
            &env::var("APP_ENV").unwrap_or_else(|_| "development".to_string()),
        );

        let host = env::var("APP_HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
        let port = env::var("APP_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse::<u16>()
            .map_err(|_| ConfigError::InvalidPort)?;

        let log_level = env::var("APP_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let defaults = LendingConfig::default();
        let lending = LendingConfig {
            weekly_interest_rate: rate_from_env(
                "LENDING_WEEKLY_INTEREST_RATE",
                defaults.weekly_interest_rate,
            )?,
            daily_penalty_rate: rate_from_env(
                "LENDING_DAILY_PENALTY_RATE",
                defaults.daily_penalty_rate,
            )?,
            blacklist_after_days: match env::var("LENDING_BLACKLIST_AFTER_DAYS") {
                Ok(raw) => raw
                    .trim()
                    .parse::<u32>()
                    .map_err(|_| ConfigError::InvalidBlacklistWindow)?,
                Err(_) => defaults.blacklist_after_days,
            },
        };

        Ok(Self {
            environment,
            server: ServerConfig { host, port },
            telemetry: TelemetryConfig { log_level },
            lending,
        })
    }
}

fn rate_from_env(key: &'static str, default: f64) -> Result<f64, ConfigError> {
    let Ok(raw) = env::var(key) else {
        return Ok(default);
    };

    match raw.trim().parse::<f64>() {
        Ok(rate) if rate.is_finite() && rate >= 0.0 => Ok(rate),
        _ => Err(ConfigError::InvalidRate { key, value: raw }),
    }
}

/// Settings controlling the HTTP server binding.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        if self.host.eq_ignore_ascii_case("localhost") {
            return Ok(SocketAddr::new(IpAddr::from([127, 0, 0, 1]), self.port));
        }

        let ip: IpAddr = self
            .host
            .parse()
            .map_err(|source| ConfigError::InvalidHost { source })?;

        Ok(SocketAddr::new(ip, self.port))
    }
}

/// Tracing controls.
#[derive(Debug, Clone)]
pub struct TelemetryConfig {
    pub log_level: String,
}

/// Pricing dials applied to newly created loans.
#[derive(Debug, Clone, PartialEq)]
pub struct LendingConfig {
    pub weekly_interest_rate: f64,
    pub daily_penalty_rate: f64,
    pub blacklist_after_days: u32,
}

impl LendingConfig {
    pub fn rate_card(&self) -> RateCard {
        RateCard {
            weekly_interest_rate: self.weekly_interest_rate,
            daily_penalty_rate: self.daily_penalty_rate,
        }
    }
}

impl Default for LendingConfig {
    fn default() -> Self {
        let rates = RateCard::default();
        Self {
            weekly_interest_rate: rates.weekly_interest_rate,
            daily_penalty_rate: rates.daily_penalty_rate,
            blacklist_after_days: 60,
        }
    }
}

#[derive(Debug)]
pub enum ConfigError {
    InvalidPort,
    InvalidHost { source: std::net::AddrParseError },
    InvalidRate { key: &'static str, value: String },
    InvalidBlacklistWindow,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidPort => write!(f, "APP_PORT must be a valid u16"),
            ConfigError::InvalidHost { .. } => {
                write!(f, "APP_HOST must parse to an IPv4 or IPv6 address")
            }
            ConfigError::InvalidRate { key, value } => {
                write!(f, "{key} must be a non-negative decimal (found '{value}')")
            }
            ConfigError::InvalidBlacklistWindow => {
                write!(f, "LENDING_BLACKLIST_AFTER_DAYS must be a whole number of days")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::InvalidHost { source } => Some(source),
            ConfigError::InvalidPort
            | ConfigError::InvalidRate { .. }
            | ConfigError::InvalidBlacklistWindow => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::{Mutex, OnceLock};

    fn env_guard() -> &'static Mutex<()> {
        static GUARD: OnceLock<Mutex<()>> = OnceLock::new();
        GUARD.get_or_init(|| Mutex::new(()))
    }

    fn reset_env() {
        env::remove_var("APP_ENV");
        env::remove_var("APP_HOST");
        env::remove_var("APP_PORT");
        env::remove_var("APP_LOG_LEVEL");
        env::remove_var("LENDING_WEEKLY_INTEREST_RATE");
        env::remove_var("LENDING_DAILY_PENALTY_RATE");
        env::remove_var("LENDING_BLACKLIST_AFTER_DAYS");
    }

    #[test]
    fn load_uses_defaults_when_env_missing() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        let config = AppConfig::load().expect("config loads with defaults");
        assert_eq!(config.environment, AppEnvironment::Development);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 3000);
        assert_eq!(config.telemetry.log_level, "info");
        assert_eq!(config.lending, LendingConfig::default());
        assert_eq!(config.lending.blacklist_after_days, 60);
    }

    #[test]
    fn accepts_localhost_host() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("APP_HOST", "localhost");
        let config = AppConfig::load().expect("config loads");
        let addr = config.server.socket_addr().expect("localhost resolves");
        assert_eq!(addr, SocketAddr::new(IpAddr::from([127, 0, 0, 1]), 3000));
        reset_env();
    }

    #[test]
    fn lending_rates_can_be_overridden() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("LENDING_WEEKLY_INTEREST_RATE", "0.12");
        env::set_var("LENDING_DAILY_PENALTY_RATE", "0.02");
        let config = AppConfig::load().expect("config loads");
        let rates = config.lending.rate_card();
        assert_eq!(rates.weekly_interest_rate, 0.12);
        assert_eq!(rates.daily_penalty_rate, 0.02);
        reset_env();
    }

    #[test]
    fn rejects_negative_rates() {
        let _lock = env_guard().lock().expect("env mutex poisoned");
        reset_env();
        env::set_var("LENDING_DAILY_PENALTY_RATE", "-0.5");
        match AppConfig::load() {
            Err(ConfigError::InvalidRate { key, .. }) => {
                assert_eq!(key, "LENDING_DAILY_PENALTY_RATE")
            }
            other => panic!("expected invalid rate, got {other:?}"),
        }
        reset_env();
    }
}

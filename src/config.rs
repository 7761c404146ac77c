//! Runtime configuration loaded from the environment (and `.env`).

use std::time::Duration;

use anyhow::{anyhow, Context};
use uuid::Uuid;

use crate::instruction::{CONNECT_TIMEOUT, PRINTER_ADDRESS, PRINTER_SERVICE, RETRY_BACKOFF};

/// Which peripheral to talk to. Fixed for the lifetime of the process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceIdentity {
    address: String,
    service: Uuid,
}

impl DeviceIdentity {
    pub fn new(address: impl Into<String>, service: Uuid) -> Self {
        Self {
            address: address.into(),
            service,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    pub fn service(&self) -> Uuid {
        self.service
    }

    /// Physical addresses compare case-insensitively.
    pub fn matches(&self, address: &str) -> bool {
        self.address.eq_ignore_ascii_case(address)
    }
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self::new(PRINTER_ADDRESS, PRINTER_SERVICE)
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub bind_address: String,
    pub port: u16,
    pub identity: DeviceIdentity,
    pub connect_timeout: Duration,
    pub retry_backoff: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".into(),
            port: 3000,
            identity: DeviceIdentity::default(),
            connect_timeout: CONNECT_TIMEOUT,
            retry_backoff: RETRY_BACKOFF,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a config from any key lookup. Missing or unparseable numbers
    /// keep their defaults; a bad address or service id is an error.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let defaults = Self::default();

        let address = match get("PRINTER_ADDRESS") {
            Some(v) => parse_address(&v)?,
            None => defaults.identity.address().to_string(),
        };
        let service = match get("PRINTER_SERVICE") {
            Some(v) => Uuid::parse_str(v.trim())
                .with_context(|| format!("invalid PRINTER_SERVICE {:?}", v))?,
            None => defaults.identity.service(),
        };

        Ok(Self {
            bind_address: get("BIND_ADDRESS")
                .filter(|v| !v.trim().is_empty())
                .unwrap_or(defaults.bind_address),
            port: parse_or(&get, "PORT", defaults.port),
            identity: DeviceIdentity::new(address, service),
            connect_timeout: Duration::from_secs(parse_or(
                &get,
                "CONNECT_TIMEOUT_SECS",
                defaults.connect_timeout.as_secs(),
            )),
            retry_backoff: Duration::from_secs(parse_or(
                &get,
                "RETRY_BACKOFF_SECS",
                defaults.retry_backoff.as_secs(),
            )),
        })
    }
}

fn parse_or<T: std::str::FromStr + Copy + std::fmt::Display>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    match get(key) {
        Some(v) => v.trim().parse().unwrap_or_else(|_| {
            log::warn!(target: "config", "ignoring {}={:?}, using {}", key, v, default);
            default
        }),
        None => default,
    }
}

fn parse_address(v: &str) -> anyhow::Result<String> {
    let v = v.trim();
    let octets: Vec<&str> = v.split(':').collect();
    let valid = octets.len() == 6
        && octets
            .iter()
            .all(|o| o.len() == 2 && o.chars().all(|c| c.is_ascii_hexdigit()));
    if !valid {
        return Err(anyhow!("invalid PRINTER_ADDRESS {:?}", v));
    }
    Ok(v.to_string())
}

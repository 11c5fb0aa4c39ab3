//! config-rs/lib.rs
//! Shared configuration utilities for consistent service configuration
//! Provides standardized functions for port/address and setting lookup

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Once;

static DOTENV: Once = Once::new();

/// Load a `.env` file from the working directory, once per process.
pub fn load_dotenv() {
    DOTENV.call_once(|| {
        if dotenv::dotenv().is_ok() {
            log::debug!("Loaded environment overrides from .env");
        }
    });
}

/// Convert a service name like "calc-api" into its environment prefix ("CALC_API")
pub fn env_prefix(service_name: &str) -> String {
    service_name.replace('-', "_").to_uppercase()
}

/// Get service port from environment variables with proper fallback
///
/// # Arguments
/// * `service_name` - The name of the service (e.g., "CALC_API")
/// * `default_port` - The default port to use if not specified in environment
///
/// # Returns
/// The port number to use for the service
pub fn get_service_port(service_name: &str, default_port: u16) -> u16 {
    let var_name = format!("{}_SERVICE_PORT", env_prefix(service_name));
    env::var(&var_name)
        .unwrap_or_else(|_| default_port.to_string())
        .parse::<u16>()
        .unwrap_or_else(|_| {
            log::warn!("Invalid port in {}, using default {}", var_name, default_port);
            default_port
        })
}

/// Create a SocketAddr for binding a service
///
/// A full `<SERVICE>_SERVICE_ADDR` override wins over the port setting; it may
/// be given as `host:port` or `http://host:port`.
pub fn get_bind_address(service_name: &str, default_port: u16) -> SocketAddr {
    let var_name = format!("{}_SERVICE_ADDR", env_prefix(service_name));

    if let Ok(addr_str) = env::var(&var_name) {
        let bare = addr_str
            .strip_prefix("http://")
            .or_else(|| addr_str.strip_prefix("https://"))
            .unwrap_or(&addr_str);
        match bare.parse::<SocketAddr>() {
            Ok(addr) => return addr,
            Err(_) => log::warn!("Invalid address format in {}, using default", var_name),
        }
    }

    let port = get_service_port(service_name, default_port);
    SocketAddr::from(([0, 0, 0, 0], port))
}

/// Environment-backed configuration scoped to one service
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    service_name: String,
    prefix: String,
}

impl ServiceConfig {
    /// Create a config view for `service_name`, loading `.env` on first use
    pub fn new(service_name: &str) -> Self {
        load_dotenv();
        Self {
            service_name: service_name.to_string(),
            prefix: env_prefix(service_name),
        }
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn get_service_port(&self, default_port: u16) -> u16 {
        get_service_port(&self.service_name, default_port)
    }

    pub fn get_bind_address(&self, default_port: u16) -> SocketAddr {
        get_bind_address(&self.service_name, default_port)
    }

    /// Name of the environment variable backing `key`, e.g. `CALC_API_LOG_STORE`
    pub fn setting_var(&self, key: &str) -> String {
        format!("{}_{}", self.prefix, key.to_uppercase())
    }

    /// Raw setting value, `None` when unset or blank
    pub fn get_optional_setting(&self, key: &str) -> Option<String> {
        env::var(self.setting_var(key))
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    pub fn get_setting(&self, key: &str, default: &str) -> String {
        self.get_optional_setting(key)
            .unwrap_or_else(|| default.to_string())
    }

    /// Parsed setting value; unparseable values fall back to `default` with a warning
    pub fn get_parsed_setting<T>(&self, key: &str, default: T) -> T
    where
        T: FromStr + std::fmt::Display,
    {
        match self.get_optional_setting(key) {
            Some(raw) => raw.parse::<T>().unwrap_or_else(|_| {
                log::warn!(
                    "Invalid value '{}' in {}, using default {}",
                    raw,
                    self.setting_var(key),
                    default
                );
                default
            }),
            None => default,
        }
    }
}

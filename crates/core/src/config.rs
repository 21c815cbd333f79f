use config::{Config, ConfigError, Environment, File};
use secrecy::SecretString;
use serde::Deserialize;
use std::time::Duration;

use crate::error::{Error, Result};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub tls: TlsConfig,
    pub cache: CacheConfig,
    pub provider: ProviderConfig,
    pub limits: LimitsConfig,
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Seconds in-flight requests get to finish after a shutdown signal.
    pub shutdown_grace_secs: u64,
}

/// Lowest TLS protocol version the listener will negotiate.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub enum TlsVersion {
    #[serde(rename = "1.2")]
    Tls12,
    #[serde(rename = "1.3")]
    Tls13,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TlsConfig {
    pub cert_path: String,
    pub key_path: String,
    /// CA bundle used to verify client certificates.
    pub client_ca_path: String,
    pub min_version: TlsVersion,
}

#[derive(Debug, Deserialize, Clone)]
pub struct CacheConfig {
    /// Unset means the in-memory store.
    pub redis_url: Option<SecretString>,
    pub key_prefix: String,
    pub ttl_secs: u64,
}

impl CacheConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Provider call budget used when `provider.timeout_ms` is unset.
pub const DEFAULT_PROVIDER_TIMEOUT_MS: u64 = 300_000;

#[derive(Debug, Deserialize, Clone)]
pub struct ProviderConfig {
    pub endpoint: String,
    pub api_token: Option<SecretString>,
    pub timeout_ms: Option<u64>,
    /// Backend used when a request does not name one.
    pub default_backend: String,
}

impl ProviderConfig {
    /// Upper bound on one provider call.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.unwrap_or(DEFAULT_PROVIDER_TIMEOUT_MS))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LimitsConfig {
    pub max_program_bytes: usize,
    pub max_shots: u32,
    pub max_params: usize,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelemetryConfig {
    pub json_logs: bool,
    pub otlp_endpoint: Option<String>,
    pub service_name: String,
}

impl AppConfig {
    pub fn load() -> std::result::Result<Self, ConfigError> {
        let env = std::env::var("QPU_ENV").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default"))
            .add_source(File::with_name(&format!("config/{}", env)).required(false))
            .add_source(File::with_name("config/local").required(false))
            // Map QPU__SERVER__PORT=50051 to server.port
            .add_source(
                Environment::with_prefix("QPU")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        s.try_deserialize()
    }

    /// Reject settings the gateway cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.cache.ttl_secs == 0 {
            return Err(Error::config("cache.ttl_secs must be > 0"));
        }
        if self.limits.max_shots == 0 {
            return Err(Error::config("limits.max_shots must be > 0"));
        }
        if self.provider.endpoint.trim().is_empty() {
            return Err(Error::config("provider.endpoint must be set"));
        }
        if self.provider.timeout_ms == Some(0) {
            return Err(Error::config("provider.timeout_ms must be > 0"));
        }
        if self.provider.default_backend.trim().is_empty() {
            return Err(Error::config("provider.default_backend must be set"));
        }
        Ok(())
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_program_bytes: 1024 * 1024, // 1MB
            max_shots: 100_000,
            max_params: 4096,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".into(),
                port: 50051,
                shutdown_grace_secs: 30,
            },
            tls: TlsConfig {
                cert_path: "certs/server.pem".into(),
                key_path: "certs/server.key".into(),
                client_ca_path: "certs/client-ca.pem".into(),
                min_version: TlsVersion::Tls13,
            },
            cache: CacheConfig {
                redis_url: None,
                key_prefix: "qpu:result".into(),
                ttl_secs: 24 * 60 * 60,
            },
            provider: ProviderConfig {
                endpoint: "http://localhost:8080".into(),
                api_token: None,
                timeout_ms: Some(DEFAULT_PROVIDER_TIMEOUT_MS),
                default_backend: "Aspen-M-3".into(),
            },
            limits: LimitsConfig::default(),
            telemetry: TelemetryConfig {
                json_logs: false,
                otlp_endpoint: None,
                service_name: "qpu-gateway".into(),
            },
        }
    }
}

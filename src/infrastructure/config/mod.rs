//! Process configuration
//!
//! Layered with figment: built-in defaults, then an optional `querygate.toml`,
//! then environment variables (after `.env` has been loaded by the caller).

use crate::application::use_cases::rate_limiter::RateLimitConfig;
use crate::application::use_cases::response_cache::{
    CacheConfig, DEFAULT_CACHE_MAX_ENTRIES, DEFAULT_CACHE_TTL_SECS, DEFAULT_SWEEP_INTERVAL_SECS,
};
use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::{
    LLMConfig, DEFAULT_GEMINI_ENDPOINT, DEFAULT_GEMINI_MODEL, MAX_GENERATOR_TIMEOUT_SECS,
};
use crate::infrastructure::db::DbConnectionConfig;
use crate::infrastructure::notifier::whatsapp::{WhatsAppConfig, DEFAULT_WHATSAPP_API_BASE};
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Deserializer, Serialize};
use url::Url;

pub const CONFIG_FILE: &str = "querygate.toml";

const ENV_KEYS: &[&str] = &[
    "database_url",
    "port",
    "log_level",
    "gemini_api_key",
    "gemini_endpoint",
    "gemini_model",
    "generator_timeout_secs",
    "rate_limit_per_minute",
    "rate_limit_per_hour",
    "cache_ttl_secs",
    "cache_sweep_interval_secs",
    "db_max_connections",
    "db_query_timeout_secs",
    "whatsapp_token",
    "whatsapp_phone_number_id",
    "whatsapp_api_base",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub database_url: Option<String>,
    pub port: u16,
    pub log_level: String,
    pub gemini_api_key: Option<String>,
    pub gemini_endpoint: String,
    pub gemini_model: String,
    pub generator_timeout_secs: u64,
    pub rate_limit_per_minute: usize,
    pub rate_limit_per_hour: usize,
    pub cache_ttl_secs: u64,
    pub cache_sweep_interval_secs: u64,
    pub db_max_connections: u32,
    pub db_query_timeout_secs: u64,
    #[serde(default, deserialize_with = "string_or_number")]
    pub whatsapp_token: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub whatsapp_phone_number_id: Option<String>,
    pub whatsapp_api_base: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        let limits = RateLimitConfig::default();
        Self {
            database_url: None,
            port: 3000,
            log_level: "info".to_string(),
            gemini_api_key: None,
            gemini_endpoint: DEFAULT_GEMINI_ENDPOINT.to_string(),
            gemini_model: DEFAULT_GEMINI_MODEL.to_string(),
            generator_timeout_secs: MAX_GENERATOR_TIMEOUT_SECS,
            rate_limit_per_minute: limits.max_requests_per_minute,
            rate_limit_per_hour: limits.max_requests_per_hour,
            cache_ttl_secs: DEFAULT_CACHE_TTL_SECS,
            cache_sweep_interval_secs: DEFAULT_SWEEP_INTERVAL_SECS,
            db_max_connections: DbConnectionConfig::default().max_connections,
            db_query_timeout_secs: DbConnectionConfig::default().query_timeout_secs,
            whatsapp_token: None,
            whatsapp_phone_number_id: None,
            whatsapp_api_base: DEFAULT_WHATSAPP_API_BASE.to_string(),
        }
    }
}

/// Env values that look numeric (phone number ids) arrive as numbers.
fn string_or_number<'de, D>(deserializer: D) -> std::result::Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Unsigned(u64),
        Signed(i64),
    }

    Ok(Option::<Raw>::deserialize(deserializer)?.map(|raw| match raw {
        Raw::Text(s) => s,
        Raw::Unsigned(n) => n.to_string(),
        Raw::Signed(n) => n.to_string(),
    }))
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl GatewayConfig {
    /// Defaults, then `querygate.toml`, then the environment.
    pub fn load() -> Result<Self> {
        let figment = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(CONFIG_FILE))
            .merge(Env::raw().only(ENV_KEYS));
        Self::from_figment(figment)
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: Self = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.rate_limit_per_minute == 0 || self.rate_limit_per_hour == 0 {
            return Err(AppError::ConfigError(
                "Rate limit ceilings must be greater than zero".to_string(),
            ));
        }
        if self.cache_ttl_secs == 0 {
            return Err(AppError::ConfigError(
                "CACHE_TTL_SECS must be greater than zero".to_string(),
            ));
        }
        if self.cache_sweep_interval_secs == 0
            || self.cache_sweep_interval_secs > self.cache_ttl_secs
        {
            return Err(AppError::ConfigError(format!(
                "CACHE_SWEEP_INTERVAL_SECS must be between 1 and CACHE_TTL_SECS ({})",
                self.cache_ttl_secs
            )));
        }
        for (key, value) in [
            ("GEMINI_ENDPOINT", &self.gemini_endpoint),
            ("WHATSAPP_API_BASE", &self.whatsapp_api_base),
        ] {
            Url::parse(value).map_err(|e| {
                AppError::ConfigError(format!("{} is not a valid URL: {}", key, e))
            })?;
        }
        if self.db_max_connections == 0 {
            return Err(AppError::ConfigError(
                "DB_MAX_CONNECTIONS must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    pub fn database_url(&self) -> Result<String> {
        non_blank(&self.database_url)
            .ok_or_else(|| AppError::ConfigError("DATABASE_URL is not set".to_string()))
    }

    pub fn llm_config(&self) -> LLMConfig {
        LLMConfig {
            base_url: self.gemini_endpoint.clone(),
            model: self.gemini_model.clone(),
            api_key: non_blank(&self.gemini_api_key),
            timeout_secs: self
                .generator_timeout_secs
                .clamp(1, MAX_GENERATOR_TIMEOUT_SECS),
            ..Default::default()
        }
    }

    pub fn rate_limit_config(&self) -> RateLimitConfig {
        RateLimitConfig {
            max_requests_per_minute: self.rate_limit_per_minute,
            max_requests_per_hour: self.rate_limit_per_hour,
        }
    }

    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig {
            ttl_secs: self.cache_ttl_secs,
            sweep_interval_secs: self.cache_sweep_interval_secs,
            max_entries: DEFAULT_CACHE_MAX_ENTRIES,
        }
    }

    pub fn db_config(&self) -> DbConnectionConfig {
        DbConnectionConfig {
            max_connections: self.db_max_connections,
            query_timeout_secs: self.db_query_timeout_secs,
            ..Default::default()
        }
    }

    /// `None` unless both the token and the phone number id are set.
    pub fn whatsapp_config(&self) -> Option<WhatsAppConfig> {
        Some(WhatsAppConfig {
            api_base: self.whatsapp_api_base.clone(),
            phone_number_id: non_blank(&self.whatsapp_phone_number_id)?,
            token: non_blank(&self.whatsapp_token)?,
        })
    }
}

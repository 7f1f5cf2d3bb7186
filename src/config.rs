// ⚙️ Configuration
// Settings read once at start-up from the environment.

use crate::error::{NormalizeError, Result};
use crate::mapping::ERP_NEXT;
use crate::resilience::RetryConfig;
use crate::schema::EntityType;
use std::collections::HashMap;
use std::str::FromStr;
use std::time::Duration;

// ============================================================================
// ADAPTER ROUTING
// ============================================================================

/// Which backend serves which entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterRouting {
    default: String,
    overrides: HashMap<EntityType, String>,
}

impl AdapterRouting {
    pub fn new(default: impl Into<String>) -> Self {
        AdapterRouting {
            default: default.into(),
            overrides: HashMap::new(),
        }
    }

    /// Builder: send one entity type to a different backend
    pub fn with_override(mut self, entity_type: EntityType, source_system: impl Into<String>) -> Self {
        self.overrides.insert(entity_type, source_system.into());
        self
    }

    pub fn default_source(&self) -> &str {
        &self.default
    }

    /// Explicit choice first, then the entity's override, then the default.
    pub fn resolve<'a>(&'a self, entity_type: EntityType, explicit: Option<&'a str>) -> &'a str {
        explicit
            .or_else(|| self.overrides.get(&entity_type).map(String::as_str))
            .unwrap_or(&self.default)
    }
}

impl Default for AdapterRouting {
    fn default() -> Self {
        AdapterRouting::new(ERP_NEXT)
    }
}

// ============================================================================
// SETTINGS
// ============================================================================

#[derive(Debug, Clone)]
pub struct Settings {
    pub routing: AdapterRouting,
    pub retry: RetryConfig,
    pub request_timeout: Option<Duration>,
    /// Used when `RUST_LOG` is not set
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            routing: AdapterRouting::default(),
            retry: RetryConfig::default(),
            request_timeout: None,
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    /// Read settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build settings from any key lookup.
    ///
    /// Unset or blank keys keep their defaults; present keys must parse.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let mut settings = Settings::default();

        if let Some(default) = get("DEFAULT_ADAPTER") {
            settings.routing.default = default;
        }
        for entity_type in EntityType::ALL {
            let key = format!("{}_ADAPTER", entity_type.as_str().to_uppercase());
            if let Some(source_system) = get(&key) {
                settings.routing.overrides.insert(entity_type, source_system);
            }
        }

        let retry = &mut settings.retry;
        if let Some(v) = parse::<u32>(&get, "MAX_RETRIES")? {
            retry.max_attempts = v;
        }
        if let Some(v) = parse::<f64>(&get, "RETRY_BACKOFF_FACTOR")? {
            retry.backoff_factor = v;
        }
        if let Some(v) = parse::<u64>(&get, "RETRY_MIN_WAIT_MS")? {
            retry.min_wait = Duration::from_millis(v);
        }
        if let Some(v) = parse::<u64>(&get, "RETRY_MAX_WAIT_MS")? {
            retry.max_wait = Duration::from_millis(v);
        }
        if let Some(v) = parse::<u64>(&get, "RATE_LIMIT_MIN_WAIT_MS")? {
            retry.rate_limit_min_wait = Duration::from_millis(v);
        }
        retry.validate()?;

        settings.request_timeout = parse::<u64>(&get, "REQUEST_TIMEOUT_SECS")?.map(Duration::from_secs);
        if let Some(level) = get("LOG_LEVEL") {
            settings.log_level = level;
        }

        Ok(settings)
    }
}

fn parse<T: FromStr>(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    match get(key) {
        None => Ok(None),
        Some(raw) => raw
            .parse()
            .map(Some)
            .map_err(|_| NormalizeError::Config(format!("{} has an invalid value `{}`", key, raw))),
    }
}

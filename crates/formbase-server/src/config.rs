//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;

use formbase_core::limits::DEFAULT_MAX_FIELDS;
use formbase_core::FieldLimits;
use formbase_store::drafts::DEFAULT_DRAFT_MAX_AGE_DAYS;

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// Filesystem path of the SQLite database.  When unset, the store
    /// picks the platform data directory.
    /// Env: `DATABASE_PATH`
    pub database_path: Option<PathBuf>,

    /// Human-readable name for this instance.
    /// Env: `INSTANCE_NAME`
    /// Default: `"Formbase"`
    pub instance_name: String,

    /// Maximum number of fields accepted per form.
    /// Env: `MAX_FIELDS`
    /// Default: `100`
    pub max_fields: usize,

    /// Drafts unsaved for longer than this many days are reaped by the
    /// periodic cleanup task.
    /// Env: `DRAFT_MAX_AGE_DAYS`
    /// Default: `30`
    pub draft_max_age_days: i64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 8080).into(),
            database_path: None,
            instance_name: "Formbase".to_string(),
            max_fields: DEFAULT_MAX_FIELDS,
            draft_max_age_days: DEFAULT_DRAFT_MAX_AGE_DAYS,
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(addr) = std::env::var("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(
                    value = %addr,
                    "Invalid HTTP_ADDR, using default"
                );
            }
        }

        if let Ok(path) = std::env::var("DATABASE_PATH") {
            config.database_path = Some(PathBuf::from(path));
        }

        if let Ok(name) = std::env::var("INSTANCE_NAME") {
            config.instance_name = name;
        }

        if let Ok(val) = std::env::var("MAX_FIELDS") {
            match val.parse::<usize>() {
                Ok(n) if n > 0 => config.max_fields = n,
                _ => tracing::warn!(value = %val, "Invalid MAX_FIELDS, using default"),
            }
        }

        if let Ok(val) = std::env::var("DRAFT_MAX_AGE_DAYS") {
            match val.parse::<i64>() {
                Ok(n) if n > 0 => config.draft_max_age_days = n,
                _ => tracing::warn!(value = %val, "Invalid DRAFT_MAX_AGE_DAYS, using default"),
            }
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter,
        // so we do not store it here.

        config
    }

    /// The field limits handed to the sanitization pipeline.
    pub fn field_limits(&self) -> FieldLimits {
        FieldLimits {
            max_fields: self.max_fields,
            ..FieldLimits::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ServerConfig::default();
        assert_eq!(config.http_addr, ([0, 0, 0, 0], 8080).into());
        assert_eq!(config.max_fields, 100);
        assert_eq!(config.draft_max_age_days, 30);
    }

    #[test]
    fn test_field_limits_carry_max_fields() {
        let config = ServerConfig {
            max_fields: 25,
            ..ServerConfig::default()
        };
        assert_eq!(config.field_limits().max_fields, 25);
    }
}

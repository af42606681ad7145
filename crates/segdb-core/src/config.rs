use crate::app_config::{AppConfig, Environment};
use crate::ConfigError;

/// Load application configuration from environment variables.
///
/// Calls `dotenvy::dotenv().ok()` to load `.env` files before reading env vars.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config() -> Result<AppConfig, ConfigError> {
    dotenvy::dotenv().ok();
    load_app_config_from_env()
}

/// Load application configuration from environment variables already in the process.
///
/// Unlike [`load_app_config`], this does NOT load `.env` files.
///
/// # Errors
///
/// Returns `ConfigError` if required env vars are missing or values are invalid.
pub fn load_app_config_from_env() -> Result<AppConfig, ConfigError> {
    build_app_config(|key| std::env::var(key))
}

/// Build application configuration using the provided env-var lookup function.
///
/// Parsing and validation are decoupled from the process environment so tests
/// can drive this with a plain `HashMap`.
fn build_app_config<F>(lookup: F) -> Result<AppConfig, ConfigError>
where
    F: Fn(&str) -> Result<String, std::env::VarError>,
{
    use std::net::SocketAddr;

    let require = |var: &str| -> Result<String, ConfigError> {
        lookup(var).map_err(|_| ConfigError::MissingEnvVar(var.to_string()))
    };

    let or_default = |var: &str, default: &str| -> String {
        lookup(var).unwrap_or_else(|_| default.to_string())
    };

    let invalid = |var: &str, reason: String| ConfigError::InvalidEnvVar {
        var: var.to_string(),
        reason,
    };

    let parse_addr = |var: &str, default: &str| -> Result<SocketAddr, ConfigError> {
        or_default(var, default)
            .parse::<SocketAddr>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u32 = |var: &str, default: &str| -> Result<u32, ConfigError> {
        or_default(var, default)
            .parse::<u32>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let parse_u64 = |var: &str, default: &str| -> Result<u64, ConfigError> {
        or_default(var, default)
            .parse::<u64>()
            .map_err(|e| invalid(var, e.to_string()))
    };

    let database_url = require("DATABASE_URL")?;
    let env = parse_environment(&or_default("SEGDB_ENV", "development"))?;
    let bind_addr = parse_addr("SEGDB_BIND_ADDR", "0.0.0.0:3000")?;
    let log_level = or_default("SEGDB_LOG_LEVEL", "info");

    let db_max_connections = parse_u32("SEGDB_DB_MAX_CONNECTIONS", "10")?;
    let db_min_connections = parse_u32("SEGDB_DB_MIN_CONNECTIONS", "1")?;
    if db_min_connections > db_max_connections {
        return Err(invalid(
            "SEGDB_DB_MIN_CONNECTIONS",
            format!(
                "min connections ({db_min_connections}) exceeds max connections ({db_max_connections})"
            ),
        ));
    }
    let db_acquire_timeout_secs = parse_u64("SEGDB_DB_ACQUIRE_TIMEOUT_SECS", "10")?;

    let compute_url = or_default("SEGDB_COMPUTE_URL", "http://localhost:5001/api");
    if !(compute_url.starts_with("http://") || compute_url.starts_with("https://")) {
        return Err(invalid(
            "SEGDB_COMPUTE_URL",
            format!("expected an http(s) URL, got '{compute_url}'"),
        ));
    }
    let compute_timeout_secs = parse_u64("SEGDB_COMPUTE_TIMEOUT_SECS", "300")?;
    if compute_timeout_secs == 0 {
        return Err(invalid(
            "SEGDB_COMPUTE_TIMEOUT_SECS",
            "timeout must be at least one second".to_string(),
        ));
    }
    let compute_connect_timeout_secs = parse_u64("SEGDB_COMPUTE_CONNECT_TIMEOUT_SECS", "10")?;
    let compute_retry_backoff_ms = parse_u64("SEGDB_COMPUTE_RETRY_BACKOFF_MS", "500")?;

    let pending_grace_secs = parse_u64("SEGDB_PENDING_GRACE_SECS", "600")?;
    if pending_grace_secs <= compute_timeout_secs {
        return Err(invalid(
            "SEGDB_PENDING_GRACE_SECS",
            format!(
                "grace window ({pending_grace_secs}s) must exceed the compute timeout ({compute_timeout_secs}s)"
            ),
        ));
    }
    let sweep_cron = or_default("SEGDB_SWEEP_CRON", "0 */5 * * * *");

    Ok(AppConfig {
        database_url,
        env,
        bind_addr,
        log_level,
        db_max_connections,
        db_min_connections,
        db_acquire_timeout_secs,
        compute_url,
        compute_timeout_secs,
        compute_connect_timeout_secs,
        compute_retry_backoff_ms,
        pending_grace_secs,
        sweep_cron,
    })
}

/// Parse a string into an `Environment` variant.
fn parse_environment(s: &str) -> Result<Environment, ConfigError> {
    match s {
        "development" => Ok(Environment::Development),
        "test" => Ok(Environment::Test),
        "production" => Ok(Environment::Production),
        other => Err(ConfigError::InvalidEnvVar {
            var: "SEGDB_ENV".to_string(),
            reason: format!("unknown environment '{other}'"),
        }),
    }
}

#[cfg(test)]
#[path = "config_test.rs"]
mod tests;

//! Configuration loader
//!
//! Loads application configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If incomplete, falls back to loading from a TOML file
//!
//! ## Environment Variables
//! - `FLASHMART_DB_PATH`: Database file path (required)
//! - `FLASHMART_DB_POOL_SIZE`: Connection pool size (required)
//! - `FLASHMART_CACHE_NULL_TTL_SECS`: Null-marker TTL in seconds
//! - `FLASHMART_CACHE_REBUILD_LOCK_LEASE_SECS`: Rebuild-lock lease in seconds
//! - `FLASHMART_CACHE_REBUILD_WORKERS`: Bound on concurrent cache rebuilds
//! - `FLASHMART_ORDER_STREAM`: Order stream name
//! - `FLASHMART_CONSUMER_GROUP`: Consumer-group name
//! - `FLASHMART_CONSUMER_NAME`: Consumer name within the group
//! - `FLASHMART_BLOCK_TIMEOUT_SECS`: Blocking-read timeout in seconds
//!
//! Optional variables fall back to the defaults in
//! [`flashmart_domain::config`].
//!
//! ## File Locations
//! With no explicit path the loader probes `./config.toml` then
//! `./flashmart.toml`.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use flashmart_domain::{Config, FlashMartError, Result};
use tracing::{debug, info};

const PROBED_PATHS: [&str; 2] = ["config.toml", "flashmart.toml"];

/// Load configuration with automatic fallback strategy.
pub fn load() -> Result<Config> {
    match load_from_env() {
        Ok(config) => {
            info!("config.loaded_from_environment");
            Ok(config)
        }
        Err(e) => {
            debug!(error = ?e, "config.environment_incomplete_trying_file");
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables.
///
/// The database variables are required; everything else falls back to the
/// documented defaults.
pub fn load_from_env() -> Result<Config> {
    let mut config = Config::default();

    config.database.path = require_var("FLASHMART_DB_PATH")?;
    config.database.pool_size = parse_var("FLASHMART_DB_POOL_SIZE", None)?;

    let defaults = Config::default();
    config.cache.null_ttl_secs =
        parse_var("FLASHMART_CACHE_NULL_TTL_SECS", Some(defaults.cache.null_ttl_secs))?;
    config.cache.rebuild_lock_lease_secs = parse_var(
        "FLASHMART_CACHE_REBUILD_LOCK_LEASE_SECS",
        Some(defaults.cache.rebuild_lock_lease_secs),
    )?;
    config.cache.rebuild_workers =
        parse_var("FLASHMART_CACHE_REBUILD_WORKERS", Some(defaults.cache.rebuild_workers))?;

    if let Ok(stream) = std::env::var("FLASHMART_ORDER_STREAM") {
        config.seckill.order_stream = stream;
    }
    if let Ok(group) = std::env::var("FLASHMART_CONSUMER_GROUP") {
        config.seckill.consumer_group = group;
    }
    if let Ok(name) = std::env::var("FLASHMART_CONSUMER_NAME") {
        config.seckill.consumer_name = name;
    }
    config.seckill.block_timeout_secs =
        parse_var("FLASHMART_BLOCK_TIMEOUT_SECS", Some(defaults.seckill.block_timeout_secs))?;

    Ok(config)
}

/// Load configuration from a TOML file, probing the default locations when
/// no explicit path is given.
pub fn load_from_file(path: Option<&Path>) -> Result<Config> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => probe_default_paths().ok_or_else(|| {
            FlashMartError::Config("no configuration file found in default locations".into())
        })?,
    };

    let raw = std::fs::read_to_string(&path)
        .map_err(|e| FlashMartError::Config(format!("cannot read {}: {e}", path.display())))?;
    let config = toml::from_str(&raw)
        .map_err(|e| FlashMartError::Config(format!("cannot parse {}: {e}", path.display())))?;

    info!(path = %path.display(), "config.loaded_from_file");
    Ok(config)
}

fn probe_default_paths() -> Option<PathBuf> {
    PROBED_PATHS.iter().map(PathBuf::from).find(|p| p.exists())
}

fn require_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| FlashMartError::Config(format!("missing environment variable {name}")))
}

fn parse_var<T: FromStr>(name: &str, default: Option<T>) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| FlashMartError::Config(format!("invalid value for {name}: {e}"))),
        Err(_) => {
            default.ok_or_else(|| FlashMartError::Config(format!("missing environment variable {name}")))
        }
    }
}

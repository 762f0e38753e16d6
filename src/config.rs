//! Process configuration, read once from the environment (and `.env`) at
//! startup and handed to the components that need it.

use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use url::Url;

use crate::error::ContentError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageKind {
    Local,
    Memory,
    Gcs,
    S3,
}

impl FromStr for StorageKind {
    type Err = ContentError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "local" | "fs" => Ok(StorageKind::Local),
            "memory" => Ok(StorageKind::Memory),
            "gcs" | "gs" => Ok(StorageKind::Gcs),
            "s3" => Ok(StorageKind::S3),
            other => Err(ContentError::ConfigError {
                message: format!("Unsupported STORAGE_BACKEND: {}", other),
            }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app_name: String,
    pub app_env: String,
    pub debug: bool,
    pub log_level: String,
    pub http_host: IpAddr,
    pub http_port: u16,
    /// `None` selects the in-memory catalog.
    pub database_url: Option<String>,
    pub storage_kind: StorageKind,
    pub storage_root: PathBuf,
    pub storage_bucket: Option<String>,
    pub request_timeout: Duration,
    pub max_upload_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            app_name: "Content Catalog".to_string(),
            app_env: "dev".to_string(),
            debug: true,
            log_level: "debug".to_string(),
            http_host: IpAddr::from([0, 0, 0, 0]),
            http_port: 8000,
            database_url: None,
            storage_kind: StorageKind::Local,
            storage_root: PathBuf::from("/data/storage"),
            storage_bucket: None,
            request_timeout: Duration::from_secs(30),
            max_upload_bytes: 100 * 1024 * 1024,
        }
    }
}

fn parse_var<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> Result<T, ContentError> {
    match lookup(key) {
        Some(raw) => raw.trim().parse().map_err(|_| ContentError::ConfigError {
            message: format!("Invalid {}: {}", key, raw),
        }),
        None => Ok(default),
    }
}

fn parse_bool(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: bool,
) -> Result<bool, ContentError> {
    match lookup(key).map(|raw| raw.trim().to_lowercase()) {
        None => Ok(default),
        Some(raw) => match raw.as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ContentError::ConfigError {
                message: format!("Invalid {}: {}", key, raw),
            }),
        },
    }
}

impl AppConfig {
    /// Reads the process environment.
    ///
    /// Environment variables:
    /// - `APP_NAME`, `APP_ENV`, `DEBUG`, `LOG_LEVEL`
    /// - `HTTP_HOST` / `HTTP_PORT`: listen address (default 0.0.0.0:8000)
    /// - `DATABASE_URL`: Postgres URL; unset or `memory://` keeps the catalog in memory
    /// - `STORAGE_BACKEND`: local | memory | gcs | s3 (default local)
    /// - `STORAGE_ROOT`: root directory for the local backend
    /// - `STORAGE_BUCKET`: bucket for gcs / s3
    /// - `REQUEST_TIMEOUT_SECS`, `MAX_UPLOAD_BYTES`
    pub fn from_env() -> Result<Self, ContentError> {
        Self::from_lookup(|key| std::env::var(key).ok().filter(|v| !v.trim().is_empty()))
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ContentError> {
        let defaults = Self::default();

        let debug = parse_bool(&lookup, "DEBUG", defaults.debug)?;
        let default_level = if debug { "debug" } else { "info" };

        let database_url = lookup("DATABASE_URL").filter(|url| !url.starts_with("memory://"));

        let storage_kind = parse_var(&lookup, "STORAGE_BACKEND", defaults.storage_kind)?;
        let storage_bucket = lookup("STORAGE_BUCKET");
        if matches!(storage_kind, StorageKind::Gcs | StorageKind::S3) && storage_bucket.is_none()
        {
            return Err(ContentError::ConfigError {
                message: "STORAGE_BUCKET is required for gcs and s3 storage".to_string(),
            });
        }

        let timeout_secs: u64 = parse_var(
            &lookup,
            "REQUEST_TIMEOUT_SECS",
            defaults.request_timeout.as_secs(),
        )?;

        Ok(Self {
            app_name: lookup("APP_NAME").unwrap_or(defaults.app_name),
            app_env: lookup("APP_ENV").unwrap_or(defaults.app_env),
            debug,
            log_level: lookup("LOG_LEVEL")
                .map(|level| level.to_lowercase())
                .unwrap_or_else(|| default_level.to_string()),
            http_host: parse_var(&lookup, "HTTP_HOST", defaults.http_host)?,
            http_port: parse_var(&lookup, "HTTP_PORT", defaults.http_port)?,
            database_url,
            storage_kind,
            storage_root: lookup("STORAGE_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.storage_root),
            storage_bucket,
            request_timeout: Duration::from_secs(timeout_secs),
            max_upload_bytes: parse_var(&lookup, "MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?,
        })
    }

    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.http_host, self.http_port)
    }

    /// Database URL with the password masked, for logging.
    pub fn redacted_database_url(&self) -> Option<String> {
        self.database_url.as_deref().map(|raw| match Url::parse(raw) {
            Ok(mut url) => {
                if url.password().is_some() {
                    let _ = url.set_password(Some("***"));
                }
                url.to_string()
            }
            Err(_) => "<unparseable>".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ContentError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn test_defaults_without_environment() {
        let config = config_from(&[]).unwrap();

        assert_eq!(config.http_port, 8000);
        assert_eq!(config.storage_kind, StorageKind::Local);
        assert_eq!(config.storage_root, PathBuf::from("/data/storage"));
        assert!(config.database_url.is_none());
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_overrides_are_parsed() {
        let config = config_from(&[
            ("DEBUG", "false"),
            ("HTTP_PORT", "9090"),
            ("STORAGE_BACKEND", "memory"),
            ("REQUEST_TIMEOUT_SECS", "5"),
            ("DATABASE_URL", "postgres://u:secret@db:5432/catalog"),
        ])
        .unwrap();

        assert!(!config.debug);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.listen_addr().port(), 9090);
        assert_eq!(config.storage_kind, StorageKind::Memory);
        assert_eq!(config.request_timeout, Duration::from_secs(5));
        assert_eq!(
            config.redacted_database_url().unwrap(),
            "postgres://u:***@db:5432/catalog"
        );
    }

    #[test]
    fn test_invalid_values_fail() {
        assert!(config_from(&[("HTTP_PORT", "not-a-port")]).is_err());
        assert!(config_from(&[("STORAGE_BACKEND", "ftp")]).is_err());
        assert!(config_from(&[("STORAGE_BACKEND", "gcs")]).is_err());
        assert!(config_from(&[("STORAGE_BACKEND", "s3"), ("STORAGE_BUCKET", "b")]).is_ok());
    }

    #[test]
    fn test_memory_database_url_selects_memory_catalog() {
        let config = config_from(&[("DATABASE_URL", "memory://")]).unwrap();
        assert!(config.database_url.is_none());
    }
}

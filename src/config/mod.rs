// mongobackup/src/config/mod.rs
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::warn;
use url::Url;

use crate::errors::AppError;

pub const DEFAULT_DB_PORT: u16 = 27017;
pub const DEFAULT_AUTH_SOURCE: &str = "admin";
pub const DEFAULT_RETENTION_DAYS: u64 = 30;
pub const DEFAULT_CRON: &str = "0 */6 * * *";
pub const DEFAULT_BACKUP_DIR: &str = "backups";

/// Source of configuration values, keyed by environment variable name.
///
/// Production code reads the process environment; tests pass a map.
pub type EnvLookup = Arc<dyn Fn(&str) -> Option<String> + Send + Sync>;

pub fn process_env() -> EnvLookup {
    Arc::new(|key| env::var(key).ok())
}

/// Returns the value for `key`, treating empty or whitespace-only values as unset.
fn lookup_non_empty(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Like `lookup_non_empty` but keeps the value byte-for-byte; used for secrets.
fn lookup_raw_non_empty(lookup: &dyn Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    lookup(key).filter(|v| !v.is_empty())
}

fn lookup_first(lookup: &dyn Fn(&str) -> Option<String>, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| lookup_non_empty(lookup, key))
}

#[derive(Clone)]
pub struct MongoConfig {
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    pub auth_source: String,
    pub database: String,
}

// Keeps the password out of log lines.
impl fmt::Debug for MongoConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MongoConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("auth_source", &self.auth_source)
            .field("database", &self.database)
            .finish()
    }
}

impl MongoConfig {
    /// Reads the database settings. Fails with `AppError::Config` when
    /// `DB_HOST` or `DB_NAME` is missing, or `DB_PORT` is not a port number.
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let host = lookup_non_empty(lookup, "DB_HOST")
            .ok_or_else(|| AppError::Config("DB_HOST environment variable is not set".into()))?;
        let database = lookup_non_empty(lookup, "DB_NAME")
            .ok_or_else(|| AppError::Config("DB_NAME environment variable is not set".into()))?;

        let port = match lookup_non_empty(lookup, "DB_PORT") {
            Some(raw) => raw.parse::<u16>().map_err(|_| {
                AppError::Config(format!("DB_PORT must be a valid port number, got '{}'", raw))
            })?,
            None => DEFAULT_DB_PORT,
        };

        Ok(MongoConfig {
            host,
            port,
            username: lookup_raw_non_empty(lookup, "DB_USER"),
            password: lookup_raw_non_empty(lookup, "DB_PASS"),
            auth_source: lookup_non_empty(lookup, "DB_AUTH_SOURCE")
                .unwrap_or_else(|| DEFAULT_AUTH_SOURCE.to_string()),
            database,
        })
    }

    /// Username and password, only when both are configured.
    pub fn credentials(&self) -> Option<(&str, &str)> {
        match (&self.username, &self.password) {
            (Some(user), Some(pass)) => Some((user.as_str(), pass.as_str())),
            _ => None,
        }
    }
}

/// Reads `BACKUP_RETENTION_DAYS`, falling back to the default on a bad value.
pub fn retention_days_from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> u64 {
    match lookup_non_empty(lookup, "BACKUP_RETENTION_DAYS") {
        Some(raw) => raw.parse::<u64>().unwrap_or_else(|_| {
            warn!(
                value = %raw,
                default = DEFAULT_RETENTION_DAYS,
                "BACKUP_RETENTION_DAYS is not a whole number of days, using default"
            );
            DEFAULT_RETENTION_DAYS
        }),
        None => DEFAULT_RETENTION_DAYS,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExporterKind {
    /// In-process paged export to a gzipped JSON array.
    Stream,
    /// `mongodump` into a temp dir, bundled as tar.gz.
    Mongodump,
}

impl ExporterKind {
    fn parse(raw: &str) -> Result<Self, AppError> {
        match raw.to_ascii_lowercase().as_str() {
            "stream" | "json" => Ok(ExporterKind::Stream),
            "mongodump" | "dump" => Ok(ExporterKind::Mongodump),
            other => Err(AppError::Config(format!(
                "BACKUP_EXPORTER must be 'stream' or 'mongodump', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Clone, Default)]
pub struct S3Config {
    pub bucket_name: Option<String>,
    pub region: Option<String>,
    pub endpoint_url: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    pub session_token: Option<String>,
    pub force_path_style: bool,
}

impl fmt::Debug for S3Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("S3Config")
            .field("bucket_name", &self.bucket_name)
            .field("region", &self.region)
            .field("endpoint_url", &self.endpoint_url)
            .field("access_key_id", &self.access_key_id)
            .field("static_credentials", &self.secret_access_key.is_some())
            .field("force_path_style", &self.force_path_style)
            .finish()
    }
}

impl S3Config {
    /// `S3_*` names win over their `AWS_*` counterparts.
    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let endpoint_url = lookup_first(lookup, &["S3_ENDPOINT", "AWS_ENDPOINT"]);
        if let Some(endpoint) = &endpoint_url {
            Url::parse(endpoint).map_err(|e| {
                AppError::Config(format!("Invalid S3 endpoint URL '{}': {}", endpoint, e))
            })?;
        }

        let force_path_style = match lookup_non_empty(lookup, "S3_FORCE_PATH_STYLE") {
            Some(raw) => parse_bool(&raw).ok_or_else(|| {
                AppError::Config(format!("S3_FORCE_PATH_STYLE must be true or false, got '{}'", raw))
            })?,
            None => false,
        };

        Ok(S3Config {
            bucket_name: lookup_first(lookup, &["S3_BUCKET", "AWS_BUCKET"]),
            region: lookup_first(lookup, &["S3_REGION", "AWS_REGION"]),
            endpoint_url,
            access_key_id: lookup_first(lookup, &["S3_ACCESS_KEY_ID", "AWS_ACCESS_KEY_ID"]),
            secret_access_key: lookup_first(lookup, &["S3_SECRET_ACCESS_KEY", "AWS_SECRET_ACCESS_KEY"]),
            session_token: lookup_first(lookup, &["S3_SESSION_TOKEN", "AWS_SESSION_TOKEN"]),
            force_path_style,
        })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Process-level settings, read once at startup.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub backup_dir: PathBuf,
    pub cron_schedule: String,
    pub exporter: ExporterKind,
    pub s3: S3Config,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        // A missing .env file is normal in container deployments.
        let _ = dotenv::dotenv();
        let lookup = process_env();
        Self::from_lookup(&*lookup)
    }

    pub fn from_lookup(lookup: &dyn Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let exporter = match lookup_non_empty(lookup, "BACKUP_EXPORTER") {
            Some(raw) => ExporterKind::parse(&raw)?,
            None => ExporterKind::Stream,
        };

        Ok(AppConfig {
            backup_dir: PathBuf::from(
                lookup_non_empty(lookup, "BACKUP_DIR").unwrap_or_else(|| DEFAULT_BACKUP_DIR.to_string()),
            ),
            cron_schedule: lookup_non_empty(lookup, "BACKUP_CRON")
                .unwrap_or_else(|| DEFAULT_CRON.to_string()),
            exporter,
            s3: S3Config::from_lookup(lookup)?,
        })
    }
}

#[cfg(test)]
pub(crate) fn map_lookup(pairs: &[(&str, &str)]) -> EnvLookup {
    let map: std::collections::HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    Arc::new(move |key| map.get(key).cloned())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mongo_config_defaults() -> anyhow::Result<()> {
        let lookup = map_lookup(&[("DB_HOST", "db.internal"), ("DB_NAME", "shop")]);
        let config = MongoConfig::from_lookup(&*lookup)?;

        assert_eq!(config.host, "db.internal");
        assert_eq!(config.port, 27017);
        assert_eq!(config.auth_source, "admin");
        assert_eq!(config.database, "shop");
        assert!(config.credentials().is_none());
        Ok(())
    }

    #[test]
    fn test_mongo_config_missing_host() {
        let lookup = map_lookup(&[("DB_NAME", "shop")]);
        let err = MongoConfig::from_lookup(&*lookup).unwrap_err();
        assert!(matches!(err, AppError::Config(ref msg) if msg.contains("DB_HOST")));
    }

    #[test]
    fn test_mongo_config_missing_database() {
        let lookup = map_lookup(&[("DB_HOST", "localhost"), ("DB_NAME", "  ")]);
        let err = MongoConfig::from_lookup(&*lookup).unwrap_err();
        assert!(matches!(err, AppError::Config(ref msg) if msg.contains("DB_NAME")));
    }

    #[test]
    fn test_mongo_config_bad_port() {
        let lookup = map_lookup(&[("DB_HOST", "localhost"), ("DB_NAME", "shop"), ("DB_PORT", "mongo")]);
        assert!(matches!(MongoConfig::from_lookup(&*lookup), Err(AppError::Config(_))));
    }

    #[test]
    fn test_credentials_need_both_parts() -> anyhow::Result<()> {
        let only_user = map_lookup(&[("DB_HOST", "h"), ("DB_NAME", "d"), ("DB_USER", "backup")]);
        assert!(MongoConfig::from_lookup(&*only_user)?.credentials().is_none());

        let both = map_lookup(&[
            ("DB_HOST", "h"),
            ("DB_NAME", "d"),
            ("DB_USER", "backup"),
            ("DB_PASS", "s3cret"),
        ]);
        assert_eq!(MongoConfig::from_lookup(&*both)?.credentials(), Some(("backup", "s3cret")));
        Ok(())
    }

    #[test]
    fn test_credentials_keep_surrounding_whitespace() -> anyhow::Result<()> {
        let lookup = map_lookup(&[("DB_HOST", "h"), ("DB_NAME", "d"), ("DB_USER", "u"), ("DB_PASS", " pw ")]);
        assert_eq!(MongoConfig::from_lookup(&*lookup)?.credentials(), Some(("u", " pw ")));

        let empty = map_lookup(&[("DB_HOST", "h"), ("DB_NAME", "d"), ("DB_USER", "u"), ("DB_PASS", "")]);
        assert!(MongoConfig::from_lookup(&*empty)?.credentials().is_none());
        Ok(())
    }

    #[test]
    fn test_debug_hides_password() -> anyhow::Result<()> {
        let lookup = map_lookup(&[("DB_HOST", "h"), ("DB_NAME", "d"), ("DB_USER", "u"), ("DB_PASS", "hunter2")]);
        let rendered = format!("{:?}", MongoConfig::from_lookup(&*lookup)?);
        assert!(!rendered.contains("hunter2"));
        Ok(())
    }

    #[test]
    fn test_retention_days() {
        assert_eq!(retention_days_from_lookup(&*map_lookup(&[])), 30);
        assert_eq!(retention_days_from_lookup(&*map_lookup(&[("BACKUP_RETENTION_DAYS", "7")])), 7);
        assert_eq!(retention_days_from_lookup(&*map_lookup(&[("BACKUP_RETENTION_DAYS", "week")])), 30);
    }

    #[test]
    fn test_app_config_defaults() -> anyhow::Result<()> {
        let config = AppConfig::from_lookup(&*map_lookup(&[]))?;
        assert_eq!(config.backup_dir, PathBuf::from("backups"));
        assert_eq!(config.cron_schedule, "0 */6 * * *");
        assert_eq!(config.exporter, ExporterKind::Stream);
        assert!(config.s3.bucket_name.is_none());
        assert!(!config.s3.force_path_style);
        Ok(())
    }

    #[test]
    fn test_app_config_exporter_selection() -> anyhow::Result<()> {
        let config = AppConfig::from_lookup(&*map_lookup(&[("BACKUP_EXPORTER", "mongodump")]))?;
        assert_eq!(config.exporter, ExporterKind::Mongodump);

        let err = AppConfig::from_lookup(&*map_lookup(&[("BACKUP_EXPORTER", "rsync")])).unwrap_err();
        assert!(matches!(err, AppError::Config(_)));
        Ok(())
    }

    #[test]
    fn test_s3_config_prefers_s3_names() -> anyhow::Result<()> {
        let lookup = map_lookup(&[
            ("S3_BUCKET", "primary"),
            ("AWS_BUCKET", "fallback"),
            ("AWS_REGION", "eu-west-1"),
            ("S3_ENDPOINT", "https://minio.local:9000"),
            ("S3_FORCE_PATH_STYLE", "true"),
        ]);
        let s3 = S3Config::from_lookup(&*lookup)?;
        assert_eq!(s3.bucket_name.as_deref(), Some("primary"));
        assert_eq!(s3.region.as_deref(), Some("eu-west-1"));
        assert_eq!(s3.endpoint_url.as_deref(), Some("https://minio.local:9000"));
        assert!(s3.force_path_style);
        Ok(())
    }

    #[test]
    fn test_s3_config_rejects_bad_endpoint() {
        let lookup = map_lookup(&[("S3_ENDPOINT", "not a url")]);
        assert!(matches!(S3Config::from_lookup(&*lookup), Err(AppError::Config(_))));
    }
}

// Connection settings for the source database
use mongodb::Database;
use mongodb::bson::doc;
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tracing::{error, info};

use crate::config::MongoConfig;
use crate::errors::AppError;

/// Characters escaped by JavaScript's `encodeURIComponent`: everything but
/// `A-Z a-z 0-9 - _ . ! ~ * ' ( )`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

pub fn encode_uri_component(raw: &str) -> String {
    utf8_percent_encode(raw, URI_COMPONENT).to_string()
}

/// Builds the `mongodb://` connection string. Credentials are only embedded
/// when both username and password are set, together with `authSource`.
pub fn build_connection_string(config: &MongoConfig) -> String {
    match config.credentials() {
        Some((user, pass)) => format!(
            "mongodb://{}:{}@{}:{}/{}?authSource={}",
            encode_uri_component(user),
            encode_uri_component(pass),
            config.host,
            config.port,
            config.database,
            config.auth_source
        ),
        None => format!("mongodb://{}:{}/{}", config.host, config.port, config.database),
    }
}

/// Pings the database so bad hosts and rejected credentials fail before any
/// archive file is created.
pub async fn check_db_connection(db: &Database) -> Result<(), AppError> {
    match db.run_command(doc! { "ping": 1 }).await {
        Ok(_) => {
            info!(database = %db.name(), "✅ Connected to MongoDB");
            Ok(())
        }
        Err(e) => {
            error!(database = %db.name(), error = %e, "❌ MongoDB ping failed");
            Err(AppError::Connection(format!("Ping to database '{}' failed: {}", db.name(), e)))
        }
    }
}

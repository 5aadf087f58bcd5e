//! Connection configuration and pool bootstrap.

use crate::DbError;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use std::str::FromStr;

pub const HOST_ENV: &str = "DB_HOST";
pub const PORT_ENV: &str = "DB_PORT";
pub const USER_ENV: &str = "DB_USER";
pub const PASSWORD_ENV: &str = "DB_PASSWORD";
pub const NAME_ENV: &str = "DB_NAME";
pub const SSLMODE_ENV: &str = "DB_SSLMODE";
pub const POOL_SIZE_ENV: &str = "DB_POOL_SIZE";

/// Maintenance database used for `CREATE DATABASE`.
pub const MAINTENANCE_DATABASE: &str = "postgres";

#[derive(Clone)]
pub struct DbConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub ssl_mode: PgSslMode,
    pub pool_size: u32,
}

impl std::fmt::Debug for DbConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("ssl_mode", &self.ssl_mode)
            .field("pool_size", &self.pool_size)
            .finish()
    }
}

impl DbConfig {
    pub fn from_env() -> Result<Self, DbError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from `lookup` (the environment in production, a map in tests).
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, DbError> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let port = match get(PORT_ENV) {
            Some(raw) => raw
                .parse::<u16>()
                .map_err(|_| DbError::Config(format!("{PORT_ENV} must be a port number, got `{raw}`")))?,
            None => 5432,
        };
        let ssl_mode = match get(SSLMODE_ENV) {
            Some(raw) => PgSslMode::from_str(&raw)
                .map_err(|_| DbError::Config(format!("{SSLMODE_ENV}: unknown mode `{raw}`")))?,
            None => PgSslMode::VerifyFull,
        };
        let pool_size = match get(POOL_SIZE_ENV) {
            Some(raw) => raw
                .parse::<u32>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| DbError::Config(format!("{POOL_SIZE_ENV} must be a positive integer, got `{raw}`")))?,
            None => 5,
        };

        Ok(Self {
            host: get(HOST_ENV).unwrap_or_else(|| "localhost".to_string()),
            port,
            user: get(USER_ENV).unwrap_or_else(|| "postgres".to_string()),
            // Passwords may legitimately contain surrounding spaces.
            password: lookup(PASSWORD_ENV).unwrap_or_default(),
            database: get(NAME_ENV).unwrap_or_else(|| MAINTENANCE_DATABASE.to_string()),
            ssl_mode,
            pool_size,
        })
    }

    /// Options for connecting to `database` with this config's credentials.
    pub fn connect_options(&self, database: &str) -> PgConnectOptions {
        PgConnectOptions::new()
            .host(&self.host)
            .port(self.port)
            .username(&self.user)
            .password(&self.password)
            .database(database)
            .ssl_mode(self.ssl_mode)
    }
}

/// Open the shared pool against the configured database.
pub async fn connect_pool(config: &DbConfig) -> Result<PgPool, DbError> {
    let pool = PgPoolOptions::new()
        .max_connections(config.pool_size)
        .connect_with(config.connect_options(&config.database))
        .await
        .map_err(|e| {
            tracing::error!(host = %config.host, database = %config.database, error = %e, "PostgreSQL connection failed");
            DbError::Connect(e.to_string())
        })?;

    tracing::info!(
        host = %config.host,
        port = config.port,
        database = %config.database,
        pool_size = config.pool_size,
        "connected to PostgreSQL"
    );
    Ok(pool)
}

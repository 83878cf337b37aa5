//! Subcommand implementations.
//!
//! Every command reads `DATABASE_URL` (a `.env` file is honoured) and talks
//! to the same database as the API server.

pub mod admin;
pub mod gdpr;
pub mod migrate;
pub mod seed;

use secrecy::SecretString;
use sqlx::PgPool;
use thiserror::Error;

use emporium_api::db::{self, RepositoryError};
use emporium_api::services::AuthError;

/// Errors that can occur while running a command.
#[derive(Debug, Error)]
pub enum CommandError {
    /// Required environment variable is missing.
    #[error("Missing environment variable: {0}")]
    MissingEnvVar(&'static str),

    #[error("Database connection error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("{0}")]
    Repository(#[from] RepositoryError),

    #[error("{0}")]
    Auth(#[from] AuthError),

    #[error("Could not read {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid seed file: {0}")]
    SeedFormat(String),

    /// Input that parsed but is not acceptable.
    #[error("{0}")]
    Invalid(String),
}

/// Connect to the database named by `DATABASE_URL`.
pub async fn connect() -> Result<PgPool, CommandError> {
    dotenvy::dotenv().ok();

    let database_url = std::env::var("DATABASE_URL")
        .map(SecretString::from)
        .map_err(|_| CommandError::MissingEnvVar("DATABASE_URL"))?;

    tracing::info!("Connecting to database...");
    Ok(db::create_pool(&database_url).await?)
}

//! Database migration command.
//!
//! # Usage
//!
//! ```bash
//! emporium migrate
//! ```
//!
//! Migrations live in `crates/api/migrations/` and are embedded in the API
//! crate, so the binary can migrate a database without the source tree.

use super::{CommandError, connect};
use emporium_api::db::MIGRATOR;

/// Apply all pending migrations.
///
/// # Errors
///
/// Returns an error if the database is unreachable or a migration fails.
pub async fn run() -> Result<(), CommandError> {
    let pool = connect().await?;

    tracing::info!(known = MIGRATOR.iter().count(), "Running migrations...");
    MIGRATOR.run(&pool).await?;

    tracing::info!("Migrations complete!");
    Ok(())
}

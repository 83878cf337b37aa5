//! Order data retention.
//!
//! Orders keep customer contact details until their retention date. After
//! that, this command strips personal data while leaving the financial
//! record (and country/state for analytics) intact. Run it from cron.
//!
//! ```bash
//! emporium gdpr anonymize --dry-run
//! emporium gdpr anonymize
//! ```

use chrono::Utc;

use emporium_api::db::OrderRepository;

use super::{CommandError, connect};

/// Anonymize every order past its retention date.
///
/// # Errors
///
/// Returns an error if the database is unreachable or the update fails.
pub async fn anonymize(dry_run: bool) -> Result<u64, CommandError> {
    let pool = connect().await?;

    let count = OrderRepository::new(&pool)
        .anonymize_expired(Utc::now(), dry_run)
        .await?;

    if dry_run {
        tracing::info!("{count} order(s) would be anonymized");
    } else {
        tracing::info!("Anonymized {count} order(s)");
    }
    Ok(count)
}

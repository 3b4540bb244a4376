use crate::db::connection::LorekeepDb;
use crate::LorekeepError;

/// Feedback records and corrections.
const SCHEMA_001: &str = include_str!("migrations/001_feedback.surql");

/// Apply the database schema to an initialized connection.
///
/// Every statement uses `IF NOT EXISTS`, so calling this on an existing
/// database is a no-op.
pub async fn apply_schema(db: &LorekeepDb) -> Result<(), LorekeepError> {
    db.query(SCHEMA_001).await?.check()?;
    Ok(())
}

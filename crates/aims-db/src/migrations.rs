//! Embedded schema, applied on every open.
//!
//! Each script only creates what is missing, so running the list against an
//! existing database is a no-op.

use crate::AimsDb;
use crate::error::DatabaseError;

/// Scripts in application order.
const MIGRATIONS: &[(&str, &str)] = &[(
    "001_initial",
    include_str!("../migrations/001_initial.sql"),
)];

impl AimsDb {
    pub(crate) async fn run_migrations(&self) -> Result<(), DatabaseError> {
        for (name, sql) in MIGRATIONS {
            self.conn
                .execute_batch(sql)
                .await
                .map_err(|e| DatabaseError::Migration(format!("{name}: {e}")))?;
            tracing::debug!(migration = name, "schema script applied");
        }
        Ok(())
    }
}

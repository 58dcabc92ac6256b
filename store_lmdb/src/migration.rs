//! Database schema migration engine.
//!
//! Tracks a monotonically increasing schema version in the meta table and
//! runs sequential migration functions to bring an older database up to date.

use wdoi_store::MetaStore;

use crate::LmdbError;

/// The schema version that the current code expects.
pub const CURRENT_SCHEMA_VERSION: u32 = 1;

/// Runs database migrations to bring the schema up to date.
pub struct Migrator;

impl Migrator {
    /// Check the stored schema version and run any needed migrations.
    ///
    /// - Version 0 means a fresh database (no version stored yet).
    /// - If the stored version matches `CURRENT_SCHEMA_VERSION`, this is a no-op.
    /// - If the stored version is *higher* than what this code supports,
    ///   the database was written by a newer build and we refuse to open it.
    pub fn run(meta_store: &(impl MetaStore + ?Sized)) -> Result<(), LmdbError> {
        let current = meta_store
            .get_schema_version()
            .map_err(|e| LmdbError::Heed(e.to_string()))?;

        if current == CURRENT_SCHEMA_VERSION {
            tracing::debug!(version = current, "database schema is up to date");
            return Ok(());
        }

        if current > CURRENT_SCHEMA_VERSION {
            return Err(LmdbError::UnsupportedSchema {
                found: current,
                supported: CURRENT_SCHEMA_VERSION,
            });
        }

        for version in current..CURRENT_SCHEMA_VERSION {
            tracing::info!(from = version, to = version + 1, "running migration");
            run_migration(version, version + 1)?;
        }

        meta_store
            .set_schema_version(CURRENT_SCHEMA_VERSION)
            .map_err(|e| LmdbError::Heed(e.to_string()))?;

        tracing::info!(version = CURRENT_SCHEMA_VERSION, "migration complete");
        Ok(())
    }
}

fn run_migration(from: u32, to: u32) -> Result<(), LmdbError> {
    match (from, to) {
        // Initial schema: nothing to migrate from a blank slate.
        (0, 1) => Ok(()),
        _ => Err(LmdbError::Heed(format!(
            "no migration path from schema {} to {}",
            from, to
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LmdbEnvironment;

    #[test]
    fn fresh_database_is_stamped() {
        let dir = tempfile::tempdir().unwrap();
        let env = LmdbEnvironment::open(dir.path(), 16 * 1024 * 1024).unwrap();
        assert_eq!(env.get_schema_version().unwrap(), 0);

        Migrator::run(&env).unwrap();
        assert_eq!(env.get_schema_version().unwrap(), CURRENT_SCHEMA_VERSION);

        // Second run is a no-op.
        Migrator::run(&env).unwrap();
    }

    #[test]
    fn newer_schema_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let env = LmdbEnvironment::open(dir.path(), 16 * 1024 * 1024).unwrap();
        env.set_schema_version(CURRENT_SCHEMA_VERSION + 1).unwrap();

        let err = Migrator::run(&env).unwrap_err();
        assert!(matches!(err, LmdbError::UnsupportedSchema { .. }));
    }
}

use std::{ops::Deref, path::PathBuf, str::FromStr};

use sqlx::{
    migrate::Migrator,
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqliteSynchronous},
    Sqlite, SqlitePool, Transaction,
};

use crate::{errors::AppError, log_and_wrap_custom_internal};

#[derive(Clone, Debug)]
pub struct Database(SqlitePool);

impl Deref for Database {
    type Target = SqlitePool;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl Database {
    pub fn new(url: &str) -> Database {
        let database_config = SqliteConnectOptions::from_str(url)
            .expect("Cannot connect to database")
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .create_if_missing(true);

        Self(SqlitePool::connect_lazy_with(database_config))
    }

    pub async fn run_migrations(&self) -> Result<(), AppError> {
        Migrator::new(std::path::Path::new("./migrations"))
            .await
            .map_err(|e| log_and_wrap_custom_internal!(e))?
            .run(&**self)
            .await
            .map_err(|e| log_and_wrap_custom_internal!(e))
    }

    pub async fn start_transaction(&self) -> Result<Transaction<'_, Sqlite>, AppError> {
        self.begin()
            .await
            .map_err(|e| log_and_wrap_custom_internal!(e))
    }
}

/// A throw-away database living in the temp dir, migrated and seeded with the roles.
/// Its files are removed on drop.
pub struct TestDatabase {
    database: Database,
    path: PathBuf,
}

impl Deref for TestDatabase {
    type Target = Database;

    fn deref(&self) -> &Self::Target {
        &self.database
    }
}

impl TestDatabase {
    pub async fn setup() -> Self {
        let path =
            std::env::temp_dir().join(format!("carpool-test-{}.sqlite", uuid::Uuid::now_v7()));
        let database = Database::new(&format!("sqlite://{}", path.display()));
        database.run_migrations().await.expect("Migrations failed");
        let mut conn = database.acquire().await.expect("Cannot acquire a connection");
        crate::models::Role::insert_roles(&mut conn)
            .await
            .expect("Cannot insert the roles");
        Self { database, path }
    }

    pub fn database(&self) -> &Database {
        &self.database
    }
}

impl Drop for TestDatabase {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut file = self.path.clone().into_os_string();
            file.push(suffix);
            let _ = std::fs::remove_file(file);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_database_files_are_removed_on_drop() {
        let database = TestDatabase::setup().await;
        let path = database.path.clone();
        assert!(path.exists());

        database.close().await;
        drop(database);
        assert!(!path.exists());
    }
}

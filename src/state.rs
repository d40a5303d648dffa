use axum::extract::FromRef;

use crate::{
    auth::Keys, config::Config, database::Database, mailing::Mailer, sessions::Sessions,
};

#[derive(Clone, FromRef)]
pub struct AppState {
    config: Config,
    database: Database,
    sessions: Sessions,
    mailer: Mailer,
    keys: Keys,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        let database = Database::new(&config.database_url);
        Self::with_database(config, database)
    }

    pub fn with_database(config: Config, database: Database) -> Self {
        Self {
            sessions: Sessions::new(database.clone()),
            mailer: Mailer::new(&config),
            keys: Keys::new(config.secret_key.as_bytes(), config.confirmation_expiration),
            database,
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn database(&self) -> &Database {
        &self.database
    }

    pub fn sessions(&self) -> &Sessions {
        &self.sessions
    }

    pub fn mailer(&self) -> &Mailer {
        &self.mailer
    }

    pub fn keys(&self) -> &Keys {
        &self.keys
    }
}

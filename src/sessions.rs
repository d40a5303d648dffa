use chrono::{Days, NaiveDateTime, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{database::Database, errors::AppError, log_and_wrap_custom_internal};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FlashLevel {
    Info,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Flash {
    pub level: FlashLevel,
    pub message: String,
}

impl Flash {
    pub fn css_class(&self) -> &'static str {
        match self.level {
            FlashLevel::Info => "alert-info",
            FlashLevel::Warning => "alert-warning",
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SessionData {
    flashes: Vec<Flash>,
}

#[derive(Clone)]
pub struct Session(Arc<RwLock<UserSession>>);

impl Session {
    pub async fn user_pk(&self) -> Option<i64> {
        self.0.read().await.user_pk
    }

    pub async fn id(&self) -> String {
        self.0.read().await.session_id.to_owned()
    }

    pub async fn remember(&self) -> bool {
        self.0.read().await.remember
    }

    pub async fn csrf_token(&self, secret: &str) -> String {
        generate_token(secret, &self.0.read().await.session_id)
    }

    pub async fn token_is_valid(&self, secret: &str, token: &str) -> bool {
        self.csrf_token(secret).await.eq(token)
    }

    pub async fn flash(&self, level: FlashLevel, message: impl Into<String>) {
        self.0.write().await.data.flashes.push(Flash {
            level,
            message: message.into(),
        });
    }

    pub async fn info(&self, message: impl Into<String>) {
        self.flash(FlashLevel::Info, message).await
    }

    pub async fn warning(&self, message: impl Into<String>) {
        self.flash(FlashLevel::Warning, message).await
    }

    /// Returns the pending flash messages and forgets them.
    pub async fn take_flashes(&self) -> Vec<Flash> {
        std::mem::take(&mut self.0.write().await.data.flashes)
    }
}

#[derive(Clone)]
pub struct Sessions(Database);

impl Sessions {
    pub fn new(database: Database) -> Self {
        Self(database)
    }

    /// Loads the live session behind `session_id`, or starts an anonymous one.
    pub async fn find_or_create(&self, session_id: Option<&str>) -> Result<Session, AppError> {
        let found = match session_id {
            Some(session_id) => UserSession::from_session_id(session_id, &self.0).await?,
            None => None,
        };
        let session = found
            .filter(|s| s.expiration > Utc::now().naive_utc())
            .unwrap_or_else(UserSession::anonymous);
        Ok(Session(Arc::new(RwLock::new(session))))
    }

    /// Writes the session back, pushing its expiration `session_expiration` days ahead.
    pub async fn save(&self, session: &Session, session_expiration: u64) -> Result<(), AppError> {
        session
            .0
            .write()
            .await
            .update_last_accessed(session_expiration)
            .save(&self.0)
            .await
    }

    /// Rotates the session id and binds the session to `user_pk`.
    pub async fn login(
        &self,
        session: &Session,
        user_pk: i64,
        remember: bool,
    ) -> Result<(), AppError> {
        let mut storage = session.0.write().await;
        storage.delete(&self.0).await?;
        storage.new_session_id().update_user(Some(user_pk), remember);
        Ok(())
    }

    /// Rotates the session id and drops the user. Pending flashes survive.
    pub async fn logout(&self, session: &Session) -> Result<(), AppError> {
        let mut storage = session.0.write().await;
        storage.delete(&self.0).await?;
        storage.new_session_id().update_user(None, false);
        Ok(())
    }

    pub async fn purge_expired(&self) -> Result<u64, AppError> {
        sqlx::query("DELETE FROM web_sessions WHERE expiration < $1;")
            .bind(Utc::now().naive_utc())
            .execute(&*self.0)
            .await
            .map_err(|e| log_and_wrap_custom_internal!(e))
            .map(|r| r.rows_affected())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SessionRow {
    session_id: String,
    user_pk: Option<i64>,
    remember: bool,
    last_accessed: NaiveDateTime,
    expiration: NaiveDateTime,
    data: Option<Vec<u8>>,
}

#[derive(Debug)]
struct UserSession {
    session_id: String,
    user_pk: Option<i64>,
    remember: bool,
    last_accessed: NaiveDateTime,
    expiration: NaiveDateTime,
    data: SessionData,
}

impl UserSession {
    fn anonymous() -> Self {
        let now = Utc::now().naive_utc();
        Self {
            session_id: Uuid::now_v7().to_string(),
            user_pk: None,
            remember: false,
            last_accessed: now,
            expiration: now,
            data: SessionData::default(),
        }
    }

    fn new_session_id(&mut self) -> &mut Self {
        self.session_id = Uuid::now_v7().to_string();
        self
    }

    fn update_user(&mut self, user_pk: Option<i64>, remember: bool) -> &mut Self {
        self.user_pk = user_pk;
        self.remember = remember;
        self
    }

    fn update_last_accessed(&mut self, session_expiration: u64) -> &mut Self {
        let now = Utc::now().naive_utc();
        self.last_accessed = now;
        self.expiration = now + Days::new(session_expiration);
        self
    }

    async fn from_session_id(
        session_id: &str,
        database: &Database,
    ) -> Result<Option<Self>, AppError> {
        let row: Option<SessionRow> =
            sqlx::query_as("SELECT * FROM web_sessions WHERE session_id = $1;")
                .bind(session_id)
                .fetch_optional(&**database)
                .await
                .map_err(|e| log_and_wrap_custom_internal!(e))?;

        Ok(row.map(|row| {
            // Unreadable data only costs the pending flashes.
            let data = row
                .data
                .as_deref()
                .and_then(|bytes| serde_json::from_slice(bytes).ok())
                .unwrap_or_default();
            Self {
                session_id: row.session_id,
                user_pk: row.user_pk,
                remember: row.remember,
                last_accessed: row.last_accessed,
                expiration: row.expiration,
                data,
            }
        }))
    }

    async fn save(&self, database: &Database) -> Result<(), AppError> {
        let data = serde_json::to_vec(&self.data).map_err(|e| log_and_wrap_custom_internal!(e))?;
        sqlx::query(
            "INSERT INTO web_sessions (session_id, user_pk, remember, last_accessed, expiration, data)
             VALUES ($1, $2, $3, $4, $5, $6)
             ON CONFLICT(session_id) DO UPDATE SET user_pk = excluded.user_pk,
                remember = excluded.remember, last_accessed = excluded.last_accessed,
                expiration = excluded.expiration, data = excluded.data;",
        )
        .bind(&self.session_id)
        .bind(self.user_pk)
        .bind(self.remember)
        .bind(self.last_accessed)
        .bind(self.expiration)
        .bind(data)
        .execute(&**database)
        .await
        .map_err(|e| log_and_wrap_custom_internal!(e))?;
        Ok(())
    }

    async fn delete(&self, database: &Database) -> Result<(), AppError> {
        sqlx::query("DELETE FROM web_sessions WHERE session_id = $1;")
            .bind(&self.session_id)
            .execute(&**database)
            .await
            .map_err(|e| log_and_wrap_custom_internal!(e))?;
        Ok(())
    }
}

fn generate_token(secret: &str, data: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC can take key of any size");
    mac.update(data.as_bytes());

    hex::encode(mac.finalize().into_bytes())
}

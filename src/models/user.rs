use std::sync::LazyLock;

use chrono::NaiveDateTime;
use regex::Regex;
use sha2::{Digest, Sha256};
use sqlx::{prelude::FromRow, SqliteConnection};

use crate::{
    auth::{hash_password, verify_password},
    errors::AppError,
};

use super::{Permission, Role};

const GRAVATAR_URL: &str = "https://www.gravatar.com/avatar";

static USERNAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_.]*$").expect("valid username regex"));

const SELECT_USER: &str = "SELECT users.pk, users.email, users.username, users.password_hash,
        users.confirmed, users.name, users.grade, users.about_me, users.member_since,
        users.avatar_hash, users.role_pk, roles.name AS role_name, roles.permissions AS permissions
    FROM users
    LEFT JOIN roles ON roles.pk = users.role_pk";

pub fn validate_username(username: &str) -> Result<(), AppError> {
    if username.is_empty() || username.chars().count() > 64 || !USERNAME_RE.is_match(username) {
        return Err(AppError::InvalidUsername);
    }
    Ok(())
}

/// Hex encoded SHA-256 of the normalized email, the hash Gravatar looks avatars up with.
pub fn avatar_hash(email: &str) -> String {
    hex::encode(Sha256::digest(email.trim().to_lowercase().as_bytes()))
}

#[derive(Debug, Clone, FromRow)]
pub struct User {
    pub pk: i64,
    pub email: String,
    pub username: String,
    password_hash: String,
    pub confirmed: bool,
    pub name: Option<String>,
    pub grade: Option<String>,
    pub about_me: Option<String>,
    pub member_since: NaiveDateTime,
    avatar_hash: Option<String>,
    pub role_pk: Option<i64>,
    pub role_name: Option<String>,
    permissions: Option<Permission>,
}

pub struct NewUser<'a> {
    pub email: &'a str,
    pub username: &'a str,
    pub password: &'a str,
    pub role: Option<&'a Role>,
}

#[derive(Debug, Default)]
pub struct ProfileUpdate {
    pub name: Option<String>,
    pub grade: Option<String>,
    pub about_me: Option<String>,
}

#[derive(Debug)]
pub struct AdminProfileUpdate {
    pub email: String,
    pub username: String,
    pub confirmed: bool,
    pub role_pk: i64,
    pub profile: ProfileUpdate,
}

impl User {
    pub async fn create(new: NewUser<'_>, tx: &mut SqliteConnection) -> Result<Self, AppError> {
        let password_hash = hash_password(new.password)?;
        let pk: i64 = sqlx::query_scalar(
            "INSERT INTO users (email, username, password_hash, confirmed, member_since, avatar_hash, role_pk)
             VALUES ($1, $2, $3, FALSE, $4, $5, $6) RETURNING pk;",
        )
        .bind(new.email)
        .bind(new.username)
        .bind(&password_hash)
        .bind(chrono::Utc::now().naive_utc())
        .bind(avatar_hash(new.email))
        .bind(new.role.map(|r| r.pk))
        .fetch_one(&mut *tx)
        .await?;
        Self::get_by_pk(pk, tx).await
    }

    pub async fn get_by_pk(pk: i64, tx: &mut SqliteConnection) -> Result<Self, AppError> {
        sqlx::query_as(&format!("{SELECT_USER} WHERE users.pk = $1;"))
            .bind(pk)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(AppError::DoesNotExist)
    }

    pub async fn find_by_email(
        email: &str,
        tx: &mut SqliteConnection,
    ) -> Result<Option<Self>, AppError> {
        Ok(sqlx::query_as(&format!("{SELECT_USER} WHERE users.email = $1;"))
            .bind(email)
            .fetch_optional(&mut *tx)
            .await?)
    }

    pub async fn find_by_username(
        username: &str,
        tx: &mut SqliteConnection,
    ) -> Result<Option<Self>, AppError> {
        Ok(
            sqlx::query_as(&format!("{SELECT_USER} WHERE users.username = $1;"))
                .bind(username)
                .fetch_optional(&mut *tx)
                .await?,
        )
    }

    pub async fn email_exists(email: &str, tx: &mut SqliteConnection) -> Result<bool, AppError> {
        Ok(
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1);")
                .bind(email)
                .fetch_one(&mut *tx)
                .await?,
        )
    }

    pub async fn username_exists(
        username: &str,
        tx: &mut SqliteConnection,
    ) -> Result<bool, AppError> {
        Ok(
            sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE username = $1);")
                .bind(username)
                .fetch_one(&mut *tx)
                .await?,
        )
    }

    pub fn verify_password(&self, raw_password: &str) -> Result<(), AppError> {
        verify_password(raw_password, &self.password_hash)
    }

    pub async fn set_password(
        &mut self,
        password: &str,
        tx: &mut SqliteConnection,
    ) -> Result<(), AppError> {
        let password_hash = hash_password(password)?;
        sqlx::query("UPDATE users SET password_hash = $1 WHERE pk = $2;")
            .bind(&password_hash)
            .bind(self.pk)
            .execute(&mut *tx)
            .await?;
        self.password_hash = password_hash;
        Ok(())
    }

    pub async fn set_confirmed(&mut self, tx: &mut SqliteConnection) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET confirmed = TRUE WHERE pk = $1;")
            .bind(self.pk)
            .execute(&mut *tx)
            .await?;
        self.confirmed = true;
        Ok(())
    }

    pub async fn update_profile(
        &mut self,
        profile: ProfileUpdate,
        tx: &mut SqliteConnection,
    ) -> Result<(), AppError> {
        sqlx::query("UPDATE users SET name = $1, grade = $2, about_me = $3 WHERE pk = $4;")
            .bind(&profile.name)
            .bind(&profile.grade)
            .bind(&profile.about_me)
            .bind(self.pk)
            .execute(&mut *tx)
            .await?;
        self.name = profile.name;
        self.grade = profile.grade;
        self.about_me = profile.about_me;
        Ok(())
    }

    /// Overwrites every editable column. Uniqueness of email and username is checked only
    /// against other users, so resubmitting unchanged values is accepted.
    pub async fn admin_update(
        self,
        update: AdminProfileUpdate,
        tx: &mut SqliteConnection,
    ) -> Result<Self, AppError> {
        if update.email != self.email && Self::email_exists(&update.email, tx).await? {
            return Err(AppError::EmailTaken);
        }
        if update.username != self.username && Self::username_exists(&update.username, tx).await?
        {
            return Err(AppError::UsernameTaken);
        }
        validate_username(&update.username)?;
        let role = Role::get_by_pk(update.role_pk, tx).await?;

        sqlx::query(
            "UPDATE users SET email = $1, username = $2, confirmed = $3, role_pk = $4,
                name = $5, grade = $6, about_me = $7, avatar_hash = $8
             WHERE pk = $9;",
        )
        .bind(&update.email)
        .bind(&update.username)
        .bind(update.confirmed)
        .bind(role.pk)
        .bind(&update.profile.name)
        .bind(&update.profile.grade)
        .bind(&update.profile.about_me)
        .bind(avatar_hash(&update.email))
        .bind(self.pk)
        .execute(&mut *tx)
        .await?;

        Self::get_by_pk(self.pk, tx).await
    }

    pub fn can(&self, permission: Permission) -> bool {
        self.permissions.is_some_and(|p| p.contains(permission))
    }

    pub fn is_administrator(&self) -> bool {
        self.can(Permission::ADMINISTER)
    }

    pub fn is_student(&self) -> bool {
        self.can(Permission::DELIVER_CARPOOL | Permission::JOIN_CARPOOL | Permission::TAKE_RIDE)
    }

    pub fn is_teacher(&self) -> bool {
        self.can(Permission::GIVE_RIDE)
    }

    pub fn gravatar(&self, size: u32) -> String {
        let hash = self
            .avatar_hash
            .clone()
            .unwrap_or_else(|| avatar_hash(&self.email));
        format!("{GRAVATAR_URL}/{hash}?s={size}&d=identicon&r=g")
    }
}

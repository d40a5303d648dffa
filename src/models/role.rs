use std::{fmt, str::FromStr};

use sqlx::{prelude::FromRow, SqliteConnection};

use crate::errors::AppError;

use super::Permission;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleName {
    Student,
    Teacher,
    Administrator,
}

impl RoleName {
    pub const ALL: [RoleName; 3] = [Self::Student, Self::Teacher, Self::Administrator];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Student => "student",
            Self::Teacher => "teacher",
            Self::Administrator => "administrator",
        }
    }

    pub fn permissions(&self) -> Permission {
        match self {
            Self::Student => {
                Permission::DELIVER_CARPOOL | Permission::JOIN_CARPOOL | Permission::TAKE_RIDE
            }
            Self::Teacher => Permission::GIVE_RIDE,
            Self::Administrator => Permission::ADMINISTER,
        }
    }
}

impl FromStr for RoleName {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "student" => Ok(Self::Student),
            "teacher" => Ok(Self::Teacher),
            "administrator" => Ok(Self::Administrator),
            other => Err(AppError::UnknownRole(other.to_owned())),
        }
    }
}

impl fmt::Display for RoleName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, FromRow, PartialEq, Eq)]
pub struct Role {
    pub pk: i64,
    pub name: String,
    pub permissions: Permission,
}

impl Role {
    /// Creates the canonical roles, or resets their permissions when they already exist.
    pub async fn insert_roles(tx: &mut SqliteConnection) -> Result<(), AppError> {
        for role in RoleName::ALL {
            sqlx::query(
                "INSERT INTO roles (name, permissions) VALUES ($1, $2)
                 ON CONFLICT(name) DO UPDATE SET permissions = excluded.permissions;",
            )
            .bind(role.as_str())
            .bind(role.permissions())
            .execute(&mut *tx)
            .await?;
        }
        tracing::info!("roles inserted");
        Ok(())
    }

    pub async fn find_by_name(
        name: RoleName,
        tx: &mut SqliteConnection,
    ) -> Result<Option<Self>, AppError> {
        Ok(
            sqlx::query_as("SELECT pk, name, permissions FROM roles WHERE name = $1;")
                .bind(name.as_str())
                .fetch_optional(&mut *tx)
                .await?,
        )
    }

    pub async fn find_administrator(tx: &mut SqliteConnection) -> Result<Option<Self>, AppError> {
        Ok(sqlx::query_as(
            "SELECT pk, name, permissions FROM roles WHERE permissions = $1 ORDER BY pk LIMIT 1;",
        )
        .bind(Permission::ADMINISTER)
        .fetch_optional(&mut *tx)
        .await?)
    }

    pub async fn get_by_pk(pk: i64, tx: &mut SqliteConnection) -> Result<Self, AppError> {
        sqlx::query_as("SELECT pk, name, permissions FROM roles WHERE pk = $1;")
            .bind(pk)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(AppError::DoesNotExist)
    }

    pub async fn list(tx: &mut SqliteConnection) -> Result<Vec<Self>, AppError> {
        Ok(
            sqlx::query_as("SELECT pk, name, permissions FROM roles ORDER BY name;")
                .fetch_all(&mut *tx)
                .await?,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::TestDatabase;

    #[test]
    fn test_role_name_from_str() {
        assert_eq!("teacher".parse::<RoleName>().unwrap(), RoleName::Teacher);
        assert!(matches!(
            "driver".parse::<RoleName>(),
            Err(AppError::UnknownRole(r)) if r == "driver"
        ));
    }

    #[tokio::test]
    async fn test_insert_roles_is_idempotent_and_resets_permissions() {
        let database = TestDatabase::setup().await;
        let mut conn = database.acquire().await.unwrap();

        sqlx::query("UPDATE roles SET permissions = 0 WHERE name = 'teacher';")
            .execute(&mut *conn)
            .await
            .unwrap();
        Role::insert_roles(&mut conn).await.unwrap();

        let roles = Role::list(&mut conn).await.unwrap();
        assert_eq!(
            roles.iter().map(|r| r.name.as_str()).collect::<Vec<_>>(),
            vec!["administrator", "student", "teacher"]
        );
        let teacher = Role::find_by_name(RoleName::Teacher, &mut conn)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(teacher.permissions, Permission::GIVE_RIDE);
    }

    #[tokio::test]
    async fn test_find_administrator() {
        let database = TestDatabase::setup().await;
        let mut conn = database.acquire().await.unwrap();
        let admin = Role::find_administrator(&mut conn).await.unwrap().unwrap();
        assert_eq!(admin.name, "administrator");
        assert!(admin.permissions.contains(Permission::GIVE_RIDE));
    }
}

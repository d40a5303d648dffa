use chrono::NaiveDateTime;
use sqlx::{prelude::FromRow, SqliteConnection};

use crate::errors::AppError;

const SELECT_APPLICATION: &str = "SELECT applications.pk, applications.is_passed,
        applications.applicant_pk, applications.group_pk, applications.timestamp,
        users.username AS applicant_username, carpool_groups.builder_pk,
        carpool_groups.start_place, carpool_groups.end_place
    FROM applications
    INNER JOIN users ON users.pk = applications.applicant_pk
    INNER JOIN carpool_groups ON carpool_groups.pk = applications.group_pk";

#[derive(Debug, Clone, FromRow)]
pub struct Application {
    pub pk: i64,
    pub is_passed: bool,
    pub applicant_pk: i64,
    pub group_pk: i64,
    pub timestamp: NaiveDateTime,
    pub applicant_username: String,
    pub builder_pk: i64,
    pub start_place: String,
    pub end_place: String,
}

impl Application {
    pub async fn create(
        applicant_pk: i64,
        group_pk: i64,
        tx: &mut SqliteConnection,
    ) -> Result<Self, AppError> {
        let pk: i64 = sqlx::query_scalar(
            "INSERT INTO applications (is_passed, applicant_pk, group_pk, timestamp)
             VALUES (FALSE, $1, $2, $3) RETURNING pk;",
        )
        .bind(applicant_pk)
        .bind(group_pk)
        .bind(chrono::Utc::now().naive_utc())
        .fetch_one(&mut *tx)
        .await?;
        Self::get_by_pk(pk, tx).await
    }

    pub async fn get_by_pk(pk: i64, tx: &mut SqliteConnection) -> Result<Self, AppError> {
        sqlx::query_as(&format!("{SELECT_APPLICATION} WHERE applications.pk = $1;"))
            .bind(pk)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(AppError::DoesNotExist)
    }

    pub async fn has_pending(
        applicant_pk: i64,
        group_pk: i64,
        tx: &mut SqliteConnection,
    ) -> Result<bool, AppError> {
        Ok(sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM applications
                WHERE applicant_pk = $1 AND group_pk = $2 AND is_passed = FALSE);",
        )
        .bind(applicant_pk)
        .bind(group_pk)
        .fetch_one(&mut *tx)
        .await?)
    }

    pub async fn mark_passed(&mut self, tx: &mut SqliteConnection) -> Result<(), AppError> {
        sqlx::query("UPDATE applications SET is_passed = TRUE WHERE pk = $1;")
            .bind(self.pk)
            .execute(&mut *tx)
            .await?;
        self.is_passed = true;
        Ok(())
    }

    /// Applications to the groups built by `builder_pk`, newest first.
    pub async fn received(
        builder_pk: i64,
        tx: &mut SqliteConnection,
    ) -> Result<Vec<Self>, AppError> {
        Ok(sqlx::query_as(&format!(
            "{SELECT_APPLICATION} WHERE carpool_groups.builder_pk = $1
             ORDER BY applications.timestamp DESC, applications.pk DESC;"
        ))
        .bind(builder_pk)
        .fetch_all(&mut *tx)
        .await?)
    }

    pub async fn raised(
        applicant_pk: i64,
        tx: &mut SqliteConnection,
    ) -> Result<Vec<Self>, AppError> {
        Ok(sqlx::query_as(&format!(
            "{SELECT_APPLICATION} WHERE applications.applicant_pk = $1
             ORDER BY applications.timestamp DESC, applications.pk DESC;"
        ))
        .bind(applicant_pk)
        .fetch_all(&mut *tx)
        .await?)
    }
}

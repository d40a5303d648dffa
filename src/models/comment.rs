use chrono::NaiveDateTime;
use sqlx::{prelude::FromRow, SqliteConnection};

use crate::{
    errors::AppError,
    markdown::{render, AllowedTags},
    pagination::Pagination,
};

const SELECT_COMMENT: &str = "SELECT comments.pk, comments.body, comments.body_html,
        comments.timestamp, comments.author_pk, comments.group_pk,
        users.username AS author_username
    FROM comments
    INNER JOIN users ON users.pk = comments.author_pk";

#[derive(Debug, Clone, FromRow)]
pub struct Comment {
    pub pk: i64,
    pub body: String,
    pub body_html: String,
    pub timestamp: NaiveDateTime,
    pub author_pk: i64,
    pub group_pk: i64,
    pub author_username: String,
}

impl Comment {
    pub async fn create(
        author_pk: i64,
        group_pk: i64,
        body: &str,
        tx: &mut SqliteConnection,
    ) -> Result<Self, AppError> {
        let pk: i64 = sqlx::query_scalar(
            "INSERT INTO comments (body, body_html, timestamp, author_pk, group_pk)
             VALUES ($1, $2, $3, $4, $5) RETURNING pk;",
        )
        .bind(body)
        .bind(render(body, AllowedTags::Comment))
        .bind(chrono::Utc::now().naive_utc())
        .bind(author_pk)
        .bind(group_pk)
        .fetch_one(&mut *tx)
        .await?;
        Self::get_by_pk(pk, tx).await
    }

    pub async fn get_by_pk(pk: i64, tx: &mut SqliteConnection) -> Result<Self, AppError> {
        sqlx::query_as(&format!("{SELECT_COMMENT} WHERE comments.pk = $1;"))
            .bind(pk)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(AppError::DoesNotExist)
    }

    pub async fn delete(self, tx: &mut SqliteConnection) -> Result<(), AppError> {
        sqlx::query("DELETE FROM comments WHERE pk = $1;")
            .bind(self.pk)
            .execute(&mut *tx)
            .await?;
        Ok(())
    }

    pub async fn count(group_pk: i64, tx: &mut SqliteConnection) -> Result<i64, AppError> {
        Ok(
            sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE group_pk = $1;")
                .bind(group_pk)
                .fetch_one(&mut *tx)
                .await?,
        )
    }

    /// Oldest first. A requested page of `-1` resolves to the last page.
    pub async fn page(
        group_pk: i64,
        requested_page: Option<i64>,
        per_page: i64,
        tx: &mut SqliteConnection,
    ) -> Result<Pagination<Self>, AppError> {
        let total = Self::count(group_pk, tx).await?;
        let page = Pagination::<Self>::resolve_page(requested_page, total, per_page);
        let items = sqlx::query_as(&format!(
            "{SELECT_COMMENT} WHERE comments.group_pk = $1
             ORDER BY comments.timestamp ASC, comments.pk ASC
             LIMIT $2 OFFSET $3;"
        ))
        .bind(group_pk)
        .bind(per_page)
        .bind(Pagination::<Self>::offset(page, per_page))
        .fetch_all(&mut *tx)
        .await?;
        Ok(Pagination {
            items,
            page,
            per_page,
            total,
        })
    }
}

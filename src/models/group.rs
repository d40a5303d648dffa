use chrono::{Duration, NaiveDateTime};
use serde::{Deserialize, Serialize};
use sqlx::{prelude::FromRow, SqliteConnection};

use crate::{
    errors::AppError,
    markdown::{render, AllowedTags},
    pagination::Pagination,
};

use super::{Permission, User};

const SELECT_GROUP: &str = "SELECT carpool_groups.pk, carpool_groups.kind, carpool_groups.description,
        carpool_groups.description_html, carpool_groups.start_time, carpool_groups.start_place,
        carpool_groups.end_place, carpool_groups.people_amount, carpool_groups.timestamp,
        carpool_groups.builder_pk, users.username AS builder_username
    FROM carpool_groups
    INNER JOIN users ON users.pk = carpool_groups.builder_pk";

const LOCAL_TIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M", "%Y-%m-%dT%H:%M", "%Y-%m-%d %H:%M:%S"];

/// Parses a start time typed in the local offset and returns it in UTC.
pub fn parse_local_time(value: &str, utc_offset_hours: i32) -> Result<NaiveDateTime, AppError> {
    LOCAL_TIME_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value.trim(), format).ok())
        .map(|local| local - Duration::hours(utc_offset_hours.into()))
        .ok_or(AppError::InvalidStartTime)
}

pub fn format_local_time(utc: &NaiveDateTime, utc_offset_hours: i32) -> String {
    (*utc + Duration::hours(utc_offset_hours.into()))
        .format("%Y-%m-%d %H:%M")
        .to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum GroupKind {
    Carpool,
    Ride,
}

impl GroupKind {
    /// Students deliver carpools, teachers give rides.
    pub fn for_builder(builder: &User) -> Result<Self, AppError> {
        if builder.can(Permission::DELIVER_CARPOOL) {
            Ok(Self::Carpool)
        } else if builder.can(Permission::GIVE_RIDE) {
            Ok(Self::Ride)
        } else {
            Err(AppError::MissingPermission)
        }
    }

    pub fn join_permission(&self) -> Permission {
        match self {
            Self::Carpool => Permission::JOIN_CARPOOL,
            Self::Ride => Permission::TAKE_RIDE,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Carpool => "carpool",
            Self::Ride => "ride",
        }
    }
}

#[derive(Debug, Clone)]
pub struct GroupInput {
    pub description: String,
    pub start_time: NaiveDateTime,
    pub start_place: String,
    pub end_place: String,
    pub people_amount: i64,
}

#[derive(Debug, Clone, FromRow)]
pub struct Member {
    pub pk: i64,
    pub username: String,
}

#[derive(Debug, Clone, FromRow)]
pub struct Group {
    pub pk: i64,
    pub kind: GroupKind,
    pub description: String,
    pub description_html: String,
    pub start_time: NaiveDateTime,
    pub start_place: String,
    pub end_place: String,
    pub people_amount: i64,
    pub timestamp: NaiveDateTime,
    pub builder_pk: i64,
    pub builder_username: String,
}

impl Group {
    /// Inserts the group and enrolls its builder as the first member.
    pub async fn create(
        builder: &User,
        kind: GroupKind,
        input: GroupInput,
        tx: &mut SqliteConnection,
    ) -> Result<Self, AppError> {
        let description_html = render(&input.description, AllowedTags::Description);
        let pk: i64 = sqlx::query_scalar(
            "INSERT INTO carpool_groups (kind, description, description_html, start_time,
                start_place, end_place, people_amount, timestamp, builder_pk)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING pk;",
        )
        .bind(kind)
        .bind(&input.description)
        .bind(&description_html)
        .bind(input.start_time)
        .bind(&input.start_place)
        .bind(&input.end_place)
        .bind(input.people_amount)
        .bind(chrono::Utc::now().naive_utc())
        .bind(builder.pk)
        .fetch_one(&mut *tx)
        .await?;

        let group = Self::get_by_pk(pk, tx).await?;
        group.add_member(builder.pk, tx).await?;
        Ok(group)
    }

    pub async fn get_by_pk(pk: i64, tx: &mut SqliteConnection) -> Result<Self, AppError> {
        sqlx::query_as(&format!("{SELECT_GROUP} WHERE carpool_groups.pk = $1;"))
            .bind(pk)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or(AppError::DoesNotExist)
    }

    /// Overwrites the editable fields and re-renders the description.
    pub async fn update(
        &mut self,
        input: GroupInput,
        tx: &mut SqliteConnection,
    ) -> Result<(), AppError> {
        let description_html = render(&input.description, AllowedTags::Description);
        sqlx::query(
            "UPDATE carpool_groups SET description = $1, description_html = $2, start_time = $3,
                start_place = $4, end_place = $5, people_amount = $6
             WHERE pk = $7;",
        )
        .bind(&input.description)
        .bind(&description_html)
        .bind(input.start_time)
        .bind(&input.start_place)
        .bind(&input.end_place)
        .bind(input.people_amount)
        .bind(self.pk)
        .execute(&mut *tx)
        .await?;

        self.description = input.description;
        self.description_html = description_html;
        self.start_time = input.start_time;
        self.start_place = input.start_place;
        self.end_place = input.end_place;
        self.people_amount = input.people_amount;
        Ok(())
    }

    /// Removes the comments, applications and memberships before the group itself.
    pub async fn delete(self, tx: &mut SqliteConnection) -> Result<(), AppError> {
        for statement in [
            "DELETE FROM comments WHERE group_pk = $1;",
            "DELETE FROM applications WHERE group_pk = $1;",
            "DELETE FROM groups_members_m2m WHERE group_pk = $1;",
            "DELETE FROM carpool_groups WHERE pk = $1;",
        ] {
            sqlx::query(statement)
                .bind(self.pk)
                .execute(&mut *tx)
                .await?;
        }
        Ok(())
    }

    pub async fn list(
        kind: GroupKind,
        page: i64,
        per_page: i64,
        tx: &mut SqliteConnection,
    ) -> Result<Pagination<Self>, AppError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM carpool_groups WHERE kind = $1;")
            .bind(kind)
            .fetch_one(&mut *tx)
            .await?;
        let items = sqlx::query_as(&format!(
            "{SELECT_GROUP} WHERE carpool_groups.kind = $1
             ORDER BY carpool_groups.start_time DESC, carpool_groups.pk DESC
             LIMIT $2 OFFSET $3;"
        ))
        .bind(kind)
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

    pub async fn built_by(
        builder_pk: i64,
        tx: &mut SqliteConnection,
    ) -> Result<Vec<Self>, AppError> {
        Ok(sqlx::query_as(&format!(
            "{SELECT_GROUP} WHERE carpool_groups.builder_pk = $1
             ORDER BY carpool_groups.timestamp DESC, carpool_groups.pk DESC;"
        ))
        .bind(builder_pk)
        .fetch_all(&mut *tx)
        .await?)
    }

    pub async fn members(&self, tx: &mut SqliteConnection) -> Result<Vec<Member>, AppError> {
        Ok(sqlx::query_as(
            "SELECT users.pk, users.username FROM groups_members_m2m
             INNER JOIN users ON users.pk = groups_members_m2m.user_pk
             WHERE groups_members_m2m.group_pk = $1
             ORDER BY users.username;",
        )
        .bind(self.pk)
        .fetch_all(&mut *tx)
        .await?)
    }

    pub async fn member_count(&self, tx: &mut SqliteConnection) -> Result<i64, AppError> {
        Ok(
            sqlx::query_scalar("SELECT COUNT(*) FROM groups_members_m2m WHERE group_pk = $1;")
                .bind(self.pk)
                .fetch_one(&mut *tx)
                .await?,
        )
    }

    pub async fn is_member(&self, user_pk: i64, tx: &mut SqliteConnection) -> Result<bool, AppError> {
        Ok(sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM groups_members_m2m WHERE group_pk = $1 AND user_pk = $2);",
        )
        .bind(self.pk)
        .bind(user_pk)
        .fetch_one(&mut *tx)
        .await?)
    }

    pub async fn add_member(&self, user_pk: i64, tx: &mut SqliteConnection) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO groups_members_m2m (group_pk, user_pk) VALUES ($1, $2)
             ON CONFLICT DO NOTHING;",
        )
        .bind(self.pk)
        .bind(user_pk)
        .execute(&mut *tx)
        .await?;
        Ok(())
    }

    pub async fn remove_member(
        &self,
        user_pk: i64,
        tx: &mut SqliteConnection,
    ) -> Result<(), AppError> {
        sqlx::query("DELETE FROM groups_members_m2m WHERE group_pk = $1 AND user_pk = $2;")
            .bind(self.pk)
            .bind(user_pk)
            .execute(&mut *tx)
            .await?;
        Ok(())
    }
}

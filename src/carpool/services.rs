//! Authorization rules and the application lifecycle of carpool groups.
//!
//! Every operation that touches more than one row runs in a single transaction.

use crate::{
    database::Database,
    errors::AppError,
    models::{Application, Comment, Group, GroupInput, GroupKind, User},
};

fn can_manage(user: &User, builder_pk: i64) -> bool {
    user.pk == builder_pk || user.is_administrator()
}

pub async fn deliver(
    database: &Database,
    builder: &User,
    input: GroupInput,
) -> Result<Group, AppError> {
    let kind = GroupKind::for_builder(builder)?;
    let mut tx = database.start_transaction().await?;
    let group = Group::create(builder, kind, input, &mut tx).await?;
    tx.commit().await?;
    tracing::info!(group_pk = group.pk, builder_pk = builder.pk, kind = kind.as_str(), "group delivered");
    Ok(group)
}

/// Loads a group the user may edit or delete.
pub async fn managed_group(
    database: &Database,
    user: &User,
    group_pk: i64,
) -> Result<Group, AppError> {
    let mut conn = database.acquire().await?;
    let group = Group::get_by_pk(group_pk, &mut conn).await?;
    if !can_manage(user, group.builder_pk) {
        return Err(AppError::Forbidden);
    }
    Ok(group)
}

pub async fn edit(
    database: &Database,
    user: &User,
    group_pk: i64,
    input: GroupInput,
) -> Result<Group, AppError> {
    let mut tx = database.start_transaction().await?;
    let mut group = Group::get_by_pk(group_pk, &mut tx).await?;
    if !can_manage(user, group.builder_pk) {
        return Err(AppError::Forbidden);
    }
    group.update(input, &mut tx).await?;
    tx.commit().await?;
    Ok(group)
}

pub async fn delete_group(database: &Database, user: &User, group_pk: i64) -> Result<(), AppError> {
    let mut tx = database.start_transaction().await?;
    let group = Group::get_by_pk(group_pk, &mut tx).await?;
    if !can_manage(user, group.builder_pk) {
        return Err(AppError::Forbidden);
    }
    group.delete(&mut tx).await?;
    tx.commit().await?;
    tracing::info!(group_pk, user_pk = user.pk, "group deleted");
    Ok(())
}

pub async fn comment(
    database: &Database,
    author: &User,
    group_pk: i64,
    body: &str,
) -> Result<Comment, AppError> {
    let mut tx = database.start_transaction().await?;
    let group = Group::get_by_pk(group_pk, &mut tx).await?;
    let comment = Comment::create(author.pk, group.pk, body, &mut tx).await?;
    tx.commit().await?;
    Ok(comment)
}

/// Returns the group the deleted comment belonged to.
pub async fn delete_comment(
    database: &Database,
    user: &User,
    comment_pk: i64,
) -> Result<i64, AppError> {
    let mut tx = database.start_transaction().await?;
    let comment = Comment::get_by_pk(comment_pk, &mut tx).await?;
    if !can_manage(user, comment.author_pk) {
        return Err(AppError::Forbidden);
    }
    let group_pk = comment.group_pk;
    comment.delete(&mut tx).await?;
    tx.commit().await?;
    Ok(group_pk)
}

pub async fn apply(database: &Database, user: &User, group_pk: i64) -> Result<Application, AppError> {
    let mut tx = database.start_transaction().await?;
    let group = Group::get_by_pk(group_pk, &mut tx).await?;
    if group.is_member(user.pk, &mut tx).await? {
        return Err(AppError::AlreadyMember);
    }
    if Application::has_pending(user.pk, group.pk, &mut tx).await? {
        return Err(AppError::ApplicationPending);
    }
    if !user.can(group.kind.join_permission()) {
        return Err(AppError::MissingPermission);
    }

    Comment::create(
        user.pk,
        group.pk,
        &format!("{} applied to join", user.username),
        &mut tx,
    )
    .await?;
    let application = Application::create(user.pk, group.pk, &mut tx).await?;
    tx.commit().await?;
    tracing::info!(application_pk = application.pk, group_pk, user_pk = user.pk, "applied");
    Ok(application)
}

/// Only the builder approves, and only while the group has room left.
pub async fn approve(
    database: &Database,
    user: &User,
    application_pk: i64,
) -> Result<Application, AppError> {
    let mut tx = database.start_transaction().await?;
    let mut application = Application::get_by_pk(application_pk, &mut tx).await?;
    let group = Group::get_by_pk(application.group_pk, &mut tx).await?;
    if group.is_member(application.applicant_pk, &mut tx).await? {
        return Err(AppError::AlreadyMember);
    }
    if user.pk != group.builder_pk {
        return Err(AppError::Forbidden);
    }
    if group.member_count(&mut tx).await? >= group.people_amount {
        return Err(AppError::GroupFull);
    }

    application.mark_passed(&mut tx).await?;
    group.add_member(application.applicant_pk, &mut tx).await?;
    Comment::create(
        user.pk,
        group.pk,
        &format!("Approved {} to join", application.applicant_username),
        &mut tx,
    )
    .await?;
    tx.commit().await?;
    tracing::info!(application_pk, group_pk = group.pk, "application approved");
    Ok(application)
}

pub async fn quit(database: &Database, user: &User, group_pk: i64) -> Result<(), AppError> {
    let mut tx = database.start_transaction().await?;
    let group = Group::get_by_pk(group_pk, &mut tx).await?;
    if !group.is_member(user.pk, &mut tx).await? {
        return Err(AppError::NotMember);
    }
    if group.builder_pk == user.pk {
        return Err(AppError::BuilderCannotQuit);
    }
    group.remove_member(user.pk, &mut tx).await?;
    tx.commit().await?;
    Ok(())
}

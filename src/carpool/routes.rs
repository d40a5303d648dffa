use askama::Template;
use axum::{
    extract::{Path, Query, State},
    handler::Handler,
    http::{header::SET_COOKIE, HeaderValue},
    middleware,
    response::{IntoResponse, Redirect, Response},
    routing::get,
    Extension, Router,
};
use axum_extra::{headers::Cookie, TypedHeader};

use crate::{
    auth::{admin_required_middleware, login_required_middleware, CurrentUser},
    errors::AppError,
    log_and_wrap_custom_internal,
    models::{format_local_time, Application, Comment, Group, GroupKind, Role, User},
    pagination::{PageQuery, Pager, Pagination},
    state::AppState,
    website::{
        flash_and_redirect, flash_outcome, template_to_response, HtmlError, HtmlResult, Meta,
        Page, SecureForm,
    },
};

use super::{
    forms::{AdminProfileForm, CommentForm, GroupForm, ProfileForm},
    services,
    views::{ApplicationRow, Choice, CommentRow, GroupRow, ProfileFields},
};

const SHOW_RIDE_COOKIE: &str = "show_ride";
const SHOW_RIDE_MAX_AGE_DAYS: i64 = 30;

pub fn routes() -> Router<AppState> {
    let admin = Router::new()
        .route(
            "/edit-profile/{pk}",
            get(edit_profile_admin).post(post_edit_profile_admin),
        )
        .route_layer(middleware::from_fn(admin_required_middleware));

    let protected = Router::new()
        .route("/edit-profile", get(edit_profile).post(post_edit_profile))
        .route("/deliver-carpool", get(deliver_carpool).post(post_deliver_carpool))
        .route("/edit/{pk}", get(edit).post(post_edit))
        .route("/delete-carpool/{pk}", get(delete_carpool))
        .route("/delete-comment/{pk}", get(delete_comment))
        .route("/apply/{group_pk}", get(apply))
        .route("/approve/{application_pk}", get(approve))
        .route("/applies-received", get(applies_received))
        .route("/applies-raised", get(applies_raised))
        .route("/quit/{group_pk}", get(quit))
        .route("/carpools", get(carpools))
        .merge(admin)
        .route_layer(middleware::from_fn(login_required_middleware));

    Router::new()
        .route("/", get(index))
        .route("/show-carpool", get(show_carpool))
        .route("/show-ride", get(show_ride))
        .route("/user/{username}", get(user))
        .route(
            "/carpool/{pk}",
            get(carpool).post(post_comment.layer(middleware::from_fn(login_required_middleware))),
        )
        .merge(protected)
}

#[derive(Template)]
#[template(path = "index.html")]
struct IndexTemplate<'a> {
    meta: Meta<'a>,
    show_ride: bool,
    groups: Vec<GroupRow>,
    pager: Pager,
}

async fn index(
    State(state): State<AppState>,
    page: Page,
    Query(query): Query<PageQuery>,
    cookie: Option<TypedHeader<Cookie>>,
) -> HtmlResult {
    let show_ride = cookie
        .as_ref()
        .and_then(|TypedHeader(cookie)| cookie.get(SHOW_RIDE_COOKIE))
        .is_some_and(|value| !value.is_empty());
    let kind = if show_ride {
        GroupKind::Ride
    } else {
        GroupKind::Carpool
    };

    let config = state.config();
    let requested = Pagination::<Group>::resolve_page(query.page, 0, config.groups_per_page);
    let mut conn = state.database().acquire().await.map_err(AppError::from)?;
    let groups = Group::list(kind, requested, config.groups_per_page, &mut conn).await?;
    let pager = groups.pager("/");
    let offset = config.utc_offset_hours;

    template_to_response(&IndexTemplate {
        meta: page.meta("Carpool").await,
        show_ride,
        groups: groups.items.into_iter().map(|g| GroupRow::new(g, offset)).collect(),
        pager,
    })
}

fn show_ride_response(value: &str) -> Result<Response, HtmlError> {
    let cookie = cookie::Cookie::build((SHOW_RIDE_COOKIE, value))
        .path("/")
        .max_age(cookie::time::Duration::days(SHOW_RIDE_MAX_AGE_DAYS))
        .build();
    let mut response = Redirect::to("/").into_response();
    response.headers_mut().append(
        SET_COOKIE,
        HeaderValue::from_str(&cookie.encoded().to_string())
            .map_err(|e| log_and_wrap_custom_internal!(e))?,
    );
    Ok(response)
}

async fn show_carpool() -> HtmlResult {
    show_ride_response("")
}

async fn show_ride() -> HtmlResult {
    show_ride_response("1")
}

#[derive(Template)]
#[template(path = "user.html")]
struct UserTemplate<'a> {
    meta: Meta<'a>,
    user: User,
    avatar: String,
    member_since: String,
    is_self: bool,
    viewer_is_admin: bool,
    groups: Vec<GroupRow>,
}

async fn user(
    State(state): State<AppState>,
    page: Page,
    Path(username): Path<String>,
) -> HtmlResult {
    let mut conn = state.database().acquire().await.map_err(AppError::from)?;
    let user = User::find_by_username(&username, &mut conn)
        .await?
        .ok_or(AppError::DoesNotExist)?;
    let offset = state.config().utc_offset_hours;
    let groups = Group::built_by(user.pk, &mut conn)
        .await?
        .into_iter()
        .map(|g| GroupRow::new(g, offset))
        .collect();

    template_to_response(&UserTemplate {
        meta: page.meta(username).await,
        avatar: user.gravatar(256),
        member_since: format_local_time(&user.member_since, offset),
        is_self: page.viewer().is_some_and(|viewer| viewer.pk == user.pk),
        viewer_is_admin: page.viewer().is_some_and(User::is_administrator),
        user,
        groups,
    })
}

#[derive(Template)]
#[template(path = "edit_profile.html")]
struct EditProfileTemplate<'a> {
    meta: Meta<'a>,
    profile: ProfileFields,
    grades: Vec<Choice>,
}

async fn edit_profile(
    page: Page,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> HtmlResult {
    let profile = ProfileFields::from(&user);
    template_to_response(&EditProfileTemplate {
        meta: page.meta("Edit profile").await,
        grades: Choice::grades(&profile.grade),
        profile,
    })
}

async fn post_edit_profile(
    State(state): State<AppState>,
    page: Page,
    Extension(CurrentUser(mut user)): Extension<CurrentUser>,
    form: SecureForm<ProfileForm>,
) -> HtmlResult {
    let result = match form.data().into_update() {
        Ok(update) => {
            let mut conn = state.database().acquire().await.map_err(AppError::from)?;
            user.update_profile(update, &mut conn).await
        }
        Err(e) => Err(e),
    };
    match flash_outcome(page.session(), result, "Your profile has been updated.").await? {
        Some(()) => Ok(Redirect::to(&format!("/user/{}", user.username)).into_response()),
        None => Ok(Redirect::to("/edit-profile").into_response()),
    }
}

#[derive(Template)]
#[template(path = "edit_profile_admin.html")]
struct EditProfileAdminTemplate<'a> {
    meta: Meta<'a>,
    user: User,
    profile: ProfileFields,
    grades: Vec<Choice>,
    roles: Vec<Choice>,
}

async fn edit_profile_admin(
    State(state): State<AppState>,
    page: Page,
    Path(pk): Path<i64>,
) -> HtmlResult {
    let mut conn = state.database().acquire().await.map_err(AppError::from)?;
    let user = User::get_by_pk(pk, &mut conn).await?;
    let roles = Role::list(&mut conn)
        .await?
        .into_iter()
        .map(|role| Choice {
            value: role.pk.to_string(),
            selected: Some(role.pk) == user.role_pk,
            label: role.name,
        })
        .collect();
    let profile = ProfileFields::from(&user);

    template_to_response(&EditProfileAdminTemplate {
        meta: page.meta("Edit profile").await,
        grades: Choice::grades(&profile.grade),
        profile,
        roles,
        user,
    })
}

async fn post_edit_profile_admin(
    State(state): State<AppState>,
    page: Page,
    Path(pk): Path<i64>,
    form: SecureForm<AdminProfileForm>,
) -> HtmlResult {
    let mut tx = state.database().start_transaction().await?;
    let user = User::get_by_pk(pk, &mut tx).await?;
    let result = match form.data().into_update() {
        Ok(update) => user.admin_update(update, &mut tx).await,
        Err(e) => Err(e),
    };
    match flash_outcome(page.session(), result, "The profile has been updated.").await? {
        Some(user) => {
            tx.commit().await.map_err(AppError::from)?;
            tracing::info!(user_pk = user.pk, "profile updated by an administrator");
            Ok(Redirect::to(&format!("/user/{}", user.username)).into_response())
        }
        None => Ok(Redirect::to(&format!("/edit-profile/{pk}")).into_response()),
    }
}

#[derive(Template)]
#[template(path = "group_form.html")]
struct GroupFormTemplate<'a> {
    meta: Meta<'a>,
    action: String,
    form: GroupFields,
}

#[derive(Default)]
struct GroupFields {
    start_time: String,
    start_place: String,
    end_place: String,
    people_amount: String,
    description: String,
}

async fn deliver_carpool(
    page: Page,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> HtmlResult {
    let kind = GroupKind::for_builder(&user)?;
    let title = match kind {
        GroupKind::Carpool => "Deliver a carpool",
        GroupKind::Ride => "Offer a ride",
    };
    template_to_response(&GroupFormTemplate {
        meta: page.meta(title).await,
        action: "/deliver-carpool".into(),
        form: GroupFields::default(),
    })
}

async fn post_deliver_carpool(
    State(state): State<AppState>,
    page: Page,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    form: SecureForm<GroupForm>,
) -> HtmlResult {
    let result = match form.data().into_input(state.config().utc_offset_hours) {
        Ok(input) => services::deliver(state.database(), &user, input).await,
        Err(e) => Err(e),
    };
    let published = "Published! Please make sure your profile is complete.";
    match flash_outcome(page.session(), result, published).await? {
        Some(group) => Ok(Redirect::to(&format!("/carpool/{}", group.pk)).into_response()),
        None => Ok(Redirect::to("/deliver-carpool").into_response()),
    }
}

#[derive(Template)]
#[template(path = "carpool.html")]
struct CarpoolTemplate<'a> {
    meta: Meta<'a>,
    group: GroupRow,
    members: Vec<String>,
    member_count: usize,
    comments: Vec<CommentRow>,
    pager: Pager,
    can_manage: bool,
    is_member: bool,
    is_builder: bool,
    logged_in: bool,
}

async fn carpool(
    State(state): State<AppState>,
    page: Page,
    Path(pk): Path<i64>,
    Query(query): Query<PageQuery>,
) -> HtmlResult {
    let config = state.config();
    let mut conn = state.database().acquire().await.map_err(AppError::from)?;
    let group = Group::get_by_pk(pk, &mut conn).await?;
    let members: Vec<String> = group
        .members(&mut conn)
        .await?
        .into_iter()
        .map(|m| m.username)
        .collect();
    let comments = Comment::page(group.pk, query.page, config.comments_per_page, &mut conn).await?;
    let pager = comments.pager(&format!("/carpool/{}", group.pk));

    let viewer = page.viewer();
    let is_member = viewer.is_some_and(|v| members.contains(&v.username));
    let is_builder = viewer.is_some_and(|v| v.pk == group.builder_pk);
    let can_manage = is_builder || viewer.is_some_and(User::is_administrator);
    let offset = config.utc_offset_hours;
    let comments = comments
        .items
        .into_iter()
        .map(|c| CommentRow::new(c, viewer, offset))
        .collect();
    let title = format!("{} to {}", group.start_place, group.end_place);

    template_to_response(&CarpoolTemplate {
        meta: page.meta(title).await,
        group: GroupRow::new(group, offset),
        member_count: members.len(),
        members,
        comments,
        pager,
        can_manage,
        is_member,
        is_builder,
        logged_in: viewer.is_some(),
    })
}

async fn post_comment(
    State(state): State<AppState>,
    page: Page,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(pk): Path<i64>,
    form: SecureForm<CommentForm>,
) -> HtmlResult {
    services::comment(state.database(), &user, pk, &form.data().body).await?;
    Ok(flash_and_redirect(
        page.session(),
        "Your comment has been published.",
        &format!("/carpool/{pk}?page=-1"),
    )
    .await)
}

async fn edit(
    State(state): State<AppState>,
    page: Page,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(pk): Path<i64>,
) -> HtmlResult {
    let group = services::managed_group(state.database(), &user, pk).await?;
    let form = GroupFields {
        start_time: format_local_time(&group.start_time, state.config().utc_offset_hours),
        start_place: group.start_place,
        end_place: group.end_place,
        people_amount: group.people_amount.to_string(),
        description: group.description,
    };
    template_to_response(&GroupFormTemplate {
        meta: page.meta("Edit carpool").await,
        action: format!("/edit/{pk}"),
        form,
    })
}

async fn post_edit(
    State(state): State<AppState>,
    page: Page,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(pk): Path<i64>,
    form: SecureForm<GroupForm>,
) -> HtmlResult {
    let result = match form.data().into_input(state.config().utc_offset_hours) {
        Ok(input) => services::edit(state.database(), &user, pk, input).await,
        Err(e) => Err(e),
    };
    match flash_outcome(page.session(), result, "The carpool has been updated.").await? {
        Some(_) => Ok(Redirect::to(&format!("/carpool/{pk}")).into_response()),
        None => Ok(Redirect::to(&format!("/edit/{pk}")).into_response()),
    }
}

async fn delete_carpool(
    State(state): State<AppState>,
    page: Page,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(pk): Path<i64>,
) -> HtmlResult {
    services::delete_group(state.database(), &user, pk).await?;
    Ok(flash_and_redirect(page.session(), "The carpool has been deleted.", "/").await)
}

async fn delete_comment(
    State(state): State<AppState>,
    page: Page,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(pk): Path<i64>,
) -> HtmlResult {
    let group_pk = services::delete_comment(state.database(), &user, pk).await?;
    Ok(flash_and_redirect(
        page.session(),
        "The comment has been deleted.",
        &format!("/carpool/{group_pk}"),
    )
    .await)
}

async fn apply(
    State(state): State<AppState>,
    page: Page,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(group_pk): Path<i64>,
) -> HtmlResult {
    let result = services::apply(state.database(), &user, group_pk).await;
    flash_outcome(page.session(), result, "Your application has been submitted!").await?;
    Ok(Redirect::to(&format!("/carpool/{group_pk}")).into_response())
}

async fn approve(
    State(state): State<AppState>,
    page: Page,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(application_pk): Path<i64>,
) -> HtmlResult {
    let result = services::approve(state.database(), &user, application_pk).await;
    flash_outcome(page.session(), result, "Approved.").await?;
    Ok(Redirect::to("/applies-received").into_response())
}

#[derive(Template)]
#[template(path = "applications.html")]
struct ApplicationsTemplate<'a> {
    meta: Meta<'a>,
    received: bool,
    applications: Vec<ApplicationRow>,
}

async fn applies_received(
    State(state): State<AppState>,
    page: Page,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> HtmlResult {
    let mut conn = state.database().acquire().await.map_err(AppError::from)?;
    let offset = state.config().utc_offset_hours;
    let applications = Application::received(user.pk, &mut conn)
        .await?
        .into_iter()
        .map(|a| ApplicationRow::new(a, offset))
        .collect();
    template_to_response(&ApplicationsTemplate {
        meta: page.meta("Applications received").await,
        received: true,
        applications,
    })
}

async fn applies_raised(
    State(state): State<AppState>,
    page: Page,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> HtmlResult {
    let mut conn = state.database().acquire().await.map_err(AppError::from)?;
    let offset = state.config().utc_offset_hours;
    let applications = Application::raised(user.pk, &mut conn)
        .await?
        .into_iter()
        .map(|a| ApplicationRow::new(a, offset))
        .collect();
    template_to_response(&ApplicationsTemplate {
        meta: page.meta("My applications").await,
        received: false,
        applications,
    })
}

async fn quit(
    State(state): State<AppState>,
    page: Page,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
    Path(group_pk): Path<i64>,
) -> HtmlResult {
    let result = services::quit(state.database(), &user, group_pk).await;
    flash_outcome(page.session(), result, "You have left the group.").await?;
    Ok(Redirect::to(&format!("/carpool/{group_pk}")).into_response())
}

#[derive(Template)]
#[template(path = "carpools.html")]
struct CarpoolsTemplate<'a> {
    meta: Meta<'a>,
    groups: Vec<GroupRow>,
}

async fn carpools(
    State(state): State<AppState>,
    page: Page,
    Extension(CurrentUser(user)): Extension<CurrentUser>,
) -> HtmlResult {
    let mut conn = state.database().acquire().await.map_err(AppError::from)?;
    let offset = state.config().utc_offset_hours;
    let groups = Group::built_by(user.pk, &mut conn)
        .await?
        .into_iter()
        .map(|g| GroupRow::new(g, offset))
        .collect();
    template_to_response(&CarpoolsTemplate {
        meta: page.meta("My carpools").await,
        groups,
    })
}

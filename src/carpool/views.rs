use crate::models::{format_local_time, Application, Comment, Group, User};

/// Group as listed on the index and detail pages, times in the local offset.
pub struct GroupRow {
    pub pk: i64,
    pub kind: &'static str,
    pub start_time: String,
    pub start_place: String,
    pub end_place: String,
    pub people_amount: i64,
    pub builder_username: String,
    pub description_html: String,
    pub posted: String,
}

impl GroupRow {
    pub fn new(group: Group, utc_offset_hours: i32) -> Self {
        Self {
            pk: group.pk,
            kind: group.kind.as_str(),
            start_time: format_local_time(&group.start_time, utc_offset_hours),
            posted: format_local_time(&group.timestamp, utc_offset_hours),
            start_place: group.start_place,
            end_place: group.end_place,
            people_amount: group.people_amount,
            builder_username: group.builder_username,
            description_html: group.description_html,
        }
    }
}

pub struct CommentRow {
    pub pk: i64,
    pub author_username: String,
    pub posted: String,
    pub body_html: String,
    pub can_delete: bool,
}

impl CommentRow {
    pub fn new(comment: Comment, viewer: Option<&User>, utc_offset_hours: i32) -> Self {
        let can_delete = viewer
            .is_some_and(|user| user.pk == comment.author_pk || user.is_administrator());
        Self {
            pk: comment.pk,
            posted: format_local_time(&comment.timestamp, utc_offset_hours),
            author_username: comment.author_username,
            body_html: comment.body_html,
            can_delete,
        }
    }
}

pub struct ApplicationRow {
    pub pk: i64,
    pub group_pk: i64,
    pub applicant_username: String,
    pub route: String,
    pub submitted: String,
    pub is_passed: bool,
}

impl ApplicationRow {
    pub fn new(application: Application, utc_offset_hours: i32) -> Self {
        Self {
            pk: application.pk,
            group_pk: application.group_pk,
            route: format!("{} to {}", application.start_place, application.end_place),
            submitted: format_local_time(&application.timestamp, utc_offset_hours),
            applicant_username: application.applicant_username,
            is_passed: application.is_passed,
        }
    }
}

/// Profile fields prefilled in the edit forms.
pub struct ProfileFields {
    pub name: String,
    pub grade: String,
    pub about_me: String,
}

impl From<&User> for ProfileFields {
    fn from(user: &User) -> Self {
        Self {
            name: user.name.clone().unwrap_or_default(),
            grade: user.grade.clone().unwrap_or_default(),
            about_me: user.about_me.clone().unwrap_or_default(),
        }
    }
}

/// Option of a `<select>`, `selected` already resolved.
pub struct Choice {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

impl Choice {
    pub fn grades(current: &str) -> Vec<Self> {
        std::iter::once("")
            .chain(super::forms::GRADES)
            .map(|grade| Self {
                value: grade.to_owned(),
                label: if grade.is_empty() { "-".into() } else { grade.to_owned() },
                selected: grade == current,
            })
            .collect()
    }
}

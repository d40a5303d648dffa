mod application;
mod comment;
mod group;
mod permission;
mod role;
mod user;

pub use application::Application;
pub use comment::Comment;
pub use group::{format_local_time, parse_local_time, Group, GroupInput, GroupKind, Member};
pub use permission::Permission;
pub use role::{Role, RoleName};
pub use user::{avatar_hash, validate_username, AdminProfileUpdate, NewUser, ProfileUpdate, User};

pub mod auth;
pub mod carpool;
pub mod config;
pub mod database;
pub mod errors;
pub mod mailing;
pub mod markdown;
pub mod models;
pub mod pagination;
pub mod router;
mod server;
pub mod sessions;
pub mod state;
mod telemetry;
pub mod website;

pub use config::{Config, Env};
pub use errors::AppError;
pub use router::{get_app, get_router};
pub use server::{prepare_database, Server, ENV_PREFIX};
pub use state::AppState;

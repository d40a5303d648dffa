mod forms;
mod routes;
pub mod services;
mod views;

pub use routes::routes;

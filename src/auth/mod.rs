mod forms;
mod middlewares;
mod passwords;
mod routes;
pub mod services;
mod tokens;

pub use middlewares::{
    admin_required_middleware, login_required_middleware, sessions_middleware,
    set_session_cookies, unconfirmed_middleware, CurrentUser, Viewer,
};
pub use passwords::{hash_password, verify_password};
pub use routes::routes;
pub use tokens::{Keys, TokenAction};

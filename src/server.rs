use std::net::SocketAddr;

use axum::{extract::Request, ServiceExt};
use menva::read_default_file;
use tokio::{net::TcpListener, signal};

use crate::{
    config::Config, errors::AppError, models::Role, router::get_app, state::AppState,
    telemetry::init_tracing,
};

pub const ENV_PREFIX: &str = "CARPOOL_";

/// Builds and runs the web server.
///
/// ```no_run
/// carpool::Server::default()
///     .load_environment_variables()
///     .set_config_from_env()
///     .enable_migrations()
///     .run();
/// ```
#[derive(Default)]
pub struct Server {
    config: Option<Config>,
    run_migrations: bool,
}

impl Server {
    pub fn new(config: Config) -> Self {
        Self {
            config: Some(config),
            run_migrations: false,
        }
    }

    pub fn load_environment_variables(self) -> Self {
        read_default_file();
        self
    }

    pub fn set_config_from_env(mut self) -> Self {
        self.config = Some(Config::from_env_with_prefix(ENV_PREFIX));
        self
    }

    pub fn enable_migrations(mut self) -> Self {
        self.run_migrations = true;
        self
    }

    pub fn run(self) {
        let config = self
            .config
            .clone()
            .expect("Missing the config, call set_config_from_env first");
        let _guards = init_tracing(&config.env, config.sentry_dsn());

        let result = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .worker_threads(config.worker_threads.max(1))
            .build()
            .expect("Cannot build the tokio runtime")
            .block_on(self.serve(config));

        if let Err(e) = result {
            tracing::error!(error = %e, "server stopped");
        }
    }

    async fn serve(self, config: Config) -> Result<(), AppError> {
        let state = AppState::new(config);

        if self.run_migrations {
            prepare_database(&state).await?;
        }

        let addr = state.config().socket_addr();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| crate::log_and_wrap_custom_internal!(e))?;
        tracing::info!(ip = %addr.0, port = addr.1, env = %state.config().env, "listening");

        let app = get_app(state);
        axum::serve(
            listener,
            ServiceExt::<Request>::into_make_service_with_connect_info::<SocketAddr>(app),
        )
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| crate::log_and_wrap_custom_internal!(e))
    }
}

/// Runs the migrations, seeds the roles and drops the expired sessions.
pub async fn prepare_database(state: &AppState) -> Result<(), AppError> {
    state.database().run_migrations().await?;
    let mut tx = state.database().start_transaction().await?;
    Role::insert_roles(&mut tx).await?;
    tx.commit().await?;
    let purged = state.sessions().purge_expired().await?;
    tracing::info!(purged, "database ready");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

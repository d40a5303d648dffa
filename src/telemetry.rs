use sentry::ClientInitGuard;
use sentry_tracing::EventFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt::format::FmtSpan, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Env;

/// Keeps the log writer and the Sentry client alive until the server stops.
pub struct TracingGuards {
    _writer: WorkerGuard,
    _sentry: Option<ClientInitGuard>,
}

pub fn init_tracing(env: &Env, sentry_dsn: Option<&str>) -> TracingGuards {
    let (non_blocking, writer_guard) = tracing_appender::non_blocking(std::io::stdout());

    let registry = tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "carpool=info,tower_http=info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(non_blocking)
                .log_internal_errors(true)
                .with_file(true)
                .with_line_number(true)
                .with_thread_ids(true)
                .with_current_span(true)
                .with_span_events(FmtSpan::CLOSE)
                .with_span_list(true)
                .with_target(true),
        );

    let sentry_guard = match sentry_dsn {
        Some(dsn) => {
            let guard = sentry::init((
                dsn,
                sentry::ClientOptions {
                    release: sentry::release_name!(),
                    environment: Some(env.to_string().into()),
                    debug: matches!(env, Env::Development | Env::Test),
                    ..Default::default()
                },
            ));

            let sentry_layer = sentry_tracing::layer().event_filter(|md| match *md.level() {
                tracing::Level::ERROR | tracing::Level::WARN => EventFilter::Event,
                _ => EventFilter::Ignore,
            });

            registry.with(sentry_layer).init();
            Some(guard)
        }
        None => {
            registry.init();
            None
        }
    };

    TracingGuards {
        _writer: writer_guard,
        _sentry: sentry_guard,
    }
}

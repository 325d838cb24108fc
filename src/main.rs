use std::{future::IntoFuture, net::SocketAddr, process, sync::Arc};

use portfolio::{
    application::{
        auth::AdminAuthService, contact::ContactNotices, error::AppError, mail::Mailer,
    },
    cache::{CacheConfig, ServerCache},
    config,
    infra::{
        db::{InMemoryDocumentStore, PostgresDocumentStore},
        error::InfraError,
        http::{
            self, AppState, Collaborators, RateLimiter, RequestGate, RouteRateLimits,
            SessionCookie,
        },
        mail::{HttpMailer, LogMailer},
        telemetry,
    },
};
use sqlx::PgPool;
use tokio::sync::Notify;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
    }
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let database_url = settings
        .database
        .url
        .as_deref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))?;

    connect_database(database_url, &settings.database).await?;
    info!(target = "portfolio::migrate", "database schema is up to date");
    Ok(())
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let collaborators = build_collaborators(&settings)?;
    let sweeper = http::spawn_sweeper(
        collaborators.request_gate.limiter.clone(),
        settings.rate_limit.sweep_interval,
    );

    let state = match settings.database.url.as_deref() {
        Some(url) => {
            let pool = connect_database(url, &settings.database).await?;
            AppState::new(Arc::new(PostgresDocumentStore::new(pool)), collaborators)
        }
        None => {
            warn!(
                target = "portfolio::serve",
                "no database url configured; content lives in memory and is lost on restart"
            );
            AppState::new(Arc::new(InMemoryDocumentStore::new()), collaborators)
        }
    };

    let result = serve_http(&settings.server, state).await;

    sweeper.abort();
    let _ = sweeper.await;

    result
}

async fn connect_database(
    url: &str,
    database: &config::DatabaseSettings,
) -> Result<PgPool, AppError> {
    let pool = PostgresDocumentStore::connect(url, database.max_connections.get())
        .await
        .map_err(InfraError::from)?;
    PostgresDocumentStore::run_migrations(&pool)
        .await
        .map_err(InfraError::from)?;
    Ok(pool)
}

fn build_collaborators(settings: &config::Settings) -> Result<Collaborators, AppError> {
    let cache = Arc::new(ServerCache::new(CacheConfig::from(&settings.cache)));

    let auth = Arc::new(AdminAuthService::new(
        &settings.auth.admin_password,
        &settings.auth.token_secret,
        settings.auth.session_ttl,
    ));

    let request_gate = RequestGate::new(
        Arc::new(RateLimiter::new()),
        RouteRateLimits::from(&settings.rate_limit),
    )
    .trust_forwarded_headers(settings.rate_limit.trust_forwarded_headers);

    let mailer: Arc<dyn Mailer> = match settings.mail.transport.as_ref() {
        Some(transport) => Arc::new(
            HttpMailer::new(
                transport.endpoint.clone(),
                transport.api_key.clone(),
                settings.mail.from.clone(),
            )
            .map_err(|err| {
                AppError::from(InfraError::configuration(format!(
                    "mail client could not be built: {err}"
                )))
            })?,
        ),
        None => {
            info!(
                target = "portfolio::serve",
                "mail transport not configured; outgoing mail is logged only"
            );
            Arc::new(LogMailer)
        }
    };

    Ok(Collaborators {
        cache,
        mailer,
        auth,
        request_gate,
        contact_notices: ContactNotices {
            admin_address: settings.mail.admin_address.clone(),
            signature: settings.mail.signature.clone(),
            auto_reply: settings.mail.auto_reply,
        },
        session_cookie: SessionCookie {
            secure: settings.auth.secure_cookie,
        },
    })
}

async fn serve_http(server: &config::ServerSettings, state: AppState) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(server.addr)
        .await
        .map_err(InfraError::from)?;
    info!(
        target = "portfolio::serve",
        addr = %server.addr,
        "listening"
    );

    let stopping = Arc::new(Notify::new());
    let signal = {
        let stopping = stopping.clone();
        async move {
            shutdown_signal().await;
            stopping.notify_one();
        }
    };

    let serve = axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(signal)
    .into_future();

    let grace = server.graceful_shutdown;
    tokio::select! {
        result = serve => result.map_err(|err| AppError::from(InfraError::from(err))),
        _ = async {
            stopping.notified().await;
            tokio::time::sleep(grace).await;
        } => {
            warn!(
                target = "portfolio::serve",
                grace_seconds = grace.as_secs(),
                "in-flight requests did not finish before the shutdown deadline"
            );
            Ok(())
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!(target = "portfolio::serve", "shutdown signal received");
}

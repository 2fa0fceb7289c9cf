use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

use scheduler::config::AppConfig;
use scheduler::db;
use scheduler::handlers;
use scheduler::services::clock::SystemClock;
use scheduler::services::email::EmailSettings;
use scheduler::services::mailer::resend::ResendMailer;
use scheduler::services::mailer::{LogMailer, Mailer};
use scheduler::services::notifications::{self, Notifier};
use scheduler::services::rate_limit::RateLimiter;
use scheduler::state::AppState;

const RATE_LIMIT_SWEEP: Duration = Duration::from_secs(10 * 60);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = AppConfig::from_env();

    if config.admin_password.is_empty() {
        tracing::warn!("ADMIN_PASSWORD not set, admin endpoints will refuse every request");
    }

    let conn = db::init_db(&config.database_url)?;
    tracing::info!("database ready at {}", config.database_url);

    let mailer: Arc<dyn Mailer> = if config.resend_api_key.is_empty() {
        tracing::warn!("RESEND_API_KEY not set, emails will only be logged");
        Arc::new(LogMailer)
    } else {
        tracing::info!("using Resend mailer (from: {})", config.mail_from);
        Arc::new(ResendMailer::new(
            config.resend_api_key.clone(),
            config.mail_from.clone(),
        )?)
    };

    let (notifier, rx) = Notifier::channel();
    let settings = EmailSettings {
        api_base_url: config.api_base_url.clone(),
        contact_email: config.contact_email.clone(),
    };
    tokio::spawn(notifications::run_dispatcher(rx, mailer, settings));

    let state = Arc::new(AppState {
        db: Arc::new(Mutex::new(conn)),
        clock: Arc::new(SystemClock::new(config.business_timezone)),
        rate_limiter: RateLimiter::default(),
        notifier,
        config: config.clone(),
    });

    let sweeper = Arc::clone(&state);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(RATE_LIMIT_SWEEP);
        loop {
            interval.tick().await;
            let purged = sweeper.rate_limiter.purge_idle();
            if purged > 0 {
                tracing::debug!(purged, "purged idle rate limit entries");
            }
        }
    });

    let app = handlers::router(state).layer(TraceLayer::new_for_http());

    let addr = format!("0.0.0.0:{}", config.port);
    tracing::info!(
        "starting server on {addr} (timezone: {})",
        config.business_timezone
    );

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}

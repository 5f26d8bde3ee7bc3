use anyhow::{Context, Result};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use bookkeeper::crypto::CryptoSidecar;
use bookkeeper::dedup::DedupGuard;
use bookkeeper::ledger::{init_database_schema, PgLedger};
use bookkeeper::media::ImageArchive;
use bookkeeper::recognition::AiRecognizer;
use bookkeeper::server::ARCHIVE_ROUTE;
use bookkeeper::wecom::WeComClient;
use bookkeeper::workspace::PendingWorkspace;
use bookkeeper::{router, AppState, Collaborators, DispatchSettings, Dispatcher, Settings};

fn init_tracing() -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    let json = std::env::var("LOG_FORMAT").is_ok_and(|v| v.eq_ignore_ascii_case("json"));

    // Initialize logging
    if json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init()?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    init_tracing()?;
    info!("Starting receipt bookkeeping bot");

    let settings = Settings::from_env().context("Invalid configuration")?;

    info!("Connecting to ledger database");
    let ledger = PgLedger::connect(&settings.database_url).await?;
    init_database_schema(ledger.pool()).await?;

    let crypto = Arc::new(CryptoSidecar::new(
        &settings.crypto_gateway_url,
        settings.collaborator_timeout,
    )?);
    let wecom = Arc::new(WeComClient::new(
        settings.wecom.clone(),
        settings.collaborator_timeout,
    )?);
    let recognizer = Arc::new(AiRecognizer::new(
        settings.ai.clone(),
        settings.deep_link.clone(),
    )?);

    let collaborators = Collaborators {
        recognizer,
        messenger: wecom.clone(),
        media: wecom,
        ledger: Arc::new(ledger),
        admin_links: None,
    };
    let dispatcher = Dispatcher::new(
        Arc::new(PendingWorkspace::new()),
        Arc::new(DedupGuard::new(settings.dedup_capacity)),
        collaborators,
        Some(ImageArchive::new(settings.image_archive_dir.clone())),
        DispatchSettings {
            deep_link_enabled: settings.deep_link.enabled,
            collaborator_timeout: settings.collaborator_timeout,
            image_base_url: Some(format!(
                "{}{ARCHIVE_ROUTE}",
                settings.penetrate_url.trim_end_matches('/')
            )),
            ..DispatchSettings::default()
        },
    );

    let app = router(AppState {
        crypto,
        dispatcher: Arc::new(dispatcher),
        archive_dir: Some(settings.image_archive_dir.clone()),
    });

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", settings.bind_addr))?;
    info!(addr = %settings.bind_addr, "Webhook server listening");

    axum::serve(listener, app).await?;
    Ok(())
}

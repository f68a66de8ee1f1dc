use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use sha2::{Digest, Sha256};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storyreel_core::{
    create_audit_system, load_config, validate_config, AuditEvent, AuditStore, Generators,
    HttpGenerator, PipelineController, RecoverySweeper, SqliteAuditStore, SqliteStoryStore,
    StoryDriver, StoryStore,
};

use storyreel_server::api::create_router;
use storyreel_server::state::AppState;

/// Application version
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Buffer size for audit event channel
const AUDIT_BUFFER_SIZE: usize = 1000;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Determine config path
    let config_path = std::env::var("STORYREEL_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    // Load configuration
    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;

    validate_config(&config).context("Configuration validation failed")?;

    info!("Configuration loaded successfully");
    info!("Database path: {:?}", config.database.path);
    info!("Generator service: {}", config.generators.base_url);

    // Compute config hash for audit
    let config_json = serde_json::to_string(&config).unwrap_or_default();
    let config_hash = format!("{:x}", Sha256::digest(config_json.as_bytes()));
    let config_hash_short = &config_hash[..16];

    // Create SQLite audit store
    let audit_store: Arc<dyn AuditStore> = Arc::new(
        SqliteAuditStore::new(&config.database.path).context("Failed to create audit store")?,
    );
    info!("Audit store initialized");

    // Create SQLite story store
    let story_store: Arc<dyn StoryStore> = Arc::new(
        SqliteStoryStore::new(&config.database.path).context("Failed to create story store")?,
    );
    info!("Story store initialized");

    // Create audit system
    let (audit_handle, audit_writer) =
        create_audit_system(Arc::clone(&audit_store), AUDIT_BUFFER_SIZE);

    // Spawn audit writer task
    let writer_handle = tokio::spawn(audit_writer.run());

    audit_handle
        .emit(AuditEvent::ServiceStarted {
            version: VERSION.to_string(),
            config_hash: config_hash_short.to_string(),
        })
        .await;
    info!("Emitted ServiceStarted audit event");

    // One HTTP client serves every generation role
    let generator =
        HttpGenerator::new(&config.generators).context("Failed to create generator client")?;
    let generators = Generators::from_single(Arc::new(generator));
    info!("Generators: {:?}", generators);

    let controller = Arc::new(
        PipelineController::new(
            Arc::clone(&story_store),
            generators,
            config.pipeline.clone(),
        )
        .with_audit(audit_handle.clone()),
    );

    // Background driver, when stories should move without client polling
    let driver = if config.pipeline.driver_enabled {
        let driver = StoryDriver::new(
            Arc::clone(&controller),
            Arc::clone(&story_store),
            config.pipeline.clone(),
        );
        driver.start();
        info!(
            "Story driver started (poll every {}ms, {} concurrent)",
            config.pipeline.driver_poll_interval_ms, config.pipeline.max_concurrent_stories
        );
        Some(driver)
    } else {
        info!("Story driver disabled, stories advance on client calls only");
        None
    };

    let sweeper = if config.recovery.enabled {
        let sweeper = RecoverySweeper::new(
            Arc::clone(&story_store),
            config.recovery.clone(),
            Some(audit_handle.clone()),
        );
        sweeper.start();
        info!(
            "Recovery sweeper started (every {}s, stale after {}s)",
            config.recovery.sweep_interval_secs, config.recovery.stale_after_secs
        );
        Some(sweeper)
    } else {
        info!("Recovery sweeper disabled in config");
        None
    };

    let state = Arc::new(AppState::new(
        config.clone(),
        story_store,
        audit_handle.clone(),
        audit_store,
        controller,
    ));

    let app = create_router(state);

    // Start server
    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");

    if let Some(ref driver) = driver {
        driver.stop();
        info!("Story driver stopped");
    }
    if let Some(ref sweeper) = sweeper {
        sweeper.stop();
        info!("Recovery sweeper stopped");
    }

    audit_handle
        .emit(AuditEvent::ServiceStopped {
            reason: "graceful_shutdown".to_string(),
        })
        .await;

    // The writer exits once every AuditHandle is gone. The driver and the
    // sweeper hold clones; the router's state was dropped with the server.
    drop(driver);
    drop(sweeper);
    drop(audit_handle);

    let _ = writer_handle.await;
    info!("Audit writer stopped");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
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
}

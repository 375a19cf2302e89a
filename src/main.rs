use std::sync::Arc;

use mail_sentinel::api::{ApiState, api_routes};
use mail_sentinel::channels::{EmailChannel, NotificationChannel, WhatsAppChannel};
use mail_sentinel::config::SentinelConfig;
use mail_sentinel::llm::{create_embedder, create_provider};
use mail_sentinel::pipeline::{
    ClassificationEngine, MeetingTracker, RulesConfig, RulesEngine, TriageProcessor,
};
use mail_sentinel::reminders::{
    DigestService, NotificationDispatcher, ReminderScheduler, spawn_digest_cron,
    spawn_reminder_sweep,
};
use mail_sentinel::retrieval::QdrantRetriever;
use mail_sentinel::store::{Database, LibSqlBackend};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install rustls crypto provider before any TLS usage
    rustls::crypto::ring::default_provider()
        .install_default()
        .expect("Failed to install rustls crypto provider");

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = SentinelConfig::from_env().unwrap_or_else(|e| {
        eprintln!("Error: {e}");
        std::process::exit(1);
    });

    eprintln!("📬 Mail Sentinel v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Model: {}", config.llm.model);
    eprintln!("   Embeddings: {}", config.llm.embedding_model);
    eprintln!(
        "   Policies: {} (collection: {})",
        config.retrieval.url, config.retrieval.collection
    );
    eprintln!("   Notify: {}", config.dispatcher.mode.as_str());
    eprintln!("   API: http://0.0.0.0:{}/api/classify", config.port);

    // ── Database ─────────────────────────────────────────────────────────
    let db_path = config.db_path.clone();
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(std::path::Path::new(&db_path))
            .await
            .unwrap_or_else(|e| {
                eprintln!("Error: Failed to open database at {db_path}: {e}");
                std::process::exit(1);
            }),
    );
    eprintln!("   Database: {db_path}");

    // ── Classification pipeline ─────────────────────────────────────────
    let llm = create_provider(&config.llm).unwrap_or_else(|e| {
        eprintln!("Error: Failed to create LLM provider: {e}");
        std::process::exit(1);
    });
    let embedder = create_embedder(&config.llm).unwrap_or_else(|e| {
        eprintln!("Error: Failed to create embedder: {e}");
        std::process::exit(1);
    });
    let retriever = Arc::new(QdrantRetriever::new(config.retrieval.clone(), embedder));

    let rules = RulesEngine::new(RulesConfig::from_env());
    let engine = ClassificationEngine::new(retriever, llm, rules);
    let tracker = MeetingTracker::new(Arc::clone(&db));
    let processor = Arc::new(TriageProcessor::new(engine, tracker, Arc::clone(&db)));

    // ── Reminders ───────────────────────────────────────────────────────
    let email_channel: Arc<dyn NotificationChannel> = Arc::new(EmailChannel::from_env());
    let whatsapp_channel: Arc<dyn NotificationChannel> = Arc::new(WhatsAppChannel::from_env());

    let scheduler = Arc::new(ReminderScheduler::new(
        Arc::clone(&db),
        config.overdue_after,
    ));
    let dispatcher = Arc::new(NotificationDispatcher::new(
        Arc::clone(&db),
        Arc::clone(&email_channel),
        Arc::clone(&whatsapp_channel),
        config.dispatcher.clone(),
    ));
    let digest = Arc::new(DigestService::new(
        Arc::clone(&db),
        Arc::clone(&email_channel),
    ));

    // Spawn the periodic scan/dispatch sweep
    let (_sweep_handle, _sweep_shutdown) =
        spawn_reminder_sweep(Arc::clone(&scheduler), Arc::clone(&dispatcher), None);

    // Spawn the digest cron when a recipient is configured
    match &config.digest {
        Some(digest_config) => {
            eprintln!(
                "   Digest: {} (cron '{}')\n",
                digest_config.recipient, digest_config.expression
            );
            let (_digest_handle, _digest_shutdown) = spawn_digest_cron(
                Arc::clone(&digest),
                digest_config.recipient.clone(),
                digest_config.schedule.clone(),
            );
        }
        None => eprintln!("   Digest: disabled (set DIGEST_RECIPIENT to enable)\n"),
    }

    // ── API server ──────────────────────────────────────────────────────
    let state = ApiState {
        processor,
        scheduler,
        dispatcher,
        digest,
    };
    let app = api_routes(state);

    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port)).await?;
    tracing::info!(port = config.port, "API server started");
    axum::serve(listener, app).await?;

    Ok(())
}

use std::sync::Arc;

use enquiry_intake::config::{IntakeConfig, TenantDirectory};
use enquiry_intake::ingest::IngestProcessor;
use enquiry_intake::store::{EnquiryStore, LibSqlBackend};
use enquiry_intake::webhook::intake_routes;
use tracing::info;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = IntakeConfig::from_env();
    let tenants = TenantDirectory::from_env();

    // Initialize tracing; with INTAKE_LOG_DIR set, logs roll daily into a
    // file instead of stdout. The guard must outlive the server.
    let _file_guard = init_tracing(&config);

    eprintln!("📬 Enquiry Intake v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Webhook: http://{}/webhook/inbound-email", config.bind);
    eprintln!("   API: http://{}/api/enquiries", config.bind);
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!(
        "   Tenants: {} configured, fallback '{}'",
        tenants.len(),
        tenants.fallback_owner()
    );
    if config.store_raw_payload {
        eprintln!("   Raw payload audit: on");
    }

    let store: Arc<dyn EnquiryStore> = Arc::new(LibSqlBackend::new_local(&config.db_path).await?);

    let processor = Arc::new(IngestProcessor::new(
        Arc::clone(&store),
        tenants,
        config.store_raw_payload,
    ));

    let app = intake_routes(processor, Arc::clone(&store));

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    info!(bind = %config.bind, "Enquiry intake server started");
    axum::serve(listener, app).await?;

    Ok(())
}

fn init_tracing(config: &IntakeConfig) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let env_filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"))
    };

    match &config.log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "enquiry-intake.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_target(false)
                .with_ansi(false)
                .with_writer(writer)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_target(false)
                .init();
            None
        }
    }
}

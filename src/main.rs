use std::sync::Arc;

use krishi_onboard::backend::{Backend, SupabaseBackend};
use krishi_onboard::config::AppConfig;
use krishi_onboard::routes::{AppState, router};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = AppConfig::from_env()?;

    eprintln!("🌾 KrishiOS onboarding v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Backend: {}", config.backend.url);
    eprintln!("   Language: {:?}", config.language);
    eprintln!("   API: http://{}/api", config.http_addr);

    let backend: Arc<dyn Backend> = Arc::new(SupabaseBackend::new(config.backend.clone()));
    let state = AppState::new(backend, config.language, config.onboarding.clone());
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(config.http_addr).await?;
    tracing::info!(addr = %config.http_addr, "HTTP shell started");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            tracing::info!("Shutting down");
        })
        .await?;

    Ok(())
}

use crate::application::use_cases::gateway::GatewayUseCase;
use crate::application::use_cases::rate_limiter::RateLimiter;
use crate::application::use_cases::response_cache::ResponseCache;
use crate::domain::error::Result;
use crate::domain::schema::WhitelistSchema;
use crate::infrastructure::config::GatewayConfig;
use crate::infrastructure::db::PgQueryExecutor;
use crate::infrastructure::llm_clients::{GeminiClient, SqlGenerator};
use crate::infrastructure::notifier::{LogNotifier, Notifier, WhatsAppNotifier};
use crate::interfaces::http::{start_server, HttpState};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

fn build_generator(config: &GatewayConfig) -> Option<Arc<dyn SqlGenerator>> {
    let llm_config = config.llm_config();
    if !llm_config.has_credentials() {
        warn!("GEMINI_API_KEY not set; generator disabled");
        return None;
    }
    match GeminiClient::new(llm_config) {
        Ok(client) => {
            info!(model = %config.gemini_model, endpoint = %config.gemini_endpoint, "Generator ready");
            Some(Arc::new(client))
        }
        Err(e) => {
            warn!(error = %e, "Generator disabled");
            None
        }
    }
}

fn build_notifier(config: &GatewayConfig) -> Result<Arc<dyn Notifier>> {
    match config.whatsapp_config() {
        Some(whatsapp) => Ok(Arc::new(WhatsAppNotifier::new(whatsapp)?)),
        None => {
            warn!("WhatsApp credentials not set; replies will only be logged");
            Ok(Arc::new(LogNotifier))
        }
    }
}

/// Loads configuration, wires the gateway and serves HTTP until shutdown.
pub async fn run() -> Result<()> {
    let _ = dotenvy::dotenv();
    let config = GatewayConfig::load()?;
    init_tracing(&config.log_level);

    let executor = Arc::new(PgQueryExecutor::connect_lazy(
        &config.database_url()?,
        config.db_config(),
    )?);
    let generator = build_generator(&config);
    let notifier = build_notifier(&config)?;

    let gateway = Arc::new(GatewayUseCase::new(
        Arc::new(RateLimiter::with_config(config.rate_limit_config())),
        Arc::new(ResponseCache::new(&config.cache_config())),
        generator,
        executor.clone(),
        Arc::new(WhitelistSchema::default()),
    ));
    let maintenance = gateway.start_maintenance();

    let server = start_server(HttpState { gateway, notifier }, config.port)?;
    let served = server.await;

    info!("Shutting down");
    maintenance.stop().await;
    executor.close().await;
    served?;
    Ok(())
}

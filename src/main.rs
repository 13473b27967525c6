use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info};

use vacwatch::analysis::{
    AiMatchClassifier, Analyzer, AnalyzerConfig, HhRetriever, MatchClassifier, VacancyRetriever,
};
use vacwatch::analysis::cleaner;
use vacwatch::clients::gemini::GeminiClient;
use vacwatch::clients::hh::HhClient;
use vacwatch::config::{self, Config};
use vacwatch::events::EventBus;
use vacwatch::repo::{
    FailedStore, NotifiedStore, PgFailedStore, PgNotifiedStore, PgSearchStore, SearchStore,
};
use vacwatch::{admin, db, telemetry};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    telemetry::init();

    let cfg = Config::from_env()?;
    let metrics_handle = PrometheusBuilder::new().install_recorder()?;

    let pool = db::make_pool(&cfg.database_url).await?;
    if cfg.migrate_on_startup {
        db::run_migrations(&pool).await?;
        info!("database migrations applied");
    }

    let searches: Arc<dyn SearchStore> = Arc::new(PgSearchStore::new(pool.clone()));
    let notified: Arc<dyn NotifiedStore> = Arc::new(PgNotifiedStore::new(pool.clone()));
    let failed: Arc<dyn FailedStore> = Arc::new(PgFailedStore::new(pool.clone()));

    let hh_client =
        HhClient::new(cfg.hh_base_url.clone()).with_rate_limit(cfg.hh_requests_per_second);
    let retriever: Arc<dyn VacancyRetriever> = Arc::new(HhRetriever::new(hh_client));

    let gemini = GeminiClient::new(cfg.gemini_api_key.clone(), cfg.gemini_model.clone())
        .with_base_url(config::gemini_base_url_or_default())
        .with_minute_rate_limit(cfg.gemini_requests_per_minute)
        .with_day_rate_limit(cfg.gemini_requests_per_day);
    let classifier: Arc<dyn MatchClassifier> = Arc::new(AiMatchClassifier::new(Arc::new(gemini)));

    let bus = EventBus::new();

    // Until a delivery channel is wired in, found vacancies go to the log.
    let mut found_rx = bus.subscribe_found();
    tokio::spawn(async move {
        while let Ok(event) = found_rx.recv().await {
            info!(
                user_id = event.search.user_id,
                search_id = event.search.id,
                name = %event.name,
                url = %event.url,
                "matching vacancy found"
            );
        }
    });

    cleaner::spawn(Arc::clone(&notified), cfg.notified_retention_days);

    if let Some(addr) = cfg.admin_addr.clone() {
        let handle = metrics_handle.clone();
        tokio::spawn(async move {
            if let Err(err) = admin::serve(addr, handle).await {
                error!(error = %err, "admin listener failed");
            }
        });
    }

    let analyzer = Analyzer::new(
        bus,
        classifier,
        retriever,
        searches,
        notified,
        failed,
        AnalyzerConfig {
            interval: cfg.analysis_interval,
            page_size: cfg.page_size,
            workers: cfg.workers,
            request_buffer: cfg.request_buffer,
            max_failed_attempts: cfg.max_failed_attempts,
        },
    );

    info!(
        interval_secs = cfg.analysis_interval.as_secs(),
        workers = cfg.workers,
        "vacwatch starting"
    );
    analyzer.run().await;

    Ok(())
}

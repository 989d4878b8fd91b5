use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use benchscout_common::{Config, Source};
use benchscout_scout::collectors::{
    ArxivCollector, Collector, DbenginesCollector, GithubCollector, HelmCollector,
    HuggingfaceCollector, SemanticScholarCollector, TechempowerCollector,
};
use benchscout_scout::enhancer::PdfEnhancer;
use benchscout_scout::notifier::Notifier;
use benchscout_scout::pipeline::Pipeline;
use benchscout_scout::prefilter::Prefilter;
use benchscout_scout::run_log::RunLog;
use benchscout_scout::scorer::LlmScorer;
use benchscout_store::{CacheClient, FallbackStore, GridStore, HistoryStore, StorageManager};

#[derive(Parser)]
#[command(about = "Run the benchmark discovery pipeline once")]
struct Cli {
    /// Per-source YAML config path (overrides SOURCES_CONFIG).
    #[arg(long)]
    sources: Option<std::path::PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("benchscout=info".parse()?))
        .init();

    info!("benchscout starting...");
    dotenv_load();

    let cli = Cli::parse();
    if let Some(path) = cli.sources {
        std::env::set_var("SOURCES_CONFIG", path);
    }
    let config = Config::from_env();
    config.log_redacted();

    // Stores and caches.
    let grid = Arc::new(GridStore::new(
        &config.grid_base_url,
        &config.grid_app_id,
        &config.grid_app_secret,
        &config.grid_app_token,
        &config.grid_table_id,
    ));
    let fallback = FallbackStore::open(&config.sqlite_path).await?;
    let history = HistoryStore::open(&config.history_path).await?;
    let score_cache = CacheClient::connect(config.redis_url.as_deref(), "benchscout:").await;
    let storage = StorageManager::new(grid.clone(), fallback);

    // Collectors, sequential at run time, each honoring its own config.
    let sources = &config.sources;
    let collectors: Vec<Box<dyn Collector>> = vec![
        Box::new(ArxivCollector::new(sources.arxiv.clone())),
        Box::new(HelmCollector::new(sources.helm.clone())),
        Box::new(GithubCollector::new(
            sources.github.clone(),
            config.github_token.clone(),
        )),
        Box::new(HuggingfaceCollector::new(
            sources.huggingface.clone(),
            config.huggingface_token.clone(),
        )),
        Box::new(TechempowerCollector::new(sources.techempower.clone())),
        Box::new(DbenginesCollector::new(sources.dbengines.clone())),
        Box::new(SemanticScholarCollector::new(
            sources.semantic_scholar.clone(),
        )),
    ];

    let enabled_sources: std::collections::HashSet<Source> = [
        (sources.arxiv.enabled, Source::Arxiv),
        (sources.github.enabled, Source::Github),
        (sources.huggingface.enabled, Source::Huggingface),
        (sources.helm.enabled, Source::Helm),
        (sources.techempower.enabled, Source::Techempower),
        (sources.dbengines.enabled, Source::Dbengines),
        (sources.semantic_scholar.enabled, Source::SemanticScholar),
    ]
    .into_iter()
    .filter_map(|(enabled, source)| enabled.then_some(source))
    .collect();
    let prefilter = Prefilter::new(enabled_sources);

    let enhancer = PdfEnhancer::new(
        config.pdf_cache_dir.clone(),
        config.parse_service_url.as_deref(),
        Some(grid),
        score_cache.clone(),
    );

    let scorer = LlmScorer::new(
        &config.anthropic_api_key,
        &config.llm_model,
        score_cache,
        sources.scoring.weights,
        sources.scoring.concurrency,
    );

    let notifier = Notifier::new(
        config.webhook_url.clone(),
        config.grid_table_url.clone(),
        history,
    );

    let run_log = RunLog::open(&config.log_dir)?;
    info!(run_id = run_log.run_id(), path = %run_log.path().display(), "run log opened");

    let mut pipeline = Pipeline::new(
        collectors,
        prefilter,
        Some(Box::new(enhancer)),
        Box::new(scorer),
        Box::new(storage),
        Box::new(notifier),
        run_log,
    );

    let stats = pipeline.run().await?;
    info!("benchscout run finished. {stats}");
    Ok(())
}

/// Load `.env` from the workspace root without overriding existing vars.
fn dotenv_load() {
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
        .parent()
        .and_then(|p| p.parent())
        .map(|p| p.join(".env"));
    let Some(path) = path else { return };
    if let Ok(content) = std::fs::read_to_string(&path) {
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some((key, value)) = line.split_once('=') {
                if std::env::var(key.trim()).is_err() {
                    std::env::set_var(key.trim(), value.trim());
                }
            }
        }
    }
}

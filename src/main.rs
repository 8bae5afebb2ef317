//! Court Extract - batch extraction of court decision and execution writ facts.

use std::sync::Arc;

use anyhow::Context;
use court_extract::chat::ChatClient;
use court_extract::config::{RunMode, Settings};
use court_extract::fetch::{FileFetcher, ShareFetcher};
use court_extract::invoker::ModelInvoker;
use court_extract::processor::FileProcessor;
use court_extract::service::{check_dir, ParserService};
use court_extract::store::{PostgrestSink, PostgrestSource};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Fetcher for check-dir runs, which never retrieve anything.
struct NoFetch;

#[async_trait::async_trait]
impl FileFetcher for NoFetch {
    async fn fetch(
        &self,
        remote: &str,
        _dest_dir: &std::path::Path,
    ) -> Result<std::path::PathBuf, court_extract::error::RetrievalError> {
        Err(court_extract::error::RetrievalError::NotFound(remote.to_string()))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "court_extract=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = Settings::from_env()?;
    let pipeline = &settings.pipeline;

    let invoker = match &settings.model {
        Some(model) => {
            info!("Using Azure OpenAI deployment {}", model.deployment);
            Some(ModelInvoker::new(Arc::new(ChatClient::new(model)), model.retry_policy()))
        }
        None => {
            warn!("Model not configured; using regex and keyword fallback only");
            None
        }
    };

    if pipeline.run_mode == RunMode::CheckDir {
        let dir = pipeline.check_dir.as_deref().context("CHECK_DIR not set")?;
        let processor = FileProcessor::new(Arc::new(NoFetch), invoker, &pipeline.work_dir)
            .with_encodings(pipeline.encodings.clone());
        let results = check_dir(&processor, dir).await?;
        info!("Checked {} files", results.len());
        return Ok(());
    }

    let share = settings.share.as_ref().context("share settings missing")?;
    let store = settings.store.as_ref().context("store settings missing")?;

    let processor = FileProcessor::new(Arc::new(ShareFetcher::new(share)), invoker, &pipeline.work_dir)
        .with_encodings(pipeline.encodings.clone());
    let service = ParserService::new(
        Arc::new(PostgrestSource::new(store, pipeline.issuer)),
        Arc::new(PostgrestSink::new(store, pipeline.issuer)),
        processor,
        pipeline,
    );

    let summary = if pipeline.run_mode == RunMode::Decisions {
        service.run_decisions().await?
    } else {
        service.run_execution_docs().await?
    };
    info!(
        "Done: {} processed, {} skipped, {} inserted",
        summary.processed, summary.skipped, summary.inserted
    );

    Ok(())
}

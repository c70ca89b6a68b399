//! `CoreAPI`: the facade spec.md §2 names — `add`/`change`/`remove`/
//! `search`/`query`/`stats` — assembling every other crate in this
//! workspace. Grounded in the teacher's `main/src/main.rs` wiring (config
//! load → provider/store construction → pipeline assembly), adapted from a
//! server-binary entrypoint to a library facade since there is no
//! CLI/HTTP surface in scope here.

use std::path::Path;
use std::sync::Arc;

use common::{
    cache::ResponseCache,
    error::AppError,
    progress::ProgressManager,
    storage::db::SurrealDbClient,
    utils::config::AppConfig,
};
use ingestion_pipeline::IngestionPipeline;
use provider::{CachingProvider, ModelProvider, ProviderFactory, ProviderParams, ProviderVariant};
use retrieval_pipeline::{
    stage::{run_stages, BoxedStage},
    stages::{EmbedStage, KneeStage, RetrieveStage},
    PipelineContext, QueryOutcome, QueryPipeline, QueryRunOutput,
};
use vector_store::{ScoredPoint, SurrealVectorStore, VectorStore};

/// Installs a `tracing-subscriber` formatting layer honoring `RUST_LOG`
/// (defaulting to `info` when unset). There is no CLI binary in this
/// workspace to own `main`'s subscriber setup, so the facade exposes it for
/// whatever embeds `CoreAPI` to call once at startup.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();
}

/// Point-count snapshot over the whole store. spec.md §2 names `stats()`
/// without detailing its shape; this is the minimal useful answer given
/// `VectorStore::count` is the only aggregate the trait exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Stats {
    pub total_points: u64,
}

pub struct CoreAPI {
    ingestion: IngestionPipeline,
    query_pipeline: QueryPipeline,
    store: Arc<dyn VectorStore>,
    provider: Arc<dyn ModelProvider>,
    config: AppConfig,
    progress: Arc<ProgressManager>,
}

impl CoreAPI {
    /// Builds every concrete backend from `config`: a cache-wrapped
    /// provider for `provider_variant`, a dimension probed from one real
    /// embedding call, and a `SurrealVectorStore` over that dimension.
    pub async fn new(config: AppConfig, provider_variant: ProviderVariant) -> Result<Self, AppError> {
        let params = ProviderParams {
            model_chunk: config.model_chunk.clone(),
            model_embed: config.model_embed.clone(),
            model_rerank: config.model_rerank.clone(),
            model_query: config.model_query.clone(),
            model_vision: config.model_vision.clone(),
            temperature_query: config.temperature_query,
        };

        let cache_dir = Path::new(&config.data_dir).join("cache");
        let cache = Arc::new(ResponseCache::open(&cache_dir)?);

        let base_provider = ProviderFactory::build(&provider_variant, params.clone());
        let provider: Arc<dyn ModelProvider> = Arc::new(CachingProvider::new(
            base_provider,
            Arc::clone(&cache),
            params,
            config.invalidate_cache,
        ));

        // The provider is the only thing that knows the embedding
        // dimension; a one-shot probe call tells the store how wide its
        // HNSW index needs to be before anything is ingested.
        let probe = provider.embed(&["dimension probe".to_string()]).await?;
        let dimension = probe
            .first()
            .map(Vec::len)
            .ok_or_else(|| AppError::InternalError("embedding provider returned an empty batch".into()))?;

        let db = Arc::new(
            SurrealDbClient::new(
                &config.surrealdb_address,
                &config.surrealdb_username,
                &config.surrealdb_password,
                &config.surrealdb_namespace,
                &config.surrealdb_database,
            )
            .await?,
        );
        let store: Arc<dyn VectorStore> = Arc::new(SurrealVectorStore::new(db, dimension).await?);

        Ok(Self::with_backends(provider, store, config, Some(cache)))
    }

    /// Assembles the facade over caller-supplied backends, bypassing
    /// config-driven construction. Used by tests (an `InMemoryVectorStore`
    /// plus a stub provider) and by callers that already own a store/provider
    /// pair.
    pub fn with_backends(
        provider: Arc<dyn ModelProvider>,
        store: Arc<dyn VectorStore>,
        config: AppConfig,
        cache: Option<Arc<ResponseCache>>,
    ) -> Self {
        let query_pipeline = QueryPipeline::new(Arc::clone(&provider), Arc::clone(&store), config.clone(), cache);
        let ingestion = IngestionPipeline::new(Arc::clone(&provider), Arc::clone(&store), config.clone());
        Self {
            ingestion,
            query_pipeline,
            store,
            provider,
            config,
            progress: Arc::new(ProgressManager::new()),
        }
    }

    pub fn progress(&self) -> &Arc<ProgressManager> {
        &self.progress
    }

    /// Ingests `path` for the first time. Returns the number of points written.
    pub async fn add(&self, path: &Path) -> Result<usize, AppError> {
        let task = self.progress.start_task(format!("add {}", path.display()), None, 1.0, None);
        let result = self.ingestion.add(path).await;
        self.progress.complete(&task);
        result
    }

    /// Re-ingests `path`: deletes its old points, then ingests the current
    /// content. Returns the number of points written.
    pub async fn change(&self, path: &Path) -> Result<usize, AppError> {
        let task = self.progress.start_task(format!("change {}", path.display()), None, 1.0, None);
        let result = self.ingestion.change(path).await;
        self.progress.complete(&task);
        result
    }

    /// Deletes every point belonging to `path`. Returns how many were removed.
    pub async fn remove(&self, path: &Path) -> Result<u64, AppError> {
        let task = self.progress.start_task(format!("remove {}", path.display()), None, 1.0, None);
        let result = self.ingestion.remove(path).await;
        self.progress.complete(&task);
        result
    }

    /// Raw semantic search: embed → retrieve → knee-cutoff, with no rerank,
    /// expansion, or synthesis. Lets a caller inspect retrieval quality
    /// directly without paying for an answer synthesis call.
    pub async fn search(&self, question: &str) -> Result<Vec<ScoredPoint>, AppError> {
        let mut ctx = PipelineContext::new(
            question.to_string(),
            Arc::clone(&self.provider),
            Arc::clone(&self.store),
            self.config.clone(),
            None,
        );
        let stages: Vec<BoxedStage> = vec![Box::new(EmbedStage), Box::new(RetrieveStage), Box::new(KneeStage)];
        run_stages(stages, &mut ctx).await?;
        Ok(ctx.candidates)
    }

    /// Runs the full query pipeline: embed → retrieve → knee-cutoff →
    /// rerank → expand → dedup → synthesise → reference repair.
    pub async fn query(&self, question: &str) -> Result<QueryRunOutput, AppError> {
        self.query_pipeline.run(question).await
    }

    pub async fn stats(&self) -> Result<Stats, AppError> {
        Ok(Stats {
            total_points: self.store.count(None).await?,
        })
    }
}

pub use provider::ProviderVariant;
pub use retrieval_pipeline::QueryOutcome as CoreQueryOutcome;

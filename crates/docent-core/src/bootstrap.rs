//! Application bootstrap: config resolution, provider and service construction.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use docent_llm::AnyProvider;
use docent_llm::gemini::GeminiProvider;
use docent_llm::ollama::OllamaProvider;
use docent_llm::openai::OpenAiProvider;
use docent_store::SqliteStore;
use docent_store::VectorIndex;
use docent_store::document::{IngestionPipeline, MarkdownLoader, SplitterConfig, TextSplitter};

use crate::config::{Config, GEMINI_API_KEY_VAR, OPENAI_API_KEY_VAR, ProviderKind};
use crate::documents::DocumentService;
use crate::rag::RagService;
use crate::vault::EnvVaultProvider;

pub const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Everything a server or CLI command needs, built from one `Config`.
pub struct App {
    pub config: Config,
    pub store: SqliteStore,
    pub documents: Arc<DocumentService>,
    pub rag: Arc<RagService>,
}

pub struct AppBuilder {
    config: Config,
}

impl AppBuilder {
    /// Load and validate the config at `path`, then resolve API keys from the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be parsed, is invalid, or secrets fail to resolve.
    pub async fn load(path: &Path) -> anyhow::Result<Self> {
        let mut config = Config::load(path)?;
        config.validate()?;
        config.resolve_secrets(&EnvVaultProvider).await?;
        tracing::debug!(path = %path.display(), provider = %config.llm.provider, "config loaded");
        Ok(Self { config })
    }

    #[must_use]
    pub fn from_config(config: Config) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// # Errors
    ///
    /// Returns an error if the database directory cannot be created or migrations fail.
    pub async fn build_store(&self) -> anyhow::Result<SqliteStore> {
        let path = &self.config.storage.database_path;
        if let Some(parent) = Path::new(path).parent()
            && !parent.as_os_str().is_empty()
        {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        SqliteStore::new(path)
            .await
            .with_context(|| format!("failed to open database {path}"))
    }

    /// # Errors
    ///
    /// Returns an error if the configured provider lacks its API key.
    pub fn build_provider(&self) -> anyhow::Result<AnyProvider> {
        create_provider(&self.config)
    }

    /// Build the app with the configured provider.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider or the database cannot be set up.
    pub async fn build(self) -> anyhow::Result<App> {
        let provider = self.build_provider()?;
        self.build_with_provider(provider).await
    }

    /// # Errors
    ///
    /// Returns an error if the database or storage directories cannot be set up.
    pub async fn build_with_provider(self, provider: AnyProvider) -> anyhow::Result<App> {
        let store = self.build_store().await?;
        let config = self.config;

        let vector_root = PathBuf::from(&config.storage.vector_root);
        tokio::fs::create_dir_all(&vector_root)
            .await
            .with_context(|| format!("failed to create {}", vector_root.display()))?;
        let index = VectorIndex::new(vector_root);

        let splitter = TextSplitter::new(SplitterConfig {
            chunk_size: config.ingest.chunk_size,
            chunk_overlap: config.ingest.chunk_overlap,
            ..SplitterConfig::default()
        });
        let pipeline = IngestionPipeline::new(splitter, index.clone(), Box::new(provider.embed_fn()));
        let loader = MarkdownLoader {
            max_file_size: config.ingest.max_file_size,
        };
        let documents = DocumentService::new(
            store.clone(),
            pipeline,
            loader,
            &config.storage.media_root,
        );
        let rag = RagService::new(provider, index)
            .with_top_k(config.rag.top_k)
            .with_hyde(config.rag.hyde);

        tracing::info!(
            database = %config.storage.database_path,
            vectors = %config.storage.vector_root,
            media = %config.storage.media_root,
            "services ready"
        );

        Ok(App {
            config,
            store,
            documents: Arc::new(documents),
            rag: Arc::new(rag),
        })
    }
}

/// Priority: explicit CLI path > `DOCENT_CONFIG` env > `config/default.toml`.
#[must_use]
pub fn resolve_config_path(cli: Option<&Path>) -> PathBuf {
    if let Some(path) = cli {
        return path.to_path_buf();
    }
    if let Ok(path) = std::env::var("DOCENT_CONFIG") {
        return PathBuf::from(path);
    }
    PathBuf::from(DEFAULT_CONFIG_PATH)
}

/// # Errors
///
/// Returns an error if a hosted provider is selected without its API key.
pub fn create_provider(config: &Config) -> anyhow::Result<AnyProvider> {
    let llm = &config.llm;
    match llm.provider {
        ProviderKind::Gemini => {
            let key = config
                .secrets
                .gemini_api_key
                .as_ref()
                .with_context(|| format!("{GEMINI_API_KEY_VAR} is required for the gemini provider"))?;
            let mut provider =
                GeminiProvider::new(key.expose(), llm.model.as_str(), llm.embedding_model.as_str())?
                    .with_temperature(llm.temperature);
            if let Some(url) = &llm.base_url {
                provider = provider.with_base_url(url.as_str());
            }
            Ok(AnyProvider::Gemini(provider))
        }
        ProviderKind::OpenAi => {
            let key = config
                .secrets
                .openai_api_key
                .as_ref()
                .with_context(|| format!("{OPENAI_API_KEY_VAR} is required for the openai provider"))?;
            let base_url = llm
                .base_url
                .clone()
                .unwrap_or_else(|| docent_llm::openai::DEFAULT_BASE_URL.to_owned());
            let provider = OpenAiProvider::new(
                key.expose().to_owned(),
                base_url,
                llm.model.clone(),
                Some(llm.embedding_model.clone()),
            )
            .with_temperature(llm.temperature);
            Ok(AnyProvider::OpenAi(provider))
        }
        ProviderKind::Ollama => {
            let base_url = llm
                .base_url
                .as_deref()
                .unwrap_or(docent_llm::ollama::DEFAULT_BASE_URL);
            Ok(AnyProvider::Ollama(OllamaProvider::new(
                base_url,
                llm.model.clone(),
                llm.embedding_model.clone(),
            )))
        }
    }
}

pub async fn health_check(provider: &AnyProvider) {
    match provider {
        AnyProvider::Ollama(ollama) => match ollama.health_check().await {
            Ok(()) => tracing::info!("ollama health check passed"),
            Err(e) => tracing::warn!("ollama health check failed: {e:#}"),
        },
        other => {
            tracing::info!(
                "using {} provider",
                docent_llm::LlmProvider::name(other)
            );
        }
    }
}

//! Composition root: resolves the workspace, loads config once and builds
//! the adapters and use-case inputs from it.

use crate::embedding_factory::build_embedding_port;
use crate::vector_store_factory::build_vector_store_port;
use crate::{InfraError, InfraResult};
use code_index_adapters::{
    IgnoreMatcher, JsonFileIdentityLedger, LocalFileSystem, PollingChangeNotifier, TracingLogger,
    TreeSitterStructureParser,
};
use code_index_app::{
    ChunkerOptions, ClearIndexDeps, EmbeddingClient, EmbeddingClientOptions, IndexerDeps,
    IndexerOptions, ScannerOptions, SemanticSearchDeps, SemanticSearchInput, WatchOptions,
};
use code_index_config::{CodeIndexEnv, ValidatedConfig, load_config_std_env};
use code_index_domain::{CollectionName, SearchRequest, derive_collection_name};
use code_index_ports::{EmbeddingPort, IdentityLedgerPort, LogFields, LoggerPort, VectorStorePort};
use code_index_shared::{ErrorCode, ErrorEnvelope, RequestContext, RetryPolicy};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Config files looked up in the workspace root when none is given.
pub const DEFAULT_CONFIG_FILES: &[&str] = &["cidx.toml", "cidx.json"];

/// Directory under the state dir holding the identity ledger.
pub const LEDGER_DIR: &str = "ledger";

/// A resolved workspace with its effective config.
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    config_path: Option<PathBuf>,
    config: ValidatedConfig,
    env: CodeIndexEnv,
    collection: CollectionName,
    state_dir: PathBuf,
}

impl Workspace {
    /// Resolve `root`, then load config from `config_path`, a default config
    /// file in the root, or defaults, with environment overrides on top.
    pub fn open(root: &Path, config_path: Option<&Path>) -> InfraResult<Self> {
        let root = resolve_root(root)?;
        let config_path = config_path
            .map(Path::to_path_buf)
            .or_else(|| discover_config(&root));
        let (config, env) = load_config_std_env(config_path.as_deref())?;
        Self::from_parts(root, config_path, config, env)
    }

    /// Build from an already loaded config. `root` must be absolute.
    pub fn from_parts(
        root: PathBuf,
        config_path: Option<PathBuf>,
        config: ValidatedConfig,
        env: CodeIndexEnv,
    ) -> InfraResult<Self> {
        let collection = derive_collection_name(&root).map_err(ErrorEnvelope::from)?;
        let state_dir = resolve_state_dir(&root, &config.index.state_dir);
        Ok(Self {
            root,
            config_path,
            config,
            env,
            collection,
            state_dir,
        })
    }

    /// Absolute workspace root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Config file in effect, if any.
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Effective config.
    pub const fn config(&self) -> &ValidatedConfig {
        &self.config
    }

    /// Collection derived from the root.
    pub const fn collection(&self) -> &CollectionName {
        &self.collection
    }

    /// Directory holding the ledger and local vectors.
    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// Build every adapter the use cases need.
    pub async fn services(&self, ctx: &RequestContext) -> InfraResult<Services> {
        let ignore = IgnoreMatcher::load(&self.root, &self.ignore_patterns()).await?;
        let embedding = build_embedding_port(&self.config, &self.env)?;
        let vector_store = build_vector_store_port(&self.config, &self.env, &self.state_dir)?;
        let ledger: Arc<dyn IdentityLedgerPort> =
            Arc::new(JsonFileIdentityLedger::new(self.state_dir.join(LEDGER_DIR)));

        let mut fields = LogFields::new();
        fields.insert(
            "correlationId".into(),
            Value::String(ctx.correlation_id().as_str().to_owned()),
        );
        fields.insert("collection".into(), Value::String(self.collection.to_string()));
        let logger: Arc<dyn LoggerPort> = Arc::new(TracingLogger::new().with_base_fields(fields));

        tracing::debug!(
            root = %self.root.display(),
            collection = %self.collection,
            ignore_rules = ignore.rule_count(),
            "workspace services ready"
        );
        Ok(Services {
            embedding,
            vector_store,
            ledger,
            ignore: Arc::new(ignore),
            logger,
            embedding_options: self.embedding_options(),
        })
    }

    /// Indexer settings from the `index` and `embedding` sections.
    pub fn indexer_options(&self, force: bool) -> IndexerOptions {
        let index = &self.config.index;
        let mut options = IndexerOptions::new(self.root.clone(), self.collection.clone());
        options.scanner = ScannerOptions {
            max_files: to_usize(index.max_files),
            max_file_size_bytes: index.max_file_size_bytes,
            skip_hidden: index.skip_hidden,
            extensions: index.extensions.clone(),
            ..ScannerOptions::default()
        };
        options.chunker = ChunkerOptions {
            max_block_chars: to_usize(index.max_block_chars),
            ..ChunkerOptions::default()
        };
        options.embedding = self.embedding_options();
        options.parsing_concurrency = to_usize(index.parsing_concurrency);
        options.batch_concurrency = to_usize(index.batch_concurrency);
        options.max_pending_batches = to_usize(index.max_pending_batches);
        options.with_force(force)
    }

    /// Search input with the configured threshold and result cap.
    pub fn search_input(&self, request: SearchRequest) -> SemanticSearchInput {
        SemanticSearchInput {
            default_min_score: self.config.search.min_score,
            max_results: to_usize(self.config.search.max_results),
            ..SemanticSearchInput::new(self.collection.clone(), request)
        }
    }

    /// Debounce and segment settings from the `watch` section.
    pub fn watch_options(&self) -> WatchOptions {
        WatchOptions {
            debounce: Duration::from_millis(self.config.watch.debounce_ms),
            segment_threshold: to_usize(self.config.watch.segment_threshold),
        }
    }

    /// Polling notifier sharing the scan's ignore rules.
    pub fn notifier(&self, services: &Services) -> PollingChangeNotifier {
        PollingChangeNotifier::new(
            Duration::from_millis(self.config.watch.poll_interval_ms),
            services.ignore.clone(),
        )
        .with_skip_hidden(self.config.index.skip_hidden)
    }

    fn embedding_options(&self) -> EmbeddingClientOptions {
        let embedding = &self.config.embedding;
        EmbeddingClientOptions {
            retry: RetryPolicy::exponential(
                u32::try_from(embedding.max_retries).unwrap_or(u32::MAX),
                embedding.initial_retry_delay_ms,
            ),
            oversized_policy: embedding.oversized_item_policy.into(),
        }
    }

    /// Configured patterns plus the state dir when it lives under the root.
    fn ignore_patterns(&self) -> Vec<Box<str>> {
        let mut patterns = self.config.index.ignore_patterns.clone();
        if let Ok(relative) = self.state_dir.strip_prefix(&self.root) {
            let relative = relative.to_string_lossy().replace('\\', "/");
            if !relative.is_empty() {
                patterns.push(format!("/{relative}/").into());
            }
        }
        patterns
    }
}

/// Adapters shared by the use cases of one command.
#[derive(Clone)]
pub struct Services {
    /// Embedding provider.
    pub embedding: Arc<dyn EmbeddingPort>,
    /// Vector store.
    pub vector_store: Arc<dyn VectorStorePort>,
    /// Identity ledger under the state dir.
    pub ledger: Arc<dyn IdentityLedgerPort>,
    /// Ignore rules from the workspace and config.
    pub ignore: Arc<IgnoreMatcher>,
    /// Structured logger scoped to the request.
    pub logger: Arc<dyn LoggerPort>,
    embedding_options: EmbeddingClientOptions,
}

impl Services {
    /// Ports for an indexing run.
    pub fn indexer_deps(&self) -> IndexerDeps {
        IndexerDeps {
            filesystem: Arc::new(LocalFileSystem::new()),
            ignore: self.ignore.clone(),
            structure: Arc::new(TreeSitterStructureParser::new()),
            embedding: Arc::clone(&self.embedding),
            vector_store: Arc::clone(&self.vector_store),
            ledger: Arc::clone(&self.ledger),
            logger: Some(Arc::clone(&self.logger)),
        }
    }

    /// Ports for a query.
    pub fn search_deps(&self) -> SemanticSearchDeps {
        SemanticSearchDeps {
            client: EmbeddingClient::new(
                Arc::clone(&self.embedding),
                self.embedding_options,
                Some(Arc::clone(&self.logger)),
            ),
            vector_store: Arc::clone(&self.vector_store),
            logger: Some(Arc::clone(&self.logger)),
        }
    }

    /// Ports for clearing the index.
    pub fn clear_deps(&self) -> ClearIndexDeps {
        ClearIndexDeps {
            vector_store: Arc::clone(&self.vector_store),
            ledger: Arc::clone(&self.ledger),
            logger: Some(Arc::clone(&self.logger)),
        }
    }
}

fn resolve_root(root: &Path) -> InfraResult<PathBuf> {
    let canonical = std::fs::canonicalize(root).map_err(|error| {
        InfraError::expected(
            ErrorCode::new("workspace", "root_not_found"),
            format!("workspace root is not accessible: {error}"),
        )
        .with_metadata("root", root.display().to_string())
    })?;
    if !canonical.is_dir() {
        return Err(InfraError::expected(
            ErrorCode::new("workspace", "root_not_a_directory"),
            "workspace root must be a directory",
        )
        .with_metadata("root", canonical.display().to_string()));
    }
    Ok(canonical)
}

fn discover_config(root: &Path) -> Option<PathBuf> {
    DEFAULT_CONFIG_FILES
        .iter()
        .map(|name| root.join(name))
        .find(|path| path.is_file())
}

fn resolve_state_dir(root: &Path, state_dir: &str) -> PathBuf {
    let path = Path::new(state_dir);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

fn to_usize(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

use std::{
    future::Future,
    path::{Path, PathBuf},
    sync::{Arc, OnceLock},
    time::Duration,
};

use crate::{
    dispatch::MainThreadQueue,
    executor::{ExecutionMode, TaskExecutor},
    parser::{ContentRegistry, ParseOptions},
    pipeline::{ResourcePipeline, SceneResourcePreparer, TileContentKind, TileLoadResult, TileLoadState},
    resources::{AssetFetcher, HttpHeaders, url},
};

/// Startup settings. Everything has a usable default.
#[derive(Clone, Debug)]
pub struct Config {
    pub mode: ExecutionMode,
    pub http_timeout: Duration,
    /// Seed for resolving relative URLs before any network request was made.
    pub base_url: Option<String>,
    pub log_level: log::LevelFilter,
    pub worker_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::Synchronous,
            http_timeout: Duration::from_secs(30),
            base_url: None,
            log_level: log::LevelFilter::Info,
            worker_name: "tileflow-worker".to_string(),
        }
    }
}

struct Inner {
    config: Config,
    executor: Arc<TaskExecutor>,
    main_thread: MainThreadQueue,
    fetcher: AssetFetcher,
    registry: OnceLock<ContentRegistry>,
}

/**
 * The state shared by every stage of tile processing.
 *
 * One context is created at startup and handed to whatever needs the
 * executor, the main-thread queue, the fetcher or the content parsers.
 * Clones share the same state.
 */
#[derive(Clone)]
pub struct Context {
    inner: Arc<Inner>,
}

impl Context {
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let executor = Arc::new(TaskExecutor::with_worker_name(config.mode, config.worker_name.clone()));
        let fetcher = AssetFetcher::new(Arc::clone(&executor), config.http_timeout);
        if let Some(base) = &config.base_url {
            fetcher.set_base_url(base)?;
        }
        log::debug!("Context created in {:?} mode", config.mode);
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                executor,
                main_thread: MainThreadQueue::new(),
                fetcher,
                registry: OnceLock::new(),
            }),
        })
    }

    /// Installs `env_logger` at the configured level. `RUST_LOG` takes
    /// precedence. A logger that is already installed is kept.
    pub fn init_logging(&self) {
        let result = env_logger::Builder::new()
            .filter_level(self.inner.config.log_level)
            .parse_default_env()
            .try_init();
        if let Err(e) = result {
            log::debug!("Logger already initialized: {}", e);
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn executor(&self) -> &Arc<TaskExecutor> {
        &self.inner.executor
    }

    pub fn main_thread(&self) -> &MainThreadQueue {
        &self.inner.main_thread
    }

    pub fn fetcher(&self) -> &AssetFetcher {
        &self.inner.fetcher
    }

    /// The default parsers, registered on first use only.
    pub fn content_registry(&self) -> &ContentRegistry {
        self.inner.registry.get_or_init(|| {
            log::debug!("Registering tile content parsers");
            ContentRegistry::with_default_parsers()
        })
    }

    pub fn resource_pipeline(&self) -> ResourcePipeline<SceneResourcePreparer> {
        ResourcePipeline::new(SceneResourcePreparer, Arc::clone(&self.inner.executor))
    }

    /**
     * Fetches `url` and parses the payload on the executor.
     *
     * A transport failure yields [`TileLoadState::RetryLater`], any other
     * unsuccessful status or a parse without a document yields
     * [`TileLoadState::Failed`]. The future never fails itself.
     */
    pub fn load_tile_content(&self, url: &str) -> impl Future<Output = TileLoadResult> + Send + use<> {
        let request = self.inner.fetcher.get(url, HttpHeaders::new());
        let context = self.clone();
        async move {
            let request = request.await;
            let response = request.response;
            if !response.is_success() {
                let state = if response.status == 0 {
                    TileLoadState::RetryLater
                } else {
                    TileLoadState::Failed
                };
                log::error!("Failed to load {}: status {}", request.url, response.status);
                return TileLoadResult::failed(
                    state,
                    request.url,
                    format!("Request failed with status {}: {}", response.status, response.text()),
                );
            }

            let url = request.url;
            let options = ParseOptions {
                base_dir: local_base_dir(&url),
            };
            let executor = Arc::clone(context.executor());
            let parsing = {
                let url = url.clone();
                executor.run_in_worker(move || context.content_registry().parse(&response.data, &url, &options))
            };
            let Some(outcome) = parsing.await else {
                return TileLoadResult::failed(TileLoadState::Failed, url, "Parsing was discarded before it completed");
            };
            for warning in &outcome.warnings {
                log::warn!("{}: {}", url, warning);
            }
            match outcome.document {
                Some(document) => {
                    log::info!("Loaded {} ({} node(s), {} mesh(es))", url, document.nodes.len(), document.meshes.len());
                    let mut result = TileLoadResult::model(url, document);
                    result.errors = outcome.errors;
                    result.warnings = outcome.warnings;
                    result
                }
                None => TileLoadResult {
                    state: TileLoadState::Failed,
                    content: TileContentKind::Empty,
                    url,
                    errors: outcome.errors,
                    warnings: outcome.warnings,
                },
            }
        }
    }

    /// Stops the executor and discards its queued work.
    pub fn shutdown(&self) {
        self.inner.executor.shutdown();
    }
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("config", &self.inner.config)
            .field("executor", &self.inner.executor)
            .field("main_thread", &self.inner.main_thread)
            .field("fetcher", &self.inner.fetcher)
            .finish()
    }
}

/// Directory of a local payload, for resolving relative buffer and image URIs.
fn local_base_dir(url: &str) -> Option<PathBuf> {
    if url::is_http_url(url) {
        return None;
    }
    let path = if url::is_file_url(url) {
        url::file_url_to_path(url)
    } else {
        PathBuf::from(url)
    };
    path.parent().map(Path::to_path_buf)
}

//! Standalone model loading outside of a tile host.

use std::{future::Future, path::Path};

use cgmath::{Matrix4, SquareMatrix};

use crate::{
    context::Context,
    pipeline::{MainThreadResource, TileLoadState},
    resources::url,
};

/// A committed model, or the reasons there is none.
#[derive(Debug, Default)]
pub struct ReadGltfResult {
    pub resource: Option<MainThreadResource>,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ReadGltfResult {
    fn failed(errors: Vec<String>, warnings: Vec<String>) -> Self {
        Self {
            resource: None,
            errors,
            warnings,
        }
    }
}

/**
 * Loads glTF, GLB or b3dm content through the same stages a tile goes
 * through: fetch and parse on the executor, build off the main thread, then
 * commit on the context's main-thread queue.
 */
#[derive(Clone, Debug)]
pub struct GltfLoader {
    context: Context,
}

impl GltfLoader {
    pub fn new(context: Context) -> Self {
        Self { context }
    }

    /// Resolves once the main-thread queue has run the commit step, so
    /// something must keep dispatching it.
    pub fn load(&self, url: &str) -> impl Future<Output = ReadGltfResult> + Send + use<> {
        let loading = self.context.load_tile_content(url);
        let context = self.context.clone();
        async move {
            let content = loading.await;
            if content.state != TileLoadState::Success {
                return ReadGltfResult::failed(content.errors, content.warnings);
            }
            let (errors, warnings) = (content.errors.clone(), content.warnings.clone());
            let url = content.url.clone();

            let pipeline = context.resource_pipeline();
            let Some(load) = pipeline.prepare_off_main_thread(content, Matrix4::identity()).await else {
                let mut errors = errors;
                errors.push(format!("{} has no renderable content", url));
                return ReadGltfResult::failed(errors, warnings);
            };
            let commit = context
                .main_thread()
                .run_in_main_thread(move || pipeline.prepare_on_main_thread(load));
            match commit.await {
                Some(resource) => ReadGltfResult {
                    resource: Some(resource),
                    errors,
                    warnings,
                },
                None => {
                    let mut errors = errors;
                    errors.push(format!("Committing {} on the main thread failed", url));
                    ReadGltfResult::failed(errors, warnings)
                }
            }
        }
    }

    /**
     * Blocking load for tools and tests. A bare path is turned into an
     * absolute `file://` URL first; network URLs are used as they are.
     *
     * Pumps the main-thread queue from the calling thread, which therefore
     * acts as the main thread for the duration of the call.
     */
    pub fn read(&self, path: &str) -> ReadGltfResult {
        let target = if url::is_http_url(path) || url::is_file_url(path) {
            path.to_string()
        } else {
            match std::path::absolute(Path::new(path)) {
                Ok(absolute) => url::path_to_file_url(&absolute),
                Err(e) => return ReadGltfResult::failed(vec![format!("Invalid path '{}': {}", path, e)], Vec::new()),
            }
        };
        log::debug!("Reading {}", target);
        let loading = self.load(&target);
        self.context.main_thread().wait_pumping(loading)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Config;

    #[test]
    fn missing_file_reports_an_error() {
        let loader = GltfLoader::new(Context::new(Config::default()).unwrap());
        let path = std::env::temp_dir().join("tileflow-loader-missing.glb");
        let result = loader.read(&path.to_string_lossy());
        assert!(result.resource.is_none());
        assert_eq!(result.errors.len(), 1);
    }
}

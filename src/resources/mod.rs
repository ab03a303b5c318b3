use std::{
    future::Future,
    path::Path,
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use anyhow::Context as _;

use crate::executor::TaskExecutor;

/**
 * This module contains all logic for fetching tile and model bytes from the network or disk.
 *
 * Requests are classified by [`url::classify`], dispatched onto the shared
 * [`TaskExecutor`] and always complete with an [`AssetResponse`]; a failed
 * fetch is a status code, not an error value.
 */
pub mod request;
pub mod url;

pub use request::{AssetRequest, AssetResponse, FetchError, HttpHeaders, collect_headers};
pub use url::AssetLocation;

struct FetcherState {
    executor: Arc<TaskExecutor>,
    base_url: Mutex<Option<reqwest::Url>>,
    client: Mutex<Option<reqwest::blocking::Client>>,
    timeout: Duration,
}

/// Resolves URLs and paths to bytes. Clones share the base URL and HTTP client.
#[derive(Clone)]
pub struct AssetFetcher {
    state: Arc<FetcherState>,
}

impl AssetFetcher {
    pub fn new(executor: Arc<TaskExecutor>, timeout: Duration) -> Self {
        Self {
            state: Arc::new(FetcherState {
                executor,
                base_url: Mutex::new(None),
                client: Mutex::new(None),
                timeout,
            }),
        }
    }

    /**
     * Seeds relative URL resolution. Accepts network or `file://` URLs and
     * absolute local directories. A missing trailing slash is added so the
     * last path segment counts as a directory.
     */
    pub fn set_base_url(&self, base: &str) -> anyhow::Result<()> {
        let mut text = if url::is_http_url(base) || url::is_file_url(base) {
            base.to_string()
        } else if url::is_absolute_local_path(base) {
            url::path_to_file_url(Path::new(base))
        } else {
            anyhow::bail!("Base URL must be absolute, got '{}'", base);
        };
        if !text.ends_with('/') {
            text.push('/');
        }
        let parsed = reqwest::Url::parse(&text).with_context(|| format!("Invalid base URL '{}'", base))?;
        log::debug!("Asset base URL set to {}", parsed);
        *self.lock_base() = Some(parsed);
        Ok(())
    }

    pub fn base_url(&self) -> Option<String> {
        self.lock_base().as_ref().map(|url| url.to_string())
    }

    pub fn executor(&self) -> &Arc<TaskExecutor> {
        &self.state.executor
    }

    pub fn get(&self, url: &str, headers: HttpHeaders) -> impl Future<Output = AssetRequest> + Send + use<> {
        self.request("GET", url, headers, Vec::new())
    }

    /**
     * Issues a request on the executor.
     *
     * Network requests update the base URL to their directory before they are
     * dispatched, so relative references found in the response resolve
     * against it.
     */
    pub fn request(
        &self,
        method: &str,
        url: &str,
        headers: HttpHeaders,
        payload: Vec<u8>,
    ) -> impl Future<Output = AssetRequest> + Send + use<> {
        let location = {
            let mut base = self.lock_base();
            let location = url::classify(url, base.as_ref());
            if let AssetLocation::Network(resolved) = &location {
                if let Some(dir) = url::directory_of(resolved) {
                    *base = Some(dir);
                }
            }
            location
        };
        let method = method.to_ascii_uppercase();
        let requested = url.to_string();
        let state = Arc::clone(&self.state);
        let work = {
            let method = method.clone();
            let headers = headers.clone();
            move || state.perform(method, location, headers, payload)
        };
        let pending = self.state.executor.run_in_worker(work);
        async move {
            match pending.await {
                Some(request) => request,
                None => AssetRequest {
                    method,
                    url: requested,
                    headers,
                    response: AssetResponse::message(0, "Request discarded before it completed"),
                },
            }
        }
    }

    /// `GET` without extra headers, reduced to the payload or a typed error.
    pub fn fetch(&self, url: &str) -> impl Future<Output = Result<Vec<u8>, FetchError>> + Send + use<> {
        let pending = self.get(url, HttpHeaders::new());
        async move {
            let request = pending.await;
            if request.response.is_success() {
                Ok(request.response.data)
            } else {
                Err(FetchError::from_response(&request.url, &request.response))
            }
        }
    }

    fn lock_base(&self) -> std::sync::MutexGuard<'_, Option<reqwest::Url>> {
        self.state.base_url.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl FetcherState {
    fn perform(&self, method: String, location: AssetLocation, headers: HttpHeaders, payload: Vec<u8>) -> AssetRequest {
        match location {
            AssetLocation::Network(url) => {
                let response = self.perform_http(&method, &url, &headers, payload);
                AssetRequest { method, url, headers, response }
            }
            AssetLocation::File(path) => {
                let response = read_file(&path);
                AssetRequest {
                    method,
                    url: path.to_string_lossy().into_owned(),
                    headers,
                    response,
                }
            }
        }
    }

    fn client(&self) -> anyhow::Result<reqwest::blocking::Client> {
        let mut slot = self.client.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = slot.as_ref() {
            return Ok(client.clone());
        }
        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .context("Could not build HTTP client")?;
        *slot = Some(client.clone());
        Ok(client)
    }

    fn perform_http(&self, method: &str, url: &str, headers: &HttpHeaders, payload: Vec<u8>) -> AssetResponse {
        match self.send(method, url, headers, payload) {
            Ok(response) => {
                log::debug!(
                    "HTTP {} {} -> {} ({}, {} bytes)",
                    method,
                    url,
                    response.status,
                    response.content_type,
                    response.data.len()
                );
                response
            }
            Err(e) => {
                log::warn!("Network error for {}: {:#}", url, e);
                AssetResponse::message(0, format!("Network error: {:#}", e))
            }
        }
    }

    fn send(&self, method: &str, url: &str, headers: &HttpHeaders, payload: Vec<u8>) -> anyhow::Result<AssetResponse> {
        let method = reqwest::Method::from_bytes(method.as_bytes())
            .with_context(|| format!("Unsupported request method '{}'", method))?;
        let mut builder = self.client()?.request(method, url);
        for (name, value) in headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if !payload.is_empty() {
            builder = builder.body(payload);
        }
        let response = builder.send()?;
        let status = response.status().as_u16();
        let response_headers: HttpHeaders = response
            .headers()
            .iter()
            .filter_map(|(name, value)| Some((name.as_str().to_string(), value.to_str().ok()?.to_string())))
            .collect();
        let content_type = response_headers
            .get("content-type")
            .cloned()
            .unwrap_or_else(|| "unknown".to_string());
        let data = response.bytes().context("Reading response body")?.to_vec();
        Ok(AssetResponse {
            status,
            content_type,
            headers: response_headers,
            data,
        })
    }
}

fn read_file(path: &Path) -> AssetResponse {
    match std::fs::read(path) {
        Ok(data) => {
            log::trace!("Read {} bytes from {}", data.len(), path.display());
            AssetResponse::ok(url::content_type_for_path(path), data)
        }
        Err(e) => {
            let status = match e.kind() {
                std::io::ErrorKind::NotFound => 404,
                std::io::ErrorKind::PermissionDenied => 403,
                _ => 500,
            };
            log::debug!("Reading {} failed with {}: {}", path.display(), status, e);
            AssetResponse::empty(status)
        }
    }
}

impl std::fmt::Debug for AssetFetcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetFetcher")
            .field("base_url", &self.base_url())
            .field("timeout", &self.state.timeout)
            .finish()
    }
}

//! Request and response values handed back by the asset fetcher.

use std::{collections::BTreeMap, fmt};

/// Header names are stored lower-cased.
pub type HttpHeaders = BTreeMap<String, String>;

/// A completed request. Failures are encoded in the response status, never
/// raised.
#[derive(Clone, Debug)]
pub struct AssetRequest {
    pub method: String,
    pub url: String,
    pub headers: HttpHeaders,
    pub response: AssetResponse,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct AssetResponse {
    /// 0 means the transport failed before a status was received.
    pub status: u16,
    pub content_type: String,
    pub headers: HttpHeaders,
    pub data: Vec<u8>,
}

impl AssetResponse {
    pub fn ok(content_type: impl Into<String>, data: Vec<u8>) -> Self {
        Self {
            status: 200,
            content_type: content_type.into(),
            headers: HttpHeaders::new(),
            data,
        }
    }

    /// A failure without a body, such as a missing local file.
    pub fn empty(status: u16) -> Self {
        Self {
            status,
            content_type: "text/plain".to_string(),
            headers: HttpHeaders::new(),
            data: Vec::new(),
        }
    }

    /// A failure whose body carries a readable message.
    pub fn message(status: u16, message: impl AsRef<str>) -> Self {
        Self {
            data: message.as_ref().as_bytes().to_vec(),
            ..Self::empty(status)
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}

/// Header lists are accepted in any order and normalized once.
pub fn collect_headers<I, K, V>(headers: I) -> HttpHeaders
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Into<String>,
{
    headers
        .into_iter()
        .map(|(k, v)| (k.as_ref().to_ascii_lowercase(), v.into()))
        .collect()
}

/// A fetch that did not produce a usable payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FetchError {
    pub status: u16,
    pub url: String,
    pub message: String,
}

impl FetchError {
    pub fn from_response(url: &str, response: &AssetResponse) -> Self {
        let message = match response.status {
            0 => response.text(),
            404 => "resource not found".to_string(),
            status if response.data.is_empty() => format!("request failed with status {}", status),
            _ => response.text(),
        };
        Self {
            status: response.status,
            url: url.to_string(),
            message,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Fetching {} failed ({}): {}", self.url, self.status, self.message)
    }
}

impl std::error::Error for FetchError {}

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};

use crate::worker::http::{Request, Response, ResponseType};

/// One stored response inside a cache generation.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedAsset {
    pub cache_name: String,
    /// `METHOD:absolute-url`, see [`Request::cache_key`].
    pub request_key: String,
    pub url: String,
    pub status: u16,
    pub status_text: String,
    pub response_type: ResponseType,
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
    pub cached_at: DateTime<Utc>,
}

impl CachedAsset {
    pub fn capture(cache_name: &str, request: &Request, response: &Response) -> Self {
        Self {
            cache_name: cache_name.to_string(),
            request_key: request.cache_key(),
            url: request.url.clone(),
            status: response.status,
            status_text: response.status_text.clone(),
            response_type: response.response_type,
            headers: response.headers.clone(),
            body: response.body.clone(),
            cached_at: Utc::now(),
        }
    }

    pub fn into_response(self) -> Response {
        Response {
            status: self.status,
            status_text: self.status_text,
            headers: self.headers,
            body: self.body,
            response_type: self.response_type,
            url: self.url,
        }
    }
}

use std::{collections::BTreeMap, future::Future, time::Duration};

use anyhow::{Context, Result};
use url::Url;

use crate::error::NetworkError;

use super::http::{Request, RequestMethod, Response, ResponseType};

const CONNECT_TIMEOUT_SECS: u64 = 5;

/// The outbound side of the worker: anything that can turn a request into a response.
pub trait Network: Send + Sync + 'static {
    fn fetch(
        &self,
        request: &Request,
    ) -> impl Future<Output = Result<Response, NetworkError>> + Send;
}

/// Live network backed by `reqwest`.
pub struct HttpNetwork {
    client: reqwest::Client,
    origin: Url,
}

impl HttpNetwork {
    pub fn new(origin: Url) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self { client, origin })
    }

    fn response_type(&self, url: &Url) -> ResponseType {
        if url.origin() == self.origin.origin() {
            ResponseType::Basic
        } else {
            ResponseType::Cors
        }
    }
}

impl Network for HttpNetwork {
    async fn fetch(&self, request: &Request) -> Result<Response, NetworkError> {
        let method = match request.method {
            RequestMethod::Get => reqwest::Method::GET,
            RequestMethod::Post => reqwest::Method::POST,
            RequestMethod::Put => reqwest::Method::PUT,
            RequestMethod::Delete => reqwest::Method::DELETE,
            RequestMethod::Patch => reqwest::Method::PATCH,
            RequestMethod::Head => reqwest::Method::HEAD,
            RequestMethod::Options => reqwest::Method::OPTIONS,
        };

        let mut builder = self.client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let reply = builder
            .send()
            .await
            .map_err(|err| NetworkError::Failed(err.to_string()))?;

        let final_url = reply.url().clone();
        let status = reply.status();
        let headers: BTreeMap<String, String> = reply
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = reply
            .bytes()
            .await
            .map_err(|err| NetworkError::Failed(format!("failed to read body: {err}")))?;

        Ok(Response {
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_string(),
            headers,
            body: body.to_vec(),
            response_type: self.response_type(&final_url),
            url: final_url.to_string(),
        })
    }
}

/// Runs a fetch with an upper bound on its duration.
pub async fn fetch_with_timeout<N: Network>(
    network: &N,
    request: &Request,
    timeout: Duration,
) -> Result<Response, NetworkError> {
    match tokio::time::timeout(timeout, network.fetch(request)).await {
        Ok(result) => result,
        Err(_) => Err(NetworkError::Timeout(timeout)),
    }
}

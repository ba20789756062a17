//! Resource Loader
//!
//! Blocking HTTP client driven off the async executor's thread pool.

use std::collections::HashMap;
use std::time::Duration;

use crate::{NetError, Response};

/// Request configuration
#[derive(Debug, Default, Clone)]
pub struct Request {
    pub url: String,
    pub headers: HashMap<String, String>,
}

impl Request {
    pub fn get(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Default::default()
        }
    }

    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.headers.insert(key.to_string(), value.to_string());
        self
    }
}

/// Load resources from network
#[derive(Debug, Clone)]
pub struct ResourceLoader {
    client: reqwest::blocking::Client,
}

impl ResourceLoader {
    pub fn new(request_timeout: Duration) -> Result<Self, NetError> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("code-verify/", env!("CARGO_PKG_VERSION")))
            .timeout(request_timeout)
            .build()
            .map_err(|e| NetError::Network(e.to_string()))?;

        Ok(Self { client })
    }

    /// Make a GET request without blocking the executor
    pub async fn request(&self, req: Request) -> Result<Response, NetError> {
        tracing::info!("HTTP GET {}", req.url);

        let client = self.client.clone();
        smol::unblock(move || {
            let mut builder = client.get(&req.url);
            for (key, value) in &req.headers {
                builder = builder.header(key, value);
            }

            let resp = builder.send().map_err(|e| NetError::Network(e.to_string()))?;
            let status = resp.status().as_u16();
            let headers = resp
                .headers()
                .iter()
                .map(|(k, v)| (k.as_str().to_string(), String::from_utf8_lossy(v.as_bytes()).into_owned()))
                .collect();
            let body = resp.bytes().map_err(|e| NetError::Network(e.to_string()))?.to_vec();

            Ok(Response { status, headers, body })
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let req = Request::get("https://example.com")
            .with_header("Accept", "application/json");

        assert_eq!(req.url, "https://example.com");
        assert_eq!(req.headers.get("Accept").unwrap(), "application/json");
    }

    #[test]
    fn test_unreachable_host_is_network_error() {
        let loader = ResourceLoader::new(Duration::from_millis(200)).unwrap();
        let result = smol::block_on(loader.request(Request::get("http://127.0.0.1:9/hash/a/b")));
        assert!(matches!(result, Err(NetError::Network(_))));
    }
}

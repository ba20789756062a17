//! Fetch response helpers

use crate::{NetError, Response};

/// Response with convenience accessors
#[derive(Debug)]
pub struct FetchResponse {
    inner: Response,
}

impl FetchResponse {
    /// HTTP status code
    pub fn status(&self) -> u16 {
        self.inner.status
    }

    /// Check if response is OK (2xx)
    pub fn ok(&self) -> bool {
        (200..300).contains(&self.inner.status)
    }

    /// Get header value
    pub fn header(&self, name: &str) -> Option<&str> {
        self.inner.headers.iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Get body as JSON
    pub fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T, NetError> {
        serde_json::from_slice(&self.inner.body)
            .map_err(|e| NetError::MalformedBody(e.to_string()))
    }
}

impl From<Response> for FetchResponse {
    fn from(inner: Response) -> Self {
        Self { inner }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn response(status: u16, body: &str) -> FetchResponse {
        FetchResponse::from(Response {
            status,
            headers: vec![("Content-Type".into(), "application/json".into())],
            body: body.as_bytes().to_vec(),
        })
    }

    #[test]
    fn test_ok_range() {
        assert!(response(200, "").ok());
        assert!(response(204, "").ok());
        assert!(!response(301, "").ok());
        assert!(!response(500, "").ok());
        assert_eq!(response(404, "").status(), 404);
    }

    #[test]
    fn test_header_case_insensitive() {
        assert_eq!(response(200, "").header("content-type"), Some("application/json"));
        assert_eq!(response(200, "").header("etag"), None);
    }

    #[test]
    fn test_json_errors_are_malformed_body() {
        let parsed: Result<serde_json::Value, _> = response(200, "{not json").json();
        assert!(matches!(parsed, Err(NetError::MalformedBody(_))));
    }
}

//! The single request function every engine operation goes through.
//!
//! An [`ApiRequest`] describes method, path, query and body; a [`Transport`]
//! turns it into `Ok(Some(json))`, `Ok(None)` for empty/204 responses, or a
//! normalized [`TransportError`].

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use serde::Serialize;
use serde_json::Value;

use vmsync_core::wire::ErrorEnvelope;

use crate::config::ClientConfig;
use crate::error::TransportError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Delete => "DELETE",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: Method,
    /// Path below the API base, starting with `/`.
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl ApiRequest {
    fn new(method: Method, path: impl Into<String>) -> Self {
        ApiRequest {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::Post, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    /// Appends a query parameter. Empty values are dropped.
    pub fn query(mut self, key: &str, value: impl ToString) -> Self {
        let value = value.to_string();
        if !value.is_empty() {
            self.query.push((key.to_string(), value));
        }
        self
    }

    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self, TransportError> {
        let value = serde_json::to_value(body)
            .map_err(|e| TransportError::network(format!("failed to encode request body: {}", e)))?;
        self.body = Some(value);
        Ok(self)
    }
}

/// Percent-encodes one path segment (template module names, ids).
pub fn encode_segment(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: ApiRequest) -> Result<Option<Value>, TransportError>;
}

fn is_absolute(base: &str) -> bool {
    let lower = base.to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

/// Resolves a request against the configured base.
///
/// An absolute `http(s)://` base is used as-is; anything else is a path
/// prefix joined onto `origin`.
pub fn request_url(base: &str, origin: &str, request: &ApiRequest) -> Result<Url, TransportError> {
    let base = base.trim_end_matches('/');
    let full = if is_absolute(base) {
        format!("{}{}", base, request.path)
    } else {
        let origin = origin.trim_end_matches('/');
        let prefix = base.trim_start_matches('/');
        if prefix.is_empty() {
            format!("{}{}", origin, request.path)
        } else {
            format!("{}/{}{}", origin, prefix, request.path)
        }
    };
    let mut url = Url::parse(&full)
        .map_err(|e| TransportError::network(format!("invalid request url {}: {}", full, e)))?;
    if !request.query.is_empty() {
        url.query_pairs_mut().extend_pairs(request.query.iter());
    }
    Ok(url)
}

/// Interprets a response body. Non-2xx statuses become errors carrying the
/// envelope's code, message and details; the message falls back to
/// `HTTP <status>`.
pub fn interpret_response(status: u16, body: &[u8]) -> Result<Option<Value>, TransportError> {
    if (200..300).contains(&status) {
        if status == StatusCode::NO_CONTENT.as_u16() || body.iter().all(u8::is_ascii_whitespace) {
            return Ok(None);
        }
        return serde_json::from_slice(body).map(Some).map_err(|e| TransportError {
            status,
            message: format!("invalid JSON response: {}", e),
            code: None,
            details: None,
        });
    }

    let envelope = serde_json::from_slice::<ErrorEnvelope>(body).ok();
    let error = envelope.map(|e| e.error).unwrap_or_default();
    Err(TransportError {
        status,
        message: error
            .message
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| format!("HTTP {}", status)),
        code: error.code,
        details: error.details,
    })
}

/// reqwest-backed transport.
pub struct HttpTransport {
    client: reqwest::Client,
    base: String,
    origin: String,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Self {
        HttpTransport {
            client: reqwest::Client::new(),
            base: config.api_base_url.clone(),
            origin: config.origin.clone(),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(&self, request: ApiRequest) -> Result<Option<Value>, TransportError> {
        let url = request_url(&self.base, &self.origin, &request)?;
        tracing::debug!(method = request.method.as_str(), %url, "api request");

        let builder = match request.method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
            Method::Delete => self.client.delete(url),
        };
        let builder = match &request.body {
            Some(body) => builder.json(body),
            None => builder,
        };

        let response = builder
            .send()
            .await
            .map_err(|e| TransportError::network(e.to_string()))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::network(e.to_string()))?;
        tracing::debug!(status, bytes = body.len(), "api response");
        interpret_response(status, &body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn absolute_base_is_used_directly() {
        let req = ApiRequest::get("/api/v1/sessions").query("status", "ready");
        let url = request_url("https://vm.example.com/root/", "http://ignored", &req).unwrap();
        assert_eq!(url.as_str(), "https://vm.example.com/root/api/v1/sessions?status=ready");
    }

    #[test]
    fn relative_base_joins_origin() {
        let req = ApiRequest::get("/api/v1/templates");
        let url = request_url("/proxy", "http://127.0.0.1:3210/", &req).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:3210/proxy/api/v1/templates");
        let url = request_url("", "http://127.0.0.1:3210", &req).unwrap();
        assert_eq!(url.as_str(), "http://127.0.0.1:3210/api/v1/templates");
    }

    #[test]
    fn empty_query_values_are_skipped() {
        let req = ApiRequest::get("/x").query("status", "").query("limit", 50);
        assert_eq!(req.query, vec![("limit".to_string(), "50".to_string())]);
    }

    #[test]
    fn segments_are_percent_encoded() {
        assert_eq!(encode_segment("@scope/pkg"), "%40scope%2Fpkg");
        assert_eq!(encode_segment("lodash"), "lodash");
        assert_eq!(encode_segment("my module"), "my%20module");
        assert_eq!(encode_segment("lodash.get~v4_x-y"), "lodash.get~v4_x-y");
        assert_eq!(encode_segment("é"), "%C3%A9");
    }

    #[test]
    fn envelope_errors_are_normalized() {
        let body = json!({ "error": { "code": "SESSION_NOT_FOUND", "message": "Session not found", "details": { "session_id": "s" } } });
        let err = interpret_response(404, body.to_string().as_bytes()).unwrap_err();
        assert_eq!(err.status, 404);
        assert_eq!(err.message, "Session not found");
        assert!(err.has_code("SESSION_NOT_FOUND"));
        assert_eq!(err.details, Some(json!({ "session_id": "s" })));
    }

    #[test]
    fn missing_envelope_falls_back_to_status() {
        let err = interpret_response(502, b"<html>bad gateway</html>").unwrap_err();
        assert_eq!(err.message, "HTTP 502");
        assert_eq!(err.code, None);
    }

    #[test]
    fn no_content_is_none() {
        assert_eq!(interpret_response(204, b"").unwrap(), None);
        assert_eq!(interpret_response(200, b"  ").unwrap(), None);
        assert_eq!(interpret_response(200, b"[1]").unwrap(), Some(json!([1])));
    }
}

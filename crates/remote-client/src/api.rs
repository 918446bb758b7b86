//! Calls of the remote inference API.

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use forecast_common::RetrieveRequest;
use reqwest::Url;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::error::{RemoteError, Result};
use crate::transport::{Body, Method, Reply, Transport};

/// What to ask the metadata endpoint for.
#[derive(Debug, Clone)]
pub enum MetadataQuery {
    One(String),
    Many(Vec<String>),
}

#[derive(Clone)]
pub struct RemoteApi {
    base: Url,
    transport: Arc<dyn Transport>,
}

impl RemoteApi {
    pub fn new(base: Url, transport: Arc<dyn Transport>) -> Self {
        Self { base, transport }
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Resolve `href` against the base URL. Absolute hrefs are kept.
    pub fn url(&self, href: &str) -> Result<Url> {
        self.base
            .join(href)
            .map_err(|e| RemoteError::Config(format!("bad href '{}': {}", href, e)))
    }

    /// Send one request and decode the reply.
    ///
    /// A 401 is always [`RemoteError::Unauthorized`]. A body that is not
    /// JSON becomes `{"status": "<url> <code> <text>"}`. A textual
    /// `status` is lower-cased.
    pub async fn request(&self, action: &'static str, method: Method, href: &str, body: Body) -> Result<Value> {
        Ok(self.exchange(action, method, href, body).await?.1)
    }

    /// Like [`RemoteApi::request`], also returning the HTTP status code.
    pub async fn exchange(&self, action: &'static str, method: Method, href: &str, body: Body) -> Result<(u16, Value)> {
        let url = self.url(href)?;
        let reply = self.transport.send(action, method, &url, body).await?;
        let code = reply.status;
        Ok((code, decode(reply)?))
    }

    /// Upload the input file; returns the HTTP status code and the reply.
    pub async fn upload(&self, input: &Path) -> Result<(u16, Value)> {
        let bytes = tokio::fs::read(input).await?;
        debug!(path = %input.display(), bytes = bytes.len(), "Uploading input file");
        self.exchange("upload", Method::Post, "upload", Body::Bytes(Bytes::from(bytes)))
            .await
    }

    pub async fn submit(&self, href: &str, job_config: &Value) -> Result<Value> {
        self.request("submit", Method::Post, href, Body::Json(job_config.clone()))
            .await
    }

    pub async fn poll(&self, href: &str) -> Result<Value> {
        self.request("poll", Method::Get, href, Body::Empty).await
    }

    pub async fn download(&self, href: &str, target: &Path) -> Result<u64> {
        let url = self.url(href)?;
        self.transport.download(&url, target).await
    }

    /// Names of the models offered by the server. Anything but a list
    /// counts as none.
    pub async fn models(&self) -> Result<Vec<String>> {
        let reply = self.request("models", Method::Get, "models", Body::Empty).await?;
        Ok(match reply {
            Value::Array(items) => items
                .into_iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            _ => Vec::new(),
        })
    }

    /// Model parameters from the metadata endpoint.
    pub async fn metadata(&self, model: &str, version: &str, query: &MetadataQuery) -> Result<Map<String, Value>> {
        let reply = match query {
            MetadataQuery::One(param) => {
                let href = format!("metadata/{}/{}/{}", model, version, param);
                self.request("metadata", Method::Get, &href, Body::Empty).await?
            }
            MetadataQuery::Many(params) => {
                let href = format!("metadata/{}/{}", model, version);
                self.request("metadata", Method::Post, &href, Body::Json(json!(params)))
                    .await?
            }
        };
        match reply {
            Value::Object(map) => Ok(map),
            other => Err(RemoteError::Rejected {
                action: "metadata",
                status: other.to_string(),
                reason: None,
            }),
        }
    }

    /// Let the server adjust a retrieval request for its model. Any
    /// `status` in the reply is an error.
    pub async fn patch_retrieve_request(&self, job_config: &Value, request: &RetrieveRequest) -> Result<RetrieveRequest> {
        let mut body = job_config.clone();
        if let Value::Object(map) = &mut body {
            map.insert("patchrequest".to_string(), serde_json::to_value(request)?);
        }
        let reply = self.request("patch", Method::Post, "patch", Body::Json(body)).await?;
        if let Some(status) = reply.get("status").and_then(Value::as_str) {
            return Err(RemoteError::Rejected {
                action: "patch",
                status: status.to_string(),
                reason: reason(&reply),
            });
        }
        Ok(serde_json::from_value(reply)?)
    }
}

fn decode(reply: Reply) -> Result<Value> {
    if reply.status == 401 {
        return Err(RemoteError::Unauthorized);
    }
    match serde_json::from_slice::<Value>(&reply.body) {
        Ok(mut value) => {
            if let Some(Value::String(status)) = value.get_mut("status") {
                *status = status.to_lowercase();
            }
            Ok(value)
        }
        Err(_) => Ok(json!({
            "status": format!("{} {} {}", reply.url, reply.status, reply.text()),
        })),
    }
}

/// The server's `reason`, when it sent one.
pub fn reason(reply: &Value) -> Option<String> {
    reply
        .get("reason")
        .and_then(Value::as_str)
        .filter(|r| !r.is_empty())
        .map(str::to_string)
}

/// The reply's `status`, empty when missing.
pub fn status(reply: &Value) -> &str {
    reply.get("status").and_then(Value::as_str).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(status: u16, body: &str) -> Reply {
        Reply {
            status,
            url: "https://example.com/api/upload".into(),
            body: Bytes::from(body.to_string()),
        }
    }

    #[test]
    fn test_status_lowercased() {
        let v = decode(reply(200, r#"{"status": "QUEUED", "href": "jobs/1"}"#)).unwrap();
        assert_eq!(status(&v), "queued");
        assert_eq!(v["href"], "jobs/1");
    }

    #[test]
    fn test_non_json_body_becomes_status() {
        let v = decode(reply(502, "Bad Gateway")).unwrap();
        assert_eq!(status(&v), "https://example.com/api/upload 502 Bad Gateway");
    }

    #[test]
    fn test_unauthorized() {
        let err = decode(reply(401, r#"{"status": "error"}"#)).unwrap_err();
        assert!(matches!(err, RemoteError::Unauthorized));
    }

    #[test]
    fn test_reason() {
        assert_eq!(reason(&json!({"reason": "disk full"})).as_deref(), Some("disk full"));
        assert_eq!(reason(&json!({"reason": ""})), None);
    }
}

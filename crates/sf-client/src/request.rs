//! Logical request description: method, path, body.

use bytes::Bytes;
use serde::Serialize;

use crate::error::Result;

/// HTTP request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequestMethod {
    Get,
    Post,
    Patch,
    Put,
    Delete,
}

impl RequestMethod {
    /// Convert to reqwest::Method.
    pub fn to_reqwest(&self) -> reqwest::Method {
        match self {
            RequestMethod::Get => reqwest::Method::GET,
            RequestMethod::Post => reqwest::Method::POST,
            RequestMethod::Patch => reqwest::Method::PATCH,
            RequestMethod::Put => reqwest::Method::PUT,
            RequestMethod::Delete => reqwest::Method::DELETE,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RequestMethod::Get => "GET",
            RequestMethod::Post => "POST",
            RequestMethod::Patch => "PATCH",
            RequestMethod::Put => "PUT",
            RequestMethod::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for RequestMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request body content.
///
/// Structured values are encoded once; text and byte payloads are sent
/// exactly as given. Bulk uploads depend on the passthrough: a CSV payload
/// must never be re-encoded as a JSON string. All variants are cheap to
/// clone so a request can be replayed after a retry or a credential refresh.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum RequestBody {
    #[default]
    Empty,
    Json(serde_json::Value),
    Text {
        content: String,
        content_type: String,
    },
    Bytes {
        content: Bytes,
        content_type: String,
    },
    Form(Vec<(String, String)>),
}

impl RequestBody {
    /// Encode a structured value as JSON.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Result<Self> {
        Ok(RequestBody::Json(serde_json::to_value(value)?))
    }

    /// CSV payload (for Bulk API uploads).
    pub fn csv(data: impl Into<String>) -> Self {
        RequestBody::Text {
            content: data.into(),
            content_type: "text/csv".to_string(),
        }
    }

    /// Plain text payload.
    pub fn text(data: impl Into<String>) -> Self {
        RequestBody::Text {
            content: data.into(),
            content_type: "text/plain".to_string(),
        }
    }

    /// Raw bytes with an explicit content type.
    pub fn bytes(data: impl Into<Bytes>, content_type: impl Into<String>) -> Self {
        RequestBody::Bytes {
            content: data.into(),
            content_type: content_type.into(),
        }
    }

    /// Form-encoded body.
    pub fn form<K: Into<String>, V: Into<String>>(pairs: impl IntoIterator<Item = (K, V)>) -> Self {
        RequestBody::Form(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, RequestBody::Empty)
    }

    /// Content-Type header value for this body, if any.
    pub fn content_type(&self) -> Option<&str> {
        match self {
            RequestBody::Empty => None,
            RequestBody::Json(_) => Some("application/json"),
            RequestBody::Text { content_type, .. } | RequestBody::Bytes { content_type, .. } => {
                Some(content_type)
            }
            RequestBody::Form(_) => Some("application/x-www-form-urlencoded"),
        }
    }

    /// Wire bytes for this body.
    pub fn encode(&self) -> Result<Bytes> {
        Ok(match self {
            RequestBody::Empty => Bytes::new(),
            RequestBody::Json(value) => Bytes::from(serde_json::to_vec(value)?),
            RequestBody::Text { content, .. } => Bytes::from(content.clone()),
            RequestBody::Bytes { content, .. } => content.clone(),
            RequestBody::Form(pairs) => Bytes::from(serde_urlencoded::to_string(pairs)?),
        })
    }
}

/// A logical call before credentials are attached.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: RequestMethod,
    /// Absolute URL, or a path joined to the credential's base address.
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: RequestBody,
}

impl ApiRequest {
    /// Create a new request without body.
    pub fn new(method: RequestMethod, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: Vec::new(),
            body: RequestBody::Empty,
        }
    }

    /// Add a header.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Set the body.
    pub fn body(mut self, body: RequestBody) -> Self {
        self.body = body;
        self
    }

    /// Resolve the path against a base address.
    pub fn url(&self, base_address: &str) -> String {
        let base = base_address.trim_end_matches('/');
        if self.path.starts_with("http://") || self.path.starts_with("https://") {
            self.path.clone()
        } else if self.path.starts_with('/') {
            format!("{}{}", base, self.path)
        } else {
            format!("{}/{}", base, self.path)
        }
    }
}

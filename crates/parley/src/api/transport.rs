//! JSON-over-HTTP transport with auth injection and error normalization.
//!
//! Every backend call in the crate goes through a [`Transport`]. The trait is
//! the seam between the orchestration logic and the network: production code
//! uses [`HttpTransport`] (reqwest), tests substitute in-memory fakes.
//!
//! The transport never retries. Wrap calls in
//! [`with_retry`](super::retry::with_retry) when resilience is wanted.

use std::future::Future;
use std::pin::Pin;
use std::time::{Duration, Instant};

use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::{Error, Result};

/// Boxed future returned by [`Transport`] methods so the trait stays
/// dyn-compatible.
pub type TransportFuture<'a> = Pin<Box<dyn Future<Output = Result<Value>> + Send + 'a>>;

/// Boxed future for raw response bodies.
pub type BytesFuture<'a> = Pin<Box<dyn Future<Output = Result<Vec<u8>>> + Send + 'a>>;

/// A JSON request/response channel to one backend.
pub trait Transport: Send + Sync {
    /// `POST` `payload` to `endpoint` (relative to the transport's base URL).
    ///
    /// Adds `Content-Type: application/json`, plus
    /// `Authorization: Bearer <token>` when `auth_token` is given.
    fn post<'a>(
        &'a self,
        endpoint: &'a str,
        payload: &'a Value,
        auth_token: Option<&'a str>,
    ) -> TransportFuture<'a>;

    /// `GET` `endpoint`, used for status polling and health checks.
    fn get<'a>(&'a self, endpoint: &'a str, auth_token: Option<&'a str>) -> TransportFuture<'a>;

    /// `GET` `endpoint` and return the body unparsed (rendered export files).
    ///
    /// JSON-only transports keep this default, which reports the body as
    /// undecodable.
    fn get_bytes<'a>(&'a self, endpoint: &'a str, _auth_token: Option<&'a str>) -> BytesFuture<'a> {
        Box::pin(async move {
            Err(Error::Decode(format!(
                "{endpoint}: transport cannot return binary bodies"
            )))
        })
    }
}

/// Serialize `request`, post it, and decode the success body as `Resp`.
///
/// This is where untyped JSON becomes a typed reply: a body that does not
/// match `Resp` surfaces as [`Error::Decode`].
pub async fn send_json<Req, Resp>(
    transport: &dyn Transport,
    endpoint: &str,
    request: &Req,
    auth_token: Option<&str>,
) -> Result<Resp>
where
    Req: Serialize + ?Sized,
    Resp: DeserializeOwned,
{
    let payload = serde_json::to_value(request)
        .map_err(|e| Error::Decode(format!("failed to serialize request: {e}")))?;
    let value = transport.post(endpoint, &payload, auth_token).await?;
    decode(value)
}

/// `GET` `endpoint` and decode the body as `Resp`.
pub async fn get_json<Resp: DeserializeOwned>(
    transport: &dyn Transport,
    endpoint: &str,
    auth_token: Option<&str>,
) -> Result<Resp> {
    let value = transport.get(endpoint, auth_token).await?;
    decode(value)
}

fn decode<Resp: DeserializeOwned>(value: Value) -> Result<Resp> {
    serde_json::from_value(value).map_err(|e| Error::Decode(e.to_string()))
}

/// Build the normalized error for a non-success response.
///
/// Prefers a `message`, `error`, or `detail` string in a JSON body; falls
/// back to `"HTTP <status>: <reason>"` when the body is empty, not JSON, or
/// carries none of those fields.
pub fn error_from_response(status: StatusCode, body: &str) -> Error {
    let from_body = serde_json::from_str::<Value>(body).ok().and_then(|v| {
        ["message", "error", "detail"]
            .iter()
            .find_map(|key| v.get(key).and_then(Value::as_str).map(str::to_string))
    });

    let message = from_body.unwrap_or_else(|| {
        format!(
            "HTTP {}: {}",
            status.as_u16(),
            status.canonical_reason().unwrap_or("Unknown Status")
        )
    });

    Error::Http {
        status: status.as_u16(),
        message,
    }
}

/// Join a base URL and an endpoint path without doubling slashes.
pub fn endpoint_url(base_url: &str, endpoint: &str) -> String {
    let base = base_url.trim_end_matches('/');
    if endpoint.starts_with('/') {
        format!("{base}{endpoint}")
    } else {
        format!("{base}/{endpoint}")
    }
}

// ── reqwest implementation ─────────────────────────────────────────

/// [`Transport`] backed by a `reqwest::Client`.
#[derive(Clone)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
}

impl HttpTransport {
    /// Create a transport rooted at `base_url` (e.g. `http://localhost:5000/api`).
    ///
    /// `timeout` bounds a single request; `None` leaves requests unbounded.
    pub fn new(base_url: impl Into<String>, timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder().user_agent(crate::USER_AGENT);
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder
            .build()
            .map_err(|e| Error::config(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// The base URL every endpoint is resolved against.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn execute(&self, request: reqwest::RequestBuilder, url: &str) -> Result<Value> {
        let start = Instant::now();
        let resp = request.send().await.map_err(Error::from)?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .map_err(|e| Error::Network(format!("failed to read response: {e}")))?;

        debug!(
            "HTTP {} from {url} in {:.1}s ({} bytes)",
            status.as_u16(),
            start.elapsed().as_secs_f64(),
            text.len()
        );

        if !status.is_success() {
            return Err(error_from_response(status, &text));
        }

        serde_json::from_str(&text).map_err(|e| Error::Decode(e.to_string()))
    }

    async fn execute_bytes(&self, request: reqwest::RequestBuilder, url: &str) -> Result<Vec<u8>> {
        let start = Instant::now();
        let resp = request.send().await.map_err(Error::from)?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            return Err(error_from_response(status, &text));
        }
        let body = resp
            .bytes()
            .await
            .map_err(|e| Error::Network(format!("failed to read response: {e}")))?;

        debug!(
            "HTTP {} from {url} in {:.1}s ({} bytes, binary)",
            status.as_u16(),
            start.elapsed().as_secs_f64(),
            body.len()
        );
        Ok(body.to_vec())
    }

    fn authorize(request: reqwest::RequestBuilder, auth_token: Option<&str>) -> reqwest::RequestBuilder {
        match auth_token {
            Some(token) => request.header(AUTHORIZATION, format!("Bearer {token}")),
            None => request,
        }
    }
}

impl Transport for HttpTransport {
    fn post<'a>(
        &'a self,
        endpoint: &'a str,
        payload: &'a Value,
        auth_token: Option<&'a str>,
    ) -> TransportFuture<'a> {
        Box::pin(async move {
            let url = endpoint_url(&self.base_url, endpoint);
            trace!(
                "POST {url}: {} bytes",
                serde_json::to_string(payload).map_or(0, |s| s.len())
            );
            let request = self
                .client
                .post(&url)
                .header(CONTENT_TYPE, "application/json")
                .json(payload);
            self.execute(Self::authorize(request, auth_token), &url).await
        })
    }

    fn get<'a>(&'a self, endpoint: &'a str, auth_token: Option<&'a str>) -> TransportFuture<'a> {
        Box::pin(async move {
            let url = endpoint_url(&self.base_url, endpoint);
            trace!("GET {url}");
            let request = self
                .client
                .get(&url)
                .header(CONTENT_TYPE, "application/json");
            self.execute(Self::authorize(request, auth_token), &url).await
        })
    }

    fn get_bytes<'a>(&'a self, endpoint: &'a str, auth_token: Option<&'a str>) -> BytesFuture<'a> {
        Box::pin(async move {
            let url = endpoint_url(&self.base_url, endpoint);
            trace!("GET {url} (binary)");
            let request = self.client.get(&url);
            self.execute_bytes(Self::authorize(request, auth_token), &url).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[test]
    fn error_prefers_backend_message() {
        let err = error_from_response(
            StatusCode::BAD_REQUEST,
            r#"{"message":"prompt too long"}"#,
        );
        assert_eq!(
            err,
            Error::Http {
                status: 400,
                message: "prompt too long".into()
            }
        );
    }

    #[test]
    fn error_reads_error_field() {
        let err = error_from_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            r#"{"success":false,"error":"upstream down"}"#,
        );
        assert_eq!(err.to_string(), "upstream down");
    }

    #[test]
    fn error_falls_back_to_status_line() {
        let err = error_from_response(StatusCode::BAD_GATEWAY, "<html>oops</html>");
        assert_eq!(err.to_string(), "HTTP 502: Bad Gateway");

        let err = error_from_response(StatusCode::SERVICE_UNAVAILABLE, "");
        assert_eq!(err.to_string(), "HTTP 503: Service Unavailable");

        // JSON without a usable field also falls back.
        let err = error_from_response(StatusCode::NOT_FOUND, r#"{"code":17}"#);
        assert_eq!(err.to_string(), "HTTP 404: Not Found");
    }

    #[test]
    fn endpoint_url_joins_cleanly() {
        assert_eq!(
            endpoint_url("http://localhost:5000/api", "/chat/claude"),
            "http://localhost:5000/api/chat/claude"
        );
        assert_eq!(
            endpoint_url("http://localhost:5000/api/", "health"),
            "http://localhost:5000/api/health"
        );
    }

    struct CannedTransport(Value);

    impl Transport for CannedTransport {
        fn post<'a>(
            &'a self,
            _endpoint: &'a str,
            _payload: &'a Value,
            _auth_token: Option<&'a str>,
        ) -> TransportFuture<'a> {
            let value = self.0.clone();
            Box::pin(async move { Ok(value) })
        }

        fn get<'a>(&'a self, _endpoint: &'a str, _auth: Option<&'a str>) -> TransportFuture<'a> {
            let value = self.0.clone();
            Box::pin(async move { Ok(value) })
        }
    }

    #[derive(Deserialize, Debug)]
    struct Reply {
        content: String,
    }

    #[tokio::test]
    async fn send_json_decodes_typed_reply() {
        let transport = CannedTransport(serde_json::json!({"content": "hi"}));
        let reply: Reply = send_json(&transport, "/x", &serde_json::json!({}), None)
            .await
            .unwrap();
        assert_eq!(reply.content, "hi");
    }

    #[tokio::test]
    async fn send_json_reports_shape_mismatch() {
        let transport = CannedTransport(serde_json::json!({"unexpected": true}));
        let err = send_json::<_, Reply>(&transport, "/x", &serde_json::json!({}), None)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Decode(_)));
    }
}

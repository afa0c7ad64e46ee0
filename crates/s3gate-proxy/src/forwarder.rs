//! Backend forwarding.
//!
//! The gateway treats the backing store as a black box behind the
//! [`Forwarder`] trait. [`HttpForwarder`] is the production implementation:
//! it rebuilds each permitted request as a path-style S3 HTTP request
//! against the configured endpoint, signs it with the gateway's backend
//! credentials, and streams the response body back without buffering.
//!
//! Backend responses with an error status are drained and surfaced as
//! [`ForwardError::Backend`] carrying the response text, so the gateway can
//! map them onto S3 wire errors uniformly with transport failures.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use chrono::Utc;
use http::{HeaderMap, Method, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use tracing::debug;

use s3gate_auth::canonical::{build_canonical_request, uri_encode};
use s3gate_auth::{build_string_to_sign, compute_signature, derive_signing_key, hash_payload};
use s3gate_config::BackendConfig;
use s3gate_http::{GatewayBody, S3Request};

/// A response from the backing store, ready to stream to the client.
#[derive(Debug)]
pub struct BackendResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: GatewayBody,
}

/// Errors produced while forwarding a request.
#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    /// The backend endpoint in the configuration is not a valid URL.
    #[error("invalid backend endpoint: {0}")]
    InvalidEndpoint(String),

    /// The action has no forwarding implementation.
    #[error("unsupported action: {0}")]
    UnsupportedAction(String),

    /// The backend answered with an error status.
    #[error("backend returned {status}: {message}")]
    Backend { status: StatusCode, message: String },

    /// The backend could not be reached or the exchange failed mid-flight.
    #[error("backend transport error: {0}")]
    Transport(String),
}

/// Future returned by [`Forwarder::forward`].
pub type ForwardFuture = Pin<Box<dyn Future<Output = Result<BackendResponse, ForwardError>> + Send>>;

/// The backend abstraction consumed by the gateway pipeline.
pub trait Forwarder: Send + Sync {
    /// Forward a permitted request to the backing store.
    fn forward(&self, request: S3Request) -> ForwardFuture;
}

/// Signed headers on every outbound request, in canonical order.
const SIGNED_HEADERS: [&str; 3] = ["host", "x-amz-content-sha256", "x-amz-date"];

/// GetObject request headers passed through to the backend.
const GET_PASSTHROUGH_HEADERS: [&str; 3] = ["range", "if-match", "if-none-match"];

/// PutObject request headers passed through to the backend.
const PUT_PASSTHROUGH_HEADERS: [&str; 3] = ["content-type", "content-encoding", "cache-control"];

/// ListBucket query parameters passed through to the backend.
const LIST_PASSTHROUGH_PARAMS: [&str; 4] = ["prefix", "delimiter", "max-keys", "continuation-token"];

/// Forwards requests to an S3-compatible endpoint over plain HTTP.
#[derive(Clone)]
pub struct HttpForwarder {
    client: Client<HttpConnector, Full<Bytes>>,
    scheme: String,
    /// Endpoint authority; the `Host` header in path-style mode, the
    /// suffix of the bucket host otherwise.
    authority: String,
    /// Path-style (`endpoint/bucket/key`) vs virtual-hosted
    /// (`bucket.endpoint/key`) addressing of the backing store.
    use_path_style: bool,
    region: String,
    access_key: String,
    secret_key: String,
}

impl std::fmt::Debug for HttpForwarder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpForwarder")
            .field("authority", &self.authority)
            .field("use_path_style", &self.use_path_style)
            .field("region", &self.region)
            .finish_non_exhaustive()
    }
}

impl HttpForwarder {
    /// Build a forwarder from the backend configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ForwardError::InvalidEndpoint`] when the endpoint URL
    /// cannot be parsed or lacks an authority.
    pub fn new(cfg: &BackendConfig) -> Result<Self, ForwardError> {
        let endpoint: Uri = cfg
            .endpoint
            .parse()
            .map_err(|_| ForwardError::InvalidEndpoint(cfg.endpoint.clone()))?;
        let authority = endpoint
            .authority()
            .ok_or_else(|| ForwardError::InvalidEndpoint(cfg.endpoint.clone()))?
            .to_string();
        let scheme = endpoint.scheme_str().unwrap_or("http");

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(Duration::from_secs(10)));
        connector.set_keepalive(Some(Duration::from_secs(60)));

        let client = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(Duration::from_secs(90))
            .build(connector);

        Ok(Self {
            client,
            scheme: scheme.to_owned(),
            authority,
            use_path_style: cfg.use_path_style,
            region: cfg.region.clone(),
            access_key: cfg.access_key_id.clone(),
            secret_key: cfg.secret_access_key.clone(),
        })
    }

    /// Resolve the `(host, path)` pair for a bucket and key under the
    /// configured addressing mode.
    fn target(&self, bucket: &str, key: &str) -> (String, String) {
        if self.use_path_style {
            (self.authority.clone(), object_path(bucket, key))
        } else {
            (format!("{bucket}.{}", self.authority), key_path(key))
        }
    }

    /// Build, sign, and execute the outbound request.
    async fn dispatch(self, request: S3Request) -> Result<BackendResponse, ForwardError> {
        let (method, query, body) = match request.action {
            "s3:GetObject" => (request.method.clone(), String::new(), Bytes::new()),
            "s3:PutObject" => (Method::PUT, String::new(), request.body.clone()),
            "s3:DeleteObject" => (Method::DELETE, String::new(), Bytes::new()),
            "s3:ListBucket" => (Method::GET, list_query(&request), Bytes::new()),
            other => return Err(ForwardError::UnsupportedAction(other.to_owned())),
        };

        let (host, path) = self.target(&request.bucket, &request.key);
        let uri: Uri = if query.is_empty() {
            format!("{}://{host}{path}", self.scheme)
        } else {
            format!("{}://{host}{path}?{query}", self.scheme)
        }
        .parse()
        .map_err(|_| ForwardError::InvalidEndpoint(host.clone()))?;

        let amz_date = Utc::now().format("%Y%m%dT%H%M%SZ").to_string();
        let payload_hash = hash_payload(&body);
        let authorization =
            self.sign(method.as_str(), &host, &path, &query, &payload_hash, &amz_date);

        let mut builder = http::Request::builder()
            .method(method)
            .uri(uri)
            .header(http::header::HOST, &host)
            .header("x-amz-date", &amz_date)
            .header("x-amz-content-sha256", &payload_hash)
            .header(http::header::AUTHORIZATION, &authorization);

        for name in passthrough_headers(request.action) {
            if let Some(value) = request.headers.get(*name) {
                builder = builder.header(*name, value.clone());
            }
        }

        let outbound = builder
            .body(Full::new(body))
            .map_err(|e| ForwardError::Transport(e.to_string()))?;

        debug!(
            action = request.action,
            bucket = %request.bucket,
            key = %request.key,
            "forwarding to backend"
        );

        let response = self
            .client
            .request(outbound)
            .await
            .map_err(|e| ForwardError::Transport(e.to_string()))?;

        let (parts, incoming) = response.into_parts();
        if parts.status.as_u16() >= 400 {
            // Error documents are small; drain them so the message can be
            // matched against known backend error codes.
            let collected = incoming
                .collect()
                .await
                .map_err(|e| ForwardError::Transport(e.to_string()))?
                .to_bytes();
            return Err(ForwardError::Backend {
                status: parts.status,
                message: String::from_utf8_lossy(&collected).into_owned(),
            });
        }

        let body = GatewayBody::streaming(incoming.map_err(std::io::Error::other).boxed());
        Ok(BackendResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }

    /// Produce the `Authorization` header for an outbound request.
    fn sign(
        &self,
        method: &str,
        host: &str,
        path: &str,
        query: &str,
        payload_hash: &str,
        amz_date: &str,
    ) -> String {
        let date = &amz_date[..8];
        let signed: Vec<String> = SIGNED_HEADERS.iter().map(|s| (*s).to_owned()).collect();
        let header_values = vec![
            ("host".to_owned(), host.to_owned()),
            ("x-amz-content-sha256".to_owned(), payload_hash.to_owned()),
            ("x-amz-date".to_owned(), amz_date.to_owned()),
        ];

        let canonical =
            build_canonical_request(method, path, query, &header_values, &signed, payload_hash);
        let scope = format!("{date}/{}/s3/aws4_request", self.region);
        let string_to_sign =
            build_string_to_sign(amz_date, &scope, &hash_payload(canonical.as_bytes()));

        let signing_key = derive_signing_key(&self.secret_key, date, &self.region, "s3");
        let signature = compute_signature(&signing_key, &string_to_sign);

        format!(
            "AWS4-HMAC-SHA256 Credential={}/{scope}, SignedHeaders={}, Signature={signature}",
            self.access_key,
            SIGNED_HEADERS.join(";")
        )
    }
}

impl Forwarder for HttpForwarder {
    fn forward(&self, request: S3Request) -> ForwardFuture {
        let forwarder = self.clone();
        Box::pin(forwarder.dispatch(request))
    }
}

/// The encoded path-style URL path for a bucket and optional key.
fn object_path(bucket: &str, key: &str) -> String {
    if key.is_empty() {
        format!("/{}", uri_encode(bucket))
    } else {
        format!("/{}{}", uri_encode(bucket), key_path(key))
    }
}

/// The encoded key-only path used with virtual-hosted addressing.
fn key_path(key: &str) -> String {
    if key.is_empty() {
        return "/".to_owned();
    }
    let encoded = key.split('/').map(uri_encode).collect::<Vec<_>>().join("/");
    format!("/{encoded}")
}

/// The outbound query string for a ListBucket request.
fn list_query(request: &S3Request) -> String {
    let mut pairs = vec![("list-type".to_owned(), "2".to_owned())];
    for name in LIST_PASSTHROUGH_PARAMS {
        if let Some(value) = request.query_value(name) {
            pairs.push((name.to_owned(), value.to_owned()));
        }
    }

    pairs
        .iter()
        .map(|(k, v)| format!("{}={}", uri_encode(k), uri_encode(v)))
        .collect::<Vec<_>>()
        .join("&")
}

/// Request headers passed through to the backend for the given action.
fn passthrough_headers(action: &str) -> &'static [&'static str] {
    match action {
        "s3:GetObject" => &GET_PASSTHROUGH_HEADERS,
        "s3:PutObject" => &PUT_PASSTHROUGH_HEADERS,
        _ => &[],
    }
}

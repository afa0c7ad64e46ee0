//! The gateway request pipeline.
//!
//! Lifecycle per request: assign a request id, short-circuit `/health`,
//! parse into an [`S3Request`], authenticate the SigV4 signature, check the
//! tenant scope boundary, evaluate policies, forward to the backend, stream
//! the response, and emit exactly one audit entry.
//!
//! All per-request state lives in this module's stack frames; the only
//! shared pieces are the credential snapshot, the policy snapshot, and the
//! audit writer, none of which are held across an await.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use http::{Request, Response, StatusCode};
use http_body_util::{BodyExt, Limited};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use s3gate_audit::{AuditEntry, AuditLogger, RequestInfo};
use s3gate_auth::{parse_authorization_header, verify, Credential, CredentialStore};
use s3gate_http::error::{deny_response, s3_error_response};
use s3gate_http::{GatewayBody, S3Request};
use s3gate_policy::{match_scope, DenyReason, EvalContext, PolicyEngine};

use crate::forwarder::{ForwardError, Forwarder};

/// The gateway service. Cheap to clone; all state is shared behind `Arc`s.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<Inner>,
}

struct Inner {
    credentials: Arc<CredentialStore>,
    policies: Arc<PolicyEngine>,
    forwarder: Arc<dyn Forwarder>,
    audit: Arc<AuditLogger>,
    max_body_bytes: u64,
}

/// Everything the terminal branches need for auditing and error bodies.
struct RequestState {
    request_id: String,
    start: Instant,
    source_ip: String,
    user_agent: String,
    client_id: String,
    tenant_id: String,
}

impl Gateway {
    /// Assemble the pipeline from its shared components.
    #[must_use]
    pub fn new(
        credentials: Arc<CredentialStore>,
        policies: Arc<PolicyEngine>,
        forwarder: Arc<dyn Forwarder>,
        audit: Arc<AuditLogger>,
        max_body_bytes: u64,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                credentials,
                policies,
                forwarder,
                audit,
                max_body_bytes,
            }),
        }
    }

    /// Handle one request. `peer` is the client socket address, used as the
    /// source IP of last resort.
    pub async fn handle<B>(&self, req: Request<B>, peer: SocketAddr) -> Response<GatewayBody>
    where
        B: http_body::Body + Send,
        B::Data: Send,
        B::Error: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let start = Instant::now();
        let request_id = Uuid::new_v4().to_string();

        if req.uri().path() == "/health" {
            return health_response(&request_id);
        }

        let (parts, body) = req.into_parts();
        let mut state = RequestState {
            request_id,
            start,
            source_ip: client_ip(&parts.headers, peer),
            user_agent: parts
                .headers
                .get(http::header::USER_AGENT)
                .and_then(|v| v.to_str().ok())
                .unwrap_or("")
                .to_owned(),
            client_id: String::new(),
            tenant_id: String::new(),
        };

        debug!(
            request_id = %state.request_id,
            method = %parts.method,
            uri = %parts.uri,
            source_ip = %state.source_ip,
            "handling request"
        );

        // The body must be buffered to compute the signature payload hash
        // when the client did not send X-Amz-Content-Sha256. The limit
        // bounds that buffering.
        let limit = usize::try_from(self.inner.max_body_bytes).unwrap_or(usize::MAX);
        let body = match Limited::new(body, limit).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                warn!(request_id = %state.request_id, error = %e, "failed to read request body");
                let s3req = S3Request::parse(&parts, Bytes::new());
                return self.deny(&state, &s3req, DenyReason::InvalidResource);
            }
        };

        let s3req = S3Request::parse(&parts, body);

        // Listing all buckets is not supported; every request names one.
        if s3req.bucket.is_empty() {
            return self.deny(&state, &s3req, DenyReason::InvalidResource);
        }

        // Authentication. Unknown key, bad timestamp, and bad signature are
        // deliberately indistinguishable in both the response and the audit
        // record.
        let credential = match self.authenticate(&parts, &s3req.body) {
            Ok(credential) => credential,
            Err(e) => {
                warn!(request_id = %state.request_id, error = %e, "authentication failed");
                return self.deny(&state, &s3req, DenyReason::AuthFailed);
            }
        };
        state.client_id = credential.client_id.clone();
        state.tenant_id = credential.tenant_id.clone();

        // Tenant boundary: empty scopes deny unconditionally.
        if !match_scope(&s3req.bucket, &credential.scopes) {
            warn!(
                request_id = %state.request_id,
                client_id = %state.client_id,
                bucket = %s3req.bucket,
                "tenant boundary violation"
            );
            return self.deny(&state, &s3req, DenyReason::TenantBoundary);
        }

        // Policy evaluation.
        let ctx = EvalContext {
            client_id: credential.client_id.clone(),
            tenant_id: credential.tenant_id.clone(),
            action: s3req.action.to_owned(),
            resource: s3req.resource_arn(),
            bucket: s3req.bucket.clone(),
            key: s3req.key.clone(),
            conditions: [("aws:SourceIp".to_owned(), state.source_ip.clone())]
                .into_iter()
                .collect(),
        };
        let decision = self.inner.policies.evaluate(&ctx, &credential.policies);
        if !decision.is_allowed() {
            warn!(
                request_id = %state.request_id,
                client_id = %state.client_id,
                action = s3req.action,
                resource = %ctx.resource,
                matched_policy = decision.matched_policy().unwrap_or("-"),
                "policy denied"
            );
            let reason = decision.deny_reason().unwrap_or(DenyReason::Policy);
            return self.deny(&state, &s3req, reason);
        }

        // Forward to the backend and stream the response through.
        let audit_req = (s3req.action, s3req.bucket.clone(), s3req.key.clone());
        match self.inner.forwarder.forward(s3req).await {
            Ok(backend) => {
                let info = self.request_info(&state, audit_req.0, &audit_req.1, &audit_req.2);
                self.audit(AuditEntry::allow(info, backend.status.as_u16()));

                info!(
                    request_id = %state.request_id,
                    client_id = %state.client_id,
                    action = audit_req.0,
                    status = backend.status.as_u16(),
                    "request allowed"
                );

                let mut response = Response::new(backend.body);
                *response.status_mut() = backend.status;
                *response.headers_mut() = backend.headers;
                set_request_id(&mut response, &state.request_id);
                response
            }
            Err(e) => {
                error!(request_id = %state.request_id, error = %e, "backend forward failed");
                self.backend_error(&state, audit_req.0, &audit_req.1, &audit_req.2, &e)
            }
        }
    }

    /// Extract the access key, look up the credential, and verify the
    /// signature.
    fn authenticate(
        &self,
        parts: &http::request::Parts,
        body: &[u8],
    ) -> Result<Arc<Credential>, AuthFailure> {
        let auth_header = parts
            .headers
            .get(http::header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AuthFailure::MissingHeader)?;

        let components = parse_authorization_header(auth_header)?;
        let credential = self.inner.credentials.get(&components.access_key)?;
        verify(parts, body, &credential)?;
        Ok(credential)
    }

    /// Audit and answer a denial.
    fn deny(
        &self,
        state: &RequestState,
        s3req: &S3Request,
        reason: DenyReason,
    ) -> Response<GatewayBody> {
        let info = self.request_info(state, s3req.action, &s3req.bucket, &s3req.key);
        self.audit(AuditEntry::deny(info, reason.as_str()));
        deny_response(reason, &s3req.resource_path(), &state.request_id)
    }

    /// Audit and answer a backend failure. These are not access-control
    /// denials; they surface as S3 errors and audit as `S3_ERROR`.
    fn backend_error(
        &self,
        state: &RequestState,
        action: &str,
        bucket: &str,
        key: &str,
        err: &ForwardError,
    ) -> Response<GatewayBody> {
        let info = self.request_info(state, action, bucket, key);
        self.audit(AuditEntry::deny(info, DenyReason::S3Error.as_str()).with_error(err.to_string()));

        let message = err.to_string();
        let (status, code, text) = if message.contains("NoSuchKey") || message.contains("NotFound")
        {
            (
                StatusCode::NOT_FOUND,
                "NoSuchKey",
                "The specified key does not exist.",
            )
        } else if message.contains("NoSuchBucket") {
            (
                StatusCode::NOT_FOUND,
                "NoSuchBucket",
                "The specified bucket does not exist.",
            )
        } else {
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "InternalError",
                "We encountered an internal error. Please try again.",
            )
        };

        s3_error_response(status, code, text, None, &state.request_id)
    }

    fn request_info(
        &self,
        state: &RequestState,
        action: &str,
        bucket: &str,
        key: &str,
    ) -> RequestInfo {
        RequestInfo {
            request_id: state.request_id.clone(),
            client_id: state.client_id.clone(),
            tenant_id: state.tenant_id.clone(),
            action: action.to_owned(),
            resource: s3gate_policy::build_resource_arn(bucket, key),
            bucket: bucket.to_owned(),
            key: key.to_owned(),
            source_ip: state.source_ip.clone(),
            user_agent: state.user_agent.clone(),
            duration_ms: i64::try_from(state.start.elapsed().as_millis()).unwrap_or(i64::MAX),
        }
    }

    fn audit(&self, entry: AuditEntry) {
        if let Err(e) = self.inner.audit.log(&entry) {
            error!(error = %e, "failed to write audit entry");
        }
    }
}

/// Authentication failure causes. Collapsed to one external response; the
/// variants exist so server-side logs stay diagnosable.
#[derive(Debug, thiserror::Error)]
enum AuthFailure {
    #[error("missing Authorization header")]
    MissingHeader,
    #[error(transparent)]
    Auth(#[from] s3gate_auth::AuthError),
    #[error(transparent)]
    Credential(#[from] s3gate_auth::CredentialError),
}

fn health_response(request_id: &str) -> Response<GatewayBody> {
    let mut response = Response::new(GatewayBody::from_bytes("OK"));
    set_request_id(&mut response, request_id);
    response
}

fn set_request_id(response: &mut Response<GatewayBody>, request_id: &str) {
    if let Ok(value) = http::header::HeaderValue::from_str(request_id) {
        response.headers_mut().insert("x-amz-request-id", value);
    }
}

/// Resolve the client IP: first `X-Forwarded-For` entry, then `X-Real-IP`,
/// then the peer address without its port.
fn client_ip(headers: &http::HeaderMap, peer: SocketAddr) -> String {
    if let Some(xff) = headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
        if let Some(first) = xff.split(',').next() {
            let first = first.trim();
            if !first.is_empty() {
                return first.to_owned();
            }
        }
    }

    if let Some(real_ip) = headers.get("x-real-ip").and_then(|v| v.to_str().ok()) {
        if !real_ip.is_empty() {
            return real_ip.to_owned();
        }
    }

    peer.ip().to_string()
}

//! Mapping internal deny reasons to S3 wire errors.
//!
//! Every denial and error leaves the gateway through one of the two builders
//! here, so clients always see a well-formed S3 `<Error>` document with a
//! request id, and never an internal string or stack trace.

use http::header::{HeaderValue, CONTENT_TYPE};
use http::{Response, StatusCode};
use s3gate_policy::DenyReason;

use crate::body::GatewayBody;
use crate::xml::error_to_xml;

/// The HTTP status for a deny reason.
#[must_use]
pub fn deny_status(reason: DenyReason) -> StatusCode {
    match reason {
        DenyReason::AuthFailed | DenyReason::TenantBoundary | DenyReason::Policy => {
            StatusCode::FORBIDDEN
        }
        DenyReason::InvalidResource => StatusCode::BAD_REQUEST,
        DenyReason::InternalError | DenyReason::S3Error => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// The S3 error code for a deny reason.
#[must_use]
pub fn deny_code(reason: DenyReason) -> &'static str {
    match reason {
        DenyReason::AuthFailed => "SignatureDoesNotMatch",
        DenyReason::TenantBoundary | DenyReason::Policy => "AccessDenied",
        DenyReason::InvalidResource => "InvalidRequest",
        DenyReason::InternalError | DenyReason::S3Error => "InternalError",
    }
}

/// The client-facing message for a deny reason. Deliberately generic for
/// authentication failures so the sub-cause cannot be probed.
#[must_use]
pub fn deny_message(reason: DenyReason) -> &'static str {
    match reason {
        DenyReason::AuthFailed => {
            "The request signature we calculated does not match the signature you provided"
        }
        DenyReason::TenantBoundary => "Access denied: resource is outside your tenant boundary",
        DenyReason::Policy => "Access denied: action not permitted by policy",
        DenyReason::InvalidResource => "Invalid resource",
        DenyReason::InternalError | DenyReason::S3Error => {
            "We encountered an internal error. Please try again."
        }
    }
}

/// Build the error response for an internal deny reason.
#[must_use]
pub fn deny_response(reason: DenyReason, resource: &str, request_id: &str) -> Response<GatewayBody> {
    s3_error_response(
        deny_status(reason),
        deny_code(reason),
        deny_message(reason),
        Some(resource),
        request_id,
    )
}

/// Build an S3 XML error response from explicit parts (used for backend
/// error passthrough: `NoSuchKey`, `NoSuchBucket`, `InternalError`).
#[must_use]
pub fn s3_error_response(
    status: StatusCode,
    code: &str,
    message: &str,
    resource: Option<&str>,
    request_id: &str,
) -> Response<GatewayBody> {
    let xml = error_to_xml(code, message, resource, request_id);

    let mut response = Response::builder()
        .status(status)
        .header(CONTENT_TYPE, "application/xml")
        .body(GatewayBody::from_bytes(xml))
        .unwrap_or_else(|_| {
            let mut fallback = Response::new(GatewayBody::empty());
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        });

    if let Ok(value) = HeaderValue::from_str(request_id) {
        response.headers_mut().insert("x-amz-request-id", value);
    }
    response
}

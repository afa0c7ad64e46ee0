//! Error types for SigV4 authentication.
//!
//! Every variant maps to the same external response (`DENY_AUTH_FAILED`);
//! the distinctions exist for server-side diagnostics only, so a probing
//! client learns nothing from the error surface.

/// Errors that can occur during AWS Signature Version 4 verification.
#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The `Authorization` header is missing from the request.
    #[error("missing Authorization header")]
    MissingAuthHeader,

    /// The `Authorization` header does not match the AWS4-HMAC-SHA256 form.
    #[error("invalid Authorization header format")]
    InvalidAuthHeader,

    /// The access key in the header differs from the credential being
    /// checked.
    #[error("access key mismatch")]
    AccessKeyMismatch,

    /// The `X-Amz-Date` header is missing.
    #[error("missing X-Amz-Date header")]
    MissingDate,

    /// The `X-Amz-Date` header is not `YYYYMMDDTHHMMSSZ`.
    #[error("invalid X-Amz-Date format: {0}")]
    InvalidDate(String),

    /// The request timestamp is more than 15 minutes from current UTC.
    #[error("request timestamp is outside allowed window")]
    TimestampSkew,

    /// The computed signature does not equal the supplied one.
    #[error("signature mismatch")]
    SignatureMismatch,
}

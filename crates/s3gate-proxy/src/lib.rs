//! The s3gate request pipeline.
//!
//! [`Gateway`](service::Gateway) drives each request through parsing,
//! SigV4 authentication, the tenant scope boundary, policy evaluation,
//! backend forwarding, and audit logging. The backend is abstracted behind
//! the [`Forwarder`](forwarder::Forwarder) trait; the production
//! implementation is [`HttpForwarder`](forwarder::HttpForwarder), which
//! speaks plain S3 HTTP to the configured endpoint with the gateway's own
//! credentials.

pub mod forwarder;
pub mod service;

pub use forwarder::{BackendResponse, ForwardError, Forwarder, HttpForwarder};
pub use service::Gateway;

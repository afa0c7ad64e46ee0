//! AWS Signature Version 4 verification and credential storage for s3gate.
//!
//! This crate implements the authentication half of the gateway: given an
//! incoming HTTP request and the credential store, it verifies that the
//! request was signed by a known access key with the correct secret key,
//! within the allowed clock skew.
//!
//! The signing primitives ([`derive_signing_key`], [`compute_signature`],
//! [`hash_payload`], and the [`canonical`] builders) are exposed publicly:
//! the gateway's forwarder reuses them to sign outbound requests with the
//! backend credentials.
//!
//! # Modules
//!
//! - [`canonical`] - canonical request construction per the SigV4 specification
//! - [`credentials`] - credential records and the reloadable credential store
//! - [`error`] - authentication error types
//! - [`sigv4`] - header parsing and signature verification

pub mod canonical;
pub mod credentials;
pub mod error;
pub mod sigv4;

pub use credentials::{Credential, CredentialError, CredentialStore};
pub use error::AuthError;
pub use sigv4::{
    build_string_to_sign, compute_signature, derive_signing_key, hash_payload,
    parse_authorization_header, verify, SigV4Components,
};

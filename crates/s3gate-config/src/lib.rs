//! Configuration loading for the s3gate gateway.
//!
//! Three YAML files drive the gateway:
//!
//! - the gateway config (`gateway.yaml`): server settings, backend endpoint,
//!   audit output, and the paths of the other two files
//! - the credentials file: one record per client access key
//! - the policies file: named IAM-style policies
//!
//! The gateway config supports `${VAR_NAME}` environment substitution so
//! secrets can be injected without writing them to disk. Credential and
//! policy files are validated at load time; duplicate access keys, duplicate
//! policy names, unknown effects, and statements with empty `actions` or
//! `resources` are fatal errors.

pub mod loader;
pub mod types;

pub use loader::{load_credentials, load_gateway_config, load_policies, ConfigError};
pub use types::{
    AuditConfig, AuditOutput, BackendConfig, CredentialRecord, CredentialsConfig, Effect,
    GatewayConfig, PoliciesConfig, PolicyRecord, ServerConfig, StatementRecord,
};

//! Configuration types, deserialized from YAML.
//!
//! Field names follow the camelCase convention of the configuration files
//! (`credentialsFile`, `accessKey`, ...). Defaults match what a bare-bones
//! deployment needs: port 8080, stdout audit, `us-east-1`.

use std::collections::HashMap;

use serde::Deserialize;

/// Top-level gateway configuration (`gateway.yaml`).
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfig {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,
    /// Backing object store connection settings.
    pub backend: BackendConfig,
    /// Path to the credentials YAML file.
    pub credentials_file: String,
    /// Path to the policies YAML file.
    pub policies_file: String,
    /// Audit logging settings.
    #[serde(default)]
    pub audit: AuditConfig,
    /// Log level filter used when `RUST_LOG` is not set.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// HTTP server settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// TCP port to bind.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Read timeout in seconds.
    #[serde(default = "default_read_timeout")]
    pub read_timeout: u64,
    /// Write timeout in seconds.
    #[serde(default = "default_write_timeout")]
    pub write_timeout: u64,
    /// Graceful shutdown drain timeout in seconds.
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout: u64,
    /// Maximum request body size the gateway will buffer, in bytes.
    ///
    /// Bodies must be buffered to compute the SigV4 payload hash when the
    /// client does not send `X-Amz-Content-Sha256`; requests larger than
    /// this are rejected rather than buffered.
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            read_timeout: default_read_timeout(),
            write_timeout: default_write_timeout(),
            shutdown_timeout: default_shutdown_timeout(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

/// Backing store connection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    /// AWS region used in the outbound signature scope.
    #[serde(default = "default_region")]
    pub region: String,
    /// Endpoint URL of the backing store (e.g. `http://127.0.0.1:9000`).
    pub endpoint: String,
    /// Access key the gateway uses against the backing store.
    pub access_key_id: String,
    /// Secret key the gateway uses against the backing store.
    pub secret_access_key: String,
    /// Address the backing store path-style (`endpoint/bucket/key`) rather
    /// than virtual-hosted (`bucket.endpoint/key`). Most S3-compatible
    /// stores behind a fixed endpoint want path-style.
    #[serde(default = "default_use_path_style")]
    pub use_path_style: bool,
}

/// Where audit records are written.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditOutput {
    /// Write to standard output.
    #[default]
    Stdout,
    /// Append to a file.
    File,
    /// Write to both standard output and a file.
    Both,
}

/// Audit logging settings.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditConfig {
    /// Whether audit logging is enabled at all.
    #[serde(default)]
    pub enabled: bool,
    /// Output target.
    #[serde(default)]
    pub output: AuditOutput,
    /// Path of the audit file when `output` is `file` or `both`.
    #[serde(default)]
    pub file_path: String,
}

/// Credentials file contents: one record per client.
#[derive(Debug, Clone, Deserialize)]
pub struct CredentialsConfig {
    pub credentials: Vec<CredentialRecord>,
}

/// A single client credential record.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialRecord {
    pub access_key: String,
    pub secret_key: String,
    pub client_id: String,
    pub tenant_id: String,
    #[serde(default)]
    pub description: String,
    /// Names of the policies evaluated for this client, in order.
    #[serde(default)]
    pub policies: Vec<String>,
    /// Bucket patterns establishing the tenant boundary. Empty means no access.
    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Policies file contents.
#[derive(Debug, Clone, Deserialize)]
pub struct PoliciesConfig {
    pub policies: Vec<PolicyRecord>,
}

/// A named policy: an ordered list of statements.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyRecord {
    pub name: String,
    #[serde(default)]
    pub version: String,
    #[serde(default)]
    pub statements: Vec<StatementRecord>,
}

/// Statement effect. Any other value fails deserialization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum Effect {
    Allow,
    Deny,
}

/// A policy statement as written in the policies file.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementRecord {
    #[serde(default)]
    pub sid: String,
    pub effect: Effect,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub resources: Vec<String>,
    /// Condition blocks: operator -> condition key -> expected value.
    #[serde(default)]
    pub conditions: HashMap<String, HashMap<String, String>>,
}

fn default_port() -> u16 {
    8080
}

fn default_read_timeout() -> u64 {
    30
}

fn default_write_timeout() -> u64 {
    60
}

fn default_shutdown_timeout() -> u64 {
    10
}

fn default_max_body_bytes() -> u64 {
    64 * 1024 * 1024
}

fn default_region() -> String {
    "us-east-1".to_owned()
}

fn default_use_path_style() -> bool {
    true
}

fn default_log_level() -> String {
    "info".to_owned()
}

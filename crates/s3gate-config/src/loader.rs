//! YAML file loading, environment substitution, and load-time validation.

use std::collections::HashSet;
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::types::{CredentialsConfig, GatewayConfig, PoliciesConfig};

/// Matches `${VAR_NAME}` placeholders in the gateway config.
static ENV_VAR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\$\{([^}]+)\}").expect("env var pattern is valid"));

/// Errors produced while loading or validating configuration files.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// The file is not valid YAML or does not match the expected schema.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    /// The file parsed but violates an invariant.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Load the gateway configuration, applying `${VAR}` environment substitution
/// to the raw file contents before parsing.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read or parsed, or if a
/// required field is missing.
pub fn load_gateway_config(path: impl AsRef<Path>) -> Result<GatewayConfig, ConfigError> {
    let path = path.as_ref();
    let raw = read_file(path)?;
    let substituted = substitute_env_vars(&raw);

    let cfg: GatewayConfig = serde_yaml::from_str(&substituted).map_err(|source| {
        ConfigError::Parse {
            path: path.display().to_string(),
            source,
        }
    })?;

    debug!(path = %path.display(), "loaded gateway configuration");
    Ok(cfg)
}

/// Load and validate the credentials file.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read or parsed, a record
/// is missing a required field, or two records share an access key.
pub fn load_credentials(path: impl AsRef<Path>) -> Result<CredentialsConfig, ConfigError> {
    let path = path.as_ref();
    let raw = read_file(path)?;

    let cfg: CredentialsConfig =
        serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;

    validate_credentials(&cfg)?;
    debug!(path = %path.display(), count = cfg.credentials.len(), "loaded credentials");
    Ok(cfg)
}

/// Load and validate the policies file.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read or parsed, two
/// policies share a name, or a statement has empty `actions` or `resources`.
/// Effects other than `Allow`/`Deny` already fail at the parse stage.
pub fn load_policies(path: impl AsRef<Path>) -> Result<PoliciesConfig, ConfigError> {
    let path = path.as_ref();
    let raw = read_file(path)?;

    let cfg: PoliciesConfig = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.display().to_string(),
        source,
    })?;

    validate_policies(&cfg)?;
    debug!(path = %path.display(), count = cfg.policies.len(), "loaded policies");
    Ok(cfg)
}

fn read_file(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })
}

/// Replace `${VAR_NAME}` with the environment value. Placeholders whose
/// variable is unset or empty are left as-is.
fn substitute_env_vars(raw: &str) -> String {
    ENV_VAR_RE
        .replace_all(raw, |caps: &regex::Captures<'_>| {
            match std::env::var(&caps[1]) {
                Ok(value) if !value.is_empty() => value,
                _ => caps[0].to_owned(),
            }
        })
        .into_owned()
}

fn validate_credentials(cfg: &CredentialsConfig) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for (i, cred) in cfg.credentials.iter().enumerate() {
        if cred.access_key.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "credentials[{i}]: accessKey is required"
            )));
        }
        if cred.secret_key.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "credentials[{i}]: secretKey is required"
            )));
        }
        if cred.client_id.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "credentials[{i}]: clientId is required"
            )));
        }
        if cred.tenant_id.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "credentials[{i}]: tenantId is required"
            )));
        }
        if !seen.insert(cred.access_key.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "credentials[{i}]: duplicate accessKey {:?}",
                cred.access_key
            )));
        }
    }
    Ok(())
}

fn validate_policies(cfg: &PoliciesConfig) -> Result<(), ConfigError> {
    let mut seen = HashSet::new();
    for (i, policy) in cfg.policies.iter().enumerate() {
        if policy.name.is_empty() {
            return Err(ConfigError::Invalid(format!(
                "policies[{i}]: name is required"
            )));
        }
        if !seen.insert(policy.name.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "policies[{i}]: duplicate policy name {:?}",
                policy.name
            )));
        }

        for (j, stmt) in policy.statements.iter().enumerate() {
            if stmt.actions.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "policies[{i}].statements[{j}]: actions is required"
                )));
            }
            if stmt.resources.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "policies[{i}].statements[{j}]: resources is required"
                )));
            }
        }
    }
    Ok(())
}

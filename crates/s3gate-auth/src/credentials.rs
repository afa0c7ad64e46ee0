//! Credential records and the reloadable credential store.
//!
//! The store is a read-mostly map from access key to credential. Lookups
//! take the read side of a `RwLock`; [`CredentialStore::reload`] builds a
//! new map from the credentials file and swaps it in under the write side,
//! so concurrent lookups never block each other and in-flight requests keep
//! whichever snapshot they resolved.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use tracing::info;

/// A client credential with its access-control metadata.
#[derive(Debug, Clone)]
pub struct Credential {
    pub access_key: String,
    /// Never logged and never included in responses.
    pub secret_key: String,
    pub client_id: String,
    pub tenant_id: String,
    pub description: String,
    /// Policy names evaluated for this client, in order.
    pub policies: Vec<String>,
    /// Bucket patterns establishing the tenant boundary.
    pub scopes: Vec<String>,
}

/// Errors surfaced by the credential store.
#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    /// No credential exists for the access key.
    #[error("credential not found for access key: {0}")]
    NotFound(String),

    /// The credentials file failed to load or validate.
    #[error("failed to load credentials: {0}")]
    Load(#[from] s3gate_config::ConfigError),
}

/// Read-mostly credential storage, loaded from the credentials file.
#[derive(Debug)]
pub struct CredentialStore {
    credentials: RwLock<HashMap<String, Arc<Credential>>>,
    config_path: PathBuf,
}

impl CredentialStore {
    /// Create a store, eagerly loading the credentials file.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Load`] if the file cannot be read, parsed,
    /// or validated (duplicate access keys are a validation failure).
    pub fn new(config_path: impl Into<PathBuf>) -> Result<Self, CredentialError> {
        let store = Self {
            credentials: RwLock::new(HashMap::new()),
            config_path: config_path.into(),
        };
        store.reload()?;
        Ok(store)
    }

    /// Look up a credential by access key.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::NotFound`] for unknown keys; callers must
    /// not surface the distinction to clients.
    pub fn get(&self, access_key: &str) -> Result<Arc<Credential>, CredentialError> {
        self.credentials
            .read()
            .expect("credential lock poisoned")
            .get(access_key)
            .cloned()
            .ok_or_else(|| CredentialError::NotFound(access_key.to_owned()))
    }

    /// Reload credentials from the configuration file, swapping in a new
    /// snapshot atomically.
    ///
    /// # Errors
    ///
    /// Returns [`CredentialError::Load`] on any load failure; the previous
    /// snapshot stays in place.
    pub fn reload(&self) -> Result<(), CredentialError> {
        let cfg = s3gate_config::load_credentials(&self.config_path)?;

        let next: HashMap<String, Arc<Credential>> = cfg
            .credentials
            .into_iter()
            .map(|record| {
                let credential = Arc::new(Credential {
                    access_key: record.access_key.clone(),
                    secret_key: record.secret_key,
                    client_id: record.client_id,
                    tenant_id: record.tenant_id,
                    description: record.description,
                    policies: record.policies,
                    scopes: record.scopes,
                });
                (record.access_key, credential)
            })
            .collect();

        let count = next.len();
        *self.credentials.write().expect("credential lock poisoned") = next;
        info!(count, path = %self.config_path.display(), "credentials loaded");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_temp(contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!(
            "s3gate-credentials-test-{}-{:?}.yaml",
            std::process::id(),
            std::thread::current().id()
        ));
        std::fs::write(&path, contents).expect("write temp credentials");
        path
    }

    #[test]
    fn test_should_look_up_credential_by_access_key() {
        let path = write_temp(
            "credentials:\n  - accessKey: AKID\n    secretKey: secret\n    clientId: client-1\n    tenantId: tenant-001\n    policies: [read-only]\n    scopes: [\"tenant-001-*\"]\n",
        );
        let store = CredentialStore::new(&path).expect("should load");
        std::fs::remove_file(&path).ok();

        let cred = store.get("AKID").expect("should find credential");
        assert_eq!(cred.client_id, "client-1");
        assert_eq!(cred.tenant_id, "tenant-001");
        assert_eq!(cred.policies, vec!["read-only".to_owned()]);
        assert_eq!(cred.scopes, vec!["tenant-001-*".to_owned()]);
    }

    #[test]
    fn test_should_return_not_found_for_unknown_access_key() {
        let path = write_temp("credentials: []\n");
        let store = CredentialStore::new(&path).expect("should load");
        std::fs::remove_file(&path).ok();

        assert!(matches!(
            store.get("UNKNOWN"),
            Err(CredentialError::NotFound(_))
        ));
    }

    #[test]
    fn test_should_fail_construction_on_duplicate_access_key() {
        let path = write_temp(
            "credentials:\n  - accessKey: AKID\n    secretKey: s1\n    clientId: c1\n    tenantId: t1\n  - accessKey: AKID\n    secretKey: s2\n    clientId: c2\n    tenantId: t2\n",
        );
        let result = CredentialStore::new(&path);
        std::fs::remove_file(&path).ok();
        assert!(matches!(result, Err(CredentialError::Load(_))));
    }

    #[test]
    fn test_should_swap_snapshot_on_reload() {
        let path = write_temp(
            "credentials:\n  - accessKey: OLD\n    secretKey: s\n    clientId: c\n    tenantId: t\n",
        );
        let store = CredentialStore::new(&path).expect("should load");

        std::fs::write(
            &path,
            "credentials:\n  - accessKey: NEW\n    secretKey: s\n    clientId: c\n    tenantId: t\n",
        )
        .expect("rewrite credentials");
        store.reload().expect("should reload");
        std::fs::remove_file(&path).ok();

        assert!(store.get("OLD").is_err());
        assert!(store.get("NEW").is_ok());
    }
}

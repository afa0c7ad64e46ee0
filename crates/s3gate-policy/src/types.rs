//! Policy data model and evaluation results.

use std::collections::HashMap;
use std::fmt;

/// Statement effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    Allow,
    Deny,
}

impl From<s3gate_config::Effect> for Effect {
    fn from(effect: s3gate_config::Effect) -> Self {
        match effect {
            s3gate_config::Effect::Allow => Self::Allow,
            s3gate_config::Effect::Deny => Self::Deny,
        }
    }
}

/// A named policy: an ordered list of statements.
#[derive(Debug, Clone)]
pub struct Policy {
    pub name: String,
    pub version: String,
    pub statements: Vec<Statement>,
}

/// A single policy statement.
#[derive(Debug, Clone)]
pub struct Statement {
    pub sid: String,
    pub effect: Effect,
    pub actions: Vec<String>,
    pub resources: Vec<String>,
    /// Condition blocks: operator -> condition key -> expected value.
    pub conditions: HashMap<String, HashMap<String, String>>,
}

/// Per-request context the engine evaluates statements against.
///
/// Built by the gateway handler for each request and dropped with it.
#[derive(Debug, Clone, Default)]
pub struct EvalContext {
    pub client_id: String,
    pub tenant_id: String,
    /// Action string, e.g. `s3:GetObject`.
    pub action: String,
    /// Resource ARN, e.g. `arn:aws:s3:::bucket/key`.
    pub resource: String,
    pub bucket: String,
    pub key: String,
    /// Runtime condition values, e.g. `aws:SourceIp`.
    pub conditions: HashMap<String, String>,
}

/// Internal reason an operation was denied, carried through audit records
/// and mapped to an S3 wire error by the HTTP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// Authentication failed: missing/malformed Authorization header,
    /// unknown access key, timestamp skew, or signature mismatch. The
    /// sub-causes are deliberately indistinguishable to the client.
    AuthFailed,
    /// The bucket is outside the credential's scopes.
    TenantBoundary,
    /// No policy allowed the action, or a policy explicitly denied it.
    Policy,
    /// The request does not name a valid resource.
    InvalidResource,
    /// An internal gateway failure.
    InternalError,
    /// The backend returned or caused an error; not an access-control denial.
    S3Error,
}

impl DenyReason {
    /// The stable tag written to audit records.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthFailed => "DENY_AUTH_FAILED",
            Self::TenantBoundary => "DENY_TENANT_BOUNDARY",
            Self::Policy => "DENY_POLICY",
            Self::InvalidResource => "DENY_INVALID_RESOURCE",
            Self::InternalError => "DENY_INTERNAL_ERROR",
            Self::S3Error => "S3_ERROR",
        }
    }
}

impl fmt::Display for DenyReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outcome of policy evaluation.
///
/// Modeled as a tagged variant rather than a bool with side fields so the
/// explicit-deny-wins rule reads directly off the type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// A statement with effect `Allow` matched and no `Deny` preceded it.
    Allow {
        /// Name of the policy containing the matching statement.
        policy: String,
        /// Sid of the matching statement.
        sid: String,
    },
    /// Denied, either explicitly or by default.
    Deny {
        reason: DenyReason,
        /// Matching policy, absent on default deny.
        policy: Option<String>,
        /// Matching statement sid, absent on default deny.
        sid: Option<String>,
    },
}

impl Decision {
    /// The default deny returned when no statement matched.
    #[must_use]
    pub fn default_deny() -> Self {
        Self::Deny {
            reason: DenyReason::Policy,
            policy: None,
            sid: None,
        }
    }

    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }

    /// The deny reason, if this is a deny.
    #[must_use]
    pub fn deny_reason(&self) -> Option<DenyReason> {
        match self {
            Self::Allow { .. } => None,
            Self::Deny { reason, .. } => Some(*reason),
        }
    }

    /// Name of the matched policy, if any.
    #[must_use]
    pub fn matched_policy(&self) -> Option<&str> {
        match self {
            Self::Allow { policy, .. } => Some(policy),
            Self::Deny { policy, .. } => policy.as_deref(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_should_report_allow_decision_as_allowed() {
        let decision = Decision::Allow {
            policy: "p".to_owned(),
            sid: "s".to_owned(),
        };
        assert!(decision.is_allowed());
        assert_eq!(decision.deny_reason(), None);
        assert_eq!(decision.matched_policy(), Some("p"));
    }

    #[test]
    fn test_should_tag_default_deny_as_policy_deny() {
        let decision = Decision::default_deny();
        assert!(!decision.is_allowed());
        assert_eq!(decision.deny_reason(), Some(DenyReason::Policy));
        assert_eq!(decision.matched_policy(), None);
    }

    #[test]
    fn test_should_render_deny_reason_tags() {
        assert_eq!(DenyReason::AuthFailed.as_str(), "DENY_AUTH_FAILED");
        assert_eq!(DenyReason::TenantBoundary.as_str(), "DENY_TENANT_BOUNDARY");
        assert_eq!(DenyReason::Policy.as_str(), "DENY_POLICY");
        assert_eq!(DenyReason::InvalidResource.as_str(), "DENY_INVALID_RESOURCE");
        assert_eq!(DenyReason::InternalError.as_str(), "DENY_INTERNAL_ERROR");
        assert_eq!(DenyReason::S3Error.as_str(), "S3_ERROR");
    }
}

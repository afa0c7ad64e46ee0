//! The policy evaluation engine.
//!
//! Policies live in an immutable snapshot behind a `RwLock`. Evaluation
//! takes the read side; [`PolicyEngine::reload`] builds a fresh map from the
//! policies file and swaps it in under the write side, so in-flight
//! evaluations keep the snapshot they started with.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::RwLock;

use tracing::{debug, info};

use crate::matcher::{match_action, match_resource};
use crate::types::{Decision, DenyReason, Effect, EvalContext, Policy, Statement};

/// Errors surfaced by the engine.
#[derive(Debug, thiserror::Error)]
pub enum PolicyError {
    /// The policies file failed to load or validate.
    #[error("failed to load policies: {0}")]
    Load(#[from] s3gate_config::ConfigError),
}

/// Evaluates the ordered policy list attached to a credential.
#[derive(Debug)]
pub struct PolicyEngine {
    policies: RwLock<HashMap<String, Policy>>,
    config_path: PathBuf,
}

impl PolicyEngine {
    /// Create an engine, eagerly loading the policies file.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Load`] if the file cannot be read, parsed, or
    /// validated.
    pub fn new(config_path: impl Into<PathBuf>) -> Result<Self, PolicyError> {
        let engine = Self {
            policies: RwLock::new(HashMap::new()),
            config_path: config_path.into(),
        };
        engine.reload()?;
        Ok(engine)
    }

    /// Reload policies from the configuration file, swapping in a new
    /// snapshot atomically.
    ///
    /// # Errors
    ///
    /// Returns [`PolicyError::Load`] on any load failure; the previous
    /// snapshot stays in place.
    pub fn reload(&self) -> Result<(), PolicyError> {
        let cfg = s3gate_config::load_policies(&self.config_path)?;

        let mut next = HashMap::with_capacity(cfg.policies.len());
        for record in cfg.policies {
            let policy = Policy {
                name: record.name.clone(),
                version: record.version,
                statements: record
                    .statements
                    .into_iter()
                    .map(|s| Statement {
                        sid: s.sid,
                        effect: Effect::from(s.effect),
                        actions: s.actions,
                        resources: s.resources,
                        conditions: s.conditions,
                    })
                    .collect(),
            };
            next.insert(record.name, policy);
        }

        let count = next.len();
        *self.policies.write().expect("policy lock poisoned") = next;
        info!(count, path = %self.config_path.display(), "policies loaded");
        Ok(())
    }

    /// Look up a policy by name from the current snapshot.
    #[must_use]
    pub fn get_policy(&self, name: &str) -> Option<Policy> {
        self.policies
            .read()
            .expect("policy lock poisoned")
            .get(name)
            .cloned()
    }

    /// Evaluate the named policies, in order, against the request context.
    ///
    /// IAM semantics: the default is deny; the first matching `Deny`
    /// statement anywhere short-circuits; otherwise the first matching
    /// `Allow` wins. Names not present in the store are skipped silently.
    #[must_use]
    pub fn evaluate(&self, ctx: &EvalContext, policy_names: &[String]) -> Decision {
        let policies = self.policies.read().expect("policy lock poisoned");

        let mut allow: Option<Decision> = None;

        for name in policy_names {
            let Some(policy) = policies.get(name) else {
                debug!(policy = %name, "policy not found, skipping");
                continue;
            };

            match evaluate_policy(ctx, policy) {
                Some(decision) if !decision.is_allowed() => return decision,
                Some(decision) if allow.is_none() => allow = Some(decision),
                _ => {}
            }
        }

        allow.unwrap_or_else(Decision::default_deny)
    }
}

/// Evaluate a single policy. Returns `None` when no statement matched,
/// a deny for the first matching `Deny`, otherwise the first matching
/// `Allow`.
fn evaluate_policy(ctx: &EvalContext, policy: &Policy) -> Option<Decision> {
    let mut allow: Option<Decision> = None;

    for stmt in &policy.statements {
        if !statement_matches(ctx, stmt) {
            continue;
        }

        match stmt.effect {
            Effect::Deny => {
                return Some(Decision::Deny {
                    reason: DenyReason::Policy,
                    policy: Some(policy.name.clone()),
                    sid: Some(stmt.sid.clone()),
                });
            }
            Effect::Allow => {
                if allow.is_none() {
                    allow = Some(Decision::Allow {
                        policy: policy.name.clone(),
                        sid: stmt.sid.clone(),
                    });
                }
            }
        }
    }

    allow
}

/// A statement matches when the action matches, the resource matches, and
/// every condition holds.
fn statement_matches(ctx: &EvalContext, stmt: &Statement) -> bool {
    if !match_action(&ctx.action, &stmt.actions) {
        return false;
    }
    if !match_resource(&ctx.resource, &stmt.resources) {
        return false;
    }
    if !stmt.conditions.is_empty() && !conditions_hold(ctx, &stmt.conditions) {
        return false;
    }
    true
}

/// Every (operator, key) pair must hold. A missing runtime key or an
/// unsupported operator fails the block.
fn conditions_hold(
    ctx: &EvalContext,
    conditions: &HashMap<String, HashMap<String, String>>,
) -> bool {
    for (operator, block) in conditions {
        for (key, expected) in block {
            let Some(actual) = ctx.conditions.get(key) else {
                return false;
            };
            if !condition_holds(operator, actual, expected) {
                return false;
            }
        }
    }
    true
}

fn condition_holds(operator: &str, actual: &str, expected: &str) -> bool {
    match operator {
        "StringEquals" => actual == expected,
        "StringNotEquals" => actual != expected,
        "StringLike" => crate::matcher::match_pattern(actual, expected),
        "StringNotLike" => !crate::matcher::match_pattern(actual, expected),
        _ => false,
    }
}

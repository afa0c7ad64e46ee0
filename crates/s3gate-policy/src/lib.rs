//! IAM-style policy evaluation for the s3gate gateway.
//!
//! This crate implements the authorization half of the gateway:
//!
//! - [`matcher`] - wildcard pattern matching for actions, resource ARNs, and
//!   bucket scopes, plus ARN construction and parsing
//! - [`types`] - policies, statements, the per-request evaluation context,
//!   and the [`Decision`](types::Decision) returned by the engine
//! - [`engine`] - the [`PolicyEngine`](engine::PolicyEngine), evaluating the
//!   ordered policy list attached to a credential with IAM semantics:
//!   default deny, explicit deny wins, first matching allow otherwise
//!
//! Evaluation is read-only and lock-guarded;
//! [`PolicyEngine::reload`](engine::PolicyEngine::reload) swaps in a fresh
//! immutable snapshot without blocking in-flight evaluations on the
//! previous one.

pub mod engine;
pub mod matcher;
pub mod types;

pub use engine::{PolicyEngine, PolicyError};
pub use matcher::{
    build_resource_arn, match_action, match_pattern, match_resource, match_scope,
    parse_resource_arn,
};
pub use types::{Decision, DenyReason, Effect, EvalContext, Policy, Statement};

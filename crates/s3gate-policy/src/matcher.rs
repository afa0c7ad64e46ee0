//! Wildcard pattern matching and ARN helpers.
//!
//! All three matchers are built on one primitive: an IAM-style glob where
//! `*` matches any sequence of characters (including the empty one) and `?`
//! matches exactly one character. Patterns are translated to regexes with
//! every other metacharacter escaped, and matches are anchored at both ends.

use regex::Regex;

/// The ARN prefix for S3 resources.
const ARN_PREFIX: &str = "arn:aws:s3:::";

/// Check whether `action` matches any of the given patterns.
#[must_use]
pub fn match_action(action: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|p| match_pattern(action, p))
}

/// Check whether `resource` (an ARN) matches any of the given patterns.
#[must_use]
pub fn match_resource(resource: &str, patterns: &[String]) -> bool {
    patterns.iter().any(|p| match_pattern(resource, p))
}

/// Check whether `bucket` matches any of the given scope patterns.
///
/// A scope may carry a path component (`tenant-a-*/reports`); only the
/// portion before the first `/` participates in the bucket match, the rest
/// is informational.
#[must_use]
pub fn match_scope(bucket: &str, scopes: &[String]) -> bool {
    scopes.iter().any(|scope| {
        let bucket_pattern = scope.split('/').next().unwrap_or(scope);
        match_pattern(bucket, bucket_pattern)
    })
}

/// Match a string against a single wildcard pattern, anchored at both ends.
#[must_use]
pub fn match_pattern(value: &str, pattern: &str) -> bool {
    let translated = pattern_to_regex(pattern);
    Regex::new(&format!("^{translated}$"))
        .map(|re| re.is_match(value))
        .unwrap_or(false)
}

/// Translate an IAM-style glob into a regex fragment: `*` becomes `.*`,
/// `?` becomes `.`, regex metacharacters are escaped.
fn pattern_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    for ch in pattern.chars() {
        match ch {
            '*' => out.push_str(".*"),
            '?' => out.push('.'),
            '.' | '+' | '^' | '$' | '[' | ']' | '(' | ')' | '{' | '}' | '|' | '\\' => {
                out.push('\\');
                out.push(ch);
            }
            _ => out.push(ch),
        }
    }
    out
}

/// Build the S3 resource ARN for a bucket and optional key.
#[must_use]
pub fn build_resource_arn(bucket: &str, key: &str) -> String {
    if key.is_empty() {
        format!("{ARN_PREFIX}{bucket}")
    } else {
        format!("{ARN_PREFIX}{bucket}/{key}")
    }
}

/// Parse an S3 resource ARN back into `(bucket, key)`.
///
/// Returns `None` for strings that do not start with `arn:aws:s3:::`.
#[must_use]
pub fn parse_resource_arn(arn: &str) -> Option<(&str, &str)> {
    let rest = arn.strip_prefix(ARN_PREFIX)?;
    Some(match rest.split_once('/') {
        Some((bucket, key)) => (bucket, key),
        None => (rest, ""),
    })
}

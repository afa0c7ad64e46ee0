//! S3 request parsing: path-style bucket/key extraction and action mapping.
//!
//! The parser does not reason about authorization. It turns the raw HTTP
//! request into an [`S3Request`] carrying the bucket, key, canonical action
//! string, a cloned header map, the parsed query, and the collected body.
//! Action identification is a decision table keyed first on sub-resource
//! query flags, then on the method and whether a key is present.

use bytes::Bytes;
use http::{HeaderMap, Method};
use percent_encoding::percent_decode_str;

/// Action assigned when no table entry applies; no policy should allow it.
pub const ACTION_UNKNOWN: &str = "s3:Unknown";

/// A parsed S3 request.
#[derive(Debug, Clone)]
pub struct S3Request {
    /// Bucket name (first path segment). Empty means the request is invalid;
    /// listing all buckets is not supported.
    pub bucket: String,
    /// Object key (rest of the path, may itself contain slashes).
    pub key: String,
    /// Canonical action string, e.g. `s3:GetObject`.
    pub action: &'static str,
    pub method: Method,
    pub headers: HeaderMap,
    /// Decoded query parameters in request order.
    pub query: Vec<(String, String)>,
    /// The collected request body.
    pub body: Bytes,
    pub content_length: u64,
}

impl S3Request {
    /// Parse the request head and collected body into an `S3Request`.
    #[must_use]
    pub fn parse(parts: &http::request::Parts, body: Bytes) -> Self {
        let (bucket, key) = parse_path(parts.uri.path());
        let query = parse_query_params(parts.uri.query().unwrap_or(""));
        let action = determine_action(&parts.method, &key, &query);
        let content_length = body.len() as u64;

        Self {
            bucket,
            key,
            action,
            method: parts.method.clone(),
            headers: parts.headers.clone(),
            query,
            body,
            content_length,
        }
    }

    /// The resource ARN for this request.
    #[must_use]
    pub fn resource_arn(&self) -> String {
        s3gate_policy::build_resource_arn(&self.bucket, &self.key)
    }

    /// `bucket/key` as shown in error documents.
    #[must_use]
    pub fn resource_path(&self) -> String {
        format!("{}/{}", self.bucket, self.key)
    }

    /// Look up a query parameter value by name.
    #[must_use]
    pub fn query_value(&self, name: &str) -> Option<&str> {
        query_value(&self.query, name)
    }
}

/// Split the URI path into bucket and key. The key keeps its internal
/// slashes; both components are percent-decoded.
fn parse_path(path: &str) -> (String, String) {
    let trimmed = path.strip_prefix('/').unwrap_or(path);
    if trimmed.is_empty() {
        return (String::new(), String::new());
    }

    match trimmed.split_once('/') {
        Some((bucket, key)) => (decode_component(bucket), decode_component(key)),
        None => (decode_component(trimmed), String::new()),
    }
}

fn decode_component(s: &str) -> String {
    percent_decode_str(s).decode_utf8_lossy().into_owned()
}

/// Parse a query string into decoded key-value pairs, preserving order.
fn parse_query_params(query: &str) -> Vec<(String, String)> {
    if query.is_empty() {
        return Vec::new();
    }

    query
        .split('&')
        .filter(|s| !s.is_empty())
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (decode_component(k), decode_component(v)),
            None => (decode_component(pair), String::new()),
        })
        .collect()
}

fn query_has_key(params: &[(String, String)], key: &str) -> bool {
    params.iter().any(|(k, _)| k == key)
}

fn query_value<'a>(params: &'a [(String, String)], key: &str) -> Option<&'a str> {
    params
        .iter()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.as_str())
}

/// Map the request shape to its canonical action string.
///
/// Sub-resource query flags take precedence; within a flag, only the listed
/// methods are claimed and anything else falls through to the generic
/// mapping. HEAD maps to `s3:ListBucket` on a bucket and `s3:GetObject` on
/// an object.
fn determine_action(method: &Method, key: &str, query: &[(String, String)]) -> &'static str {
    let has_key = !key.is_empty();

    if query_has_key(query, "acl") {
        match *method {
            Method::GET => {
                return if has_key {
                    "s3:GetObjectAcl"
                } else {
                    "s3:GetBucketAcl"
                };
            }
            Method::PUT => {
                return if has_key {
                    "s3:PutObjectAcl"
                } else {
                    "s3:PutBucketAcl"
                };
            }
            _ => {}
        }
    }

    if query_has_key(query, "versioning") {
        match *method {
            Method::GET => return "s3:GetBucketVersioning",
            Method::PUT => return "s3:PutBucketVersioning",
            _ => {}
        }
    }

    if query_has_key(query, "lifecycle") {
        match *method {
            Method::GET => return "s3:GetLifecycleConfiguration",
            Method::PUT => return "s3:PutLifecycleConfiguration",
            Method::DELETE => return "s3:DeleteLifecycleConfiguration",
            _ => {}
        }
    }

    if query_has_key(query, "policy") {
        match *method {
            Method::GET => return "s3:GetBucketPolicy",
            Method::PUT => return "s3:PutBucketPolicy",
            Method::DELETE => return "s3:DeleteBucketPolicy",
            _ => {}
        }
    }

    if query_has_key(query, "tagging") {
        match *method {
            Method::GET => {
                return if has_key {
                    "s3:GetObjectTagging"
                } else {
                    "s3:GetBucketTagging"
                };
            }
            Method::PUT => {
                return if has_key {
                    "s3:PutObjectTagging"
                } else {
                    "s3:PutBucketTagging"
                };
            }
            Method::DELETE => {
                return if has_key {
                    "s3:DeleteObjectTagging"
                } else {
                    "s3:DeleteBucketTagging"
                };
            }
            _ => {}
        }
    }

    if query_has_key(query, "uploads") {
        match *method {
            // Initiating a multipart upload is authorized as a write.
            Method::POST => return "s3:PutObject",
            Method::GET => return "s3:ListBucketMultipartUploads",
            _ => {}
        }
    }

    if query_has_key(query, "uploadId") {
        match *method {
            // Part upload and completion are both writes.
            Method::PUT | Method::POST => return "s3:PutObject",
            Method::DELETE => return "s3:AbortMultipartUpload",
            Method::GET => return "s3:ListMultipartUploadParts",
            _ => {}
        }
    }

    if !has_key {
        return match *method {
            Method::GET | Method::HEAD => "s3:ListBucket",
            Method::PUT => "s3:CreateBucket",
            Method::DELETE => "s3:DeleteBucket",
            _ => ACTION_UNKNOWN,
        };
    }

    match *method {
        Method::GET | Method::HEAD => "s3:GetObject",
        Method::PUT | Method::POST => "s3:PutObject",
        Method::DELETE => "s3:DeleteObject",
        _ => ACTION_UNKNOWN,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parts(method: Method, uri: &str) -> http::request::Parts {
        let (parts, ()) = http::Request::builder()
            .method(method)
            .uri(uri)
            .header("host", "gateway.local")
            .body(())
            .expect("valid request")
            .into_parts();
        parts
    }

    fn action_of(method: Method, uri: &str) -> &'static str {
        S3Request::parse(&parts(method, uri), Bytes::new()).action
    }

    #[test]
    fn test_should_split_path_into_bucket_and_key() {
        let req = S3Request::parse(&parts(Method::GET, "/mybucket/a/b/c.txt"), Bytes::new());
        assert_eq!(req.bucket, "mybucket");
        assert_eq!(req.key, "a/b/c.txt");
        assert_eq!(req.resource_arn(), "arn:aws:s3:::mybucket/a/b/c.txt");
    }

    #[test]
    fn test_should_parse_bucket_only_path() {
        let req = S3Request::parse(&parts(Method::GET, "/mybucket"), Bytes::new());
        assert_eq!(req.bucket, "mybucket");
        assert_eq!(req.key, "");
        assert_eq!(req.resource_arn(), "arn:aws:s3:::mybucket");
    }

    #[test]
    fn test_should_yield_empty_bucket_for_root_path() {
        let req = S3Request::parse(&parts(Method::GET, "/"), Bytes::new());
        assert_eq!(req.bucket, "");
        assert_eq!(req.key, "");
    }

    #[test]
    fn test_should_percent_decode_bucket_and_key() {
        let req = S3Request::parse(
            &parts(Method::GET, "/mybucket/my%20key%2Bplus"),
            Bytes::new(),
        );
        assert_eq!(req.key, "my key+plus");
    }

    #[test]
    fn test_should_map_object_crud_actions() {
        assert_eq!(action_of(Method::GET, "/b/k"), "s3:GetObject");
        assert_eq!(action_of(Method::HEAD, "/b/k"), "s3:GetObject");
        assert_eq!(action_of(Method::PUT, "/b/k"), "s3:PutObject");
        assert_eq!(action_of(Method::POST, "/b/k"), "s3:PutObject");
        assert_eq!(action_of(Method::DELETE, "/b/k"), "s3:DeleteObject");
    }

    #[test]
    fn test_should_map_bucket_level_actions() {
        assert_eq!(action_of(Method::GET, "/b"), "s3:ListBucket");
        assert_eq!(action_of(Method::HEAD, "/b"), "s3:ListBucket");
        assert_eq!(action_of(Method::PUT, "/b"), "s3:CreateBucket");
        assert_eq!(action_of(Method::DELETE, "/b"), "s3:DeleteBucket");
    }

    #[test]
    fn test_should_map_list_with_query_to_list_bucket() {
        assert_eq!(
            action_of(Method::GET, "/b?list-type=2&prefix=a%2F"),
            "s3:ListBucket"
        );
    }

    #[test]
    fn test_should_map_acl_actions_by_key_presence() {
        assert_eq!(action_of(Method::GET, "/b?acl"), "s3:GetBucketAcl");
        assert_eq!(action_of(Method::GET, "/b/k?acl"), "s3:GetObjectAcl");
        assert_eq!(action_of(Method::PUT, "/b?acl"), "s3:PutBucketAcl");
        assert_eq!(action_of(Method::PUT, "/b/k?acl"), "s3:PutObjectAcl");
    }

    #[test]
    fn test_should_map_versioning_actions() {
        assert_eq!(action_of(Method::GET, "/b?versioning"), "s3:GetBucketVersioning");
        assert_eq!(action_of(Method::PUT, "/b?versioning"), "s3:PutBucketVersioning");
    }

    #[test]
    fn test_should_map_lifecycle_actions() {
        assert_eq!(
            action_of(Method::GET, "/b?lifecycle"),
            "s3:GetLifecycleConfiguration"
        );
        assert_eq!(
            action_of(Method::PUT, "/b?lifecycle"),
            "s3:PutLifecycleConfiguration"
        );
        assert_eq!(
            action_of(Method::DELETE, "/b?lifecycle"),
            "s3:DeleteLifecycleConfiguration"
        );
    }

    #[test]
    fn test_should_map_bucket_policy_actions() {
        assert_eq!(action_of(Method::GET, "/b?policy"), "s3:GetBucketPolicy");
        assert_eq!(action_of(Method::PUT, "/b?policy"), "s3:PutBucketPolicy");
        assert_eq!(action_of(Method::DELETE, "/b?policy"), "s3:DeleteBucketPolicy");
    }

    #[test]
    fn test_should_map_tagging_actions_by_key_presence() {
        assert_eq!(action_of(Method::GET, "/b?tagging"), "s3:GetBucketTagging");
        assert_eq!(action_of(Method::GET, "/b/k?tagging"), "s3:GetObjectTagging");
        assert_eq!(action_of(Method::PUT, "/b/k?tagging"), "s3:PutObjectTagging");
        assert_eq!(
            action_of(Method::DELETE, "/b?tagging"),
            "s3:DeleteBucketTagging"
        );
        assert_eq!(
            action_of(Method::DELETE, "/b/k?tagging"),
            "s3:DeleteObjectTagging"
        );
    }

    #[test]
    fn test_should_map_multipart_initiate_and_listing() {
        assert_eq!(action_of(Method::POST, "/b/k?uploads"), "s3:PutObject");
        assert_eq!(
            action_of(Method::GET, "/b?uploads"),
            "s3:ListBucketMultipartUploads"
        );
    }

    #[test]
    fn test_should_map_upload_id_actions() {
        assert_eq!(
            action_of(Method::PUT, "/b/k?uploadId=u1&partNumber=1"),
            "s3:PutObject"
        );
        assert_eq!(action_of(Method::POST, "/b/k?uploadId=u1"), "s3:PutObject");
        assert_eq!(
            action_of(Method::DELETE, "/b/k?uploadId=u1"),
            "s3:AbortMultipartUpload"
        );
        assert_eq!(
            action_of(Method::GET, "/b/k?uploadId=u1"),
            "s3:ListMultipartUploadParts"
        );
    }

    #[test]
    fn test_should_fall_through_flag_with_unclaimed_method() {
        // DELETE with ?acl is not an ACL operation; it falls through to the
        // generic object mapping.
        assert_eq!(action_of(Method::DELETE, "/b/k?acl"), "s3:DeleteObject");
    }

    #[test]
    fn test_should_map_unsupported_method_to_unknown() {
        assert_eq!(action_of(Method::PATCH, "/b/k"), ACTION_UNKNOWN);
        assert_eq!(action_of(Method::OPTIONS, "/b"), ACTION_UNKNOWN);
    }

    #[test]
    fn test_should_parse_query_params_with_flags_and_values() {
        let req = S3Request::parse(
            &parts(Method::GET, "/b?list-type=2&prefix=a%2F&acl"),
            Bytes::new(),
        );
        assert_eq!(req.query_value("list-type"), Some("2"));
        assert_eq!(req.query_value("prefix"), Some("a/"));
        assert_eq!(req.query_value("acl"), Some(""));
        assert_eq!(req.query_value("missing"), None);
    }

    #[test]
    fn test_should_record_content_length_from_body() {
        let req = S3Request::parse(&parts(Method::PUT, "/b/k"), Bytes::from("12345"));
        assert_eq!(req.content_length, 5);
    }
}

//! Canonical request construction for AWS Signature Version 4.
//!
//! The canonical request format:
//!
//! ```text
//! HTTPRequestMethod\n
//! CanonicalURI\n
//! CanonicalQueryString\n
//! CanonicalHeaders\n\n
//! SignedHeaders\n
//! HashedPayload
//! ```
//!
//! The URI is encoded per path segment; query parameters are decoded,
//! sorted by key then value, and re-encoded; headers appear in the order the
//! client listed them in `SignedHeaders`, since the verifier must reproduce
//! the client's canonicalization exactly.

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Characters percent-encoded in URI path segments and query components.
///
/// Per the SigV4 rules, everything except unreserved characters
/// (A-Z, a-z, 0-9, `-`, `_`, `.`, `~`) is encoded.
const SIGV4_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'~');

/// Percent-encode a single URI path segment or query component with the
/// SigV4 unreserved set.
#[must_use]
pub fn uri_encode(input: &str) -> String {
    utf8_percent_encode(input, SIGV4_ENCODE_SET).to_string()
}

/// Build the full canonical request string.
///
/// `headers` are `(lowercased name, trimmed value)` pairs in the order given
/// by the `SignedHeaders` component of the `Authorization` header.
#[must_use]
pub fn build_canonical_request(
    method: &str,
    path: &str,
    query: &str,
    headers: &[(String, String)],
    signed_headers: &[String],
    payload_hash: &str,
) -> String {
    let canonical_uri = build_canonical_uri(path);
    let canonical_query = build_canonical_query_string(query);
    let canonical_headers = headers
        .iter()
        .map(|(name, value)| format!("{name}:{value}"))
        .collect::<Vec<_>>()
        .join("\n");
    let signed_headers_str = signed_headers.join(";");

    format!(
        "{method}\n{canonical_uri}\n{canonical_query}\n{canonical_headers}\n\n{signed_headers_str}\n{payload_hash}"
    )
}

/// Build the canonical URI by encoding each path segment individually.
///
/// Forward slashes are preserved; empty paths normalize to `/`. Segments
/// are decoded first so an already-encoded path is not double-encoded.
#[must_use]
pub fn build_canonical_uri(path: &str) -> String {
    if path.is_empty() || path == "/" {
        return "/".to_owned();
    }

    path.split('/')
        .map(|segment| {
            let decoded = percent_decode_str(segment).decode_utf8_lossy();
            utf8_percent_encode(&decoded, SIGV4_ENCODE_SET).to_string()
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Build the canonical query string.
///
/// Pairs are percent-decoded, sorted by key and then by value for duplicate
/// keys, re-encoded with the SigV4 unreserved set, and joined with `&`.
#[must_use]
pub fn build_canonical_query_string(query: &str) -> String {
    if query.is_empty() {
        return String::new();
    }

    let mut pairs: Vec<(String, String)> = query
        .split('&')
        .filter(|s| !s.is_empty())
        .map(|pair| {
            let (k, v) = pair.split_once('=').unwrap_or((pair, ""));
            (
                percent_decode_str(k).decode_utf8_lossy().into_owned(),
                percent_decode_str(v).decode_utf8_lossy().into_owned(),
            )
        })
        .collect();

    pairs.sort_unstable();

    pairs
        .iter()
        .map(|(k, v)| {
            format!(
                "{}={}",
                utf8_percent_encode(k, SIGV4_ENCODE_SET),
                utf8_percent_encode(v, SIGV4_ENCODE_SET)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owned(items: &[(&str, &str)]) -> Vec<(String, String)> {
        items
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect()
    }

    #[test]
    fn test_should_normalize_empty_path_to_slash() {
        assert_eq!(build_canonical_uri(""), "/");
        assert_eq!(build_canonical_uri("/"), "/");
    }

    #[test]
    fn test_should_encode_special_characters_per_segment() {
        assert_eq!(build_canonical_uri("/hello world"), "/hello%20world");
        assert_eq!(build_canonical_uri("/a/b c/d"), "/a/b%20c/d");
    }

    #[test]
    fn test_should_not_double_encode_path() {
        assert_eq!(build_canonical_uri("/hello%20world"), "/hello%20world");
        assert_eq!(
            build_canonical_uri("/hello world"),
            build_canonical_uri("/hello%20world")
        );
    }

    #[test]
    fn test_should_sort_query_keys_lexicographically() {
        assert_eq!(build_canonical_query_string("b=2&a=1&c=3"), "a=1&b=2&c=3");
        assert_eq!(build_canonical_query_string(""), "");
    }

    #[test]
    fn test_should_sort_duplicate_query_keys_by_value() {
        assert_eq!(
            build_canonical_query_string("k=beta&k=alpha&a=1"),
            "a=1&k=alpha&k=beta"
        );
    }

    #[test]
    fn test_should_emit_empty_value_for_flag_parameters() {
        assert_eq!(build_canonical_query_string("acl"), "acl=");
        assert_eq!(build_canonical_query_string("list-type=2&prefix="), "list-type=2&prefix=");
    }

    #[test]
    fn test_should_re_encode_decoded_query_values() {
        assert_eq!(
            build_canonical_query_string("prefix=a%2Fb&delimiter=%2F"),
            "delimiter=%2F&prefix=a%2Fb"
        );
    }

    #[test]
    fn test_should_build_canonical_request_matching_aws_example() {
        use sha2::{Digest, Sha256};

        let headers = owned(&[
            ("host", "examplebucket.s3.amazonaws.com"),
            ("range", "bytes=0-9"),
            (
                "x-amz-content-sha256",
                "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
            ),
            ("x-amz-date", "20130524T000000Z"),
        ]);
        let signed: Vec<String> = ["host", "range", "x-amz-content-sha256", "x-amz-date"]
            .iter()
            .map(|s| (*s).to_owned())
            .collect();

        let canonical = build_canonical_request(
            "GET",
            "/test.txt",
            "",
            &headers,
            &signed,
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855",
        );

        let expected = "GET\n\
                        /test.txt\n\
                        \n\
                        host:examplebucket.s3.amazonaws.com\n\
                        range:bytes=0-9\n\
                        x-amz-content-sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855\n\
                        x-amz-date:20130524T000000Z\n\
                        \n\
                        host;range;x-amz-content-sha256;x-amz-date\n\
                        e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";
        assert_eq!(canonical, expected);

        // The hash of this canonical request is a published AWS test vector.
        let hash = hex::encode(Sha256::digest(canonical.as_bytes()));
        assert_eq!(
            hash,
            "7344ae5b7ee6c3e7e6b0fe0640412a37625d1fbfff95c48bbb2dc43964946972"
        );
    }
}

//! Request signing: canonical string construction and HMAC-SHA256.
//!
//! The canonical string is a wire contract shared with every client:
//!
//! ```text
//! UPPERCASE(method) \n path \n canonical_query \n timestamp \n nonce \n hex(sha256(body))
//! ```
//!
//! An empty query still occupies its line, so the string always has six
//! newline-separated fields.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};
use std::time::Duration;
use subtle::ConstantTimeEq;
use url::form_urlencoded;

type HmacSha256 = Hmac<Sha256>;

/// Security-relevant fields of a signed request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureInput<'a> {
    pub method: &'a str,
    pub path: &'a str,
    /// Raw query string as received, without the leading `?`.
    pub raw_query: &'a str,
    /// Client timestamp header, decimal epoch milliseconds.
    pub timestamp: &'a str,
    pub nonce: &'a str,
    /// Lowercase hex SHA-256 of the request body.
    pub body_hash: &'a str,
}

/// Build the canonical query: decode, sort by key then value, re-encode.
///
/// # Example
///
/// `b=x+y&a=1&b=*` becomes `a=1&b=%2A&b=x+y`.
pub fn canonical_query(raw: &str) -> String {
    if raw.is_empty() {
        return String::new();
    }

    let mut pairs: Vec<(String, String)> = form_urlencoded::parse(raw.as_bytes())
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    // Tuple ordering compares keys first, then values, both bytewise
    pairs.sort();

    pairs
        .iter()
        .map(|(key, value)| {
            format!(
                "{}={}",
                escape_query_component(key),
                escape_query_component(value)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

/// Query-component escaping with the unreserved set `A-Z a-z 0-9 - _ . ~`.
///
/// `form_urlencoded` keeps `*` and escapes `~`; both are corrected so the
/// output matches what existing clients compute.
fn escape_query_component(value: &str) -> String {
    form_urlencoded::byte_serialize(value.as_bytes())
        .collect::<String>()
        .replace('*', "%2A")
        .replace("%7E", "~")
}

/// Assemble the newline-delimited string that gets signed.
pub fn canonical_string(input: &SignatureInput<'_>) -> String {
    [
        input.method.trim().to_ascii_uppercase(),
        input.path.to_string(),
        canonical_query(input.raw_query),
        input.timestamp.to_string(),
        input.nonce.to_string(),
        input.body_hash.trim().to_ascii_lowercase(),
    ]
    .join("\n")
}

/// HMAC-SHA256 of the canonical string, lowercase hex.
pub fn sign(secret: &str, input: &SignatureInput<'_>) -> String {
    let mut mac =
        HmacSha256::new_from_slice(secret.as_bytes()).expect("HMAC key length is valid");
    mac.update(canonical_string(input).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Check a client signature against the expected one.
///
/// Both sides are hex-decoded and the raw bytes are compared in constant
/// time. Malformed hex or a length mismatch is simply `false`.
pub fn verify(secret: &str, input: &SignatureInput<'_>, signature: &str) -> bool {
    let expected = sign(secret, input);
    let supplied = signature.trim().to_ascii_lowercase();

    let (Ok(left), Ok(right)) = (hex::decode(expected), hex::decode(supplied)) else {
        return false;
    };
    if left.len() != right.len() {
        return false;
    }

    left.ct_eq(&right).into()
}

/// Accept a decimal epoch-millisecond timestamp within `max_skew` of `now`,
/// in the past or the future.
pub fn validate_timestamp(raw: &str, max_skew: Duration, now: DateTime<Utc>) -> bool {
    let Ok(client_ms) = raw.trim().parse::<i64>() else {
        return false;
    };

    match now.timestamp_millis().checked_sub(client_ms) {
        Some(delta) => u128::from(delta.unsigned_abs()) <= max_skew.as_millis(),
        None => false,
    }
}

/// Lowercase hex SHA-256 digest.
pub fn sha256_hex(raw: &[u8]) -> String {
    hex::encode(Sha256::digest(raw))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EMPTY_BODY_HASH: &str =
        "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855";

    fn golden_input() -> SignatureInput<'static> {
        SignatureInput {
            method: "GET",
            path: "/v1/public/posts",
            raw_query: "",
            timestamp: "1700000000000",
            nonce: "abc123",
            body_hash: EMPTY_BODY_HASH,
        }
    }

    #[test]
    fn golden_vector_matches_reference() {
        let input = golden_input();
        assert_eq!(sha256_hex(b""), EMPTY_BODY_HASH);
        assert_eq!(
            canonical_string(&input),
            "GET\n/v1/public/posts\n\n1700000000000\nabc123\n\
             e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_eq!(
            sign("s3cr3t", &input),
            "697c84b2bced7cc900671665ab26ef4f04973b4d87333c8201542b39fa68404f"
        );
    }

    #[test]
    fn signed_query_and_body_vector() {
        let body_hash = sha256_hex(br#"{"title":"hello"}"#);
        let input = SignatureInput {
            method: "post",
            path: "/v1/posts",
            raw_query: "b=x+y&a=1&b=*",
            timestamp: "1700000000000",
            nonce: "n-1",
            body_hash: &body_hash,
        };
        assert!(canonical_string(&input).starts_with("POST\n/v1/posts\na=1&b=%2A&b=x+y\n"));
        assert_eq!(
            sign("s3cr3t", &input),
            "9d917c52db0d91d7c7e1e4c213aa3f3e794160fb1a74a2a7adeae53f9476241b"
        );
    }

    #[test]
    fn canonical_query_sorts_and_reencodes() {
        assert_eq!(canonical_query(""), "");
        assert_eq!(canonical_query("z=1&a=2"), "a=2&z=1");
        assert_eq!(canonical_query("a=2&a=1"), "a=1&a=2");
        assert_eq!(canonical_query("q=hello%20world"), "q=hello+world");
        assert_eq!(canonical_query("path=%2Fa%2Fb&tilde=%7E"), "path=%2Fa%2Fb&tilde=~");
        assert_eq!(canonical_query("flag"), "flag=");
    }

    #[test]
    fn verify_accepts_own_signature() {
        let input = golden_input();
        let signature = sign("s3cr3t", &input);
        assert!(verify("s3cr3t", &input, &signature));
        assert!(verify("s3cr3t", &input, &signature.to_uppercase()));
        assert!(!verify("other", &input, &signature));
    }

    #[test]
    fn verify_rejects_any_changed_field() {
        let input = golden_input();
        let signature = sign("s3cr3t", &input);

        let variants = [
            SignatureInput { method: "POST", ..input },
            SignatureInput { path: "/v1/public/moments", ..input },
            SignatureInput { raw_query: "page=2", ..input },
            SignatureInput { timestamp: "1700000000001", ..input },
            SignatureInput { nonce: "abc124", ..input },
            SignatureInput {
                body_hash: "0000000000000000000000000000000000000000000000000000000000000000",
                ..input
            },
        ];
        for variant in variants {
            assert!(!verify("s3cr3t", &variant, &signature), "{variant:?}");
        }
    }

    #[test]
    fn verify_fails_closed_on_malformed_signature() {
        let input = golden_input();
        let signature = sign("s3cr3t", &input);
        assert!(!verify("s3cr3t", &input, ""));
        assert!(!verify("s3cr3t", &input, "not-hex"));
        assert!(!verify("s3cr3t", &input, &signature[..62]));
        assert!(!verify("s3cr3t", &input, &format!("{signature}00")));
        assert!(!verify("s3cr3t", &input, &signature[..63]));
    }

    #[test]
    fn timestamp_window_is_symmetric() {
        let now = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        let skew = Duration::from_secs(300);

        assert!(validate_timestamp("1700000000000", skew, now));
        assert!(validate_timestamp("1699999700000", skew, now));
        assert!(validate_timestamp("1700000300000", skew, now));
        assert!(!validate_timestamp("1699999699999", skew, now));
        assert!(!validate_timestamp("1700000300001", skew, now));
        assert!(!validate_timestamp("17e11", skew, now));
        assert!(!validate_timestamp("", skew, now));
        assert!(!validate_timestamp("-9223372036854775808", skew, now));
    }
}

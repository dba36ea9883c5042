//! AWS Signature Version 4 for JSON requests to function URLs.
//!
//! Signs `host` and `x-amz-date` only, with the payload hash carried in
//! `x-amz-content-sha256`, which is all a function URL with IAM auth checks.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha256};

type HmacSha256 = Hmac<Sha256>;

const ALGORITHM: &str = "AWS4-HMAC-SHA256";
const SIGNED_HEADERS: &str = "host;x-amz-date";

#[derive(Debug, Clone)]
pub struct Credentials {
    pub access_key: String,
    pub secret_key: String,
}

#[derive(Debug, Clone)]
pub struct SigningScope<'a> {
    pub region: &'a str,
    pub service: &'a str,
}

/// Headers to attach to the outgoing request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedHeaders {
    pub authorization: String,
    pub amz_date: String,
    pub content_sha256: String,
}

pub fn sign(
    credentials: &Credentials,
    scope: &SigningScope<'_>,
    method: &str,
    host: &str,
    path: &str,
    body: &[u8],
    now: DateTime<Utc>,
) -> SignedHeaders {
    let amz_date = now.format("%Y%m%dT%H%M%SZ").to_string();
    let date_stamp = now.format("%Y%m%d").to_string();
    let payload_hash = hex::encode(Sha256::digest(body));
    let canonical_uri = if path.is_empty() { "/" } else { path };

    let canonical_request = format!(
        "{method}\n{canonical_uri}\n\nhost:{host}\nx-amz-date:{amz_date}\n\n{SIGNED_HEADERS}\n{payload_hash}"
    );
    let credential_scope = format!(
        "{date_stamp}/{}/{}/aws4_request",
        scope.region, scope.service
    );
    let string_to_sign = format!(
        "{ALGORITHM}\n{amz_date}\n{credential_scope}\n{}",
        hex::encode(Sha256::digest(canonical_request.as_bytes()))
    );

    let key = signing_key(&credentials.secret_key, &date_stamp, scope);
    let signature = hex::encode(hmac(&key, string_to_sign.as_bytes()));

    SignedHeaders {
        authorization: format!(
            "{ALGORITHM} Credential={}/{credential_scope}, SignedHeaders={SIGNED_HEADERS}, Signature={signature}",
            credentials.access_key
        ),
        amz_date,
        content_sha256: payload_hash,
    }
}

pub fn signing_key(secret_key: &str, date_stamp: &str, scope: &SigningScope<'_>) -> Vec<u8> {
    let k_date = hmac(format!("AWS4{secret_key}").as_bytes(), date_stamp.as_bytes());
    let k_region = hmac(&k_date, scope.region.as_bytes());
    let k_service = hmac(&k_region, scope.service.as_bytes());
    hmac(&k_service, b"aws4_request")
}

fn hmac(key: &[u8], data: &[u8]) -> Vec<u8> {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(data);
    mac.finalize().into_bytes().to_vec()
}

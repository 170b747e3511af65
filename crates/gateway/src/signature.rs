//! Canonical-string HMAC signatures.
//!
//! Both pay parameters and webhook notifications are signed the same way:
//! fields sorted by name, joined `k=v&k=v`, HMAC-SHA256 under the shared
//! secret, hex-encoded. Verification is constant-time via the MAC itself.

use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Builds the canonical string for a set of fields: sorted by field name,
/// `k=v` pairs joined with `&`.
pub fn canonical_string(fields: &[(&str, &str)]) -> String {
    let mut sorted: Vec<&(&str, &str)> = fields.iter().collect();
    sorted.sort_by_key(|(k, _)| *k);
    sorted
        .iter()
        .map(|(k, v)| format!("{k}={v}"))
        .collect::<Vec<_>>()
        .join("&")
}

/// Signs the fields, returning the hex-encoded MAC.
pub fn sign(secret: &str, fields: &[(&str, &str)]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(canonical_string(fields).as_bytes());
    hex::encode(mac.finalize().into_bytes())
}

/// Verifies a hex-encoded signature over the fields.
pub fn verify(secret: &str, fields: &[(&str, &str)], signature: &str) -> bool {
    let Ok(expected) = hex::decode(signature) else {
        return false;
    };
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .expect("HMAC accepts keys of any length");
    mac.update(canonical_string(fields).as_bytes());
    mac.verify_slice(&expected).is_ok()
}

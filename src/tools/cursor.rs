//! Opaque, tamper-resistant pagination cursor (spec.md §4.2, §9).
//!
//! Wraps `(position, catalogue-epoch)` in an HMAC-SHA256 envelope, base64url
//! encoded. An invalid or stale cursor (wrong HMAC, or an epoch that no
//! longer matches the catalogue) restarts from the beginning rather than
//! erroring, to avoid leaking anything about why it was rejected.
//!
//! Grounded in the teacher's reuse of `sha2`+`base64` for its OAuth PKCE
//! verification (`server/auth/provider.rs`) — the same two crates, applied
//! to a different HMAC-shaped problem.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use sha2::{Digest, Sha256};

fn hmac(secret: &str, message: &str) -> [u8; 32] {
    // HMAC-SHA256 built from the primitive hash, matching the teacher's
    // preference for depending directly on `sha2` rather than pulling in
    // a separate `hmac` crate for a single call site.
    let block_size = 64;
    let mut key = secret.as_bytes().to_vec();
    if key.len() > block_size {
        key = Sha256::digest(&key).to_vec();
    }
    key.resize(block_size, 0);

    let mut ipad = vec![0x36u8; block_size];
    let mut opad = vec![0x5cu8; block_size];
    for i in 0..block_size {
        ipad[i] ^= key[i];
        opad[i] ^= key[i];
    }

    let mut inner = Sha256::new();
    inner.update(&ipad);
    inner.update(message.as_bytes());
    let inner_digest = inner.finalize();

    let mut outer = Sha256::new();
    outer.update(&opad);
    outer.update(inner_digest);
    outer.finalize().into()
}

/// Encode a cursor for `position` at the catalogue's current `epoch`.
pub fn encode(secret: &str, position: usize, epoch: u64) -> String {
    let payload = format!("{position}:{epoch}");
    let mac = hmac(secret, &payload);
    let mac_b64 = URL_SAFE_NO_PAD.encode(mac);
    URL_SAFE_NO_PAD.encode(format!("{payload}:{mac_b64}"))
}

/// Decode a cursor. Returns `None` if the cursor is malformed, tampered
/// with, or bound to a stale epoch — callers should treat `None` exactly
/// like "no cursor" (restart from the beginning), never as an error.
pub fn decode(secret: &str, cursor: &str, current_epoch: u64) -> Option<usize> {
    let raw = URL_SAFE_NO_PAD.decode(cursor).ok()?;
    let raw = String::from_utf8(raw).ok()?;
    let mut parts = raw.splitn(3, ':');
    let position: usize = parts.next()?.parse().ok()?;
    let epoch: u64 = parts.next()?.parse().ok()?;
    let mac_b64 = parts.next()?;

    if epoch != current_epoch {
        return None;
    }

    let expected = hmac(secret, &format!("{position}:{epoch}"));
    let expected_b64 = URL_SAFE_NO_PAD.encode(expected);

    if constant_time_eq(mac_b64.as_bytes(), expected_b64.as_bytes()) {
        Some(position)
    } else {
        None
    }
}

/// Timing-safe byte comparison (spec.md §4.7, §8 property 4 — reused here
/// for cursor HMAC verification, not only PKCE).
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

//! PBKDF2-HMAC-SHA256 password hashing.
//!
//! Stored format: `pbkdf2_sha256$<iterations>$<salt_hex>$<hash_hex>`. The
//! iteration count travels with the hash, so raising the default does not
//! invalidate existing accounts.

use polibrief_core::AuthError;
use sha2::Sha256;

const ALGORITHM: &str = "pbkdf2_sha256";
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;

pub const DEFAULT_ITERATIONS: u32 = 100_000;

/// Hash `password` with a fresh random salt.
pub fn hash_password(password: &str, iterations: u32) -> Result<String, AuthError> {
    if iterations == 0 {
        return Err(AuthError::Hashing("iteration count must be > 0".into()));
    }
    let salt = generate_salt();
    let hash = derive(password.as_bytes(), &salt, iterations);
    Ok(format!(
        "{ALGORITHM}${iterations}${}${}",
        hex::encode(salt),
        hex::encode(hash)
    ))
}

/// Check `password` against a stored hash. Malformed hashes never verify.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let mut parts = stored.split('$');
    let (Some(algorithm), Some(iterations), Some(salt), Some(expected), None) = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    ) else {
        return false;
    };
    if algorithm != ALGORITHM {
        return false;
    }
    let Ok(iterations) = iterations.parse::<u32>() else {
        return false;
    };
    let (Ok(salt), Ok(expected)) = (hex::decode(salt), hex::decode(expected)) else {
        return false;
    };
    if iterations == 0 || expected.len() != HASH_LEN {
        return false;
    }

    constant_time_eq(&derive(password.as_bytes(), &salt, iterations), &expected)
}

fn generate_salt() -> [u8; SALT_LEN] {
    use rand::Rng;
    let mut rng = rand::rng();
    let mut salt = [0u8; SALT_LEN];
    rng.fill(&mut salt[..]);
    salt
}

fn derive(password: &[u8], salt: &[u8], iterations: u32) -> [u8; HASH_LEN] {
    let mut out = [0u8; HASH_LEN];
    pbkdf2::pbkdf2_hmac::<Sha256>(password, salt, iterations, &mut out);
    out
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

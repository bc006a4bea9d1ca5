use rand::Rng;
use sha2::{Digest, Sha256};
use std::sync::LazyLock;

const SALT_LEN: usize = 16;

/// A real stored hash generated once at startup, verified against for
/// non-existent accounts so login timing does not reveal whether an email is
/// registered.
static DUMMY_HASH: LazyLock<String> = LazyLock::new(|| hash_password("dummy-never-matches"));

/// Salted single-round SHA-256, stored as `<hex salt>:<hex digest>`.
///
/// No iteration count or memory hardening: the session token, not the
/// password digest, is this system's security-critical asset.
pub fn hash_password(password: &str) -> String {
    let mut salt = [0u8; SALT_LEN];
    rand::rng().fill_bytes(&mut salt);

    let digest = digest_with_salt(&salt, password);
    format!("{}:{}", hex::encode(salt), hex::encode(digest))
}

/// Verify a candidate password against a stored `salt:digest` string.
///
/// Fails closed: a malformed stored value (missing colon, bad hex, wrong
/// lengths) returns false and never errors past the caller.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let Some((salt_hex, digest_hex)) = stored.split_once(':') else {
        return false;
    };
    let Ok(salt) = hex::decode(salt_hex) else {
        return false;
    };
    let Ok(expected) = hex::decode(digest_hex) else {
        return false;
    };
    if salt.len() != SALT_LEN || expected.len() != 32 {
        return false;
    }

    let actual = digest_with_salt(&salt, password);
    constant_time_eq(&actual, &expected)
}

/// Burn a verification against the dummy hash to equalize response latency
/// for accounts that do not exist.
pub fn dummy_verify(password: &str) {
    let _ = verify_password(password, &DUMMY_HASH);
}

fn digest_with_salt(salt: &[u8], password: &str) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(salt);
    hasher.update(password.as_bytes());
    hasher.finalize().into()
}

// Digest comparison must not short-circuit on the first differing byte.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn round_trip() {
        let stored = hash_password("secret1");
        assert!(verify_password("secret1", &stored));
        assert!(!verify_password("secret2", &stored));
    }

    #[test]
    fn empty_password_is_consistent() {
        let stored = hash_password("");
        assert!(verify_password("", &stored));
        assert!(!verify_password("x", &stored));
    }

    #[test]
    fn unicode_password_is_consistent() {
        let stored = hash_password("pässwörd-🦀");
        assert!(verify_password("pässwörd-🦀", &stored));
        assert!(!verify_password("pässwörd-🦞", &stored));
    }

    #[test]
    fn stored_format_is_salt_colon_digest() {
        let stored = hash_password("secret1");
        let (salt, digest) = stored.split_once(':').unwrap();
        assert_eq!(salt.len(), 32);
        assert_eq!(digest.len(), 64);
        assert!(salt.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn salts_differ_between_hashes() {
        assert_ne!(hash_password("secret1"), hash_password("secret1"));
    }

    #[test]
    fn malformed_stored_hash_fails_closed() {
        assert!(!verify_password("anything", "not-a-valid-hash"));
        assert!(!verify_password("anything", ""));
        assert!(!verify_password("anything", ":"));
        assert!(!verify_password("anything", "zzzz:zzzz"));
        assert!(!verify_password("anything", "abcd:abcd")); // hex but wrong lengths
        let valid = hash_password("p");
        assert!(!verify_password("p", &valid[..valid.len() - 2]));
    }

    #[test]
    fn dummy_verify_does_not_panic() {
        dummy_verify("whatever");
        dummy_verify("");
    }

    proptest! {
        #[test]
        fn any_password_round_trips(p in ".*") {
            let stored = hash_password(&p);
            prop_assert!(verify_password(&p, &stored));
        }

        #[test]
        fn mismatched_passwords_reject(p1 in ".*", p2 in ".*") {
            prop_assume!(p1 != p2);
            let stored = hash_password(&p2);
            prop_assert!(!verify_password(&p1, &stored));
        }

        #[test]
        fn garbage_stored_values_never_panic(p in ".*", stored in ".*") {
            // May only be true if `stored` happens to be a real hash of `p`,
            // which a random string is not.
            let _ = verify_password(&p, &stored);
        }
    }
}

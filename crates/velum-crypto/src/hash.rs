//! Child-name hashing
//!
//! Names under a folder are compared by `HMAC-SHA256(parentHashKey, name)`
//! rendered as lowercase hex, so the backend can detect collisions without
//! ever seeing a name.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use velum_core::{Error, HashKey, Result};

/// Hash a node name under its parent's hash key.
pub fn name_hash(hash_key: &HashKey, name: &str) -> Result<String> {
    let mut mac = <Hmac<Sha256>>::new_from_slice(hash_key.as_bytes())
        .map_err(|_| Error::internal("hash key rejected by HMAC"))?;
    mac.update(name.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_vector() {
        // RFC 4231 test case 2: key "Jefe", data "what do ya want for nothing?"
        let key = HashKey::new(b"Jefe".to_vec());
        let hash = name_hash(&key, "what do ya want for nothing?").unwrap();
        assert_eq!(
            hash,
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
    }

    #[test]
    fn same_name_same_key_is_deterministic() {
        let key = HashKey::new(vec![7; 32]);
        assert_eq!(
            name_hash(&key, "hello").unwrap(),
            name_hash(&key, "hello").unwrap()
        );
        assert_ne!(
            name_hash(&key, "hello").unwrap(),
            name_hash(&key, "Hello").unwrap()
        );
    }
}

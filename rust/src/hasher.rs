//! `Hasher` bundles the application key, the salt entropy chain and the
//! default Bcrypt cost so callers can pass one value around instead of
//! reaching for global configuration.

use crate::crypto::entropy::EntropyChain;
use crate::crypto::integrity::{self, ApplicationKey, IntegrityError};
use crate::crypto::passwords::{self, PasswordError, DEFAULT_ROUNDS};

#[derive(Debug)]
pub struct Hasher {
    key: Option<ApplicationKey>,
    entropy: EntropyChain,
    rounds: u32,
}

impl Hasher {
    /// A hasher without an application key. Password hashing works; the HMAC
    /// operations fail with `ConfigurationMissing` until a key is supplied.
    pub fn new() -> Self {
        Self {
            key: None,
            entropy: EntropyChain::system_default(),
            rounds: DEFAULT_ROUNDS,
        }
    }

    /// Supplies the application key used by the HMAC operations.
    pub fn with_key(mut self, key: ApplicationKey) -> Self {
        self.key = Some(key);
        self
    }

    /// Replaces the salt entropy chain.
    pub fn with_entropy(mut self, entropy: EntropyChain) -> Self {
        self.entropy = entropy;
        self
    }

    /// Sets the default Bcrypt cost, rejecting values outside 4..=31.
    pub fn with_rounds(mut self, rounds: u32) -> Result<Self, PasswordError> {
        passwords::validate_cost(rounds)?;
        self.rounds = rounds;
        Ok(self)
    }

    /// Default Bcrypt cost used by `make`.
    pub fn rounds(&self) -> u32 {
        self.rounds
    }

    /// Hashes `value` at the default cost.
    pub fn make(&self, value: impl AsRef<[u8]>) -> Result<String, PasswordError> {
        passwords::make_with_entropy(value, self.rounds, &self.entropy)
    }

    /// Hashes `value` at the given cost.
    pub fn make_with_rounds(
        &self,
        value: impl AsRef<[u8]>,
        rounds: u32,
    ) -> Result<String, PasswordError> {
        passwords::make_with_entropy(value, rounds, &self.entropy)
    }

    /// Checks `value` against a stored Bcrypt hash.
    pub fn check(&self, value: impl AsRef<[u8]>, hash: &str) -> bool {
        passwords::check(value, hash)
    }

    fn key(&self) -> Result<&ApplicationKey, IntegrityError> {
        self.key.as_ref().ok_or_else(|| {
            IntegrityError::ConfigurationMissing("no application key supplied to the hasher".to_string())
        })
    }

    /// HMAC-SHA256 of `value` under the application key.
    pub fn hmac_sha256_digest(&self, value: impl AsRef<[u8]>) -> Result<[u8; 32], IntegrityError> {
        integrity::hmac_sha256_digest(self.key()?, value)
    }

    /// Hex-encoded HMAC-SHA256 of `value` under the application key.
    pub fn hmac_sha256_hex(&self, value: impl AsRef<[u8]>) -> Result<String, IntegrityError> {
        integrity::hmac_sha256_hex(self.key()?, value)
    }

    /// HMAC-SHA512 of `value` under the application key.
    pub fn hmac_sha512_digest(&self, value: impl AsRef<[u8]>) -> Result<[u8; 64], IntegrityError> {
        integrity::hmac_sha512_digest(self.key()?, value)
    }

    /// Hex-encoded HMAC-SHA512 of `value` under the application key.
    pub fn hmac_sha512_hex(&self, value: impl AsRef<[u8]>) -> Result<String, IntegrityError> {
        integrity::hmac_sha512_hex(self.key()?, value)
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::Hasher;
    use crate::crypto::integrity::{ApplicationKey, IntegrityError};
    use crate::crypto::passwords::PasswordError;
    use std::sync::Arc;
    use std::thread;

    fn keyed() -> Hasher {
        Hasher::new()
            .with_key(ApplicationKey::new("Jefe").expect("valid key"))
            .with_rounds(4)
            .expect("cost in range")
    }

    #[test]
    fn hashes_and_checks_with_configured_rounds() {
        let hasher = keyed();
        let hash = hasher.make("secret").expect("hashing should succeed");
        assert!(hash.starts_with("$2a$04$"));
        assert!(hasher.check("secret", &hash));
        assert!(!hasher.check("other", &hash));

        let hash = hasher.make_with_rounds("secret", 5).unwrap();
        assert!(hash.starts_with("$2a$05$"));
    }

    #[test]
    fn rejects_invalid_default_rounds() {
        let err = Hasher::new().with_rounds(40).unwrap_err();
        assert!(matches!(err, PasswordError::InvalidCost(40)));
    }

    #[test]
    fn hmac_requires_a_key() {
        let hasher = Hasher::new();
        assert!(matches!(
            hasher.hmac_sha256_hex("payload"),
            Err(IntegrityError::ConfigurationMissing(_))
        ));
        assert!(matches!(
            hasher.hmac_sha512_digest("payload"),
            Err(IntegrityError::ConfigurationMissing(_))
        ));
    }

    #[test]
    fn hmac_uses_the_injected_key() {
        let hasher = keyed();
        assert_eq!(
            hasher.hmac_sha256_hex("what do ya want for nothing?").unwrap(),
            "5bdcc146bf60754e6a042426089575c75a003f089d2739839dec58b964ec3843"
        );
        assert_eq!(
            hasher.hmac_sha256_digest("x").unwrap(),
            hasher.hmac_sha256_digest("x").unwrap()
        );
        assert_eq!(
            hex::decode(hasher.hmac_sha512_hex("x").unwrap()).unwrap(),
            hasher.hmac_sha512_digest("x").unwrap().to_vec()
        );
    }

    #[test]
    fn shares_across_threads() {
        let hasher = Arc::new(keyed());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let hasher = Arc::clone(&hasher);
                thread::spawn(move || {
                    let value = format!("password-{i}");
                    let hash = hasher.make(&value).unwrap();
                    hasher.check(&value, &hash)
                })
            })
            .collect();
        for handle in handles {
            assert!(handle.join().unwrap());
        }
    }
}

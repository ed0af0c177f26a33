//! Salt entropy sources. Sources are tried in a fixed order and the first one
//! that produces bytes wins. The pseudo-random source is never used unless the
//! chain was explicitly built with `InsecureFallback::Permit`.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::distributions::Alphanumeric;
use rand::rngs::{OsRng, SmallRng};
use rand::{Rng, RngCore, SeedableRng};
use thiserror::Error;
use tracing::{debug, warn};

/// Raw salt length handed to Bcrypt.
pub const SALT_LEN: usize = 16;
/// Length of the alphanumeric string produced by the degraded source.
pub const PSEUDO_SALT_LEN: usize = 40;

#[derive(Debug, Error)]
pub enum EntropyError {
    #[error("random source {source_name} failed: {reason}")]
    SourceFailed {
        source_name: &'static str,
        reason: String,
    },
    #[error("no secure random source available (tried: {tried})")]
    RandomSourceUnavailable { tried: String },
}

/// A provider of salt material.
pub trait RandomSource: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Whether the bytes come from a cryptographically secure generator.
    fn is_secure(&self) -> bool;

    /// Returns fresh salt material. Secure sources return `SALT_LEN` bytes.
    fn fill_salt(&self) -> Result<Vec<u8>, EntropyError>;
}

/// The operating system CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRandom;

impl RandomSource for SystemRandom {
    fn name(&self) -> &'static str {
        "os"
    }

    fn is_secure(&self) -> bool {
        true
    }

    fn fill_salt(&self) -> Result<Vec<u8>, EntropyError> {
        let mut salt = vec![0u8; SALT_LEN];
        OsRng
            .try_fill_bytes(&mut salt)
            .map_err(|e| EntropyError::SourceFailed {
                source_name: self.name(),
                reason: format!("{e}"),
            })?;
        Ok(salt)
    }
}

/// The thread-local ChaCha generator from `rand`, periodically reseeded from the OS.
#[derive(Debug, Default, Clone, Copy)]
pub struct ThreadRandom;

impl RandomSource for ThreadRandom {
    fn name(&self) -> &'static str {
        "thread"
    }

    fn is_secure(&self) -> bool {
        true
    }

    fn fill_salt(&self) -> Result<Vec<u8>, EntropyError> {
        let mut salt = vec![0u8; SALT_LEN];
        rand::thread_rng()
            .try_fill_bytes(&mut salt)
            .map_err(|e| EntropyError::SourceFailed {
                source_name: self.name(),
                reason: format!("{e}"),
            })?;
        Ok(salt)
    }
}

static PSEUDO_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Non-cryptographic last resort: an alphanumeric string from a clock-seeded
/// `SmallRng`. Salts produced here are predictable.
#[derive(Debug, Default, Clone, Copy)]
pub struct PseudoRandom;

impl RandomSource for PseudoRandom {
    fn name(&self) -> &'static str {
        "pseudo"
    }

    fn is_secure(&self) -> bool {
        false
    }

    fn fill_salt(&self) -> Result<Vec<u8>, EntropyError> {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        let bump = PSEUDO_COUNTER.fetch_add(1, Ordering::Relaxed);
        let rng = SmallRng::seed_from_u64(nanos ^ bump.rotate_left(32));
        Ok(rng.sample_iter(Alphanumeric).take(PSEUDO_SALT_LEN).collect())
    }
}

/// Whether the chain may fall through to a non-cryptographic source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InsecureFallback {
    #[default]
    Refuse,
    Permit,
}

/// Ordered list of salt sources evaluated on every call.
pub struct EntropyChain {
    sources: Vec<Box<dyn RandomSource>>,
    fallback: InsecureFallback,
}

impl EntropyChain {
    /// Builds a chain that tries `sources` in order.
    pub fn new(sources: Vec<Box<dyn RandomSource>>, fallback: InsecureFallback) -> Self {
        Self { sources, fallback }
    }

    /// OS generator, then the thread-local generator, then the pseudo source.
    pub fn system_default() -> Self {
        Self::new(
            vec![
                Box::new(SystemRandom),
                Box::new(ThreadRandom),
                Box::new(PseudoRandom),
            ],
            InsecureFallback::Refuse,
        )
    }

    /// Replaces the insecure-source policy.
    pub fn with_fallback(mut self, fallback: InsecureFallback) -> Self {
        self.fallback = fallback;
        self
    }

    /// Current insecure-source policy.
    pub fn fallback(&self) -> InsecureFallback {
        self.fallback
    }

    /// Returns salt material from the first source that succeeds.
    pub fn salt_bytes(&self) -> Result<Vec<u8>, EntropyError> {
        let mut tried = Vec::with_capacity(self.sources.len());
        for source in &self.sources {
            if !source.is_secure() && self.fallback == InsecureFallback::Refuse {
                debug!(source = source.name(), "skipping insecure salt source");
                continue;
            }
            tried.push(source.name());
            match source.fill_salt() {
                Ok(bytes) => {
                    if source.is_secure() {
                        debug!(source = source.name(), "salt generated");
                    } else {
                        warn!(
                            source = source.name(),
                            "no secure random source available; salt generated from a non-cryptographic generator"
                        );
                    }
                    return Ok(bytes);
                }
                Err(err) => debug!(source = source.name(), error = %err, "salt source failed"),
            }
        }
        Err(EntropyError::RandomSourceUnavailable {
            tried: if tried.is_empty() {
                "none".to_string()
            } else {
                tried.join(", ")
            },
        })
    }
}

impl Default for EntropyChain {
    fn default() -> Self {
        Self::system_default()
    }
}

impl fmt::Debug for EntropyChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.sources.iter().map(|s| s.name()).collect();
        f.debug_struct("EntropyChain")
            .field("sources", &names)
            .field("fallback", &self.fallback)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{
        EntropyChain, EntropyError, InsecureFallback, PseudoRandom, RandomSource, PSEUDO_SALT_LEN,
        SALT_LEN,
    };

    struct Broken;

    impl RandomSource for Broken {
        fn name(&self) -> &'static str {
            "broken"
        }

        fn is_secure(&self) -> bool {
            true
        }

        fn fill_salt(&self) -> Result<Vec<u8>, EntropyError> {
            Err(EntropyError::SourceFailed {
                source_name: self.name(),
                reason: "device unplugged".to_string(),
            })
        }
    }

    struct Fixed(u8);

    impl RandomSource for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn is_secure(&self) -> bool {
            true
        }

        fn fill_salt(&self) -> Result<Vec<u8>, EntropyError> {
            Ok(vec![self.0; SALT_LEN])
        }
    }

    #[test]
    fn default_chain_yields_sixteen_bytes() {
        assert_eq!(EntropyChain::default().fallback(), InsecureFallback::Refuse);
        let salt = EntropyChain::default().salt_bytes().expect("os rng available");
        assert_eq!(salt.len(), SALT_LEN);
    }

    #[test]
    fn falls_through_to_next_secure_source() {
        let chain = EntropyChain::new(
            vec![Box::new(Broken), Box::new(Fixed(7))],
            InsecureFallback::Refuse,
        );
        assert_eq!(chain.salt_bytes().unwrap(), vec![7u8; SALT_LEN]);
    }

    #[test]
    fn refuses_pseudo_source_by_default() {
        let chain = EntropyChain::new(
            vec![Box::new(Broken), Box::new(PseudoRandom)],
            InsecureFallback::Refuse,
        );
        let err = chain.salt_bytes().unwrap_err();
        assert!(matches!(err, EntropyError::RandomSourceUnavailable { .. }));
        assert!(format!("{err}").contains("broken"));
        assert!(!format!("{err}").contains("pseudo"));
    }

    #[test]
    fn permits_pseudo_source_when_asked() {
        let chain = EntropyChain::new(
            vec![Box::new(Broken), Box::new(PseudoRandom)],
            InsecureFallback::Refuse,
        )
        .with_fallback(InsecureFallback::Permit);
        assert_eq!(chain.fallback(), InsecureFallback::Permit);
        let salt = chain.salt_bytes().expect("pseudo source always succeeds");
        assert_eq!(salt.len(), PSEUDO_SALT_LEN);
        assert!(salt.iter().all(u8::is_ascii_alphanumeric));
    }

    #[test]
    fn empty_chain_is_unavailable() {
        let chain = EntropyChain::new(Vec::new(), InsecureFallback::Permit);
        let err = chain.salt_bytes().unwrap_err();
        assert!(format!("{err}").contains("tried: none"));
    }
}

//! Bcrypt password hashing.
//! Hashes are produced in the modular crypt format
//! `$2a$<cost>$<22-char salt><31-char digest>` so any conforming Bcrypt
//! verifier can check them.

use std::fmt;

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use bcrypt::Version;
use constant_time_eq::constant_time_eq;
use thiserror::Error;
use tracing::debug;

use crate::crypto::entropy::{EntropyChain, EntropyError};

pub const DEFAULT_ROUNDS: u32 = 8;
pub const MIN_ROUNDS: u32 = 4;
pub const MAX_ROUNDS: u32 = 31;

const SALT_CHARS: usize = 22;
const SETTINGS_LEN: usize = 7 + SALT_CHARS;
const HASH_LEN: usize = SETTINGS_LEN + 31;

/// Bcrypt's base64 alphabet. The 22nd salt character only contributes two
/// bits, so trailing bits are ignored when decoding.
const BCRYPT_SALT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::BCRYPT,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_allow_trailing_bits(true)
        .with_decode_padding_mode(DecodePaddingMode::RequireNone),
);

#[derive(Debug, Error)]
pub enum PasswordError {
    #[error("cost {0} outside the supported range 4..=31")]
    InvalidCost(u32),
    #[error("invalid bcrypt salt: {0}")]
    InvalidSalt(String),
    #[error("malformed bcrypt hash: {0}")]
    MalformedHash(String),
    #[error("bcrypt failed: {0}")]
    HashingPrimitiveFailure(String),
    #[error(transparent)]
    Entropy(#[from] EntropyError),
}

/// Version tag of a Bcrypt hash. `$2x$` is not accepted: it marks hashes from
/// the sign-extension bug, which the `bcrypt` crate cannot reproduce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Revision {
    TwoA,
    TwoB,
    TwoY,
}

impl Revision {
    fn parse(tag: &str) -> Option<Self> {
        match tag {
            "2a" => Some(Revision::TwoA),
            "2b" => Some(Revision::TwoB),
            "2y" => Some(Revision::TwoY),
            _ => None,
        }
    }

    /// The two-character tag written between the first two `$`.
    pub fn tag(self) -> &'static str {
        match self {
            Revision::TwoA => "2a",
            Revision::TwoB => "2b",
            Revision::TwoY => "2y",
        }
    }

    fn version(self) -> Version {
        match self {
            Revision::TwoA => Version::TwoA,
            Revision::TwoB => Version::TwoB,
            Revision::TwoY => Version::TwoY,
        }
    }
}

/// The `$2a$08$<salt>` prefix that selects version, cost and salt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BcryptSettings {
    revision: Revision,
    cost: u32,
    salt: String,
}

impl BcryptSettings {
    /// Builds `$2a$` settings from a cost and an already encoded salt.
    pub fn new(cost: u32, salt: &str) -> Result<Self, PasswordError> {
        validate_cost(cost)?;
        validate_salt(salt)?;
        Ok(Self {
            revision: Revision::TwoA,
            cost,
            salt: salt.to_string(),
        })
    }

    /// Parses settings from the start of `input`, which may be a bare settings
    /// string or a complete hash.
    pub fn parse(input: &str) -> Result<Self, PasswordError> {
        if !input.is_ascii() || input.len() < SETTINGS_LEN {
            return Err(PasswordError::MalformedHash(
                "too short or not ascii".to_string(),
            ));
        }
        let bytes = input.as_bytes();
        if bytes[0] != b'$' || bytes[3] != b'$' || bytes[6] != b'$' {
            return Err(PasswordError::MalformedHash(
                "expected $<version>$<cost>$ prefix".to_string(),
            ));
        }
        let revision = Revision::parse(&input[1..3]).ok_or_else(|| {
            PasswordError::MalformedHash(format!("unknown version tag {}", &input[1..3]))
        })?;
        let cost_digits = &input[4..6];
        if !cost_digits.bytes().all(|b| b.is_ascii_digit()) {
            return Err(PasswordError::MalformedHash(format!(
                "cost {cost_digits} is not two digits"
            )));
        }
        let cost = cost_digits
            .parse::<u32>()
            .map_err(|e| PasswordError::MalformedHash(format!("{e}")))?;
        validate_cost(cost)?;
        let salt = &input[7..SETTINGS_LEN];
        validate_salt(salt)?;
        Ok(Self {
            revision,
            cost,
            salt: salt.to_string(),
        })
    }

    /// Version tag the hash is emitted with.
    pub fn revision(&self) -> Revision {
        self.revision
    }

    /// Work factor, as a power-of-two exponent.
    pub fn cost(&self) -> u32 {
        self.cost
    }

    /// The 22-character encoded salt.
    pub fn salt(&self) -> &str {
        &self.salt
    }

    /// Runs Bcrypt over `value` with these settings and returns the full hash.
    pub fn hash(&self, value: impl AsRef<[u8]>) -> Result<String, PasswordError> {
        let raw_salt = BCRYPT_SALT
            .decode(self.salt.as_bytes())
            .map_err(|e| PasswordError::InvalidSalt(format!("{e}")))?;
        let raw_salt: [u8; 16] = raw_salt.as_slice().try_into().map_err(|_| {
            PasswordError::InvalidSalt(format!("decoded to {} bytes", raw_salt.len()))
        })?;
        let parts = bcrypt::hash_with_salt(value, self.cost, raw_salt)
            .map_err(|e| PasswordError::HashingPrimitiveFailure(format!("{e}")))?;
        Ok(parts.format_for_version(self.revision.version()))
    }
}

impl fmt::Display for BcryptSettings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "${}${:02}${}", self.revision.tag(), self.cost, self.salt)
    }
}

pub(crate) fn validate_cost(cost: u32) -> Result<(), PasswordError> {
    if (MIN_ROUNDS..=MAX_ROUNDS).contains(&cost) {
        Ok(())
    } else {
        Err(PasswordError::InvalidCost(cost))
    }
}

fn validate_salt(salt: &str) -> Result<(), PasswordError> {
    if salt.len() != SALT_CHARS {
        return Err(PasswordError::InvalidSalt(format!(
            "expected {SALT_CHARS} characters, got {}",
            salt.len()
        )));
    }
    match salt
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '.' || *c == '/'))
    {
        Some(bad) => Err(PasswordError::InvalidSalt(format!(
            "character {bad:?} is outside the bcrypt alphabet"
        ))),
        None => Ok(()),
    }
}

/// Turns raw salt material into a 22-character Bcrypt salt: standard base64
/// with `+` mapped to `.`, truncated.
pub fn encode_salt(material: &[u8]) -> Result<String, PasswordError> {
    let encoded = STANDARD.encode(material).replace('+', ".");
    match encoded.get(..SALT_CHARS) {
        Some(salt) => Ok(salt.to_string()),
        None => Err(PasswordError::InvalidSalt(format!(
            "{} bytes of salt material is not enough",
            material.len()
        ))),
    }
}

/// Hashes `value` at the default cost with a salt from the default entropy chain.
pub fn make(value: impl AsRef<[u8]>) -> Result<String, PasswordError> {
    make_with_rounds(value, DEFAULT_ROUNDS)
}

/// Hashes `value` at the given cost.
pub fn make_with_rounds(value: impl AsRef<[u8]>, rounds: u32) -> Result<String, PasswordError> {
    make_with_entropy(value, rounds, &EntropyChain::system_default())
}

/// Hashes `value` at the given cost, drawing the salt from `entropy`.
pub fn make_with_entropy(
    value: impl AsRef<[u8]>,
    rounds: u32,
    entropy: &EntropyChain,
) -> Result<String, PasswordError> {
    validate_cost(rounds)?;
    let material = entropy.salt_bytes()?;
    let settings = BcryptSettings::new(rounds, &encode_salt(&material)?)?;
    settings.hash(value)
}

/// Checks `value` against a stored Bcrypt hash. Malformed hashes never match.
pub fn check(value: impl AsRef<[u8]>, hash: &str) -> bool {
    if hash.len() != HASH_LEN {
        debug!(len = hash.len(), "rejecting bcrypt hash of unexpected length");
        return false;
    }
    let settings = match BcryptSettings::parse(hash) {
        Ok(settings) => settings,
        Err(err) => {
            debug!(error = %err, "rejecting malformed bcrypt hash");
            return false;
        }
    };
    match settings.hash(value) {
        Ok(computed) => constant_time_eq(computed.as_bytes(), hash.as_bytes()),
        Err(err) => {
            debug!(error = %err, "bcrypt failed during check");
            false
        }
    }
}

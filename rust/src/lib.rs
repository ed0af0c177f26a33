//! Bcrypt password hashing plus SHA-2 digest and HMAC helpers.
//! Everything here is stateless; `Hasher` only carries injected dependencies
//! (application key, salt entropy chain, default cost).

pub mod config;
pub mod crypto;
pub mod hasher;

pub use crypto::integrity::{sha256_digest, sha256_hex, sha512_digest, sha512_hex, ApplicationKey};
pub use crypto::passwords::{check, make, make_with_rounds};
pub use hasher::Hasher;

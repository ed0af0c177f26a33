//! Central cryptography module: password hashing, salt entropy and integrity
//! helpers. Each submodule focuses on a single responsibility.

pub mod entropy;
pub mod integrity;
pub mod passwords;

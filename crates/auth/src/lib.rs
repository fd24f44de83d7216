//! Account security for polibrief.
//!
//! Provides:
//! - **Passwords**: salted PBKDF2-HMAC-SHA256 hashes (`pbkdf2` crate) with constant-time verification
//! - **Tokens**: HS256 JWTs (`jsonwebtoken`) carrying the user's identity

pub mod password;
pub mod token;

pub use password::{hash_password, verify_password, DEFAULT_ITERATIONS};
pub use token::{Claims, TokenPair, TokenSigner, TokenType};

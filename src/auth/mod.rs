//! Authentication module
//!
//! Password hashing, login sessions, the per-request `Viewer`, and the
//! signed tokens used for password resets.

pub mod identity;
pub mod password;
pub mod reset_token;
pub mod service;

pub use identity::Viewer;
pub use password::CredentialHasher;
pub use reset_token::ResetTokens;
pub use service::{AuthService, Claims, SESSION_COOKIE};

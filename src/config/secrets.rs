//! Secret handling utilities.
//!
//! Re-exports the secrecy types the config layer hands out, so callers
//! expose the database URL explicitly at the point of use.

pub use secrecy::{ExposeSecret, SecretString};

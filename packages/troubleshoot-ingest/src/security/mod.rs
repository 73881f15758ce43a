//! Secret handling.

pub mod credentials;

pub use credentials::{SecretString, SiteCredentials};

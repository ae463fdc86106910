//! Session credential models: credential kinds, redacted secrets, and credential pairs.

pub mod credential;
pub mod secret;

pub use credential::*;
pub use secret::*;

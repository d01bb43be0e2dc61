//! Router Module Index
//!
//! Routes are split by who may reach them. Authentication is applied as a
//! layer on the authenticated router, so a handler placed there can never be
//! reached without a resolved identity.

/// Read-only resource access and the OAuth entry points. No credential needed.
pub mod public;

/// Mutations and the current-identity lookup. Wrapped in the auth layer.
pub mod authenticated;

/// Stand-ins for external services, mounted only in `Env::Local`.
pub mod development;

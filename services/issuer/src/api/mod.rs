//! Issuer HTTP API module.
//!
//! # Purpose
//! Route handlers for the public surface (token issuance, discovery, health)
//! and the internal invocation surface (rotation steps, platform-shaped sign
//! events). Handlers are thin adapters over `signer` and `rotation`.
pub mod discovery;
pub mod error;
pub mod invoke;
pub mod system;
pub mod token;
pub mod types;

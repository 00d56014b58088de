//! STS token issuer library crate.
//!
//! # Purpose
//! Exposes configuration, observability, the key/artifact/lease stores, the
//! key rotation engine and workflow, the token signer and the HTTP routers
//! for use by the binary and tests.
pub mod api;
pub mod app;
pub mod config;
pub mod observability;
pub mod rotation;
pub mod signer;
pub mod store;

//! JOSE primitives shared by the STS token issuer and its relying parties.
//!
//! # Purpose
//! Centralizes the JWK/JWKS model, the OpenID discovery document, compact JWT
//! assembly for externally-signed tokens and caller-identity parsing.
//!
//! # How it fits
//! The issuer service derives JWKs from key-store public keys, publishes the
//! JWKS and discovery document, and assembles tokens around signatures
//! produced by the key store. Relying parties can use [`verify_token`] against
//! the published JWKS.
//!
//! # Key invariants
//! - Tokens are RS256 only.
//! - A key's `kid` is its RFC 7638 thumbprint, so the same public key always
//!   maps to the same `kid`.
//! - A JWKS only ever carries public key material.
//!
//! # Examples
//! ```rust
//! use sts_jose::{OpenIdConfiguration, parse_identity};
//!
//! let identity = parse_identity(
//!     "arn:aws:sts:eu-west-1:123456789012:assumed-role/deployer/session",
//! )
//! .unwrap();
//! assert_eq!(identity.base_role_arn(), "arn:aws:iam:eu-west-1:123456789012:role/deployer");
//!
//! let config = OpenIdConfiguration::for_issuer("https://oidc.example.com");
//! assert_eq!(config.jwks_uri, "https://oidc.example.com/discovery/keys");
//! ```
//!
//! # Common pitfalls
//! - The issuer string must match byte-for-byte between the discovery document,
//!   the `iss` claim and the verifier's expectation.
//! - `parse_identity` does not authenticate anything; callers must only feed it
//!   ARNs asserted by a trusted upstream.

mod discovery;
mod errors;
mod identity;
mod jwks;
mod token;

pub use discovery::{JWKS_PATH, OPENID_CONFIGURATION_PATH, OpenIdConfiguration};
pub use errors::{JoseError, JoseResult};
pub use identity::{CallerIdentity, parse_identity};
pub use jwks::{Jwk, Jwks, KeyUse, RS256, RSA_KEY_TYPE, rsa_thumbprint};
pub use token::{
    JwtHeader, NOT_BEFORE_SKEW_SECS, TOKEN_TTL_SECS, TokenClaims, assemble, decode_unverified,
    signing_input, verify_token,
};

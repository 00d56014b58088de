//! Compact JWT assembly for externally-signed tokens, and RS256 verification
//! against a published key set.
//!
//! Signing happens outside this crate (the private key never leaves the key
//! store), so tokens are built in two halves: [`signing_input`] produces the
//! bytes to sign and [`assemble`] appends the detached signature.
use crate::{JoseError, JoseResult, Jwks, RS256};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, Validation};
use serde::{Deserialize, Serialize};

/// Lifetime of an issued token in seconds.
pub const TOKEN_TTL_SECS: i64 = 60 * 60;
/// How far `nbf` is backdated from `iat`, absorbing relying-party clock skew.
pub const NOT_BEFORE_SKEW_SECS: i64 = 5 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JwtHeader {
    pub alg: String,
    pub typ: String,
    pub kid: String,
}

impl JwtHeader {
    pub fn rs256(kid: impl Into<String>) -> Self {
        Self {
            alg: RS256.to_string(),
            typ: "JWT".to_string(),
            kid: kid.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    pub sub: String,
    pub aud: String,
    pub iss: String,
    pub iat: i64,
    pub exp: i64,
    pub nbf: i64,
}

impl TokenClaims {
    /// Claims for a token issued at `now` (seconds since the epoch).
    pub fn issued_at(
        subject: impl Into<String>,
        audience: impl Into<String>,
        issuer: impl Into<String>,
        now: i64,
    ) -> Self {
        Self {
            sub: subject.into(),
            aud: audience.into(),
            iss: issuer.into(),
            iat: now,
            exp: now + TOKEN_TTL_SECS,
            nbf: now - NOT_BEFORE_SKEW_SECS,
        }
    }
}

/// `base64url(header) "." base64url(claims)`, the byte sequence a JWS signs.
///
/// # Errors
/// - `JoseError::Json` if either half fails to serialize.
pub fn signing_input(header: &JwtHeader, claims: &TokenClaims) -> JoseResult<String> {
    let header = URL_SAFE_NO_PAD.encode(serde_json::to_vec(header)?);
    let claims = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);
    Ok(format!("{header}.{claims}"))
}

/// Append a raw signature to a signing input, producing the compact token.
pub fn assemble(signing_input: &str, signature: &[u8]) -> String {
    format!("{signing_input}.{}", URL_SAFE_NO_PAD.encode(signature))
}

/// Verify an RS256 token against a key set, selecting the key by `kid`.
///
/// Checks signature, `iss`, `aud`, `exp` and `nbf` (with the default 60s
/// leeway) and returns the claims.
///
/// # Errors
/// - `JoseError::MissingKid` / `JoseError::UnknownKid` if no key can be selected.
/// - `JoseError::Jwt` for malformed tokens, bad signatures or failed claim checks.
pub fn verify_token(
    jwks: &Jwks,
    token: &str,
    issuer: &str,
    audience: &str,
) -> JoseResult<TokenClaims> {
    let header = jsonwebtoken::decode_header(token)?;
    let kid = header.kid.ok_or(JoseError::MissingKid)?;
    let jwk = jwks
        .find(&kid)
        .ok_or_else(|| JoseError::UnknownKid(kid.clone()))?;
    let decoding_key = jwk.decoding_key()?;

    let mut validation = Validation::new(Algorithm::RS256);
    validation.set_issuer(&[issuer]);
    validation.set_audience(&[audience]);
    validation.validate_nbf = true;
    let data = jsonwebtoken::decode::<TokenClaims>(token, &decoding_key, &validation)?;
    Ok(data.claims)
}

/// Split a compact token without verifying it. Used for diagnostics and tests.
///
/// # Errors
/// - `JoseError::MalformedToken` unless there are exactly three segments that
///   decode to a JSON header and claims.
pub fn decode_unverified(token: &str) -> JoseResult<(JwtHeader, TokenClaims, Vec<u8>)> {
    let mut parts = token.split('.');
    let (Some(header), Some(claims), Some(signature), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return Err(JoseError::MalformedToken(
            "expected three segments".to_string(),
        ));
    };
    let decode = |segment: &str| {
        URL_SAFE_NO_PAD
            .decode(segment)
            .map_err(|err| JoseError::MalformedToken(err.to_string()))
    };
    let header: JwtHeader = serde_json::from_slice(&decode(header)?)?;
    let claims: TokenClaims = serde_json::from_slice(&decode(claims)?)?;
    Ok((header, claims, decode(signature)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Jwk;
    use rsa::pkcs1v15::SigningKey;
    use rsa::pkcs8::EncodePublicKey;
    use rsa::sha2::Sha256;
    use rsa::signature::{SignatureEncoding, Signer};
    use rsa::{RsaPrivateKey, RsaPublicKey};

    fn now() -> i64 {
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("clock")
            .as_secs() as i64
    }

    fn keypair() -> (RsaPrivateKey, Jwk) {
        let private = RsaPrivateKey::new(&mut rand::thread_rng(), 2048).expect("key");
        let der = RsaPublicKey::from(&private)
            .to_public_key_der()
            .expect("der");
        let jwk = Jwk::from_public_key_der(der.as_bytes()).expect("jwk");
        (private, jwk)
    }

    fn sign(private: &RsaPrivateKey, jwk: &Jwk, claims: &TokenClaims) -> String {
        let input = signing_input(&JwtHeader::rs256(jwk.kid.clone()), claims).expect("input");
        let signer = SigningKey::<Sha256>::new(private.clone());
        let signature = signer.sign(input.as_bytes()).to_vec();
        assemble(&input, &signature)
    }

    #[test]
    fn claims_lifetime_and_skew() {
        let claims = TokenClaims::issued_at("sub", "aud", "iss", 1_577_836_800);
        assert_eq!(claims.exp - claims.iat, 3600);
        assert_eq!(claims.iat - claims.nbf, 300);
    }

    #[test]
    fn assemble_strips_padding() {
        let token = assemble("a.b", b"i-am-a-signature");
        let signature = token.rsplit('.').next().expect("signature");
        assert_eq!(signature, "aS1hbS1hLXNpZ25hdHVyZQ");
        assert!(!signature.contains('='));
    }

    #[test]
    fn decode_unverified_roundtrips_header_and_claims() {
        let header = JwtHeader::rs256("kid-1");
        let claims = TokenClaims::issued_at("sub", "aud", "iss", 100);
        let token = assemble(&signing_input(&header, &claims).expect("input"), b"sig");
        let (decoded_header, decoded_claims, signature) =
            decode_unverified(&token).expect("decode");
        assert_eq!(decoded_header, header);
        assert_eq!(decoded_claims, claims);
        assert_eq!(signature, b"sig");
    }

    #[test]
    fn decode_unverified_rejects_wrong_segment_count() {
        assert!(matches!(
            decode_unverified("a.b"),
            Err(JoseError::MalformedToken(_))
        ));
        assert!(matches!(
            decode_unverified("a.b.c.d"),
            Err(JoseError::MalformedToken(_))
        ));
    }

    #[test]
    fn verify_accepts_token_signed_by_published_key() {
        let (private, jwk) = keypair();
        let claims = TokenClaims::issued_at("role", "aud-1", "https://issuer", now());
        let token = sign(&private, &jwk, &claims);
        let jwks = Jwks { keys: vec![jwk] };
        let verified = verify_token(&jwks, &token, "https://issuer", "aud-1").expect("verify");
        assert_eq!(verified, claims);
    }

    #[test]
    fn verify_rejects_unknown_kid_and_wrong_audience() {
        let (private, jwk) = keypair();
        let claims = TokenClaims::issued_at("role", "aud-1", "https://issuer", now());
        let token = sign(&private, &jwk, &claims);

        let empty = Jwks::default();
        assert!(matches!(
            verify_token(&empty, &token, "https://issuer", "aud-1"),
            Err(JoseError::UnknownKid(_))
        ));

        let jwks = Jwks { keys: vec![jwk] };
        assert!(matches!(
            verify_token(&jwks, &token, "https://issuer", "other-aud"),
            Err(JoseError::Jwt(_))
        ));
        assert!(matches!(
            verify_token(&jwks, &token, "https://other-issuer", "aud-1"),
            Err(JoseError::Jwt(_))
        ));
    }

    #[test]
    fn verify_rejects_expired_token() {
        let (private, jwk) = keypair();
        let claims = TokenClaims::issued_at("role", "aud-1", "https://issuer", now() - 7200);
        let token = sign(&private, &jwk, &claims);
        let jwks = Jwks { keys: vec![jwk] };
        assert!(verify_token(&jwks, &token, "https://issuer", "aud-1").is_err());
    }
}

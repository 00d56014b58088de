//! RSA JSON Web Keys derived from DER public keys.
//!
//! # Key invariants
//! - `kid` is the RFC 7638 SHA-256 thumbprint of the key's required members
//!   (`e`, `kty`, `n`), so deriving a JWK twice from the same public key always
//!   yields the same `kid`, `n` and `e`.
//! - Only public material is ever represented here.
use crate::{JoseError, JoseResult};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rsa::RsaPublicKey;
use rsa::pkcs8::DecodePublicKey;
use rsa::traits::PublicKeyParts;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const RSA_KEY_TYPE: &str = "RSA";
pub const RS256: &str = "RS256";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyUse {
    Sig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwk {
    pub kty: String,
    pub n: String,
    pub e: String,
    pub kid: String,
    pub alg: String,
    #[serde(rename = "use")]
    pub use_field: KeyUse,
}

impl Jwk {
    /// Build the signing JWK for a DER-encoded `SubjectPublicKeyInfo` RSA key.
    ///
    /// # Errors
    /// - `JoseError::InvalidPublicKey` if the bytes are not an RSA SPKI document.
    pub fn from_public_key_der(der: &[u8]) -> JoseResult<Self> {
        let key = RsaPublicKey::from_public_key_der(der)
            .map_err(|err| JoseError::InvalidPublicKey(err.to_string()))?;
        let n = URL_SAFE_NO_PAD.encode(key.n().to_bytes_be());
        let e = URL_SAFE_NO_PAD.encode(key.e().to_bytes_be());
        let kid = rsa_thumbprint(&n, &e);
        Ok(Self {
            kty: RSA_KEY_TYPE.to_string(),
            n,
            e,
            kid,
            alg: RS256.to_string(),
            use_field: KeyUse::Sig,
        })
    }

    /// Decoding key for RS256 verification against this JWK.
    ///
    /// # Errors
    /// - `JoseError::UnsupportedKeyType` for non-RSA keys.
    /// - `JoseError::Jwt` if `n`/`e` are not valid base64url.
    pub fn decoding_key(&self) -> JoseResult<jsonwebtoken::DecodingKey> {
        if self.kty != RSA_KEY_TYPE {
            return Err(JoseError::UnsupportedKeyType(self.kty.clone()));
        }
        Ok(jsonwebtoken::DecodingKey::from_rsa_components(
            &self.n, &self.e,
        )?)
    }
}

/// RFC 7638 thumbprint of an RSA key: base64url(SHA-256 of the canonical
/// member object with keys in lexicographic order and no whitespace).
pub fn rsa_thumbprint(n: &str, e: &str) -> String {
    let canonical = format!(r#"{{"e":"{e}","kty":"{RSA_KEY_TYPE}","n":"{n}"}}"#);
    URL_SAFE_NO_PAD.encode(Sha256::digest(canonical.as_bytes()))
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Jwks {
    pub keys: Vec<Jwk>,
}

impl Jwks {
    pub fn find(&self, kid: &str) -> Option<&Jwk> {
        self.keys.iter().find(|key| key.kid == kid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::engine::general_purpose::STANDARD;

    const PREVIOUS_DER: &str = "MIIBIjANBgkqhkiG9w0BAQEFAAOCAQ8AMIIBCgKCAQEAt0O+biOuAYD5FrM2R6dAliN1v9HA5XpsuoAtXTn8OVKsLvvBFEhBFlghvSXPpu71vE/JYpUj0lL7J54o/RmCz9ZRDzojLU7aWEYM2sEC9nO2ITdu8it+rr3faa70+7PGW09o4iFD+mXYUgadYT8VWxrKQ3eV/LQrSM+6/KYl3BhlNZNxwjtbHGWAldOlzvy14I59GU5W/zDPgOIWSQBbpRvoJKT2rzOZYDtn7C62197hJYAU7QIZ4mOz/ia10ayFFI7p2Uogku3tY5cyYEtSWGzlTL3EiEzSvvsfQ0717bA5ybbDqCWtShg8+IoOxmby4K9X7XuGAQZYE/fgNAXg3wIDAQAB";
    const PREVIOUS_N: &str = "t0O-biOuAYD5FrM2R6dAliN1v9HA5XpsuoAtXTn8OVKsLvvBFEhBFlghvSXPpu71vE_JYpUj0lL7J54o_RmCz9ZRDzojLU7aWEYM2sEC9nO2ITdu8it-rr3faa70-7PGW09o4iFD-mXYUgadYT8VWxrKQ3eV_LQrSM-6_KYl3BhlNZNxwjtbHGWAldOlzvy14I59GU5W_zDPgOIWSQBbpRvoJKT2rzOZYDtn7C62197hJYAU7QIZ4mOz_ia10ayFFI7p2Uogku3tY5cyYEtSWGzlTL3EiEzSvvsfQ0717bA5ybbDqCWtShg8-IoOxmby4K9X7XuGAQZYE_fgNAXg3w";
    const PREVIOUS_KID: &str = "reND9IAI5hj2pe8UfKm2X6r-SjW1v7s23oC3_N5WPiQ";

    #[test]
    fn jwk_from_der_matches_known_vector() {
        let der = STANDARD.decode(PREVIOUS_DER).expect("der");
        let jwk = Jwk::from_public_key_der(&der).expect("jwk");
        assert_eq!(jwk.kty, "RSA");
        assert_eq!(jwk.e, "AQAB");
        assert_eq!(jwk.n, PREVIOUS_N);
        assert_eq!(jwk.kid, PREVIOUS_KID);
        assert_eq!(jwk.alg, "RS256");
        assert_eq!(jwk.use_field, KeyUse::Sig);
    }

    #[test]
    fn jwk_derivation_is_idempotent() {
        let der = STANDARD.decode(PREVIOUS_DER).expect("der");
        let first = Jwk::from_public_key_der(&der).expect("first");
        let second = Jwk::from_public_key_der(&der).expect("second");
        assert_eq!(first, second);
    }

    #[test]
    fn jwk_rejects_garbage_der() {
        let err = Jwk::from_public_key_der(b"not a key").expect_err("garbage");
        assert!(matches!(err, JoseError::InvalidPublicKey(_)));
    }

    #[test]
    fn jwk_serializes_use_field() {
        let der = STANDARD.decode(PREVIOUS_DER).expect("der");
        let jwk = Jwk::from_public_key_der(&der).expect("jwk");
        let value = serde_json::to_value(&jwk).expect("json");
        assert_eq!(value["use"], "sig");
        assert_eq!(value["kty"], "RSA");
        assert!(value.get("use_field").is_none());
    }

    #[test]
    fn jwks_find_by_kid() {
        let der = STANDARD.decode(PREVIOUS_DER).expect("der");
        let jwks = Jwks {
            keys: vec![Jwk::from_public_key_der(&der).expect("jwk")],
        };
        assert!(jwks.find(PREVIOUS_KID).is_some());
        assert!(jwks.find("other").is_none());
    }

    #[test]
    fn decoding_key_rejects_non_rsa() {
        let jwk = Jwk {
            kty: "OKP".to_string(),
            n: String::new(),
            e: String::new(),
            kid: "k1".to_string(),
            alg: "EdDSA".to_string(),
            use_field: KeyUse::Sig,
        };
        assert!(matches!(
            jwk.decoding_key(),
            Err(JoseError::UnsupportedKeyType(_))
        ));
    }
}

use serde::{Deserialize, Serialize};

/// Object key the JWKS is published under, relative to the issuer URL.
pub const JWKS_PATH: &str = "discovery/keys";
/// Object key of the OpenID discovery document, relative to the issuer URL.
pub const OPENID_CONFIGURATION_PATH: &str = ".well-known/openid-configuration";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenIdConfiguration {
    pub issuer: String,
    pub jwks_uri: String,
    pub response_types_supported: Vec<String>,
    pub id_token_signing_alg_values_supported: Vec<String>,
    pub scopes_supported: Vec<String>,
    pub token_endpoint_auth_methods_supported: Vec<String>,
    pub claims_supported: Vec<String>,
}

impl OpenIdConfiguration {
    pub fn for_issuer(issuer: &str) -> Self {
        Self {
            issuer: issuer.to_string(),
            jwks_uri: format!("{issuer}/{JWKS_PATH}"),
            response_types_supported: strings(&["token"]),
            id_token_signing_alg_values_supported: strings(&[crate::RS256]),
            scopes_supported: strings(&["openid"]),
            token_endpoint_auth_methods_supported: strings(&["client_secret_basic"]),
            claims_supported: strings(&["aud", "exp", "iat", "iss", "sub"]),
        }
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jwks_uri_is_derived_from_issuer() {
        let config = OpenIdConfiguration::for_issuer("https://oidc.example.com");
        assert_eq!(config.issuer, "https://oidc.example.com");
        assert_eq!(config.jwks_uri, "https://oidc.example.com/discovery/keys");
    }

    #[test]
    fn document_shape_is_stable() {
        let config = OpenIdConfiguration::for_issuer("test-issuer.com");
        let value = serde_json::to_value(&config).expect("json");
        assert_eq!(
            value,
            serde_json::json!({
                "issuer": "test-issuer.com",
                "jwks_uri": "test-issuer.com/discovery/keys",
                "response_types_supported": ["token"],
                "id_token_signing_alg_values_supported": ["RS256"],
                "scopes_supported": ["openid"],
                "token_endpoint_auth_methods_supported": ["client_secret_basic"],
                "claims_supported": ["aud", "exp", "iat", "iss", "sub"]
            })
        );
    }
}

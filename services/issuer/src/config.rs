use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::net::SocketAddr;
use std::time::Duration;

pub const DEFAULT_CURRENT_ALIAS: &str = "alias/sts/CURRENT";
pub const DEFAULT_PREVIOUS_ALIAS: &str = "alias/sts/PREVIOUS";
pub const DEFAULT_PENDING_ALIAS: &str = "alias/sts/PENDING";
pub const DEFAULT_IDENTITY_HEADER: &str = "x-sts-caller-arn";
pub const DEFAULT_ROTATION_INTERVAL_SECS: u64 = 90 * 24 * 60 * 60;
pub const DEFAULT_ROTATION_LEASE_SECS: u64 = 600;
pub const MAX_ROTATION_INTERVAL_SECS: u64 = 10 * 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    Memory,
    Aws,
}

impl std::str::FromStr for Backend {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "aws" => Ok(Self::Aws),
            other => bail!("unknown backend {other:?} (expected memory or aws)"),
        }
    }
}

/// Names of the three key-ring aliases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyAliases {
    pub current: String,
    pub previous: String,
    pub pending: String,
}

impl Default for KeyAliases {
    fn default() -> Self {
        Self {
            current: DEFAULT_CURRENT_ALIAS.to_string(),
            previous: DEFAULT_PREVIOUS_ALIAS.to_string(),
            pending: DEFAULT_PENDING_ALIAS.to_string(),
        }
    }
}

// Issuer configuration sourced from environment variables, optionally
// overridden by the YAML file named in STS_CONFIG.
#[derive(Debug, Clone)]
pub struct IssuerConfig {
    pub issuer: String,
    pub default_audience: String,
    pub s3_bucket: Option<String>,
    pub aliases: KeyAliases,
    pub bind_addr: SocketAddr,
    pub internal_bind: SocketAddr,
    pub metrics_bind: SocketAddr,
    pub backend: Backend,
    pub identity_header: String,
    pub rotation_interval: Duration,
    pub skip_initial_rotation: bool,
    pub rotation_lease: Duration,
    pub alert_webhook_url: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct IssuerConfigOverride {
    issuer: Option<String>,
    default_audience: Option<String>,
    s3_bucket: Option<String>,
    current_key: Option<String>,
    previous_key: Option<String>,
    pending_key: Option<String>,
    bind_addr: Option<String>,
    internal_bind: Option<String>,
    metrics_bind: Option<String>,
    backend: Option<Backend>,
    identity_header: Option<String>,
    rotation_interval_secs: Option<u64>,
    skip_initial_rotation: Option<bool>,
    rotation_lease_secs: Option<u64>,
    alert_webhook_url: Option<String>,
}

impl IssuerConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self::from_lookup(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_env_or_yaml() -> Result<Self> {
        let mut config = Self::from_lookup(|key| std::env::var(key).ok())?;
        if let Ok(path) = std::env::var("STS_CONFIG") {
            let contents =
                fs::read_to_string(&path).with_context(|| format!("read STS_CONFIG: {path}"))?;
            config.apply_yaml(&contents)?;
        }
        config.validate()?;
        Ok(config)
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());
        let bind_addr = var("STS_BIND", "0.0.0.0:8080")
            .parse::<SocketAddr>()
            .with_context(|| "parse STS_BIND")?;
        let internal_bind = var("STS_INTERNAL_BIND", "127.0.0.1:8081")
            .parse::<SocketAddr>()
            .with_context(|| "parse STS_INTERNAL_BIND")?;
        let metrics_bind = var("STS_METRICS_BIND", "0.0.0.0:9090")
            .parse::<SocketAddr>()
            .with_context(|| "parse STS_METRICS_BIND")?;
        let backend = var("STS_BACKEND", "memory")
            .parse::<Backend>()
            .with_context(|| "parse STS_BACKEND")?;
        let rotation_interval_secs = lookup("STS_ROTATION_INTERVAL_SECS")
            .map(|value| value.parse::<u64>())
            .transpose()
            .with_context(|| "parse STS_ROTATION_INTERVAL_SECS")?
            .unwrap_or(DEFAULT_ROTATION_INTERVAL_SECS);
        let rotation_lease_secs = lookup("STS_ROTATION_LEASE_SECS")
            .map(|value| value.parse::<u64>())
            .transpose()
            .with_context(|| "parse STS_ROTATION_LEASE_SECS")?
            .unwrap_or(DEFAULT_ROTATION_LEASE_SECS);
        let skip_initial_rotation = lookup("STS_SKIP_INITIAL_ROTATION")
            .map(|value| parse_flag(&value))
            .transpose()
            .with_context(|| "parse STS_SKIP_INITIAL_ROTATION")?
            .unwrap_or(false);

        Ok(Self {
            issuer: lookup("ISSUER").unwrap_or_default(),
            default_audience: lookup("DEFAULT_AUDIENCE").unwrap_or_default(),
            s3_bucket: lookup("S3_BUCKET").filter(|value| !value.is_empty()),
            aliases: KeyAliases {
                current: var("CURRENT_KEY", DEFAULT_CURRENT_ALIAS),
                previous: var("PREVIOUS_KEY", DEFAULT_PREVIOUS_ALIAS),
                pending: var("PENDING_KEY", DEFAULT_PENDING_ALIAS),
            },
            bind_addr,
            internal_bind,
            metrics_bind,
            backend,
            identity_header: var("STS_IDENTITY_HEADER", DEFAULT_IDENTITY_HEADER),
            rotation_interval: Duration::from_secs(rotation_interval_secs),
            skip_initial_rotation,
            rotation_lease: Duration::from_secs(rotation_lease_secs),
            alert_webhook_url: lookup("STS_ALERT_WEBHOOK_URL").filter(|value| !value.is_empty()),
        })
    }

    fn apply_yaml(&mut self, contents: &str) -> Result<()> {
        let override_cfg: IssuerConfigOverride =
            serde_yaml::from_str(contents).with_context(|| "parse issuer config yaml")?;
        if let Some(value) = override_cfg.issuer {
            self.issuer = value;
        }
        if let Some(value) = override_cfg.default_audience {
            self.default_audience = value;
        }
        if let Some(value) = override_cfg.s3_bucket {
            self.s3_bucket = Some(value);
        }
        if let Some(value) = override_cfg.current_key {
            self.aliases.current = value;
        }
        if let Some(value) = override_cfg.previous_key {
            self.aliases.previous = value;
        }
        if let Some(value) = override_cfg.pending_key {
            self.aliases.pending = value;
        }
        if let Some(value) = override_cfg.bind_addr {
            self.bind_addr = value.parse().with_context(|| "parse bind_addr")?;
        }
        if let Some(value) = override_cfg.internal_bind {
            self.internal_bind = value.parse().with_context(|| "parse internal_bind")?;
        }
        if let Some(value) = override_cfg.metrics_bind {
            self.metrics_bind = value.parse().with_context(|| "parse metrics_bind")?;
        }
        if let Some(value) = override_cfg.backend {
            self.backend = value;
        }
        if let Some(value) = override_cfg.identity_header {
            self.identity_header = value;
        }
        if let Some(value) = override_cfg.rotation_interval_secs {
            self.rotation_interval = Duration::from_secs(value);
        }
        if let Some(value) = override_cfg.skip_initial_rotation {
            self.skip_initial_rotation = value;
        }
        if let Some(value) = override_cfg.rotation_lease_secs {
            self.rotation_lease = Duration::from_secs(value);
        }
        if let Some(value) = override_cfg.alert_webhook_url {
            self.alert_webhook_url = Some(value);
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.issuer.trim().is_empty() {
            bail!("ISSUER is required");
        }
        if self.default_audience.trim().is_empty() {
            bail!("DEFAULT_AUDIENCE is required");
        }
        if self.backend == Backend::Aws && self.s3_bucket.is_none() {
            bail!("S3_BUCKET is required for the aws backend");
        }
        if self.rotation_interval.is_zero() {
            bail!("STS_ROTATION_INTERVAL_SECS must be positive");
        }
        if self.rotation_interval > Duration::from_secs(MAX_ROTATION_INTERVAL_SECS) {
            bail!("STS_ROTATION_INTERVAL_SECS must not exceed {MAX_ROTATION_INTERVAL_SECS}");
        }
        let aliases = [
            &self.aliases.current,
            &self.aliases.previous,
            &self.aliases.pending,
        ];
        if aliases[0] == aliases[1] || aliases[1] == aliases[2] || aliases[0] == aliases[2] {
            bail!("CURRENT_KEY, PREVIOUS_KEY and PENDING_KEY must be distinct");
        }
        Ok(())
    }
}

fn parse_flag(value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => bail!("invalid boolean {other:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn minimal() -> Vec<(&'static str, &'static str)> {
        vec![
            ("ISSUER", "https://oidc.example.com"),
            ("DEFAULT_AUDIENCE", "sts.example.com"),
        ]
    }

    #[test]
    fn defaults_apply_when_only_required_vars_set() {
        let config = IssuerConfig::from_lookup(lookup_from(&minimal())).expect("config");
        config.validate().expect("valid");
        assert_eq!(config.aliases, KeyAliases::default());
        assert_eq!(config.backend, Backend::Memory);
        assert_eq!(config.identity_header, DEFAULT_IDENTITY_HEADER);
        assert_eq!(
            config.rotation_interval,
            Duration::from_secs(DEFAULT_ROTATION_INTERVAL_SECS)
        );
        assert!(!config.skip_initial_rotation);
        assert_eq!(config.internal_bind.to_string(), "127.0.0.1:8081");
        assert!(config.alert_webhook_url.is_none());
    }

    #[test]
    fn missing_issuer_is_rejected() {
        let config =
            IssuerConfig::from_lookup(lookup_from(&[("DEFAULT_AUDIENCE", "aud")])).expect("load");
        let err = config.validate().expect_err("issuer required");
        assert!(err.to_string().contains("ISSUER"));
    }

    #[test]
    fn aws_backend_requires_bucket() {
        let mut pairs = minimal();
        pairs.push(("STS_BACKEND", "aws"));
        let config = IssuerConfig::from_lookup(lookup_from(&pairs)).expect("load");
        let err = config.validate().expect_err("bucket required");
        assert!(err.to_string().contains("S3_BUCKET"));

        pairs.push(("S3_BUCKET", "sts-artifacts"));
        let config = IssuerConfig::from_lookup(lookup_from(&pairs)).expect("load");
        config.validate().expect("valid");
        assert_eq!(config.s3_bucket.as_deref(), Some("sts-artifacts"));
    }

    #[test]
    fn rotation_interval_is_bounded() {
        let mut pairs = minimal();
        pairs.push(("STS_ROTATION_INTERVAL_SECS", "0"));
        let config = IssuerConfig::from_lookup(lookup_from(&pairs)).expect("load");
        assert!(config.validate().is_err());

        let mut pairs = minimal();
        pairs.push(("STS_ROTATION_INTERVAL_SECS", "18446744073709551615"));
        let config = IssuerConfig::from_lookup(lookup_from(&pairs)).expect("load");
        let err = config.validate().expect_err("interval too large");
        assert!(err.to_string().contains("must not exceed"));

        let max = MAX_ROTATION_INTERVAL_SECS.to_string();
        let mut pairs = minimal();
        pairs.push(("STS_ROTATION_INTERVAL_SECS", max.as_str()));
        let config = IssuerConfig::from_lookup(lookup_from(&pairs)).expect("load");
        config.validate().expect("ten years is allowed");
    }

    #[test]
    fn alias_names_must_be_distinct() {
        let mut pairs = minimal();
        pairs.push(("PENDING_KEY", DEFAULT_CURRENT_ALIAS));
        let config = IssuerConfig::from_lookup(lookup_from(&pairs)).expect("load");
        assert!(config.validate().is_err());
    }

    #[test]
    fn invalid_values_surface_context() {
        let mut pairs = minimal();
        pairs.push(("STS_BIND", "not-an-addr"));
        let err = IssuerConfig::from_lookup(lookup_from(&pairs)).expect_err("bad bind");
        assert!(err.to_string().contains("STS_BIND"));

        let mut pairs = minimal();
        pairs.push(("STS_SKIP_INITIAL_ROTATION", "maybe"));
        let err = IssuerConfig::from_lookup(lookup_from(&pairs)).expect_err("bad flag");
        assert!(err.to_string().contains("STS_SKIP_INITIAL_ROTATION"));
    }

    #[test]
    fn yaml_overrides_env_values() {
        let mut config = IssuerConfig::from_lookup(lookup_from(&minimal())).expect("load");
        config
            .apply_yaml(
                r#"
issuer: https://override.example.com
backend: aws
s3_bucket: bucket-a
current_key: alias/custom/CURRENT
rotation_interval_secs: 60
skip_initial_rotation: true
alert_webhook_url: https://hooks.example.com/rotation
"#,
            )
            .expect("yaml");
        config.validate().expect("valid");
        assert_eq!(config.issuer, "https://override.example.com");
        assert_eq!(config.backend, Backend::Aws);
        assert_eq!(config.aliases.current, "alias/custom/CURRENT");
        assert_eq!(config.aliases.pending, DEFAULT_PENDING_ALIAS);
        assert_eq!(config.rotation_interval, Duration::from_secs(60));
        assert!(config.skip_initial_rotation);
        assert_eq!(
            config.alert_webhook_url.as_deref(),
            Some("https://hooks.example.com/rotation")
        );
    }

    #[test]
    #[serial]
    fn from_env_reads_process_environment() {
        unsafe {
            std::env::set_var("ISSUER", "https://env.example.com");
            std::env::set_var("DEFAULT_AUDIENCE", "env-aud");
            std::env::set_var("STS_SKIP_INITIAL_ROTATION", "true");
        }
        let config = IssuerConfig::from_env();
        unsafe {
            std::env::remove_var("ISSUER");
            std::env::remove_var("DEFAULT_AUDIENCE");
            std::env::remove_var("STS_SKIP_INITIAL_ROTATION");
        }
        let config = config.expect("config");
        assert_eq!(config.issuer, "https://env.example.com");
        assert_eq!(config.default_audience, "env-aud");
        assert!(config.skip_initial_rotation);
    }
}

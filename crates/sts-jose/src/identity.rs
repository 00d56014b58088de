//! Caller identity normalization.
//!
//! # Purpose
//! Turn the session-scoped assumed-role ARN supplied by the hosting platform
//! into the stable base role ARN that becomes a token's `sub` claim.
//!
//! # Trust boundary
//! Parsing is the only validation performed here. The ARN must already have
//! been authenticated upstream (e.g. by a SigV4-verifying gateway); nothing in
//! this module can tell a genuine identity from a forged string.
use regex::Regex;
use std::fmt;
use std::sync::OnceLock;

const ASSUMED_ROLE_PATTERN: &str = concat!(
    r"^arn:aws:sts:",
    r"(?P<region>[^:]*)",
    r":",
    r"(?P<account>\d{12})",
    r":assumed-role/",
    r"(?P<role>[A-Za-z0-9\-]+?)",
    r"/",
    r"(?P<session>[^:]*)$",
);

fn assumed_role_regex() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(ASSUMED_ROLE_PATTERN).expect("assumed-role pattern"))
}

/// The IAM role a caller assumed, stripped of its session name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallerIdentity {
    pub region: String,
    pub account_id: String,
    pub role_name: String,
}

impl CallerIdentity {
    /// `arn:aws:iam:<region>:<account>:role/<role-name>`
    pub fn base_role_arn(&self) -> String {
        format!(
            "arn:aws:iam:{}:{}:role/{}",
            self.region, self.account_id, self.role_name
        )
    }
}

impl fmt::Display for CallerIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base_role_arn())
    }
}

/// Parse an `arn:aws:sts:<region>:<account>:assumed-role/<role>/<session>` ARN.
///
/// Returns `None` for every string that does not have exactly that shape:
/// other services, account ids that are not 12 digits, role names outside
/// `[A-Za-z0-9-]`, or missing segments.
pub fn parse_identity(user_arn: &str) -> Option<CallerIdentity> {
    let captures = assumed_role_regex().captures(user_arn)?;
    Some(CallerIdentity {
        region: captures.name("region")?.as_str().to_string(),
        account_id: captures.name("account")?.as_str().to_string(),
        role_name: captures.name("role")?.as_str().to_string(),
    })
}

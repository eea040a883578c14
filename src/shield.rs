//! Abuse protection in front of registration.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allow,
    Deny,
}

impl Decision {
    pub fn is_denied(self) -> bool {
        self == Decision::Deny
    }
}

/// What the shield gets to look at for one request.
#[derive(Debug, Clone)]
pub struct ShieldRequest<'a> {
    pub email: &'a str,
    pub user_agent: Option<&'a str>,
}

#[async_trait]
pub trait AbuseShield: Send + Sync {
    async fn evaluate(&self, req: &ShieldRequest<'_>) -> Decision;
}

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

/// Denies malformed addresses, disposable domains and requests without a user agent.
pub struct EmailShield {
    blocked_domains: Vec<String>,
}

impl EmailShield {
    pub fn new(blocked_domains: Vec<String>) -> Self {
        Self { blocked_domains }
    }
}

#[async_trait]
impl AbuseShield for EmailShield {
    async fn evaluate(&self, req: &ShieldRequest<'_>) -> Decision {
        let email = req.email.trim().to_lowercase();
        if !is_valid_email(&email) {
            warn!(%email, "shield: invalid email");
            return Decision::Deny;
        }
        let domain = email.rsplit('@').next().unwrap_or_default();
        if self
            .blocked_domains
            .iter()
            .any(|d| domain == d || domain.ends_with(&format!(".{}", d)))
        {
            warn!(%domain, "shield: disposable email domain");
            return Decision::Deny;
        }
        if req.user_agent.map_or(true, |ua| ua.trim().is_empty()) {
            warn!(%email, "shield: missing user agent");
            return Decision::Deny;
        }
        Decision::Allow
    }
}

use anyhow::Context;
use serde::Deserialize;
use std::net::SocketAddr;

#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: String,
    pub audience: String,
    pub session_ttl_days: i64,
    pub email_verification_ttl_minutes: i64,
    pub reset_password_ttl_minutes: i64,
    pub invite_ttl_days: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: String,
    /// Base URL objects are served from; stored URLs are `{public_url}/{key}`.
    pub public_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub enum MailProvider {
    Log,
    SendGrid,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MailConfig {
    pub provider: MailProvider,
    pub api_key: Option<String>,
    pub from: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub database_url: String,
    pub client_url: String,
    pub cookie_secure: bool,
    pub jwt: JwtConfig,
    pub storage: StorageConfig,
    pub mail: MailConfig,
    pub blocked_email_domains: Vec<String>,
    pub two_factor_requires_password: bool,
    pub upload_max_bytes: usize,
    pub host: String,
    pub port: u16,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let database_url = std::env::var("DATABASE_URL")?;
        let jwt = JwtConfig {
            secret: std::env::var("JWT_SECRET")?,
            issuer: std::env::var("JWT_ISSUER").unwrap_or_else(|_| "taskly".into()),
            audience: std::env::var("JWT_AUDIENCE").unwrap_or_else(|_| "taskly-users".into()),
            session_ttl_days: env_parse("SESSION_TTL_DAYS", 7),
            email_verification_ttl_minutes: env_parse("EMAIL_VERIFICATION_TTL_MINUTES", 60),
            reset_password_ttl_minutes: env_parse("RESET_PASSWORD_TTL_MINUTES", 15),
            invite_ttl_days: env_parse("INVITE_TTL_DAYS", 7),
        };

        let storage = StorageConfig {
            endpoint: std::env::var("MINIO_ENDPOINT")?,
            bucket: std::env::var("MINIO_BUCKET").unwrap_or_else(|_| "taskly".into()),
            access_key: std::env::var("MINIO_ACCESS_KEY")?,
            secret_key: std::env::var("MINIO_SECRET_KEY")?,
            region: std::env::var("MINIO_REGION").unwrap_or_else(|_| "us-east-1".into()),
            public_url: std::env::var("STORAGE_PUBLIC_URL")?,
        };

        let provider = match std::env::var("MAIL_PROVIDER").as_deref() {
            Ok("sendgrid") => MailProvider::SendGrid,
            _ => MailProvider::Log,
        };
        let mail = MailConfig {
            provider,
            api_key: std::env::var("SENDGRID_API_KEY").ok(),
            from: std::env::var("MAIL_FROM").unwrap_or_else(|_| "no-reply@taskly.local".into()),
        };
        if mail.provider == MailProvider::SendGrid && mail.api_key.is_none() {
            anyhow::bail!("SENDGRID_API_KEY is required when MAIL_PROVIDER=sendgrid");
        }

        let blocked_email_domains = std::env::var("SHIELD_BLOCKED_DOMAINS")
            .map(|v| parse_domain_list(&v))
            .unwrap_or_default();

        Ok(Self {
            database_url,
            client_url: std::env::var("CLIENT_URL")
                .unwrap_or_else(|_| "http://localhost:5173".into())
                .trim_end_matches('/')
                .to_string(),
            cookie_secure: env_parse("COOKIE_SECURE", false),
            jwt,
            storage,
            mail,
            blocked_email_domains,
            two_factor_requires_password: env_parse("TWO_FACTOR_REQUIRES_PASSWORD", true),
            upload_max_bytes: env_parse("UPLOAD_MAX_BYTES", 5 * 1024 * 1024),
            host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".into()),
            port: env_parse("APP_PORT", 8080),
        })
    }

    pub fn bind_addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse::<T>().ok())
        .unwrap_or(default)
}

fn parse_domain_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|d| d.trim().to_lowercase())
        .filter(|d| !d.is_empty())
        .collect()
}

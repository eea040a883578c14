use axum::extract::FromRef;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use time::{Duration, OffsetDateTime};
use tracing::debug;
use uuid::Uuid;

use super::claims::{Claims, InviteClaims, TokenPurpose};
use crate::{config::JwtConfig, state::AppState, workspaces::repo_types::WorkspaceRole};

/// Holds JWT signing and verification keys with per-purpose lifetimes.
#[derive(Clone)]
pub struct JwtKeys {
    pub encoding: EncodingKey,
    pub decoding: DecodingKey,
    pub issuer: String,
    pub audience: String,
    pub session_ttl: Duration,
    pub email_verification_ttl: Duration,
    pub reset_password_ttl: Duration,
    pub invite_ttl: Duration,
}

/// A freshly signed token and the instant it stops being valid.
#[derive(Debug, Clone)]
pub struct SignedToken {
    pub token: String,
    pub expires_at: OffsetDateTime,
}

impl FromRef<AppState> for JwtKeys {
    fn from_ref(state: &AppState) -> Self {
        JwtKeys::from_config(&state.config.jwt)
    }
}

impl JwtKeys {
    pub fn from_config(cfg: &JwtConfig) -> Self {
        Self {
            encoding: EncodingKey::from_secret(cfg.secret.as_bytes()),
            decoding: DecodingKey::from_secret(cfg.secret.as_bytes()),
            issuer: cfg.issuer.clone(),
            audience: cfg.audience.clone(),
            session_ttl: Duration::days(cfg.session_ttl_days),
            email_verification_ttl: Duration::minutes(cfg.email_verification_ttl_minutes),
            reset_password_ttl: Duration::minutes(cfg.reset_password_ttl_minutes),
            invite_ttl: Duration::days(cfg.invite_ttl_days),
        }
    }

    pub fn ttl_for(&self, purpose: TokenPurpose) -> Duration {
        match purpose {
            TokenPurpose::Login => self.session_ttl,
            TokenPurpose::EmailVerification => self.email_verification_ttl,
            TokenPurpose::ResetPassword => self.reset_password_ttl,
        }
    }

    pub fn sign(&self, user_id: Uuid, purpose: TokenPurpose) -> anyhow::Result<SignedToken> {
        let now = OffsetDateTime::now_utc();
        let expires_at = now + self.ttl_for(purpose);
        let claims = Claims {
            sub: user_id,
            iat: now.unix_timestamp() as usize,
            exp: expires_at.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
            purpose,
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user_id, purpose = ?purpose, "jwt signed");
        Ok(SignedToken { token, expires_at })
    }

    fn validation(&self) -> Validation {
        let mut validation = Validation::default();
        validation.set_audience(std::slice::from_ref(&self.audience));
        validation.set_issuer(std::slice::from_ref(&self.issuer));
        validation
    }

    pub fn verify(&self, token: &str) -> anyhow::Result<Claims> {
        let data = decode::<Claims>(token, &self.decoding, &self.validation())?;
        debug!(user_id = %data.claims.sub, purpose = ?data.claims.purpose, "jwt verified");
        Ok(data.claims)
    }

    /// Verifies signature and expiry, then rejects tokens minted for another purpose.
    pub fn verify_purpose(&self, token: &str, purpose: TokenPurpose) -> anyhow::Result<Claims> {
        let claims = self.verify(token)?;
        if claims.purpose != purpose {
            anyhow::bail!("token purpose mismatch: expected {:?}", purpose);
        }
        Ok(claims)
    }

    pub fn sign_invite(
        &self,
        user: Uuid,
        workspace_id: Uuid,
        role: WorkspaceRole,
    ) -> anyhow::Result<SignedToken> {
        let now = OffsetDateTime::now_utc();
        let expires_at = now + self.invite_ttl;
        let claims = InviteClaims {
            user,
            workspace_id,
            role,
            iat: now.unix_timestamp() as usize,
            exp: expires_at.unix_timestamp() as usize,
            iss: self.issuer.clone(),
            aud: self.audience.clone(),
        };
        let token = encode(&Header::default(), &claims, &self.encoding)?;
        debug!(user_id = %user, %workspace_id, "invite jwt signed");
        Ok(SignedToken { token, expires_at })
    }

    pub fn verify_invite(&self, token: &str) -> anyhow::Result<InviteClaims> {
        let data = decode::<InviteClaims>(token, &self.decoding, &self.validation())?;
        Ok(data.claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_keys() -> JwtKeys {
        JwtKeys::from_config(&AppState::fake_config().jwt)
    }

    fn keys_with(issuer: &str, audience: &str) -> JwtKeys {
        JwtKeys::from_config(&JwtConfig {
            secret: "same-secret".into(),
            issuer: issuer.into(),
            audience: audience.into(),
            session_ttl_days: 7,
            email_verification_ttl_minutes: 60,
            reset_password_ttl_minutes: 15,
            invite_ttl_days: 7,
        })
    }

    #[tokio::test]
    async fn sign_and_verify_session_token() {
        let keys = make_keys();
        let user_id = Uuid::new_v4();
        let signed = keys.sign(user_id, TokenPurpose::Login).expect("sign login");
        let claims = keys.verify(&signed.token).expect("verify token");
        assert_eq!(claims.sub, user_id);
        assert_eq!(claims.iss, "test-issuer");
        assert_eq!(claims.aud, "test-aud");
        assert_eq!(claims.purpose, TokenPurpose::Login);
        assert_eq!(claims.exp as i64, signed.expires_at.unix_timestamp());
    }

    #[tokio::test]
    async fn lifetimes_follow_purpose() {
        let keys = make_keys();
        let id = Uuid::new_v4();
        let login = keys.sign(id, TokenPurpose::Login).unwrap();
        let verify = keys.sign(id, TokenPurpose::EmailVerification).unwrap();
        let reset = keys.sign(id, TokenPurpose::ResetPassword).unwrap();
        let now = OffsetDateTime::now_utc();
        assert!((login.expires_at - now - Duration::days(7)).abs() < Duration::seconds(5));
        assert!((verify.expires_at - now - Duration::hours(1)).abs() < Duration::seconds(5));
        assert!((reset.expires_at - now - Duration::minutes(15)).abs() < Duration::seconds(5));
    }

    #[tokio::test]
    async fn purpose_isolation() {
        let keys = make_keys();
        let id = Uuid::new_v4();
        let verify = keys.sign(id, TokenPurpose::EmailVerification).unwrap();
        let reset = keys.sign(id, TokenPurpose::ResetPassword).unwrap();

        assert!(keys
            .verify_purpose(&verify.token, TokenPurpose::ResetPassword)
            .is_err());
        assert!(keys
            .verify_purpose(&reset.token, TokenPurpose::EmailVerification)
            .is_err());
        assert!(keys.verify_purpose(&verify.token, TokenPurpose::Login).is_err());
        assert!(keys
            .verify_purpose(&verify.token, TokenPurpose::EmailVerification)
            .is_ok());
    }

    #[tokio::test]
    async fn verify_rejects_wrong_issuer_or_audience() {
        let good_keys = keys_with("good-iss", "good-aud");
        let bad_keys = keys_with("bad-iss", "bad-aud");
        let signed = good_keys.sign(Uuid::new_v4(), TokenPurpose::Login).unwrap();
        assert!(bad_keys.verify(&signed.token).is_err());
    }

    #[tokio::test]
    async fn verify_rejects_expired_token() {
        let keys = make_keys();
        let past = OffsetDateTime::now_utc() - Duration::hours(2);
        let claims = Claims {
            sub: Uuid::new_v4(),
            iat: (past - Duration::hours(1)).unix_timestamp() as usize,
            exp: past.unix_timestamp() as usize,
            iss: keys.issuer.clone(),
            aud: keys.audience.clone(),
            purpose: TokenPurpose::Login,
        };
        let token = encode(&Header::default(), &claims, &keys.encoding).unwrap();
        assert!(keys.verify(&token).is_err());
    }

    #[tokio::test]
    async fn invite_token_carries_role_and_workspace() {
        let keys = make_keys();
        let (user, ws) = (Uuid::new_v4(), Uuid::new_v4());
        let signed = keys.sign_invite(user, ws, WorkspaceRole::Admin).unwrap();
        let claims = keys.verify_invite(&signed.token).unwrap();
        assert_eq!(claims.user, user);
        assert_eq!(claims.workspace_id, ws);
        assert_eq!(claims.role, WorkspaceRole::Admin);
    }

    #[tokio::test]
    async fn session_token_is_not_an_invite() {
        let keys = make_keys();
        let signed = keys.sign(Uuid::new_v4(), TokenPurpose::Login).unwrap();
        assert!(keys.verify_invite(&signed.token).is_err());
    }
}

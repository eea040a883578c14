use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use super::repo_types::User;
use crate::{error::AppError, shield::is_valid_email};

/// Request body for user registration.
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub name: String,
    pub password: String,
}

impl RegisterRequest {
    pub fn normalize(mut self) -> Result<Self, AppError> {
        self.email = self.email.trim().to_lowercase();
        self.name = self.name.trim().to_string();
        if !is_valid_email(&self.email) {
            return Err(AppError::bad_request("Invalid email"));
        }
        if self.name.is_empty() {
            return Err(AppError::bad_request("Name is required"));
        }
        validate_new_password(&self.password)?;
        Ok(self)
    }
}

/// Request body for login.
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

impl LoginRequest {
    pub fn normalize(mut self) -> Result<Self, AppError> {
        self.email = self.email.trim().to_lowercase();
        if !is_valid_email(&self.email) {
            return Err(AppError::bad_request("Invalid email"));
        }
        if self.password.is_empty() {
            return Err(AppError::bad_request("Password is required"));
        }
        Ok(self)
    }
}

#[derive(Debug, Deserialize)]
pub struct VerifyEmailRequest {
    pub token: String,
}

#[derive(Debug, Deserialize)]
pub struct ResetPasswordRequestBody {
    pub email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordBody {
    pub token: String,
    pub new_password: String,
    pub confirm_password: String,
}

impl ResetPasswordBody {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.new_password != self.confirm_password {
            return Err(AppError::bad_request("Passwords do not match"));
        }
        validate_new_password(&self.new_password)
    }
}

#[derive(Debug, Deserialize)]
pub struct EnableTwoFactorRequest {
    pub token: String,
    pub secret: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateTwoFactorRequest {
    pub user_id: Uuid,
    pub token: String,
}

pub fn validate_new_password(password: &str) -> Result<(), AppError> {
    if password.len() < 8 {
        return Err(AppError::bad_request("Password must be at least 8 characters"));
    }
    Ok(())
}

/// Public part of the user returned to the client. No secrets by construction.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicUser {
    pub id: Uuid,
    pub email: String,
    pub name: String,
    pub profile_picture: Option<String>,
    pub is_email_verified: bool,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_login: Option<OffsetDateTime>,
    pub is_two_factor_enabled: bool,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl From<&User> for PublicUser {
    fn from(u: &User) -> Self {
        Self {
            id: u.id,
            email: u.email.clone(),
            name: u.name.clone(),
            profile_picture: u.profile_picture.clone(),
            is_email_verified: u.is_email_verified,
            last_login: u.last_login,
            is_two_factor_enabled: u.is_two_factor_enabled,
            created_at: u.created_at,
            updated_at: u.updated_at,
        }
    }
}

/// Login (and 2FA validate) outcome bodies.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum LoginResponse {
    #[serde(rename_all = "camelCase")]
    TwoFactorRequired {
        message: &'static str,
        is_two_factor_required: bool,
        user_id: Uuid,
    },
    LoggedIn {
        message: &'static str,
        token: String,
        user: PublicUser,
    },
    VerificationSent {
        message: &'static str,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TwoFactorSetupResponse {
    pub secret: String,
    pub otpauth_url: String,
    pub qr_code_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user() -> User {
        let now = OffsetDateTime::now_utc();
        User {
            id: Uuid::new_v4(),
            email: "alice@example.com".into(),
            name: "Alice".into(),
            password_hash: "$argon2id$secret-hash".into(),
            profile_picture: None,
            is_email_verified: true,
            last_login: None,
            is_two_factor_enabled: true,
            two_factor_secret: Some("JBSWY3DPEHPK3PXP".into()),
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn public_user_never_contains_secrets() {
        let json = serde_json::to_string(&PublicUser::from(&user())).unwrap();
        assert!(json.contains("alice@example.com"));
        assert!(json.contains("isTwoFactorEnabled"));
        assert!(!json.contains("argon2"));
        assert!(!json.contains("JBSWY3DPEHPK3PXP"));
        assert!(!json.to_lowercase().contains("password"));
    }

    #[test]
    fn debug_output_redacts_secrets() {
        let dbg = format!("{:?}", user());
        assert!(!dbg.contains("argon2"));
        assert!(!dbg.contains("JBSWY3DPEHPK3PXP"));
    }

    #[test]
    fn register_request_normalizes_email() {
        let req = RegisterRequest {
            email: "  Alice@Example.COM ".into(),
            name: " Alice ".into(),
            password: "longenough".into(),
        }
        .normalize()
        .unwrap();
        assert_eq!(req.email, "alice@example.com");
        assert_eq!(req.name, "Alice");
    }

    #[test]
    fn register_request_rejects_short_password() {
        let err = RegisterRequest {
            email: "alice@example.com".into(),
            name: "Alice".into(),
            password: "short".into(),
        }
        .normalize()
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[test]
    fn reset_body_requires_matching_passwords() {
        let body = ResetPasswordBody {
            token: "t".into(),
            new_password: "password-one".into(),
            confirm_password: "password-two".into(),
        };
        assert_eq!(body.validate().unwrap_err().to_string(), "Passwords do not match");
    }

    #[test]
    fn two_factor_required_shape() {
        let id = Uuid::new_v4();
        let v = serde_json::to_value(LoginResponse::TwoFactorRequired {
            message: "2FA required",
            is_two_factor_required: true,
            user_id: id,
        })
        .unwrap();
        assert_eq!(v["isTwoFactorRequired"], true);
        assert_eq!(v["userId"], id.to_string());
        assert!(v.get("token").is_none());
    }
}

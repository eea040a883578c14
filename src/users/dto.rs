use serde::Deserialize;

use crate::{auth::dto::validate_new_password, error::AppError};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProfileRequest {
    pub name: String,
    #[serde(default)]
    pub profile_picture: Option<String>,
}

impl UpdateProfileRequest {
    pub fn normalize(mut self) -> Result<Self, AppError> {
        self.name = self.name.trim().to_string();
        if self.name.is_empty() {
            return Err(AppError::bad_request("Name is required"));
        }
        self.profile_picture = self
            .profile_picture
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty());
        Ok(self)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
    pub confirm_password: String,
}

impl ChangePasswordRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.new_password != self.confirm_password {
            return Err(AppError::bad_request(
                "New password and confirm password do not match",
            ));
        }
        validate_new_password(&self.new_password)
    }
}

//! Request and response bodies of the auth controller.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Body of `GET <auth>/verify`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerifyResponse {
    /// Whether the token is still valid.
    #[serde(default)]
    pub success: bool,
    /// The user the token belongs to.
    #[serde(default)]
    pub user: Option<Value>,
    /// Server message on failure.
    #[serde(default)]
    pub message: Option<String>,
}

/// Body of `POST <auth>/refresh` and `POST <auth>/login`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    /// Whether the exchange succeeded.
    #[serde(default)]
    pub success: bool,
    /// New access token.
    #[serde(default)]
    pub token: Option<String>,
    /// The user the token belongs to.
    #[serde(default)]
    pub user: Option<Value>,
    /// New refresh token, if the backend rotates them.
    #[serde(default)]
    pub refresh_token: Option<String>,
    /// Server message on failure.
    #[serde(default)]
    pub message: Option<String>,
}

/// Body of `POST <auth>/login`.
#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    /// Login email.
    pub email: &'a str,
    /// Password.
    pub password: &'a str,
}

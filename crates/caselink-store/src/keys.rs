//! Store key names for every persisted session field.
//!
//! Centralising the names keeps `save`, `clear` and `restore` in step.

/// Bearer access token.
pub const ACCESS_TOKEN: &str = "access_token";

/// Role of the signed-in user.
pub const ROLE: &str = "role";

/// JSON-encoded user record.
pub const USER: &str = "user";

/// Optional refresh token.
pub const REFRESH_TOKEN: &str = "refresh_token";

/// RFC 3339 local expiry of the session.
pub const EXPIRES_AT: &str = "expires_at";

/// Every key owned by the session, in the order they are cleared.
pub const SESSION_KEYS: [&str; 5] = [ACCESS_TOKEN, ROLE, USER, REFRESH_TOKEN, EXPIRES_AT];

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// Authentication configuration.
///
/// Users sign in with a username and password; the server keeps the session
/// and hands the browser an opaque cookie.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthConfig {
    #[serde(default)]
    pub session: SessionConfig,
}

impl AuthConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.session.validate()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SessionConfig {
    /// Cookie name.
    #[serde(default = "default_session_cookie")]
    pub cookie_name: String,

    /// Session duration in seconds.
    #[serde(default = "default_session_duration")]
    pub duration_secs: u64,

    /// Secure cookie (HTTPS only).
    #[serde(default)]
    pub secure: bool,

    /// SameSite cookie attribute.
    #[serde(default)]
    pub same_site: SameSite,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            cookie_name: default_session_cookie(),
            duration_secs: default_session_duration(),
            secure: false,
            same_site: SameSite::default(),
        }
    }
}

impl SessionConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.cookie_name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "auth.session.cookie_name cannot be empty".into(),
            ));
        }
        if self.duration_secs == 0 {
            return Err(ConfigError::Validation(
                "auth.session.duration_secs must be greater than 0".into(),
            ));
        }
        if matches!(self.same_site, SameSite::None) && !self.secure {
            return Err(ConfigError::Validation(
                "auth.session.same_site = \"none\" requires secure = true".into(),
            ));
        }
        Ok(())
    }
}

fn default_session_cookie() -> String {
    "hotel_session".to_string()
}

fn default_session_duration() -> u64 {
    86400 // 1 day
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SameSite {
    #[default]
    Lax,
    Strict,
    None,
}

impl From<SameSite> for tower_cookies::cookie::SameSite {
    fn from(value: SameSite) -> Self {
        match value {
            SameSite::Lax => Self::Lax,
            SameSite::Strict => Self::Strict,
            SameSite::None => Self::None,
        }
    }
}

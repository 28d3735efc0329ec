use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, AUTHORIZATION, USER_AGENT};

#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("invalid header name `{name}`")]
    InvalidHeaderName { name: String },
    #[error("invalid value for header `{name}`")]
    InvalidHeaderValue { name: String },
}

/// Per-client configuration read by every request issued through a handle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ClientSettings {
    pub timeout: Option<Duration>,
    pub headers: HeaderMap,
}

impl ClientSettings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_header(&mut self, name: &str, value: &str) -> Result<&mut Self, SettingsError> {
        let header = HeaderName::from_bytes(name.as_bytes()).map_err(|_| {
            SettingsError::InvalidHeaderName {
                name: name.to_string(),
            }
        })?;
        let value = HeaderValue::from_str(value).map_err(|_| SettingsError::InvalidHeaderValue {
            name: name.to_string(),
        })?;
        self.headers.insert(header, value);
        Ok(self)
    }

    pub fn remove_header(&mut self, name: &str) -> &mut Self {
        self.headers.remove(name);
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn set_timeout(&mut self, timeout: Option<Duration>) -> &mut Self {
        self.timeout = timeout;
        self
    }

    pub fn user_agent(&mut self, value: &str) -> Result<&mut Self, SettingsError> {
        self.set_header(USER_AGENT.as_str(), value)
    }

    pub fn bearer_auth(&mut self, token: &str) -> Result<&mut Self, SettingsError> {
        self.set_sensitive(AUTHORIZATION, &format!("Bearer {token}"))
    }

    pub fn basic_auth(&mut self, user: &str, password: &str) -> Result<&mut Self, SettingsError> {
        let credentials = STANDARD.encode(format!("{user}:{password}"));
        self.set_sensitive(AUTHORIZATION, &format!("Basic {credentials}"))
    }

    fn set_sensitive(&mut self, name: HeaderName, value: &str) -> Result<&mut Self, SettingsError> {
        let mut value =
            HeaderValue::from_str(value).map_err(|_| SettingsError::InvalidHeaderValue {
                name: name.to_string(),
            })?;
        value.set_sensitive(true);
        self.headers.insert(name, value);
        Ok(self)
    }
}

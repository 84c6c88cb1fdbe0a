//! Credential providers.
//!
//! The pipeline never prompts; it asks a [`CredentialProvider`] for a
//! [`Credentials`] value and hands it to the HTTP client.

use crate::error::{ChurnError, ChurnResult};
use std::env;
use std::fmt;

pub const USER_ENV: &str = "LANGCHURN_USER";
pub const TOKEN_ENV: &str = "LANGCHURN_TOKEN";
pub const OTP_ENV: &str = "LANGCHURN_OTP";

#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub secret: String,
    /// Second-factor code, sent as `X-GitHub-OTP`
    pub otp: Option<String>,
}

impl Credentials {
    pub fn new(username: impl Into<String>, secret: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            secret: secret.into(),
            otp: None,
        }
    }

    pub fn with_otp(mut self, otp: impl Into<String>) -> Self {
        self.otp = Some(otp.into());
        self
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("secret", &"<redacted>")
            .field("otp", &self.otp.as_ref().map(|_| "<redacted>"))
            .finish()
    }
}

pub trait CredentialProvider {
    fn credentials(&self) -> ChurnResult<Credentials>;
}

/// Reads `LANGCHURN_USER`, `LANGCHURN_TOKEN` and optionally `LANGCHURN_OTP`.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvCredentials;

impl CredentialProvider for EnvCredentials {
    fn credentials(&self) -> ChurnResult<Credentials> {
        let username = non_empty_var(USER_ENV)
            .ok_or_else(|| ChurnError::Credentials(format!("{USER_ENV} is not set")))?;
        let secret = non_empty_var(TOKEN_ENV)
            .ok_or_else(|| ChurnError::Credentials(format!("{TOKEN_ENV} is not set")))?;

        let mut credentials = Credentials::new(username, secret);
        if let Some(otp) = non_empty_var(OTP_ENV) {
            credentials = credentials.with_otp(otp);
        }
        Ok(credentials)
    }
}

fn non_empty_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Fixed credentials, for embedding and tests.
#[derive(Debug, Clone)]
pub struct StaticCredentials(pub Credentials);

impl CredentialProvider for StaticCredentials {
    fn credentials(&self) -> ChurnResult<Credentials> {
        Ok(self.0.clone())
    }
}

//! Email one-time-code authentication against the remote store.
//!
//! The exchange is out-of-band: `request_code` asks the service to mail
//! a code, `verify_code` trades it for a bearer session. The session is
//! persisted as a small JSON file; sync reads it and silently no-ops
//! when it is absent.

use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use thiserror::Error;

use crate::storage::StorageManager;

const SESSION_FILE: &str = "session.json";

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("auth service returned {status}: {message}")]
    Api { status: u16, message: String },

    #[error("malformed auth response: {0}")]
    Malformed(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed session file: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Authenticated identity for the remote store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub user_id: String,
    pub email: String,
    pub access_token: String,
}

#[derive(Debug, Deserialize)]
struct VerifyResponse {
    access_token: String,
    user: VerifyUser,
}

#[derive(Debug, Deserialize)]
struct VerifyUser {
    id: String,
    email: Option<String>,
}

pub struct AuthClient {
    base_url: String,
    api_key: String,
}

impl AuthClient {
    pub fn new(base_url: &str, api_key: &str) -> AuthClient {
        AuthClient {
            base_url: base_url.strip_suffix('/').unwrap_or(base_url).to_string(),
            api_key: api_key.to_string(),
        }
    }

    fn post(&self, path: &str) -> reqwest::blocking::RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        log::debug!("POST {url}");
        reqwest::blocking::Client::new()
            .post(url)
            .header("apikey", &self.api_key)
    }

    fn check(
        response: reqwest::blocking::Response,
    ) -> Result<reqwest::blocking::Response, AuthError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().unwrap_or_default();
            return Err(AuthError::Api {
                status: status.as_u16(),
                message,
            });
        }
        Ok(response)
    }

    /// Asks the service to mail a one-time code to `email`.
    pub fn request_code(&self, email: &str) -> Result<(), AuthError> {
        let response = self
            .post("/auth/v1/otp")
            .json(&json!({ "email": email }))
            .send()?;
        Self::check(response)?;
        Ok(())
    }

    /// Trades the mailed code for a session.
    pub fn verify_code(&self, email: &str, code: &str) -> Result<Session, AuthError> {
        let response = self
            .post("/auth/v1/verify")
            .json(&json!({
                "email": email,
                "token": code,
                "type": "email",
            }))
            .send()?;

        let parsed: VerifyResponse = Self::check(response)?
            .json()
            .map_err(|err| AuthError::Malformed(err.to_string()))?;

        Ok(Session {
            user_id: parsed.user.id,
            email: parsed.user.email.unwrap_or_else(|| email.to_string()),
            access_token: parsed.access_token,
        })
    }
}

/// Persists the session next to the other application files.
pub struct SessionStore {
    storage: Arc<dyn StorageManager>,
}

impl SessionStore {
    pub fn new(storage: Arc<dyn StorageManager>) -> SessionStore {
        SessionStore { storage }
    }

    /// The stored session, or `None` when logged out. A corrupt file is
    /// treated as logged out rather than an error.
    pub fn load(&self) -> Option<Session> {
        if !self.storage.exists(SESSION_FILE) {
            return None;
        }
        let raw = self.storage.read(SESSION_FILE).ok()?;
        match serde_json::from_slice(&raw) {
            Ok(session) => Some(session),
            Err(err) => {
                log::warn!("ignoring malformed session file: {err}");
                None
            }
        }
    }

    pub fn save(&self, session: &Session) -> Result<(), AuthError> {
        let payload = serde_json::to_vec_pretty(session)?;
        self.storage.write(SESSION_FILE, &payload)?;
        Ok(())
    }

    pub fn clear(&self) -> Result<(), AuthError> {
        if self.storage.exists(SESSION_FILE) {
            self.storage.delete(SESSION_FILE)?;
        }
        Ok(())
    }
}

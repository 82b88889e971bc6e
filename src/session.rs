//! The signed-in session.
//!
//! The token is the only piece of state shared across the client. Reads go
//! through [`Session::token`] and friends; [`Session::sign_in`] and
//! [`Session::sign_out`] are the only writers and persist the change.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Deserialize;
use std::path::PathBuf;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::app::AppState;
use crate::error::{Error, Result};

/// Identity claims carried by the bearer token.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CurrentUser {
    #[serde(rename = "sub")]
    pub id: String,
    #[serde(rename = "given_name", default)]
    pub first_name: String,
    #[serde(rename = "family_name", default)]
    pub last_name: String,
    #[serde(default)]
    pub avatar: Option<String>,
}

impl CurrentUser {
    /// Decode the payload segment of a JWT. The signature is not checked; the
    /// server does that on every call.
    pub fn from_token(token: &str) -> Option<Self> {
        let payload = token.split('.').nth(1)?;
        let bytes = URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')).ok()?;
        serde_json::from_slice(&bytes).ok()
    }

    pub fn display_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name).trim().to_string()
    }
}

#[derive(Clone, Default)]
pub struct Session {
    state: Arc<RwLock<AppState>>,
    path: Option<PathBuf>,
}

impl Session {
    /// Session backed by the default config file.
    pub fn load() -> Self {
        match AppState::default_path() {
            Some(path) => Self::open(path),
            None => {
                log::warn!("no config directory; session will not persist");
                Self::in_memory(AppState::new())
            }
        }
    }

    pub fn open(path: PathBuf) -> Self {
        let state = AppState::load_from(&path);
        Self { state: Arc::new(RwLock::new(state)), path: Some(path) }
    }

    pub fn in_memory(state: AppState) -> Self {
        Self { state: Arc::new(RwLock::new(state)), path: None }
    }

    fn read(&self) -> RwLockReadGuard<'_, AppState> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, AppState> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn persist(&self, state: &AppState) -> Result<()> {
        match &self.path {
            Some(path) => state.save_to(path),
            None => Ok(()),
        }
    }

    pub fn token(&self) -> Option<String> {
        self.read().token.clone()
    }

    pub fn require_token(&self) -> Result<String> {
        self.token().ok_or(Error::NotSignedIn)
    }

    pub fn is_signed_in(&self) -> bool {
        self.read().token.is_some()
    }

    pub fn base_url(&self) -> String {
        self.read().base_url.clone()
    }

    pub fn current_user(&self) -> Option<CurrentUser> {
        self.token().as_deref().and_then(CurrentUser::from_token)
    }

    pub fn set_base_url(&self, base_url: &str) -> Result<()> {
        let mut state = self.write();
        state.base_url = crate::utils::normalize_url(base_url);
        self.persist(&state)
    }

    pub fn sign_in(&self, token: String) -> Result<()> {
        let mut state = self.write();
        state.token = Some(token);
        self.persist(&state)?;
        log::info!("signed in");
        Ok(())
    }

    pub fn sign_out(&self) -> Result<()> {
        let mut state = self.write();
        if state.token.take().is_some() {
            log::info!("signed out");
        }
        self.persist(&state)
    }
}

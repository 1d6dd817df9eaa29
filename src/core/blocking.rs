//! Blocking counterpart of [`crate::core::client::Client`].
//!
//! Must not be used from inside an async runtime.

use crate::config::ClientSettings;
use crate::core::client::{error_detail, token_from_body, API_KEY_HEADER, JSON};
use crate::utils::error::{OptimumError, Result};
use crate::utils::validation::Validate;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::Value;
use std::sync::{PoisonError, RwLock};
use std::time::Duration;

pub struct BlockingClient {
    http: reqwest::blocking::Client,
    settings: ClientSettings,
    api_root: String,
    token: RwLock<Option<String>>,
    detail: RwLock<Option<String>>,
}

impl BlockingClient {
    pub fn new(settings: ClientSettings) -> Result<Self> {
        settings.validate()?;

        let mut builder = reqwest::blocking::Client::builder();
        if let Some(seconds) = settings.timeout_seconds {
            builder = builder.timeout(Duration::from_secs(seconds));
        }

        Ok(Self {
            http: builder.build()?,
            api_root: settings.api_root(),
            token: RwLock::new(settings.token.clone()),
            detail: RwLock::new(None),
            settings,
        })
    }

    pub fn api_root(&self) -> &str {
        &self.api_root
    }

    pub fn token(&self) -> Option<String> {
        self.token.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn detail(&self) -> Option<String> {
        self.detail.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn set_detail(&self, detail: Option<String>) {
        *self.detail.write().unwrap_or_else(PoisonError::into_inner) = detail;
    }

    pub fn get_token(&self) -> Result<()> {
        let (Some(username), Some(password)) = (&self.settings.username, &self.settings.password)
        else {
            return Err(OptimumError::MissingCredentials);
        };

        let url = format!("{}/get_token", self.api_root);
        tracing::debug!("Requesting token from: {}", url);
        let response = self
            .http
            .get(&url)
            .header(CONTENT_TYPE, JSON)
            .header(ACCEPT, JSON)
            .basic_auth(username, Some(password))
            .send()?;
        self.set_detail(None);

        let body: Value = response.error_for_status()?.json()?;
        let token = token_from_body(&body)?;
        *self.token.write().unwrap_or_else(PoisonError::into_inner) = Some(token);
        Ok(())
    }

    pub fn call(&self, entry_point: &str, data: &Value) -> Result<Value> {
        if self.settings.auto_token_renewal && self.settings.has_credentials() {
            self.get_token()?;
        }
        let token = self.token().ok_or(OptimumError::NoToken)?;

        let url = format!("{}/{}", self.api_root, entry_point);
        tracing::debug!("Calling API entry point: {}", url);
        let response = self
            .http
            .post(&url)
            .header(ACCEPT, JSON)
            .header(API_KEY_HEADER, token)
            .json(data)
            .send()?;

        let status = response.status();
        let status_error = response.error_for_status_ref().err();
        if let Some(status_error) = status_error {
            if status == StatusCode::BAD_REQUEST {
                let detail = error_detail(&response.bytes()?);
                self.set_detail(detail.clone());
                if let Some(detail) = detail {
                    return Err(OptimumError::Api {
                        status: status.as_u16(),
                        detail,
                    });
                }
            }
            return Err(status_error.into());
        }

        self.set_detail(None);
        Ok(response.json()?)
    }
}

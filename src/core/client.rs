use crate::config::ClientSettings;
use crate::domain::ports::ApiCaller;
use crate::utils::error::{OptimumError, Result};
use crate::utils::validation::Validate;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::RwLock;

pub(crate) const API_KEY_HEADER: &str = "X-Api-Key";
pub(crate) const JSON: &str = "application/json";

/// Pull the `detail` message out of a 400 response body.
pub(crate) fn error_detail(body: &[u8]) -> Option<String> {
    let content: Value = serde_json::from_slice(body).ok()?;
    match content.get("detail")? {
        Value::Null => None,
        Value::String(s) if s.is_empty() => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

pub(crate) fn token_from_body(body: &Value) -> Result<String> {
    body.get("token")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| OptimumError::unexpected("get_token response has no 'token' field"))
}

/// Async client for one of the optimize.vicbee.net APIs.
pub struct Client {
    http: reqwest::Client,
    settings: ClientSettings,
    api_root: String,
    token: RwLock<Option<String>>,
    detail: RwLock<Option<String>>,
}

impl Client {
    pub fn new(settings: ClientSettings) -> Result<Self> {
        settings.validate()?;

        let mut builder = reqwest::Client::builder();
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

    pub async fn token(&self) -> Option<String> {
        self.token.read().await.clone()
    }

    /// Detail message of the last rejected call.
    pub async fn detail(&self) -> Option<String> {
        self.detail.read().await.clone()
    }

    /// Exchange username and password for an API token.
    pub async fn get_token(&self) -> Result<()> {
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
            .send()
            .await?;
        *self.detail.write().await = None;

        tracing::debug!("Token response status: {}", response.status());
        let response = response.error_for_status()?;
        let body: Value = response.json().await?;
        *self.token.write().await = Some(token_from_body(&body)?);
        Ok(())
    }

    /// POST `data` to `entry_point` and return the JSON response.
    pub async fn call(&self, entry_point: &str, data: &Value) -> Result<Value> {
        if self.settings.auto_token_renewal && self.settings.has_credentials() {
            self.get_token().await?;
        }
        let token = self.token().await.ok_or(OptimumError::NoToken)?;

        let url = format!("{}/{}", self.api_root, entry_point);
        tracing::debug!("Calling API entry point: {}", url);
        let response = self
            .http
            .post(&url)
            .header(ACCEPT, JSON)
            .header(API_KEY_HEADER, token)
            .json(data)
            .send()
            .await?;

        let status = response.status();
        tracing::debug!("API response status: {}", status);

        let status_error = response.error_for_status_ref().err();
        if let Some(status_error) = status_error {
            if status == StatusCode::BAD_REQUEST {
                let body = response.bytes().await?;
                let detail = error_detail(&body);
                *self.detail.write().await = detail.clone();
                if let Some(detail) = detail {
                    return Err(OptimumError::Api {
                        status: status.as_u16(),
                        detail,
                    });
                }
            }
            return Err(status_error.into());
        }

        *self.detail.write().await = None;
        Ok(response.json().await?)
    }
}

#[async_trait]
impl ApiCaller for Client {
    async fn call(&self, entry_point: &str, data: &Value) -> Result<Value> {
        Client::call(self, entry_point, data).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;
    use serde_json::json;

    #[test]
    fn test_error_detail() {
        assert_eq!(
            error_detail(br#"{"detail": "mu is out of range"}"#).as_deref(),
            Some("mu is out of range")
        );
        assert_eq!(error_detail(br#"{"detail": null}"#), None);
        assert_eq!(error_detail(b"not json"), None);
        assert_eq!(
            error_detail(br#"{"detail": [{"loc": ["mu"]}]}"#).as_deref(),
            Some(r#"[{"loc":["mu"]}]"#)
        );
    }

    #[test]
    fn test_new_requires_credentials() {
        assert!(matches!(
            Client::new(ClientSettings::default()),
            Err(OptimumError::MissingCredentials)
        ));
    }

    #[tokio::test]
    async fn test_call_without_token_and_renewal_fails() {
        let settings = ClientSettings::with_credentials("demo", "secret").auto_token_renewal(false);
        let client = Client::new(settings).unwrap();
        assert!(matches!(
            client.call("frontier", &json!({})).await,
            Err(OptimumError::NoToken)
        ));
    }

    #[tokio::test]
    async fn test_token_only_client_uses_given_token() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(POST)
                .path("/optimize/api/portfolio")
                .header("x-api-key", "static-token");
            then.status(200).json_body(json!({"status": "optimal"}));
        });

        let client = Client::new(ClientSettings::with_token("static-token").base_url(server.base_url())).unwrap();
        let response = client.call("portfolio", &json!({"mu": 0.1})).await.unwrap();

        mock.assert();
        assert_eq!(response["status"], "optimal");
    }
}

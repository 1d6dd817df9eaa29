use crate::utils::error::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Anything that can post a JSON payload to an API entry point.
#[async_trait]
pub trait ApiCaller: Send + Sync {
    async fn call(&self, entry_point: &str, data: &Value) -> Result<Value>;
}

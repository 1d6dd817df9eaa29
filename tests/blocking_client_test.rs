// reqwest's blocking client cannot run inside a tokio runtime, so these are
// plain #[test] functions.

use anyhow::Result;
use httpmock::prelude::*;
use optimum::{BlockingClient, ClientSettings, OptimumError};
use serde_json::json;

#[test]
fn test_blocking_token_and_call() -> Result<()> {
    let server = MockServer::start();
    let token_mock = server.mock(|when, then| {
        when.method(GET)
            .path("/optimize/api/get_token")
            .header("authorization", "Basic ZGVtbzpzZWNyZXQ=");
        then.status(200).json_body(json!({"token": "blocking-token"}));
    });
    let call_mock = server.mock(|when, then| {
        when.method(POST)
            .path("/optimize/api/portfolio")
            .header("x-api-key", "blocking-token");
        then.status(200).json_body(json!({"status": "optimal", "x": [0.5, 0.5]}));
    });

    let settings = ClientSettings::with_credentials("demo", "secret").base_url(server.base_url());
    let client = BlockingClient::new(settings)?;
    let response = client.call("portfolio", &json!({"mu": 0.1}))?;

    token_mock.assert();
    call_mock.assert();
    assert_eq!(response["x"], json!([0.5, 0.5]));
    assert_eq!(client.token().as_deref(), Some("blocking-token"));
    Ok(())
}

#[test]
fn test_blocking_bad_request_detail() -> Result<()> {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(POST).path("/models/api/model");
        then.status(400).json_body(json!({"detail": "Unknown range '2w'"}));
    });

    let settings = ClientSettings::with_token("t").api("models").base_url(server.base_url());
    let client = BlockingClient::new(settings)?;
    let result = client.call("model", &json!({"range": ["2w"]}));

    assert!(matches!(result, Err(OptimumError::Api { status: 400, .. })));
    assert_eq!(client.detail().as_deref(), Some("Unknown range '2w'"));
    Ok(())
}

#[test]
fn test_blocking_bad_request_without_detail_clears_detail() -> Result<()> {
    let server = MockServer::start();
    let mut with_detail = server.mock(|when, then| {
        when.method(POST).path("/optimize/api/frontier");
        then.status(400).json_body(json!({"detail": "infeasible bounds"}));
    });

    let client = BlockingClient::new(ClientSettings::with_token("t").base_url(server.base_url()))?;
    assert!(client.call("frontier", &json!({})).is_err());
    assert_eq!(client.detail().as_deref(), Some("infeasible bounds"));

    with_detail.delete();
    server.mock(|when, then| {
        when.method(POST).path("/optimize/api/frontier");
        then.status(400).body("bad request");
    });
    assert!(matches!(
        client.call("frontier", &json!({})),
        Err(OptimumError::Http(_))
    ));
    assert_eq!(client.detail(), None);
    Ok(())
}

#[test]
fn test_blocking_requires_token() {
    let settings = ClientSettings::with_credentials("demo", "secret").auto_token_renewal(false);
    let client = BlockingClient::new(settings).unwrap();
    assert!(matches!(
        client.call("frontier", &json!({})),
        Err(OptimumError::NoToken)
    ));
    assert!(matches!(
        BlockingClient::new(ClientSettings::default()),
        Err(OptimumError::MissingCredentials)
    ));
}

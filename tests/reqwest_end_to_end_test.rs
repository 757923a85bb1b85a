use std::sync::Arc;

use serde_json::json;
use wiremock::matchers::{body_json, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use azure_rest_auth::auth::{ServicePrincipalCredential, ServicePrincipalOptions};
use azure_rest_auth::prelude::*;

const SCOPE: &str = "https://management.azure.com/.default";

fn static_client(base_url: &str) -> AzureClient {
    let credential = StaticCredential::bearer("static-token", chrono::Duration::hours(1)).unwrap();
    AzureClient::new(base_url, CredentialPolicy::new(Arc::new(credential), SCOPE))
}

#[tokio::test]
async fn get_reaches_api_with_bearer_header() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/subscriptions"))
        .and(header("authorization", "Bearer static-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "value": [] })))
        .expect(1)
        .mount(&server)
        .await;

    let response = static_client(&format!("{}/", server.uri()))
        .get("/subscriptions", RequestOptions::new())
        .await
        .unwrap();

    assert!(response.is_success());
    let body: serde_json::Value = response.json().unwrap();
    assert_eq!(body, json!({ "value": [] }));
}

#[tokio::test]
async fn post_sends_json_body() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/items"))
        .and(header("content-type", "application/json"))
        .and(body_json(json!({ "a": 1 })))
        .respond_with(ResponseTemplate::new(201))
        .expect(1)
        .mount(&server)
        .await;

    let response = static_client(&server.uri())
        .post("items", Some(json!({ "a": 1 })), RequestOptions::new())
        .await
        .unwrap();
    assert_eq!(response.status, 201);
}

#[tokio::test]
async fn error_responses_pass_through_and_are_not_retried() {
    let server = MockServer::start().await;
    Mock::given(method("DELETE"))
        .and(path("/items/1"))
        .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
        .expect(1)
        .mount(&server)
        .await;

    let response = static_client(&server.uri())
        .delete("/items/1", RequestOptions::new())
        .await
        .unwrap();

    assert_eq!(response.status, 500);
    assert!(!response.is_success());
    assert_eq!(response.text(), "boom");
}

#[tokio::test]
async fn network_failure_surfaces_transport_error() {
    let err = static_client("http://127.0.0.1:1")
        .get("/unreachable", RequestOptions::new())
        .await
        .unwrap_err();
    assert!(matches!(err, AuthError::Transport(_)), "{err}");
    assert_eq!(err.category(), ErrorCategory::Transport);
}

#[tokio::test]
async fn service_principal_token_flows_into_api_call() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/tenant-1/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "sp-token",
            "token_type": "Bearer",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PUT"))
        .and(path("/resource"))
        .and(header("authorization", "Bearer sp-token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(2)
        .mount(&server)
        .await;

    let credential = ServicePrincipalCredential::new(
        ServicePrincipalOptions::client_secret("tenant-1", "client-1", "secret")
            .with_authority_host(server.uri()),
    );
    let client = AzureClient::new(server.uri(), CredentialPolicy::new(Arc::new(credential), SCOPE));

    client
        .put("/resource", Some(json!({ "n": 1 })), RequestOptions::new())
        .await
        .unwrap();
    client
        .put("/resource", Some(json!({ "n": 2 })), RequestOptions::new())
        .await
        .unwrap();
}

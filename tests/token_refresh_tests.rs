//! OAuth refresh during connection resolution, against a mock token endpoint.

use chrono::{Duration, Utc};
use serde_json::json;
use wiremock::matchers::{body_string_contains, header_exists, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use syncflow::config::AppConfig;
use syncflow::connection_resolver::ResolveError;
use syncflow::models::connection;
use syncflow::providers::{Provider, ProviderConfig};
use syncflow::repositories::NewConnection;
use syncflow::server::AppState;
use syncflow::token_refresh::TokenRefreshError;

#[path = "test_utils/mod.rs"]
mod test_utils;

fn config_for(server: &MockServer) -> AppConfig {
    let mut config = test_utils::test_config();
    config.endpoints.airtable_token_url = format!("{}/oauth2/v1/token", server.uri());
    config.oauth.airtable_client_id = Some("client-1".to_string());
    config.oauth.airtable_client_secret = Some("shh".to_string());
    config
}

async fn airtable_oauth_connection(state: &AppState, expires_in: Duration) -> connection::Model {
    state
        .connections()
        .create(NewConnection {
            team_id: uuid::Uuid::new_v4(),
            provider: Provider::Airtable,
            name: "Airtable OAuth".to_string(),
            credentials: json!({ "access_token": "old-access", "refresh_token": "refresh-1" }),
            config: None,
            expires_at: Some((Utc::now() + expires_in).fixed_offset()),
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn expiring_token_is_refreshed_and_persisted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/v1/token"))
        .and(header_exists("authorization"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=refresh-1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "new-access",
            "refresh_token": "refresh-2",
            "expires_in": 3600,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let db = test_utils::setup_test_db().await.unwrap();
    let state = test_utils::test_state(db, config_for(&server));
    let connection = airtable_oauth_connection(&state, Duration::seconds(30)).await;

    let resolved = state.resolver().resolve(connection.id).await.unwrap();
    let ProviderConfig::Airtable(airtable) = &resolved.config else {
        panic!("expected an Airtable config");
    };
    assert_eq!(airtable.access_token, "new-access");

    let stored = state
        .connections()
        .get_by_id(connection.id)
        .await
        .unwrap()
        .unwrap();
    let credentials = state.connections().credentials(&stored).unwrap();
    assert_eq!(credentials["access_token"], "new-access");
    assert_eq!(credentials["refresh_token"], "refresh-2");
    assert!(stored.expires_at.unwrap() > (Utc::now() + Duration::minutes(50)).fixed_offset());
}

#[tokio::test]
async fn fresh_token_skips_the_token_endpoint() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .expect(0)
        .mount(&server)
        .await;

    let db = test_utils::setup_test_db().await.unwrap();
    let state = test_utils::test_state(db, config_for(&server));
    let connection = airtable_oauth_connection(&state, Duration::hours(2)).await;

    let resolved = state.resolver().resolve(connection.id).await.unwrap();
    let ProviderConfig::Airtable(airtable) = &resolved.config else {
        panic!("expected an Airtable config");
    };
    assert_eq!(airtable.access_token, "old-access");
}

#[tokio::test]
async fn revoked_refresh_token_marks_connection_errored() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/v1/token"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({ "error": "invalid_grant" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let db = test_utils::setup_test_db().await.unwrap();
    let state = test_utils::test_state(db, config_for(&server));
    let connection = airtable_oauth_connection(&state, Duration::seconds(-10)).await;

    let err = state.resolver().resolve(connection.id).await.unwrap_err();
    assert!(matches!(
        err,
        ResolveError::Refresh(TokenRefreshError::Rejected { status: 400, .. })
    ));

    let stored = state
        .connections()
        .get_by_id(connection.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, "error");
}

#[tokio::test]
async fn transient_failure_leaves_connection_active() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(503)
                .set_body_json(json!({ "error": "temporarily_unavailable" })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let db = test_utils::setup_test_db().await.unwrap();
    let state = test_utils::test_state(db, config_for(&server));
    let connection = airtable_oauth_connection(&state, Duration::seconds(-10)).await;

    assert!(state.resolver().resolve(connection.id).await.is_err());
    let stored = state
        .connections()
        .get_by_id(connection.id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, "active");
}

#[tokio::test]
async fn missing_oauth_client_is_reported() {
    let server = MockServer::start().await;
    let mut config = config_for(&server);
    config.oauth.airtable_client_id = None;

    let db = test_utils::setup_test_db().await.unwrap();
    let state = test_utils::test_state(db, config);
    let connection = airtable_oauth_connection(&state, Duration::seconds(-10)).await;

    let err = state.resolver().resolve(connection.id).await.unwrap_err();
    assert!(matches!(
        err,
        ResolveError::Refresh(TokenRefreshError::MissingClientCredentials {
            provider: Provider::Airtable
        })
    ));
}

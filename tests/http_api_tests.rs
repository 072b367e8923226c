//! End-to-end HTTP tests over the full router.

use axum::Router;
use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use serde_json::{Value as JsonValue, json};
use tower::ServiceExt;
use uuid::Uuid;

use syncflow::models::sync::SyncStage;
use syncflow::providers::Provider;
use syncflow::repositories::SyncRepository;
use syncflow::server::create_app;

#[path = "test_utils/mod.rs"]
mod test_utils;

async fn call(
    app: &Router,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<JsonValue>,
) -> (StatusCode, JsonValue) {
    let mut request = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        request = request.header("Authorization", format!("Bearer {token}"));
    }
    let body = match body {
        Some(json) => {
            request = request.header("Content-Type", "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(request.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(JsonValue::Null))
}

async fn app() -> (Router, sea_orm::DatabaseConnection) {
    let db = test_utils::setup_test_db().await.unwrap();
    let app = create_app(test_utils::test_state(db.clone(), test_utils::test_config()));
    (app, db)
}

#[tokio::test]
async fn health_is_public() {
    let (app, _db) = app().await;
    let (status, body) = call(&app, Method::GET, "/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["message"], "ok");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn protected_routes_require_a_bearer_token() {
    let (app, _db) = app().await;
    let id = Uuid::new_v4();

    for (method, uri) in [
        (Method::POST, "/jobs/metadata/process".to_string()),
        (Method::POST, "/jobs/data/process".to_string()),
        (Method::POST, "/edge/validate-connection".to_string()),
        (Method::GET, format!("/connections/{id}/schema")),
        (Method::POST, format!("/syncs/{id}/auto-map")),
    ] {
        let (status, body) = call(&app, method.clone(), &uri, None, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{method} {uri}");
        assert_eq!(body["code"], "UNAUTHORIZED");

        let (status, _) = call(&app, method.clone(), &uri, Some("wrong-token"), None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED, "{method} {uri}");
    }
}

#[tokio::test]
async fn openapi_document_is_public_and_lists_routes() {
    let (app, _db) = app().await;
    let (status, doc) = call(&app, Method::GET, "/openapi.json", None, None).await;

    assert_eq!(status, StatusCode::OK);
    for path in [
        "/health",
        "/webhooks/{provider}",
        "/edge/discover",
        "/syncs/{id}/auto-map",
    ] {
        assert!(doc["paths"][path].is_object(), "missing {path}");
    }
    assert!(doc["components"]["securitySchemes"].is_object());
}

#[tokio::test]
async fn job_endpoints_report_idle_queues() {
    let (app, _db) = app().await;
    let token = Some(test_utils::OPERATOR_TOKEN);

    let (status, body) = call(&app, Method::POST, "/jobs/metadata/process", token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "outcome": "idle" }));

    let (status, body) = call(&app, Method::POST, "/jobs/data/process", token, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({ "outcome": "idle" }));
}

#[tokio::test]
async fn connection_create_queues_discovery() {
    let (app, db) = app().await;
    let token = Some(test_utils::OPERATOR_TOKEN);

    let (status, body) = call(
        &app,
        Method::POST,
        "/connections",
        token,
        Some(json!({
            "team_id": Uuid::new_v4(),
            "provider": "notion",
            "name": "  Team wiki ",
            "credentials": { "api_key": "secret_x" }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["provider"], "notion");
    assert_eq!(body["name"], "Team wiki");
    assert_eq!(body["status"], "active");

    let connection_id: Uuid = serde_json::from_value(body["id"].clone()).unwrap();
    let job_id: Uuid = serde_json::from_value(body["metadata_sync_job_id"].clone()).unwrap();
    let job = syncflow::repositories::MetadataSyncJobRepository::new(db.clone())
        .find_by_id(job_id)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(job.connection_id, connection_id);
    assert_eq!(job.status, "pending");

    // Nothing discovered yet
    let (status, body) = call(
        &app,
        Method::GET,
        &format!("/connections/{connection_id}/schema"),
        token,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["databases"], json!([]));

    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/connections/{connection_id}/metadata-sync"),
        token,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(body["status"], "pending");
}

#[tokio::test]
async fn connection_create_rejects_incomplete_credentials() {
    let (app, _db) = app().await;
    let token = Some(test_utils::OPERATOR_TOKEN);

    let (status, _) = call(
        &app,
        Method::POST,
        "/connections",
        token,
        Some(json!({
            "team_id": Uuid::new_v4(),
            "provider": "s3",
            "name": "Exports",
            "credentials": { "access_key_id": "AKIA" }
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = call(
        &app,
        Method::POST,
        "/connections",
        token,
        Some(json!({
            "team_id": Uuid::new_v4(),
            "provider": "dropbox",
            "name": "Files",
            "credentials": {}
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn schema_of_unknown_connection_is_404() {
    let (app, _db) = app().await;
    let (status, body) = call(
        &app,
        Method::GET,
        &format!("/connections/{}/schema", Uuid::new_v4()),
        Some(test_utils::OPERATOR_TOKEN),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn validate_connection_reports_missing_fields_as_invalid() {
    let (app, _db) = app().await;
    let (status, body) = call(
        &app,
        Method::POST,
        "/edge/validate-connection",
        Some(test_utils::OPERATOR_TOKEN),
        Some(json!({ "provider": "s3", "config": { "access_key_id": "AKIA" } })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["valid"], false);
    assert!(body["message"].as_str().unwrap().contains("secret_access_key"));
}

#[tokio::test]
async fn listener_for_unsupported_provider_is_400() {
    let (app, _db) = app().await;
    let (status, body) = call(
        &app,
        Method::POST,
        "/listeners",
        Some(test_utils::OPERATOR_TOKEN),
        Some(json!({
            "provider": "mongodb",
            "connectionConfig": { "connection_string": "mongodb://localhost" },
            "tableName": "orders"
        })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "UNSUPPORTED_PROVIDER");
}

#[tokio::test]
async fn auto_map_stores_suggested_mappings() {
    let (app, db) = app().await;
    let airtable =
        test_utils::insert_connection(&db, Provider::Airtable, test_utils::airtable_credentials())
            .await
            .unwrap();
    let notion =
        test_utils::insert_connection(&db, Provider::Notion, json!({ "api_key": "secret_x" }))
            .await
            .unwrap();
    let contacts = test_utils::insert_table(
        &db,
        airtable.id,
        "app1",
        "tblContacts",
        "Contacts",
        &["Email", "First Name", "Phone"],
    )
    .await
    .unwrap();
    let people = test_utils::insert_table(
        &db,
        notion.id,
        "workspace",
        "db-people",
        "People",
        &["email", "first_name", "Notes"],
    )
    .await
    .unwrap();
    let sync = test_utils::insert_sync(
        &db,
        (&airtable, &contacts),
        (&notion, &people),
        SyncStage::DataSources,
    )
    .await
    .unwrap();

    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/syncs/{}/auto-map", sync.id),
        Some(test_utils::OPERATOR_TOKEN),
        None,
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stage"], "mappings");
    let pairs: Vec<(String, String)> = body["field_mappings"]
        .as_array()
        .unwrap()
        .iter()
        .map(|m| {
            (
                m["source"].as_str().unwrap().to_string(),
                m["destination"].as_str().unwrap().to_string(),
            )
        })
        .collect();
    assert_eq!(
        pairs,
        vec![
            ("Email".to_string(), "email".to_string()),
            ("First Name".to_string(), "first_name".to_string()),
        ]
    );

    let stored = SyncRepository::new(db).get_by_id(sync.id).await.unwrap().unwrap();
    assert_eq!(stored.stage, "mappings");
    assert_eq!(stored.mappings().field_mappings.len(), 2);
}

#[tokio::test]
async fn auto_map_rejects_out_of_range_threshold() {
    let (app, _db) = app().await;
    let (status, body) = call(
        &app,
        Method::POST,
        &format!("/syncs/{}/auto-map", Uuid::new_v4()),
        Some(test_utils::OPERATOR_TOKEN),
        Some(json!({ "threshold": 1.5 })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_FAILED");
}

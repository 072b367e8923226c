//! # Authentication
//!
//! Bearer authentication for the operator and edge endpoints. A token is accepted when it
//! equals one of the configured operator tokens (constant-time compare) or is a Supabase
//! access token signed with the project's HS256 JWT secret.

use std::sync::Arc;

use axum::{
    extract::{FromRef, FromRequestParts, Request, State},
    http::{HeaderMap, header::AUTHORIZATION, request::Parts},
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation, decode};
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

use crate::config::AppConfig;
use crate::error::{ApiError, unauthorized};
use crate::server::AppState;

/// Audience Supabase puts on signed-in user tokens
const SUPABASE_AUDIENCE: &str = "authenticated";

/// Claims read from a Supabase access token
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SupabaseClaims {
    pub sub: String,
    pub exp: usize,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

/// Who made an authenticated request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Principal {
    Operator,
    User(SupabaseClaims),
}

impl FromRef<AppState> for Arc<AppConfig> {
    fn from_ref(app_state: &AppState) -> Self {
        Arc::clone(&app_state.config)
    }
}

/// Rejects requests without a valid bearer token and records the [`Principal`]
pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer_token(request.headers())?;
    let principal = authenticate(&config, token)?;

    match &principal {
        Principal::Operator => tracing::debug!("Authenticated operator request"),
        Principal::User(claims) => tracing::debug!(user_id = %claims.sub, "Authenticated user request"),
    }

    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}

fn extract_bearer_token(headers: &HeaderMap) -> Result<&str, ApiError> {
    let value = headers
        .get(AUTHORIZATION)
        .ok_or_else(|| unauthorized(Some("Missing Authorization header")))?
        .to_str()
        .map_err(|_| unauthorized(Some("Invalid Authorization header")))?;

    value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| unauthorized(Some("Authorization header must use Bearer scheme")))
}

fn authenticate(config: &AppConfig, token: &str) -> Result<Principal, ApiError> {
    let is_operator = config
        .operator_tokens
        .iter()
        .any(|configured| ConstantTimeEq::ct_eq(token.as_bytes(), configured.as_bytes()).into());
    if is_operator {
        return Ok(Principal::Operator);
    }

    let Some(secret) = config.supabase_jwt_secret.as_deref() else {
        return Err(unauthorized(Some("Invalid bearer token")));
    };

    let mut validation = Validation::new(Algorithm::HS256);
    validation.set_audience(&[SUPABASE_AUDIENCE]);
    decode::<SupabaseClaims>(token, &DecodingKey::from_secret(secret.as_bytes()), &validation)
        .map(|data| Principal::User(data.claims))
        .map_err(|e| {
            tracing::debug!(error = %e, "Rejected bearer token");
            unauthorized(Some("Invalid bearer token"))
        })
}

impl<S> FromRequestParts<S> for Principal
where
    S: Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Principal>()
            .cloned()
            .ok_or_else(|| unauthorized(Some("Authentication required")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Router,
        body::Body,
        http::{Request, StatusCode},
        routing::get,
    };
    use jsonwebtoken::{EncodingKey, Header, encode};
    use tower::ServiceExt;

    const JWT_SECRET: &str = "super-secret-jwt-token-with-at-least-32-characters";

    fn create_test_config() -> Arc<AppConfig> {
        Arc::new(AppConfig {
            operator_tokens: vec!["test-token-123".to_string()],
            supabase_jwt_secret: Some(JWT_SECRET.to_string()),
            ..Default::default()
        })
    }

    fn user_token(secret: &str, audience: &str) -> String {
        let exp = (chrono::Utc::now().timestamp() + 3600) as usize;
        encode(
            &Header::new(Algorithm::HS256),
            &serde_json::json!({ "sub": "user-1", "exp": exp, "aud": audience, "role": "authenticated" }),
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    async fn run_middleware(config: Arc<AppConfig>, authorization: Option<String>) -> Response {
        async fn handler(principal: Principal) -> String {
            match principal {
                Principal::Operator => "operator".to_string(),
                Principal::User(claims) => claims.sub,
            }
        }

        let mut request = Request::builder().uri("/test");
        if let Some(value) = authorization {
            request = request.header("Authorization", value);
        }

        Router::new()
            .route("/test", get(handler))
            .layer(axum::middleware::from_fn_with_state(config, auth_middleware))
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn missing_auth_header_returns_401() {
        let response = run_middleware(create_test_config(), None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn invalid_auth_scheme_returns_401() {
        let response =
            run_middleware(create_test_config(), Some("Basic dGVzdDoxMjM=".to_string())).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn operator_token_passes_through() {
        let response =
            run_middleware(create_test_config(), Some("Bearer test-token-123".to_string())).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "operator");
    }

    #[tokio::test]
    async fn supabase_jwt_passes_through() {
        let token = user_token(JWT_SECRET, SUPABASE_AUDIENCE);
        let response = run_middleware(create_test_config(), Some(format!("Bearer {token}"))).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_text(response).await, "user-1");
    }

    #[tokio::test]
    async fn jwt_with_wrong_secret_or_audience_returns_401() {
        for token in [
            user_token("another-secret-another-secret-another", SUPABASE_AUDIENCE),
            user_token(JWT_SECRET, "anon"),
        ] {
            let response =
                run_middleware(create_test_config(), Some(format!("Bearer {token}"))).await;
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        }
    }

    #[tokio::test]
    async fn jwt_rejected_when_no_secret_configured() {
        let config = Arc::new(AppConfig {
            operator_tokens: vec!["test-token-123".to_string()],
            ..Default::default()
        });
        let token = user_token(JWT_SECRET, SUPABASE_AUDIENCE);
        let response = run_middleware(config, Some(format!("Bearer {token}"))).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

//! # Error Handling
//!
//! Unified HTTP error handling for the Syncflow API. Every handler error is rendered as a
//! problem+json body carrying a stable `code` and the request trace id.

use axum::{
    extract::rejection::JsonRejection,
    http::{HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use utoipa::ToSchema;

use crate::connection_resolver::ResolveError;
use crate::crypto::CryptoError;
use crate::discovery::DiscoveryError;
use crate::listeners::ListenerError;
use crate::providers::{ProviderConfigError, StrategyError};
use crate::telemetry;
use crate::token_refresh::TokenRefreshError;
use crate::webhooks::WebhookError;

/// Hint returned with provider rate-limit failures
const RATE_LIMIT_RETRY_AFTER_SECS: u64 = 60;

/// Unified API error response structure
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ApiError {
    /// HTTP status code for the response
    #[serde(skip_serializing, skip_deserializing)]
    pub status: StatusCode,
    /// Error code for programmatic handling
    pub code: Box<str>,
    /// Human-readable error message
    pub message: Box<str>,
    /// Additional error details (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Box<serde_json::Value>>,
    /// Suggested retry delay in seconds (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
    /// Correlation trace ID for debugging (optional)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<Box<str>>,
}

impl ApiError {
    /// Create a new API error with the given status code and message
    pub fn new<S: Into<String>>(status: StatusCode, code: S, message: S) -> Self {
        Self {
            status,
            code: code.into().into_boxed_str(),
            message: message.into().into_boxed_str(),
            details: None,
            retry_after: None,
            trace_id: Self::current_trace_id(),
        }
    }

    /// Add details to the error
    pub fn with_details<V: Into<serde_json::Value>>(mut self, details: V) -> Self {
        self.details = Some(Box::new(details.into()));
        self
    }

    /// Set retry after delay
    pub fn with_retry_after(mut self, seconds: u64) -> Self {
        self.retry_after = Some(seconds);
        self
    }

    /// Trace id of the current request, or a short correlation id outside of one
    fn current_trace_id() -> Option<Box<str>> {
        telemetry::current_trace_id()
            .map(|trace_id| trace_id.into_boxed_str())
            .or_else(|| {
                Some(format!("corr-{}", &uuid::Uuid::new_v4().to_string()[..8]).into_boxed_str())
            })
    }
}

fn is_unique_violation(error: &sea_orm::DbErr) -> bool {
    use sea_orm::RuntimeErr;

    const PG_UNIQUE: &str = "23505";
    const SQLITE_DUPLICATE_CODES: &[&str] = &["1555", "2067"];

    let runtime_err = match error {
        sea_orm::DbErr::Query(RuntimeErr::SqlxError(sqlx_err))
        | sea_orm::DbErr::Exec(RuntimeErr::SqlxError(sqlx_err)) => sqlx_err,
        _ => return false,
    };

    let Some(db_error) = runtime_err.as_database_error() else {
        return false;
    };

    if db_error.is_unique_violation() {
        return true;
    }

    db_error
        .code()
        .is_some_and(|code| code == PG_UNIQUE || SQLITE_DUPLICATE_CODES.contains(&code.as_ref()))
}

/// Upstream provider error information
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProviderError {
    /// Provider slug (e.g., "airtable", "notion")
    pub provider: String,
    /// HTTP status code from upstream
    pub status: u16,
    /// Response body snippet from upstream (truncated)
    pub body_snippet: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let mut headers = HeaderMap::new();
        headers.insert(
            "content-type",
            HeaderValue::from_static("application/problem+json"),
        );

        if let Some(retry_after) = self.retry_after
            && let Ok(header_value) = HeaderValue::from_str(&retry_after.to_string())
        {
            headers.insert("retry-after", header_value);
        }

        (self.status, headers, axum::Json(self)).into_response()
    }
}

// Error mappers for common sources

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        tracing::error!("Internal error: {:?}", error);

        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "An internal error occurred",
        )
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let message = match rejection {
            JsonRejection::JsonDataError(err) => format!("Invalid JSON: {}", err),
            JsonRejection::JsonSyntaxError(err) => format!("JSON syntax error: {}", err),
            JsonRejection::MissingJsonContentType(_) => {
                "Missing 'Content-Type: application/json' header".to_string()
            }
            _ => "Invalid request body".to_string(),
        };

        Self::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", &message)
    }
}

impl From<sea_orm::DbErr> for ApiError {
    fn from(error: sea_orm::DbErr) -> Self {
        if is_unique_violation(&error) {
            tracing::debug!(?error, "Unique constraint violation detected");
            return Self::new(StatusCode::CONFLICT, "CONFLICT", "Resource already exists");
        }

        match error {
            sea_orm::DbErr::RecordNotFound(record) => Self::new(
                StatusCode::NOT_FOUND,
                "NOT_FOUND",
                &format!("Record not found: {}", record),
            ),
            sea_orm::DbErr::Conn(connection_err) => {
                tracing::error!("Database connection error: {:?}", connection_err);
                Self::new(
                    StatusCode::SERVICE_UNAVAILABLE,
                    "SERVICE_UNAVAILABLE",
                    "Database service unavailable",
                )
            }
            _ => {
                tracing::error!("Database error: {:?}", error);
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "Database error occurred",
                )
            }
        }
    }
}

impl From<ProviderConfigError> for ApiError {
    fn from(error: ProviderConfigError) -> Self {
        Self::new(
            StatusCode::BAD_REQUEST,
            "VALIDATION_FAILED",
            &error.to_string(),
        )
    }
}

impl From<StrategyError> for ApiError {
    fn from(error: StrategyError) -> Self {
        match error {
            StrategyError::Upstream {
                provider,
                status,
                body,
            } => provider_error(provider.to_string(), status, body),
            StrategyError::Unauthorized { provider } => {
                provider_error(provider.to_string(), 401, None)
            }
            StrategyError::Timeout { .. } => Self::new(
                StatusCode::GATEWAY_TIMEOUT,
                "PROVIDER_TIMEOUT",
                &error.to_string(),
            ),
            StrategyError::Config(config_error) => config_error.into(),
            StrategyError::Unsupported { .. } | StrategyError::ConfigMismatch { .. } => {
                Self::new(StatusCode::BAD_REQUEST, "UNSUPPORTED_PROVIDER", &error.to_string())
            }
            StrategyError::Connection { .. } | StrategyError::MalformedResponse { .. } => {
                tracing::warn!(error = %error, "Provider call failed");
                Self::new(StatusCode::BAD_GATEWAY, "PROVIDER_ERROR", &error.to_string())
            }
        }
    }
}

impl From<DiscoveryError> for ApiError {
    fn from(error: DiscoveryError) -> Self {
        match error {
            DiscoveryError::Strategy(strategy_error) => strategy_error.into(),
            DiscoveryError::Storage(storage_error) => storage_error.into(),
        }
    }
}

impl From<ResolveError> for ApiError {
    fn from(error: ResolveError) -> Self {
        match error {
            ResolveError::NotFound(id) => not_found("Connection", id),
            ResolveError::Config(config_error) => config_error.into(),
            ResolveError::Refresh(TokenRefreshError::Rejected {
                provider,
                status,
                body,
            }) => provider_error(provider.to_string(), status, Some(body)),
            ResolveError::Refresh(TokenRefreshError::Storage(storage_error)) => {
                storage_error.into()
            }
            ResolveError::Refresh(refresh_error) => {
                tracing::warn!(error = %refresh_error, "Token refresh failed");
                Self::new(
                    StatusCode::BAD_GATEWAY,
                    "PROVIDER_ERROR",
                    &refresh_error.to_string(),
                )
            }
            ResolveError::Storage(storage_error) => storage_error.into(),
        }
    }
}

impl From<WebhookError> for ApiError {
    fn from(error: WebhookError) -> Self {
        match error {
            WebhookError::MissingProvider => missing_field("provider"),
            WebhookError::UnknownProvider(provider) => {
                tracing::error!(provider = %provider, "Webhook for an unhandled provider");
                Self::new(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_SERVER_ERROR",
                    "An internal error occurred",
                )
            }
            WebhookError::Storage(storage_error) => storage_error.into(),
        }
    }
}

impl From<ListenerError> for ApiError {
    fn from(error: ListenerError) -> Self {
        match error {
            ListenerError::Unsupported(_) => Self::new(
                StatusCode::BAD_REQUEST,
                "UNSUPPORTED_PROVIDER",
                &error.to_string(),
            ),
            ListenerError::MissingField(field) => missing_field(field),
            ListenerError::InvalidIdentifier(_) => validation_error(
                &error.to_string(),
                json!({ "tableName": "must be a plain SQL identifier" }),
            ),
            ListenerError::TableNotFound(table) => not_found("Table", table),
            ListenerError::Config(config_error) => config_error.into(),
            ListenerError::Strategy(strategy_error) => strategy_error.into(),
            ListenerError::Database(_) => {
                tracing::warn!(error = %error, "Listener installation failed");
                Self::new(StatusCode::BAD_GATEWAY, "PROVIDER_ERROR", &error.to_string())
            }
        }
    }
}

impl From<CryptoError> for ApiError {
    fn from(error: CryptoError) -> Self {
        tracing::error!(error = %error, "Credential encryption failure");
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "An internal error occurred",
        )
    }
}

/// Create a provider upstream error
pub fn provider_error(provider: String, status: u16, body: Option<String>) -> ApiError {
    let provider_error = ProviderError {
        provider: provider.clone(),
        status,
        body_snippet: body.map(|b| {
            if b.chars().count() > 200 {
                let truncated: String = b.chars().take(200).collect();
                format!("{}...", truncated)
            } else {
                b
            }
        }),
    };

    // Upstream failures of any status surface as 502 so they are not mistaken for client errors
    let error = ApiError::new(
        StatusCode::BAD_GATEWAY,
        "PROVIDER_ERROR",
        &format!("Provider {} returned error status {}", provider, status),
    )
    .with_details(json!(provider_error));

    if status == 429 {
        error.with_retry_after(RATE_LIMIT_RETRY_AFTER_SECS)
    } else {
        error
    }
}

/// Create an unauthorized error (401)
pub fn unauthorized(message: Option<&str>) -> ApiError {
    let msg = message.unwrap_or("Authentication required");
    ApiError::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg)
}

/// Create a validation error with field details
pub fn validation_error(message: &str, field_errors: serde_json::Value) -> ApiError {
    ApiError::new(StatusCode::BAD_REQUEST, "VALIDATION_FAILED", message).with_details(field_errors)
}

/// Create a 400 for a required request field that is absent
pub fn missing_field(field: &str) -> ApiError {
    validation_error(
        &format!("Missing required field '{}'", field),
        json!({ field: "required" }),
    )
}

/// Create a 404 for a missing resource
pub fn not_found(resource: &str, id: impl std::fmt::Display) -> ApiError {
    ApiError::new(
        StatusCode::NOT_FOUND,
        "NOT_FOUND",
        &format!("{} {} not found", resource, id),
    )
}

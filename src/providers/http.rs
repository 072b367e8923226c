//! Response handling shared by the REST strategies

use reqwest::{RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use super::{Provider, StrategyError};

/// Upstream bodies are truncated before they travel into errors and logs
const MAX_ERROR_BODY: usize = 512;

/// Send `request` and decode a successful JSON body
pub(crate) async fn send_json<T: DeserializeOwned>(
    provider: Provider,
    request: RequestBuilder,
) -> Result<T, StrategyError> {
    let resp = send(provider, request).await?;
    resp.json::<T>()
        .await
        .map_err(|e| StrategyError::malformed(provider, e.to_string()))
}

/// Send `request` and map non-success statuses to [`StrategyError`]
pub(crate) async fn send(
    provider: Provider,
    request: RequestBuilder,
) -> Result<Response, StrategyError> {
    let resp = request
        .send()
        .await
        .map_err(|e| StrategyError::connection(provider, e))?;

    match resp.status() {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            Err(StrategyError::Unauthorized { provider })
        }
        status if !status.is_success() => {
            let body = resp.text().await.ok().map(|body| truncate(&body));
            tracing::warn!(%provider, status = status.as_u16(), "Provider request failed");
            Err(StrategyError::Upstream {
                provider,
                status: status.as_u16(),
                body,
            })
        }
        _ => Ok(resp),
    }
}

fn truncate(body: &str) -> String {
    if body.chars().count() > MAX_ERROR_BODY {
        body.chars().take(MAX_ERROR_BODY).collect()
    } else {
        body.to_string()
    }
}

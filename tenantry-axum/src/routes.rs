use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderName, HeaderValue},
    response::{IntoResponse, Response},
    routing::{get, post},
    Extension, Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use tenantry_core::{TenantId, TenantryError};
use tenantry_resolver::{Resolution, SwitchOutcome, TenantView};

use crate::identity::AuthenticatedUser;
use crate::{TenantryAxumError, TenantryAxumState};

const CLEAR_SITE_DATA: HeaderName = HeaderName::from_static("clear-site-data");

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwitchRequest {
    tenant_id: String,
}

fn map_json_rejection(rejection: JsonRejection) -> TenantryAxumError {
    TenantryError::bad_request("Failed to parse the request body as JSON")
        .with_errors(json!({"_schema": [rejection.to_string()]}))
        .into()
}

async fn current_tenant(
    State(state): State<TenantryAxumState>,
    user: AuthenticatedUser,
) -> Result<Json<TenantView>, TenantryAxumError> {
    let view = state.services.current(&user.email).await.ok_or_else(|| {
        TenantryError::not_found("No tenant assignment found for this user")
            .with_reason("no-assignment-data")
    })?;
    Ok(Json(view))
}

async fn switch_tenant(
    State(state): State<TenantryAxumState>,
    user: AuthenticatedUser,
    body: Result<Json<SwitchRequest>, JsonRejection>,
) -> Result<Response, TenantryAxumError> {
    let Json(body) = body.map_err(map_json_rejection)?;
    let tenant_id = body.tenant_id.trim();
    if tenant_id.is_empty() {
        return Err(TenantryError::bad_request("tenantId must not be empty").into());
    }

    let report = state.services.switch(&user.email, &TenantId::new(tenant_id)).await?;

    let mut response = Json(&report).into_response();
    if report.outcome == SwitchOutcome::Switched {
        response
            .headers_mut()
            .insert(CLEAR_SITE_DATA, HeaderValue::from_static("\"cache\", \"storage\""));
    }
    Ok(response)
}

/// `/tenant` and `/tenant/switch`.
pub fn tenant_router(state: TenantryAxumState) -> Router<()> {
    Router::new()
        .route("/", get(current_tenant))
        .route("/switch", post(switch_tenant))
        .with_state(state)
}

/// `/tenant/partition`. Expects the resolution middleware in front of it.
pub fn partition_router() -> Router<()> {
    Router::new().route(
        "/",
        get(|Extension(resolution): Extension<Resolution>| async move { Json(resolution) }),
    )
}

async fn health(
    State(state): State<TenantryAxumState>,
) -> Result<&'static str, TenantryAxumError> {
    state.connections.check().await.map_err(|e| {
        TenantryError::unavailable(format!("Document store unavailable: {e}"))
    })?;
    Ok("ok")
}

/// `/health`: store round trip.
pub fn health_router(state: TenantryAxumState) -> Router<()> {
    Router::new().route("/", get(health)).with_state(state)
}

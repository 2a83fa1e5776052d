use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use tenantry_core::TenantryError;
use tenantry_resolver::SwitchError;
use tracing::error;

#[derive(Debug)]
pub struct TenantryAxumError(pub anyhow::Error);

impl From<anyhow::Error> for TenantryAxumError {
    fn from(e: anyhow::Error) -> Self {
        Self(e)
    }
}

impl From<TenantryError> for TenantryAxumError {
    fn from(e: TenantryError) -> Self {
        Self(e.into_anyhow())
    }
}

impl From<SwitchError> for TenantryAxumError {
    fn from(e: SwitchError) -> Self {
        TenantryError::from(e).into()
    }
}

impl IntoResponse for TenantryAxumError {
    fn into_response(self) -> Response {
        // Keep the structured fields even when wrapped in anyhow contexts
        let tenantry = match TenantryError::from_anyhow(&self.0) {
            Some(err) => {
                if !err.kind.is_client_error() {
                    error!(error = ?self.0, "Request failed");
                }
                err.sanitize_for_client()
            }
            None => {
                error!(error = ?self.0, "Unhandled error");
                TenantryError::normalize(self.0).sanitize_for_client()
            }
        };
        let status =
            StatusCode::from_u16(tenantry.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(tenantry.to_json())).into_response()
    }
}

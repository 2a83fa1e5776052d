use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use tenantry_core::{NormalizedEmail, TenantContext, TenantryError};

use crate::TenantryAxumError;

/// Header carrying the email verified by the upstream authentication layer.
pub const USER_EMAIL_HEADER: &str = "x-user-email";

/// The caller as seen by tenant resolution.
///
/// A [`TenantContext`] placed in the request extensions by an earlier layer
/// (a session, for instance) is picked up as the attached context.
#[derive(Debug, Clone)]
pub struct AuthenticatedUser {
    pub email: NormalizedEmail,
    pub attached: Option<TenantContext>,
}

impl AuthenticatedUser {
    pub fn from_parts(parts: &Parts) -> Result<Self, TenantryError> {
        let raw = parts
            .headers
            .get(USER_EMAIL_HEADER)
            .ok_or_else(|| TenantryError::not_authenticated("Missing authenticated user"))?
            .to_str()
            .map_err(|_| TenantryError::bad_request("User email header is not valid text"))?;

        Ok(Self {
            email: NormalizedEmail::parse(raw)?,
            attached: parts.extensions.get::<TenantContext>().cloned(),
        })
    }
}

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = TenantryAxumError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Self::from_parts(parts)?)
    }
}

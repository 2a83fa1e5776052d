use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use tracing::debug;

use crate::identity::AuthenticatedUser;
use crate::{TenantryAxumError, TenantryAxumState};

/// Resolves the caller's partition and stores the
/// [`Resolution`](tenantry_resolver::Resolution) in the request extensions.
///
/// Domain handlers read it with `Extension<Resolution>` and open their
/// partition handle with [`TenantryAxumState::connection`].
pub async fn resolve_tenant(
    State(state): State<TenantryAxumState>,
    request: Request,
    next: Next,
) -> Response {
    let (mut parts, body) = request.into_parts();
    let user = match AuthenticatedUser::from_parts(&parts) {
        Ok(user) => user,
        Err(e) => return TenantryAxumError::from(e).into_response(),
    };

    let resolution = state.services.resolve(&user.email, user.attached.as_ref()).await;
    debug!(
        email = %user.email,
        tier = resolution.tier(),
        partition = %resolution.partition(),
        "Request partition attached"
    );
    parts.extensions.insert(resolution);

    next.run(Request::from_parts(parts, body)).await
}

use axum::http::HeaderName;
use axum::middleware::from_fn_with_state;
use axum::Router;
use tokio::net::{TcpListener, ToSocketAddrs};
use tower::ServiceBuilder;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::middleware::resolve_tenant;
use crate::routes;
use crate::TenantryAxumState;

const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");

#[derive(Clone)]
pub struct TenantryApp {
    pub state: TenantryAxumState,
    routes: Router<()>,
}

impl TenantryApp {
    pub fn new(state: TenantryAxumState) -> Self {
        Self {
            state,
            routes: Router::new(),
        }
    }

    /// Mounts the tenant endpoints: `/tenant`, `/tenant/switch`,
    /// `/tenant/partition` and `/health`.
    pub fn with_tenant_routes(self) -> Self {
        let state = self.state.clone();
        self.use_router("/tenant", routes::tenant_router(state.clone()))
            .use_resolved("/tenant/partition", routes::partition_router())
            .use_router("/health", routes::health_router(state))
    }

    pub fn use_router(mut self, path: &str, router: Router<()>) -> Self {
        self.routes = self.routes.nest(path, router);
        self
    }

    /// Mounts a router whose handlers receive the caller's
    /// [`Resolution`](tenantry_resolver::Resolution) as an extension.
    pub fn use_resolved(self, path: &str, router: Router<()>) -> Self {
        let layered = router.route_layer(from_fn_with_state(self.state.clone(), resolve_tenant));
        self.use_router(path, layered)
    }

    /// The finished router with request ids and HTTP tracing applied.
    pub fn router(&self) -> Router<()> {
        self.routes.clone().layer(
            ServiceBuilder::new()
                .layer(SetRequestIdLayer::new(REQUEST_ID_HEADER, MakeRequestUuid))
                .layer(TraceLayer::new_for_http())
                .layer(PropagateRequestIdLayer::new(REQUEST_ID_HEADER)),
        )
    }

    pub async fn listen<A>(self, addr: A) -> anyhow::Result<()>
    where
        A: ToSocketAddrs,
    {
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "Tenantry listening");
        axum::serve(listener, self.router()).await?;
        Ok(())
    }
}

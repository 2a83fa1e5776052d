use tenantry_axum::bootstrap;
use tenantry_core::TenantryConfig;
use tracing_subscriber::EnvFilter;

const ENV_PREFIX: &str = "TENANTRY__";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let mut config = TenantryConfig::new();
    config.load_env(ENV_PREFIX);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if config.get("log.format") == Some("json") {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    let host = config.get("http.host").unwrap_or("127.0.0.1").to_string();
    let port = config.get("http.port").unwrap_or("3030").to_string();
    let addr = format!("{host}:{port}");

    let app = bootstrap::build(&config)?;
    app.listen(addr).await
}

use anyhow::Result;
use coordinatord::{
    acl_reload, auth::AuthConfig, config::AppConfig, create_router, rate_limit, state::AppState, sweep,
};
use coord_acl::Policy;
use std::sync::Arc;
use tracing::{info, Level};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    info!("Starting coordinatord");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    coordinatord::auth::validate_hash_pepper_configuration()?;

    let db_config = coord_store::DatabaseConfig::from_env()?;
    let pool = coord_store::create_pool(&db_config).await?;
    coord_store::run_migrations(&pool).await?;
    coord_store::health_check(&pool).await?;
    info!("database connection established and verified");

    rate_limit::start_cleanup_task().await;
    info!("rate limiter cleanup task started");

    let config = AppConfig::from_env()?;
    let auth_config = AuthConfig::from_env()?;

    let server_keys = match std::env::var("SERVER_PRIVATE_KEY_HEX") {
        Ok(hex) => coord_crypto::Keypair::from_hex(&hex)?,
        Err(_) => {
            tracing::warn!("SERVER_PRIVATE_KEY_HEX is not set; generating an ephemeral key for this process only");
            coord_crypto::Keypair::generate()
        }
    };
    info!(public_key = %server_keys.public_hex(), "server key loaded");

    let store = coord_store::Store::new(pool);

    let (initial_policy, initial_rules) = match &config.acl_policy_path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)?;
            let policy = Policy::parse(&raw)?;
            let nodes = store.nodes.list_all().await?;
            let views = coordinatord::acl_views::nodes_to_views(&store, &nodes)
                .await
                .map_err(|e| anyhow::anyhow!(e.message))?;
            let rules = coord_acl::compile(&policy, &views)?;
            (policy, rules)
        }
        None => {
            tracing::warn!("ACL_POLICY_PATH is not configured; starting with an empty (deny-all extra) policy");
            (Policy::default(), Vec::new())
        }
    };

    let oidc_client = match build_oidc_client().await {
        Ok(client) => client,
        Err(err) => {
            tracing::warn!(error = %err, "OIDC is not configured; /oidc/* routes will return 503");
            None
        }
    };

    let state = Arc::new(AppState::new(store, server_keys, config, auth_config, initial_policy, initial_rules, oidc_client));

    sweep::spawn(state.clone());
    acl_reload::spawn(state.clone());

    let port: u16 = std::env::var("PORT").ok().and_then(|p| p.parse().ok()).unwrap_or(8080);
    let addr = format!("0.0.0.0:{port}");

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("coordinatord listening on http://{addr}");
    info!("Swagger UI available at http://{addr}/swagger-ui");
    info!("Prometheus metrics at http://{addr}/metrics");

    axum::serve(listener, app).await?;

    Ok(())
}

async fn build_oidc_client() -> anyhow::Result<Option<openidconnect::core::CoreClient>> {
    let issuer = std::env::var("OIDC_ISSUER_URL")?;
    let client_id = std::env::var("OIDC_CLIENT_ID")?;
    let client_secret = std::env::var("OIDC_CLIENT_SECRET")?;
    let redirect = std::env::var("OIDC_REDIRECT_URL")?;

    let issuer_url = openidconnect::IssuerUrl::new(issuer)?;
    let provider_metadata =
        openidconnect::core::CoreProviderMetadata::discover_async(issuer_url, openidconnect::reqwest::async_http_client)
            .await?;

    let client = openidconnect::core::CoreClient::from_provider_metadata(
        provider_metadata,
        openidconnect::ClientId::new(client_id),
        Some(openidconnect::ClientSecret::new(client_secret)),
    )
    .set_redirect_uri(openidconnect::RedirectUrl::new(redirect)?);

    Ok(Some(client))
}

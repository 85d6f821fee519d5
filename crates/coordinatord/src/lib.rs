use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

pub mod acl_reload;
pub mod acl_views;
pub mod assemble;
pub mod auth;
pub mod broadcast;
pub mod cache;
pub mod config;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod rate_limit;
pub mod state;
pub mod sweep;
pub mod wire;

use error::ApiError;
use state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::key::get_key,
        handlers::register::register,
        handlers::map::map_session,
        handlers::admin::login,
        handlers::admin::register_operator,
        handlers::admin::list_namespaces,
        handlers::admin::create_namespace,
    ),
    components(schemas(
        ApiError,
        wire::RegisterRequest,
        wire::RegisterResponse,
        wire::MapRequest,
        wire::Hostinfo,
        wire::Endpoint,
        wire::AuthBlock,
        auth::LoginRequest,
        auth::LoginResponse,
        auth::OperatorRegisterRequest,
        handlers::admin::CreateNamespaceRequest,
        handlers::admin::NamespaceView,
        handlers::admin::CreatePreAuthKeyRequest,
        handlers::admin::PreAuthKeyView,
        handlers::admin::NodeView,
        handlers::admin::IssueApiKeyResponse,
    ))
)]
struct ApiDoc;

/// Build the application router. The node-facing protocol endpoints
/// (`/key`, `/machine/*`) carry no auth middleware of their own since the
/// sealed-box codec already authenticates every request; the admin and
/// OIDC surfaces layer JWT/API-key middleware per spec §11.
pub fn create_router(state: Arc<AppState>) -> Router {
    let node_routes = Router::new()
        .route("/key", get(handlers::key::get_key))
        .route("/machine/:machine_key/register", post(handlers::register::register))
        .route("/machine/:machine_key/map", post(handlers::map::map_session));

    let oidc_routes = Router::new()
        .route("/oidc/register/:machine_key", get(handlers::oidc::start))
        .route("/oidc/callback", get(handlers::oidc::callback));

    let admin_auth_routes = Router::new()
        .route("/admin/login", post(handlers::admin::login))
        .route("/admin/register", post(handlers::admin::register_operator));

    let admin_protected_routes = Router::new()
        .route(
            "/admin/namespaces",
            post(handlers::admin::create_namespace).get(handlers::admin::list_namespaces),
        )
        .route("/admin/namespaces/:id", axum::routing::delete(handlers::admin::delete_namespace))
        .route(
            "/admin/namespaces/:id/pre-auth-keys",
            post(handlers::admin::create_pre_auth_key).get(handlers::admin::list_pre_auth_keys),
        )
        .route("/admin/pre-auth-keys/:id", axum::routing::delete(handlers::admin::expire_pre_auth_key))
        .route("/admin/nodes", get(handlers::admin::list_nodes))
        .route("/admin/nodes/:id", axum::routing::delete(handlers::admin::delete_node))
        .route("/admin/nodes/:node_id/routes", get(handlers::routes::list_routes_for_node))
        .route("/admin/routes", post(handlers::routes::advertise_route))
        .route("/admin/routes/:id", axum::routing::delete(handlers::routes::delete_route))
        .route("/admin/routes/:id/enable", post(handlers::routes::enable_route))
        .route("/admin/routes/:id/disable", post(handlers::routes::disable_route))
        .route("/admin/api-keys", post(handlers::admin::issue_api_key))
        .route("/admin/acl/reload", post(handlers::admin::reload_acl))
        .layer(axum_middleware::from_fn(middleware::auth::require_admin_middleware))
        .layer(axum_middleware::from_fn_with_state(state.clone(), middleware::auth::jwt_auth_middleware));

    let api_key_routes = Router::new()
        .route("/admin/whoami", get(whoami))
        .layer(axum_middleware::from_fn_with_state(state.clone(), middleware::auth::api_key_auth_middleware));

    let openapi_json = utoipa::openapi::OpenApiBuilder::from(ApiDoc::openapi()).build();

    Router::new()
        .merge(node_routes)
        .merge(oidc_routes)
        .merge(admin_auth_routes)
        .merge(admin_protected_routes)
        .merge(api_key_routes)
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", openapi_json))
        .merge(middleware::metrics::create_metrics_router())
        .layer(axum_middleware::from_fn(middleware::metrics::metrics_middleware))
        .layer(axum_middleware::from_fn(middleware::logging::request_tracing_middleware))
        .layer(axum_middleware::from_fn(middleware::headers::security_headers_middleware))
        .layer(axum_middleware::from_fn(rate_limit::rate_limit_middleware))
        .layer(middleware::cors::create_cors_layer())
        .with_state(state)
}

async fn whoami(auth_user: auth::AuthUser) -> axum::Json<serde_json::Value> {
    axum::Json(serde_json::json!({
        "user_id": auth_user.user_id,
        "username": auth_user.username,
        "role": auth_user.role,
    }))
}

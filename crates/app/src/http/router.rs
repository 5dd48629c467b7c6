use axum::http::header::{AUTHORIZATION, CONTENT_TYPE};
use axum::http::{HeaderValue, Method};
use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};

use crate::http::middleware::{admin_auth, query_limit};
use crate::http::routes::{admin, comments, health};
use crate::state::AppState;

pub fn build(state: AppState) -> Router {
    let cors = build_cors(&state);
    let admin_routes = Router::new()
        .route(
            "/v1/admin/crawl",
            get(admin::crawl::get_crawl)
                .post(admin::crawl::post_crawl)
                .delete(admin::crawl::delete_crawl),
        )
        .route(
            "/v1/admin/cookie",
            get(admin::cookie::get_cookie)
                .put(admin::cookie::put_cookie)
                .delete(admin::cookie::delete_cookie),
        )
        .route("/v1/admin/cookie/check", post(admin::cookie::post_cookie_check))
        .route(
            "/v1/admin/comments",
            axum::routing::delete(admin::comments::delete_comments),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            admin_auth::require_admin,
        ));
    let mut router = Router::new()
        .route("/health", get(health::health))
        .route(
            "/v1/comments",
            get(comments::list_comments)
                .layer(middleware::from_fn(query_limit::enforce_query_length)),
        )
        .route("/v1/comments/stats", get(comments::comment_stats))
        .route("/v1/comments/{comment_id}", get(comments::get_comment))
        .merge(admin_routes)
        .with_state(state);
    if let Some(cors) = cors {
        router = router.layer(cors);
    }
    router
}

fn build_cors(state: &AppState) -> Option<CorsLayer> {
    let mut origins = Vec::new();
    let mut allow_any = false;
    for origin in state.config.cors_allow_origins.iter() {
        if is_wildcard_origin(origin) {
            allow_any = true;
            break;
        }
        match HeaderValue::from_str(origin.trim()) {
            Ok(value) => origins.push(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "invalid CORS origin ignored");
            }
        }
    }

    if !should_enable_cors(allow_any, &origins) {
        return None;
    }

    let cors = CorsLayer::new().allow_methods([
        Method::GET,
        Method::POST,
        Method::PUT,
        Method::DELETE,
        Method::OPTIONS,
    ]);
    if allow_any {
        Some(cors.allow_origin(Any).allow_headers(Any))
    } else {
        Some(
            cors.allow_origin(AllowOrigin::list(origins))
                .allow_headers([CONTENT_TYPE, AUTHORIZATION]),
        )
    }
}

fn is_wildcard_origin(origin: &str) -> bool {
    origin.trim() == "*"
}

fn should_enable_cors(allow_any: bool, origins: &[HeaderValue]) -> bool {
    allow_any || !origins.is_empty()
}

use axum::http::{header, Method};
use tower_http::cors::{Any, CorsLayer};

/// CORS policy for browser front-ends served from any origin.
///
/// Preflight `OPTIONS` requests are answered by the layer itself with 200 and
/// an empty body; every other response gets `Access-Control-Allow-Origin: *`.
pub fn permissive_cors(methods: impl Into<Vec<Method>>) -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(methods.into())
        .allow_headers([header::CONTENT_TYPE])
}

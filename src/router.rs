use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post, MethodRouter};
use axum::{middleware, Router};
use tower_http::timeout::TimeoutLayer;

use crate::auth::{require_token, TokenValidator};
use crate::dispatch::RouteHandler;
use crate::error::ValidationError;
use crate::request::{FormFields, MetricType};
use crate::{ProxyError, ProxyResult};

/// One route per metric type.
pub const STATIC_ROUTER: &str = "static";
/// A single route; the metric type is resolved per request.
pub const DYNAMIC_ROUTER: &str = "dynamic";

/// Identifiers accepted by [`build_router`].
pub const ROUTER_NAMES: [&str; 2] = [STATIC_ROUTER, DYNAMIC_ROUTER];

/// Largest accepted request body.
pub const MAX_BODY_SIZE: usize = 64 * 1024;

type HandlerState = State<Arc<RouteHandler>>;

/// Maps metric endpoints onto the dispatcher.
pub trait HttpRouterAdapter: Send + Sync {
    /// Identifier this adapter is registered under.
    fn name(&self) -> &'static str;

    /// Routes for the metric endpoints only; [`make_app`] adds the rest.
    fn metric_routes(&self) -> Router<Arc<RouteHandler>>;
}

/// Registers `/{type}/{key}` once per [`MetricType`]; other types are 404.
pub struct StaticRouter;

impl HttpRouterAdapter for StaticRouter {
    fn name(&self) -> &'static str {
        STATIC_ROUTER
    }

    fn metric_routes(&self) -> Router<Arc<RouteHandler>> {
        MetricType::ALL
            .into_iter()
            .fold(Router::new(), |router, metric_type| {
                router.route(
                    &format!("/{}/{{key}}", metric_type.as_str()),
                    typed_route(metric_type),
                )
            })
    }
}

/// Registers a single `/{metric_type}/{key}` route and resolves the type per request.
pub struct DynamicRouter;

impl HttpRouterAdapter for DynamicRouter {
    fn name(&self) -> &'static str {
        DYNAMIC_ROUTER
    }

    fn metric_routes(&self) -> Router<Arc<RouteHandler>> {
        Router::new().route("/{metric_type}/{key}", post(named_route))
    }
}

/// Creates the router adapter registered under `name`.
///
/// # Errors
/// Returns [`ProxyError::Configuration`] for an unknown identifier.
pub fn build_router(name: &str) -> ProxyResult<Box<dyn HttpRouterAdapter>> {
    match name {
        STATIC_ROUTER => Ok(Box::new(StaticRouter)),
        DYNAMIC_ROUTER => Ok(Box::new(DynamicRouter)),
        other => Err(ProxyError::Configuration(format!(
            "HTTP router '{other}' is not supported, expected one of {ROUTER_NAMES:?}"
        ))),
    }
}

/// Assembles the full application: metric routes (token-checked when `auth` is set), the
/// heartbeat, the body limit and the request timeout.
pub fn make_app(
    adapter: &dyn HttpRouterAdapter,
    handler: Arc<RouteHandler>,
    auth: Option<TokenValidator>,
    request_timeout: Duration,
) -> Router {
    let mut metrics = adapter.metric_routes();
    if let Some(validator) = auth {
        metrics = metrics.route_layer(middleware::from_fn_with_state(validator, require_token));
    }

    Router::new()
        .route("/heartbeat", get(heartbeat))
        .merge(metrics)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            request_timeout,
        ))
        .with_state(handler)
}

#[allow(clippy::unused_async)]
async fn heartbeat() -> &'static str {
    "OK"
}

fn typed_route(metric_type: MetricType) -> MethodRouter<Arc<RouteHandler>> {
    post(
        move |State(handler): HandlerState,
              Path(key): Path<String>,
              headers: HeaderMap,
              body: Bytes| async move {
            let fields = FormFields::from_request(&headers, body).await?;
            handler.handle_metric(metric_type, &key, &headers, &fields)?;
            Ok::<_, ValidationError>(StatusCode::OK)
        },
    )
}

async fn named_route(
    State(handler): HandlerState,
    Path((metric_type, key)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ValidationError> {
    let fields = FormFields::from_request(&headers, body).await?;
    handler.handle_named(&metric_type, &key, &headers, &fields)?;
    Ok(StatusCode::OK)
}

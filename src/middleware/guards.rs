use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use super::{MiddlewareFuture, RequestFlags};

/// Boxed request handler used by the branching guards.
pub type GuardHandler =
    Arc<dyn Fn(Request) -> Pin<Box<dyn Future<Output = Response> + Send>> + Send + Sync>;

/// Wrap an async function into a [`GuardHandler`].
pub fn handler<F, Fut>(f: F) -> GuardHandler
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(move |req| Box::pin(f(req)))
}

/// Options for [`require_feature`] and the AND/OR combinators.
#[derive(Clone)]
pub struct RequireFeatureOptions {
    pub status_code: StatusCode,
    pub message: Option<String>,
    /// Custom response when the flag is off; takes precedence over
    /// `status_code`/`message`.
    pub on_disabled: Option<GuardHandler>,
}

impl Default for RequireFeatureOptions {
    fn default() -> Self {
        Self {
            status_code: StatusCode::NOT_FOUND,
            message: None,
            on_disabled: None,
        }
    }
}

impl RequireFeatureOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status_code(mut self, status_code: StatusCode) -> Self {
        self.status_code = status_code;
        self
    }

    pub fn message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }

    pub fn on_disabled(mut self, handler: GuardHandler) -> Self {
        self.on_disabled = Some(handler);
        self
    }
}

fn disabled_response(description: &str, options: &RequireFeatureOptions) -> Response {
    let message = options
        .message
        .clone()
        .unwrap_or_else(|| format!("Feature '{}' is not available", description));
    (
        options.status_code,
        Json(json!({ "error": message, "code": "FEATURE_DISABLED" })),
    )
        .into_response()
}

// Guards read the context straight from extensions instead of through the
// extractor: a missing context must behave as "disabled", not reject.
fn request_flags(req: &Request) -> Option<RequestFlags> {
    req.extensions().get::<RequestFlags>().cloned()
}

/// Guard that short-circuits the request when the flag is disabled.
/// Fails closed when no flag context was attached upstream.
pub fn require_feature(
    key: impl Into<String>,
    options: RequireFeatureOptions,
) -> impl Fn(Request, Next) -> MiddlewareFuture + Clone + Send + Sync + 'static {
    let key = key.into();
    move |req: Request, next: Next| {
        let key = key.clone();
        let options = options.clone();
        Box::pin(async move {
            let enabled = match request_flags(&req) {
                Some(flags) => flags.is_enabled(&key).await,
                None => false,
            };

            if enabled {
                return next.run(req).await;
            }
            if let Some(on_disabled) = &options.on_disabled {
                return on_disabled(req).await;
            }
            disabled_response(&key, &options)
        })
    }
}

/// Guard that requires every listed flag to be enabled.
pub fn require_all_features(
    keys: Vec<String>,
    options: RequireFeatureOptions,
) -> impl Fn(Request, Next) -> MiddlewareFuture + Clone + Send + Sync + 'static {
    move |req: Request, next: Next| {
        let keys = keys.clone();
        let options = options.clone();
        Box::pin(async move {
            let all_enabled = match request_flags(&req) {
                Some(flags) => {
                    let mut all = true;
                    for key in &keys {
                        if !flags.is_enabled(key).await {
                            all = false;
                            break;
                        }
                    }
                    all
                }
                None => false,
            };

            if all_enabled {
                return next.run(req).await;
            }
            if let Some(on_disabled) = &options.on_disabled {
                return on_disabled(req).await;
            }
            disabled_response(&keys.join(", "), &options)
        })
    }
}

/// Guard that requires at least one listed flag to be enabled.
pub fn require_any_feature(
    keys: Vec<String>,
    options: RequireFeatureOptions,
) -> impl Fn(Request, Next) -> MiddlewareFuture + Clone + Send + Sync + 'static {
    move |req: Request, next: Next| {
        let keys = keys.clone();
        let options = options.clone();
        Box::pin(async move {
            let any_enabled = match request_flags(&req) {
                Some(flags) => {
                    let mut any = false;
                    for key in &keys {
                        if flags.is_enabled(key).await {
                            any = true;
                            break;
                        }
                    }
                    any
                }
                None => false,
            };

            if any_enabled {
                return next.run(req).await;
            }
            if let Some(on_disabled) = &options.on_disabled {
                return on_disabled(req).await;
            }
            disabled_response(&keys.join(", "), &options)
        })
    }
}

/// Configuration for [`conditional_route`].
#[derive(Clone)]
pub struct ConditionalRoute {
    pub flag_key: String,
    pub enabled: GuardHandler,
    pub disabled: Option<GuardHandler>,
}

impl ConditionalRoute {
    pub fn new(flag_key: impl Into<String>, enabled: GuardHandler) -> Self {
        Self {
            flag_key: flag_key.into(),
            enabled,
            disabled: None,
        }
    }

    pub fn disabled(mut self, handler: GuardHandler) -> Self {
        self.disabled = Some(handler);
        self
    }
}

/// Branch request handling on a flag. Falls through to the next handler
/// when the flag is off and no disabled handler is supplied.
pub fn conditional_route(
    route: ConditionalRoute,
) -> impl Fn(Request, Next) -> MiddlewareFuture + Clone + Send + Sync + 'static {
    move |req: Request, next: Next| {
        let route = route.clone();
        Box::pin(async move {
            let enabled = match request_flags(&req) {
                Some(flags) => flags.is_enabled(&route.flag_key).await,
                None => false,
            };

            if enabled {
                (route.enabled)(req).await
            } else if let Some(disabled) = &route.disabled {
                disabled(req).await
            } else {
                next.run(req).await
            }
        })
    }
}

/// Configuration for [`ab_test_route`].
#[derive(Clone)]
pub struct AbTestRoute {
    pub flag_key: String,
    pub variants: HashMap<String, GuardHandler>,
    pub fallback: Option<GuardHandler>,
}

impl AbTestRoute {
    pub fn new(flag_key: impl Into<String>) -> Self {
        Self {
            flag_key: flag_key.into(),
            variants: HashMap::new(),
            fallback: None,
        }
    }

    pub fn variant(mut self, key: impl Into<String>, handler: GuardHandler) -> Self {
        self.variants.insert(key.into(), handler);
        self
    }

    pub fn fallback(mut self, handler: GuardHandler) -> Self {
        self.fallback = Some(handler);
        self
    }
}

/// Dispatch to the handler matching the resolved variant. An unmatched or
/// missing variant goes to the fallback handler, else falls through.
pub fn ab_test_route(
    route: AbTestRoute,
) -> impl Fn(Request, Next) -> MiddlewareFuture + Clone + Send + Sync + 'static {
    move |req: Request, next: Next| {
        let route = route.clone();
        Box::pin(async move {
            let variant = match request_flags(&req) {
                Some(flags) => flags.get_variant(&route.flag_key).await,
                None => None,
            };

            if let Some(handler) = variant.as_deref().and_then(|v| route.variants.get(v)) {
                return handler(req).await;
            }
            if let Some(fallback) = &route.fallback {
                return fallback(req).await;
            }
            next.run(req).await
        })
    }
}

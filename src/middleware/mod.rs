pub mod guards;
pub mod region;

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request},
    http::request::Parts,
    http::StatusCode,
    middleware::Next,
    response::Response,
};

use crate::client::FeatureFlagClient;
use crate::evaluation::{EvaluationContext, EvaluationResult};
use crate::flag::Region;

pub use guards::{
    ab_test_route, conditional_route, handler, require_all_features, require_any_feature,
    require_feature, AbTestRoute, ConditionalRoute, GuardHandler, RequireFeatureOptions,
};
pub use region::{region_middleware, RegionOptions};

/// Boxed response future returned by the middleware closures.
pub type MiddlewareFuture = Pin<Box<dyn Future<Output = Response> + Send>>;

/// Principal attached by upstream authentication middleware. The flag
/// middleware reads it from request extensions if present.
#[derive(Debug, Clone, Default)]
pub struct Principal {
    pub id: Option<String>,
    pub email: Option<String>,
    pub groups: Vec<String>,
}

/// Per-request feature flag context, inserted into request extensions by
/// [`attach_flags`]. Downstream guards and handlers consume it; any HTTP
/// framework can attach the same shape to its request object.
#[derive(Clone)]
pub struct RequestFlags {
    client: Arc<FeatureFlagClient>,
    context: EvaluationContext,
    flags: HashMap<String, EvaluationResult>,
}

impl RequestFlags {
    pub fn new(client: Arc<FeatureFlagClient>, context: EvaluationContext) -> Self {
        Self {
            client,
            context,
            flags: HashMap::new(),
        }
    }

    pub fn client(&self) -> &Arc<FeatureFlagClient> {
        &self.client
    }

    pub fn context(&self) -> &EvaluationContext {
        &self.context
    }

    pub fn set_region(&mut self, region: Region) {
        self.context.region = Some(region);
    }

    /// Results preloaded when the request context was attached.
    pub fn preloaded(&self) -> &HashMap<String, EvaluationResult> {
        &self.flags
    }

    /// Evaluate a flag for this request, consulting the per-request
    /// preload map before the client.
    pub async fn evaluate(&self, key: &str) -> EvaluationResult {
        if let Some(result) = self.flags.get(key) {
            return result.clone();
        }
        self.client.evaluate(key, Some(&self.context)).await
    }

    pub async fn is_enabled(&self, key: &str) -> bool {
        self.evaluate(key).await.value
    }

    pub async fn get_variant(&self, key: &str) -> Option<String> {
        self.evaluate(key).await.variant
    }
}

impl<S> FromRequestParts<S> for RequestFlags
where
    S: Send + Sync,
{
    type Rejection = (StatusCode, &'static str);

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<RequestFlags>()
            .cloned()
            .ok_or((StatusCode::NOT_FOUND, "feature flag context missing"))
    }
}

/// Options for [`attach_flags`].
#[derive(Clone)]
pub struct FeatureFlagLayerOptions {
    pub client: Arc<FeatureFlagClient>,
    /// Flags evaluated once when the context is attached, so repeated
    /// checks within the request cost nothing.
    pub preload: Vec<String>,
    pub default_region: Option<Region>,
}

impl FeatureFlagLayerOptions {
    pub fn new(client: Arc<FeatureFlagClient>) -> Self {
        Self {
            client,
            preload: Vec::new(),
            default_region: None,
        }
    }

    pub fn preload(mut self, keys: Vec<String>) -> Self {
        self.preload = keys;
        self
    }

    pub fn default_region(mut self, region: Region) -> Self {
        self.default_region = Some(region);
        self
    }
}

/// Middleware that builds the per-request [`RequestFlags`] and inserts it
/// into request extensions. Use with `axum::middleware::from_fn`.
///
/// Context extraction can only degrade, never reject: a malformed region
/// or missing principal leaves the corresponding fields empty and the
/// request continues.
pub fn attach_flags(
    options: FeatureFlagLayerOptions,
) -> impl Fn(Request, Next) -> MiddlewareFuture + Clone + Send + Sync + 'static {
    move |mut req: Request, next: Next| {
        let options = options.clone();
        Box::pin(async move {
            let context = extract_context(&req, &options);
            let mut request_flags = RequestFlags::new(Arc::clone(&options.client), context);

            for key in &options.preload {
                let result = request_flags
                    .client
                    .evaluate(key, Some(&request_flags.context))
                    .await;
                request_flags.flags.insert(key.clone(), result);
            }

            req.extensions_mut().insert(request_flags);
            next.run(req).await
        })
    }
}

fn extract_context(req: &Request, options: &FeatureFlagLayerOptions) -> EvaluationContext {
    let mut context = EvaluationContext::default();

    if let Some(principal) = req.extensions().get::<Principal>() {
        context.user_id = principal.id.clone();
        context.email = principal.email.clone();
        context.groups = principal.groups.clone();
    }

    context.region = region::region_from_request(req)
        .ok()
        .flatten()
        .or(options.default_region);

    context
}

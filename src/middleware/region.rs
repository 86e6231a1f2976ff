use std::str::FromStr;

use axum::{
    extract::Request,
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use super::{MiddlewareFuture, RequestFlags};
use crate::flag::Region;

/// Options for [`region_middleware`].
#[derive(Debug, Clone, Default)]
pub struct RegionOptions {
    /// Applied when the request carries no region signal.
    pub default_region: Option<Region>,
    /// Explicit allow-list; a known-but-disallowed region is rejected
    /// with 403.
    pub allowed_regions: Option<Vec<Region>>,
}

impl RegionOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn default_region(mut self, region: Region) -> Self {
        self.default_region = Some(region);
        self
    }

    pub fn allowed_regions(mut self, regions: Vec<Region>) -> Self {
        self.allowed_regions = Some(regions);
        self
    }
}

/// Pull a region code from the `x-region` header or the `region` query
/// parameter. `Err` carries the malformed code.
pub(crate) fn region_from_request(req: &Request) -> Result<Option<Region>, String> {
    let raw = req
        .headers()
        .get("x-region")
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
        .or_else(|| query_param(req, "region"));

    match raw {
        Some(code) => Region::from_str(&code).map(Some).map_err(|_| code),
        None => Ok(None),
    }
}

fn query_param(req: &Request, name: &str) -> Option<String> {
    let query = req.uri().query()?;
    query.split('&').find_map(|pair| {
        let (k, v) = pair.split_once('=')?;
        (k == name).then(|| v.to_string())
    })
}

/// Middleware that validates the request's region and attaches it as a
/// [`Region`] extension: 400 for an unknown code, 403 for a region outside
/// the allow-list, configured default when absent. An already-attached
/// flag context gets its region updated in place.
pub fn region_middleware(
    options: RegionOptions,
) -> impl Fn(Request, Next) -> MiddlewareFuture + Clone + Send + Sync + 'static {
    move |mut req: Request, next: Next| {
        let options = options.clone();
        Box::pin(async move {
            let region = match region_from_request(&req) {
                Ok(Some(region)) => Some(region),
                Ok(None) => options.default_region,
                Err(code) => {
                    return invalid_region_response(&code);
                }
            };

            if let (Some(region), Some(allowed)) = (region, &options.allowed_regions) {
                if !allowed.contains(&region) {
                    return forbidden_region_response(region);
                }
            }

            if let Some(region) = region {
                if let Some(flags) = req.extensions_mut().get_mut::<RequestFlags>() {
                    flags.set_region(region);
                }
                req.extensions_mut().insert(region);
            }

            next.run(req).await
        })
    }
}

fn invalid_region_response(code: &str) -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({
            "error": format!("Unknown region code '{}'", code),
            "code": "INVALID_REGION",
        })),
    )
        .into_response()
}

fn forbidden_region_response(region: Region) -> Response {
    (
        StatusCode::FORBIDDEN,
        Json(json!({
            "error": format!("Region '{}' is not available", region),
            "code": "REGION_NOT_ALLOWED",
        })),
    )
        .into_response()
}

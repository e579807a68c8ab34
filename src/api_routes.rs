// src/api_routes.rs

use crate::services::OgvStatsService;
use async_trait::async_trait;
use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderValue, ALLOW, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde_json::{json, Value};

/// `Allow` value sent with 405 responses by the stock routes.
pub const DEFAULT_ALLOW: &str = "POST, OPTIONS";

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl ApiResponse {
    pub fn json<T: Serialize>(status: StatusCode, body: &T) -> Self {
        let body = serde_json::to_value(body).unwrap_or_else(|e| {
            warn!("Failed to serialize API response body: {}", e);
            Value::Null
        });
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self {
            status,
            headers,
            body,
        }
    }

    pub fn method_not_allowed(allow: &'static str) -> Self {
        let mut response = Self::json(
            StatusCode::METHOD_NOT_ALLOWED,
            &json!({ "error": "Method not allowed" }),
        );
        response
            .headers
            .insert(ALLOW, HeaderValue::from_static(allow));
        response
    }

    pub fn not_found(path: &str) -> Self {
        Self::json(
            StatusCode::NOT_FOUND,
            &json!({ "error": format!("No route for {}", path) }),
        )
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// GET-only API route. Every other method answers 405 with [`allow`](ApiRoute::allow).
#[async_trait]
pub trait ApiRoute: Send + Sync {
    fn path(&self) -> &'static str;

    fn allow(&self) -> &'static str {
        DEFAULT_ALLOW
    }

    async fn get(&self) -> ApiResponse;

    async fn dispatch(&self, method: &Method) -> ApiResponse {
        if *method == Method::GET {
            self.get().await
        } else {
            debug!("{} {} rejected with 405", method, self.path());
            ApiResponse::method_not_allowed(self.allow())
        }
    }
}

/// `GET /api/ogv-stats`: the dashboard stats document.
pub struct OgvStatsRoute {
    service: OgvStatsService,
}

impl OgvStatsRoute {
    pub fn new(service: OgvStatsService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl ApiRoute for OgvStatsRoute {
    fn path(&self) -> &'static str {
        "/api/ogv-stats"
    }

    async fn get(&self) -> ApiResponse {
        let stats = self.service.fetch_ogv_stats().await;
        ApiResponse::json(StatusCode::OK, &stats)
    }
}

/// `GET /api/circulating-supply`: latest circulating OGV as a bare number,
/// the shape listing sites poll for.
pub struct CirculatingSupplyRoute {
    service: OgvStatsService,
}

impl CirculatingSupplyRoute {
    pub fn new(service: OgvStatsService) -> Self {
        Self { service }
    }
}

#[async_trait]
impl ApiRoute for CirculatingSupplyRoute {
    fn path(&self) -> &'static str {
        "/api/circulating-supply"
    }

    async fn get(&self) -> ApiResponse {
        let latest = match self.service.fetch_circulating_supply().await {
            Ok(points) => points
                .iter()
                .max_by_key(|p| p.timestamp)
                .map(|p| p.value)
                .unwrap_or(0.0),
            Err(e) => {
                warn!("Circulating supply unavailable, answering 0: {}", e);
                0.0
            }
        };
        ApiResponse::json(StatusCode::OK, &latest)
    }
}

/// Path-based dispatch over a fixed set of routes.
#[derive(Default)]
pub struct ApiRouter {
    routes: Vec<Box<dyn ApiRoute>>,
}

impl ApiRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route(mut self, route: impl ApiRoute + 'static) -> Self {
        self.routes.push(Box::new(route));
        self
    }

    pub fn paths(&self) -> Vec<&'static str> {
        self.routes.iter().map(|r| r.path()).collect()
    }

    pub async fn handle(&self, method: &Method, path: &str) -> ApiResponse {
        let path = path.split('?').next().unwrap_or(path).trim_end_matches('/');
        match self.routes.iter().find(|r| r.path() == path) {
            Some(route) => route.dispatch(method).await,
            None => ApiResponse::not_found(path),
        }
    }
}

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::DashError;
use crate::types::GeoPoint;

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct RouteRequest {
    pub start: GeoPoint,
    pub destinations: Vec<GeoPoint>,
}

/// Result of `/optimize` (and of `/route`, which has no ordering metadata).
#[derive(Clone, Debug, PartialEq)]
pub struct OptimizedRoute {
    pub coords: Vec<GeoPoint>,
    pub best_order: Option<Vec<GeoPoint>>,
    pub total_time_hours: Option<f64>,
}

/// The routing backend. Optimization and road-following happen there.
#[async_trait(?Send)]
pub trait RouteService {
    async fn optimize(&self, request: &RouteRequest) -> Result<OptimizedRoute, DashError>;
    async fn road_route(&self, request: &RouteRequest) -> Result<OptimizedRoute, DashError>;
    async fn snap(&self, point: GeoPoint) -> Result<GeoPoint, DashError>;
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OptimizeReply {
    optimized_route: Vec<GeoPoint>,
    #[serde(default)]
    best_order: Option<Vec<GeoPoint>>,
    #[serde(default)]
    total_time: Option<f64>,
}

#[derive(Deserialize)]
struct RoadRouteReply {
    route: Vec<GeoPoint>,
}

#[derive(Deserialize)]
struct SnapReply {
    snapped: GeoPoint,
}

fn error_message(body: &Value) -> Option<String> {
    body.get("error").and_then(Value::as_str).map(str::to_string)
}

fn require_route(coords: Vec<GeoPoint>) -> Result<Vec<GeoPoint>, DashError> {
    if coords.len() < 2 {
        return Err(DashError::MalformedResponse(format!("route has {} points, need at least 2", coords.len())));
    }
    Ok(coords)
}

pub fn parse_optimize_reply(body: Value) -> Result<OptimizedRoute, DashError> {
    let reply: OptimizeReply = serde_json::from_value(body)?;
    Ok(OptimizedRoute {
        coords: require_route(reply.optimized_route)?,
        best_order: reply.best_order,
        total_time_hours: reply.total_time,
    })
}

pub fn parse_road_route_reply(body: Value) -> Result<OptimizedRoute, DashError> {
    let reply: RoadRouteReply = serde_json::from_value(body)?;
    Ok(OptimizedRoute { coords: require_route(reply.route)?, best_order: None, total_time_hours: None })
}

pub struct HttpRouteService {
    client: Client,
    base_url: String,
}

impl HttpRouteService {
    pub fn new(base_url: &str) -> Self {
        HttpRouteService {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    /// POSTs a JSON body and returns the decoded JSON reply. Non-2xx replies
    /// become `Network` errors carrying the backend's `error` message if any.
    async fn post(&self, path: &str, body: &impl Serialize) -> Result<Value, DashError> {
        let url = format!("{}{}", self.base_url, path);
        log::info!("POST {}", url);
        let response = self.client.post(&url).json(body).send().await?;
        let status = response.status();
        let text = response.text().await?;
        let json: Option<Value> = serde_json::from_str(&text).ok();
        if !status.is_success() {
            let message = json
                .as_ref()
                .and_then(error_message)
                .unwrap_or_else(|| format!("{} returned {}", path, status));
            return Err(DashError::Network(message));
        }
        json.ok_or_else(|| DashError::MalformedResponse(format!("{} did not return JSON", path)))
    }
}

#[async_trait(?Send)]
impl RouteService for HttpRouteService {
    async fn optimize(&self, request: &RouteRequest) -> Result<OptimizedRoute, DashError> {
        parse_optimize_reply(self.post("/optimize", request).await?)
    }

    async fn road_route(&self, request: &RouteRequest) -> Result<OptimizedRoute, DashError> {
        parse_road_route_reply(self.post("/route", request).await?)
    }

    async fn snap(&self, point: GeoPoint) -> Result<GeoPoint, DashError> {
        let body = self.post("/snap", &serde_json::json!({ "point": point })).await?;
        let reply: SnapReply = serde_json::from_value(body)?;
        Ok(reply.snapped)
    }
}

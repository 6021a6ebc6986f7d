use async_trait::async_trait;

use crate::error::DashError;
use crate::route_service::{OptimizedRoute, RouteRequest, RouteService};
use crate::types::{GeoPoint, LabeledPoint, Marker, Role};

/// Where user-visible failures go. In the browser this is `window.alert`.
pub trait AlertSink {
    fn alert(&self, message: &str);
}

/// Asks the user for a waypoint label. `None` means they cancelled.
pub trait LabelPrompt {
    fn ask(&self, message: &str) -> Option<String>;
}

#[async_trait(?Send)]
pub trait LocationProvider {
    async fn current_position(&self) -> Result<GeoPoint, DashError>;
}

/// Monotonic request numbering. Only the most recently issued number is
/// current; anything older that comes back is dropped.
#[derive(Debug, Default)]
struct Sequencer {
    latest: u64,
}

impl Sequencer {
    fn issue(&mut self) -> u64 {
        self.latest += 1;
        self.latest
    }

    fn is_current(&self, seq: u64) -> bool {
        seq == self.latest
    }

    fn invalidate(&mut self) {
        self.latest += 1;
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RouteTicket(u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LocationTicket(u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Outcome {
    /// Preconditions unmet; nothing was sent.
    Skipped,
    Applied,
    /// A newer request was issued (or the state was reset) meanwhile.
    Stale,
    /// The request failed and the user was alerted. State is unchanged.
    Failed,
}

/// Summary of the last backend-computed route, when there is one.
#[derive(Clone, Debug, PartialEq)]
pub struct RouteDetails {
    pub best_order: Option<Vec<GeoPoint>>,
    pub total_time_hours: Option<f64>,
}

/// Holds the chosen start and destinations and the route drawn through them.
///
/// The first placed point always becomes the start. Destinations keep
/// insertion order; only a backend-optimized route can visit them in a
/// different order, and it does so by replacing `route` as a whole.
#[derive(Debug, Default)]
pub struct WaypointController {
    start: Option<LabeledPoint>,
    destinations: Vec<LabeledPoint>,
    route: Vec<GeoPoint>,
    route_version: u64,
    details: Option<RouteDetails>,
    pending: Option<GeoPoint>,
    route_requests: Sequencer,
    location_requests: Sequencer,
}

impl WaypointController {
    pub fn new() -> Self {
        WaypointController::default()
    }

    pub fn start(&self) -> Option<&LabeledPoint> {
        self.start.as_ref()
    }

    pub fn destinations(&self) -> &[LabeledPoint] {
        &self.destinations
    }

    pub fn route(&self) -> &[GeoPoint] {
        &self.route
    }

    /// Changes whenever `route` is replaced with different contents.
    pub fn route_version(&self) -> u64 {
        self.route_version
    }

    pub fn route_details(&self) -> Option<&RouteDetails> {
        self.details.as_ref()
    }

    /// Route and Optimize are only enabled when this holds.
    pub fn can_route(&self) -> bool {
        self.start.is_some() && !self.destinations.is_empty()
    }

    /// Places a point and returns the role it got. `role_hint` only matters
    /// once a start exists, and even then a second start is never created.
    pub fn place_point(&mut self, coord: GeoPoint, role_hint: Role) -> Role {
        self.place(coord, role_hint, None)
    }

    fn place(&mut self, point: GeoPoint, role_hint: Role, label: Option<String>) -> Role {
        if self.start.is_none() {
            log::info!("Start set at {}", point);
            self.start = Some(LabeledPoint { point, label, role: Role::Start });
            return Role::Start;
        }
        if role_hint == Role::Start {
            log::info!("Start already set, adding {} as a destination", point);
        }
        self.destinations.push(LabeledPoint { point, label, role: Role::Destination });
        log::info!("Destination {} set at {}", self.destinations.len(), point);
        Role::Destination
    }

    /// Remembers where the context menu was opened, so a following
    /// `request_label` knows which point is being placed.
    pub fn open_context_menu(&mut self, coord: GeoPoint) {
        self.pending = Some(coord);
    }

    pub fn pending_point(&self) -> Option<GeoPoint> {
        self.pending
    }

    /// Runs the label flow for the pending point. Confirming places it with
    /// the entered label; cancelling drops it and leaves state untouched.
    pub fn request_label(&mut self, role: Role, prompt: &dyn LabelPrompt) -> Option<Role> {
        let point = self.pending.take()?;
        let message = match role {
            Role::Start => "Label for the start point:",
            Role::Destination => "Label for this destination:",
        };
        let label = prompt.ask(message)?;
        let label = Some(label.trim().to_string()).filter(|l| !l.is_empty());
        Some(self.place(point, role, label))
    }

    fn replace_route(&mut self, route: Vec<GeoPoint>, details: Option<RouteDetails>) {
        if route != self.route {
            self.route = route;
            self.route_version += 1;
        }
        self.details = details;
    }

    /// Straight-line route through the points in insertion order.
    pub fn build_direct_route(&mut self) -> bool {
        let Some(start) = &self.start else {
            return false;
        };
        if self.destinations.is_empty() {
            return false;
        }
        let mut route = Vec::with_capacity(self.destinations.len() + 1);
        route.push(start.point);
        route.extend(self.destinations.iter().map(|d| d.point));
        // A direct route supersedes anything still in flight.
        self.route_requests.invalidate();
        self.replace_route(route, None);
        true
    }

    /// Snapshot of the current points for the backend, tagged so the reply
    /// can be matched against later requests.
    pub fn prepare_route_request(&mut self) -> Option<(RouteTicket, RouteRequest)> {
        if !self.can_route() {
            return None;
        }
        let start = self.start.as_ref()?.point;
        let request = RouteRequest {
            start,
            destinations: self.destinations.iter().map(|d| d.point).collect(),
        };
        Some((RouteTicket(self.route_requests.issue()), request))
    }

    pub fn apply_route_result(
        &mut self,
        ticket: RouteTicket,
        result: Result<OptimizedRoute, DashError>,
        alerts: &dyn AlertSink,
    ) -> Outcome {
        if !self.route_requests.is_current(ticket.0) {
            log::info!("Discarding route reply {:?}, a newer request exists", ticket);
            return Outcome::Stale;
        }
        match result {
            Ok(optimized) => {
                log::info!(
                    "Route applied with {} points, estimated {:?} h",
                    optimized.coords.len(),
                    optimized.total_time_hours
                );
                let details = RouteDetails {
                    best_order: optimized.best_order,
                    total_time_hours: optimized.total_time_hours,
                };
                self.replace_route(optimized.coords, Some(details));
                Outcome::Applied
            }
            Err(err) => {
                log::error!("Route request failed: {}", err);
                alerts.alert(&err.to_string());
                Outcome::Failed
            }
        }
    }

    pub fn reset(&mut self) {
        self.start = None;
        self.destinations.clear();
        self.pending = None;
        self.replace_route(Vec::new(), None);
        self.route_requests.invalidate();
        self.location_requests.invalidate();
        log::info!("Waypoints reset");
    }

    pub fn prepare_location_request(&mut self) -> LocationTicket {
        LocationTicket(self.location_requests.issue())
    }

    /// Sets (or overwrites) the start from a location lookup.
    pub fn apply_location_result(
        &mut self,
        ticket: LocationTicket,
        result: Result<GeoPoint, DashError>,
        alerts: &dyn AlertSink,
    ) -> Outcome {
        if !self.location_requests.is_current(ticket.0) {
            log::info!("Discarding location reply {:?}, a newer request exists", ticket);
            return Outcome::Stale;
        }
        match result {
            Ok(point) => {
                log::info!("Start set from current location {}", point);
                self.start = Some(LabeledPoint { point, label: None, role: Role::Start });
                Outcome::Applied
            }
            Err(err) => {
                log::error!("Location lookup failed: {}", err);
                alerts.alert(&err.to_string());
                Outcome::Failed
            }
        }
    }

    /// Markers for the map, start first, destinations numbered from 1.
    pub fn markers(&self) -> Vec<Marker> {
        let mut markers = Vec::with_capacity(self.destinations.len() + 1);
        if let Some(start) = &self.start {
            markers.push(Marker {
                point: start.point,
                role: Role::Start,
                title: start.label.clone().unwrap_or_else(|| "Start Point".to_string()),
            });
        }
        for (i, dest) in self.destinations.iter().enumerate() {
            markers.push(Marker {
                point: dest.point,
                role: Role::Destination,
                title: dest.label.clone().unwrap_or_else(|| format!("Destination {}", i + 1)),
            });
        }
        markers
    }
}

/// Queries the position and snaps it to the road network when a snapper is
/// given. A failed snap falls back to the raw position.
pub async fn locate_start(locator: &dyn LocationProvider, snapper: Option<&dyn RouteService>) -> Result<GeoPoint, DashError> {
    let position = locator.current_position().await?;
    let Some(snapper) = snapper else {
        return Ok(position);
    };
    match snapper.snap(position).await {
        Ok(snapped) => Ok(snapped),
        Err(err) => {
            log::warn!("Snapping {} failed, using it as is: {}", position, err);
            Ok(position)
        }
    }
}

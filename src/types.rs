use serde::{Deserialize, Serialize};
use std::fmt;

// ** Coordinates **

/// A WGS84 coordinate. On the wire it is a `[lat, lng]` pair, matching what
/// the map widget hands us and what the routing backend expects.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        GeoPoint { latitude, longitude }
    }

    // GeoJSON wants lng first
    pub fn to_lng_lat(&self) -> Vec<f64> {
        vec![self.longitude, self.latitude]
    }

    pub fn to_coord(&self) -> geo::Coord<f64> {
        geo::Coord { x: self.longitude, y: self.latitude }
    }
}

impl From<[f64; 2]> for GeoPoint {
    fn from(pair: [f64; 2]) -> Self {
        GeoPoint::new(pair[0], pair[1])
    }
}

impl From<GeoPoint> for [f64; 2] {
    fn from(point: GeoPoint) -> Self {
        [point.latitude, point.longitude]
    }
}

impl fmt::Display for GeoPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({:.6}, {:.6})", self.latitude, self.longitude)
    }
}

pub fn distance_meters(a: &GeoPoint, b: &GeoPoint) -> f64 {
    let ap = haversine_rs::point::Point { latitude: a.latitude, longitude: a.longitude };
    let bp = haversine_rs::point::Point { latitude: b.latitude, longitude: b.longitude };
    haversine_rs::distance(ap, bp, haversine_rs::units::Unit::Meters)
}

pub fn path_length_meters(path: &[GeoPoint]) -> f64 {
    path.windows(2).map(|pair| distance_meters(&pair[0], &pair[1])).sum()
}

// ** Waypoints **

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Role {
    Start,
    Destination,
}

impl Role {
    pub fn parse(value: &str) -> Option<Role> {
        match value.trim().to_ascii_lowercase().as_str() {
            "start" => Some(Role::Start),
            "destination" | "dest" => Some(Role::Destination),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Role::Start => "start",
            Role::Destination => "destination",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LabeledPoint {
    pub point: GeoPoint,
    pub label: Option<String>,
    pub role: Role,
}

/// What the map draws for a waypoint: position, role and popup title.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Marker {
    pub point: GeoPoint,
    pub role: Role,
    pub title: String,
}

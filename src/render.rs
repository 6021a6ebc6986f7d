use async_trait::async_trait;
use geo::LineString;
use geojson::{Feature, Geometry};
use reqwest::Client;
use serde::Deserialize;

use crate::error::DashError;
use crate::types::{path_length_meters, GeoPoint};

pub type LayerId = u32;

/// The map widget, as far as route drawing is concerned. Every added layer
/// must eventually be removed through the id it returned. `None` means the
/// layer was not created and there is nothing to remove.
pub trait MapView {
    fn add_layer(&mut self, layer: &PathLayer) -> Option<LayerId>;
    fn remove_layer(&mut self, id: LayerId);
}

/// Road-following paths between two points. Several alternatives may come
/// back; the first is the preferred one.
#[async_trait(?Send)]
pub trait PathService {
    async fn alternatives(&self, from: GeoPoint, to: GeoPoint) -> Result<Vec<Vec<GeoPoint>>, DashError>;
}

#[derive(Clone, Debug, PartialEq)]
pub struct PathStyle {
    pub color: &'static str,
    pub weight: u8,
    pub opacity: f64,
    pub dash_array: Option<&'static str>,
}

const COLORS: [&str; 5] = ["blue", "#d73a49", "#2ea043", "#a371f7", "#f0883e"];
const DASHES: [Option<&str>; 4] = [None, Some("8 6"), Some("2 6"), Some("12 4 2 4")];

/// Style for the n-th alternative of a leg. Index 0 is the main route.
pub fn alternative_style(index: usize) -> PathStyle {
    PathStyle {
        color: COLORS[index % COLORS.len()],
        weight: if index == 0 { 4 } else { 3 },
        opacity: if index == 0 { 1.0 } else { 0.7 },
        dash_array: DASHES[index % DASHES.len()],
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct PathLayer {
    pub coords: Vec<GeoPoint>,
    pub leg: usize,
    pub alternative: usize,
    pub style: PathStyle,
}

impl PathLayer {
    pub fn length_meters(&self) -> f64 {
        path_length_meters(&self.coords)
    }

    pub fn to_feature(&self) -> Feature {
        let line: LineString<f64> = self.coords.iter().map(GeoPoint::to_coord).collect();
        let mut feature = Feature::from(Geometry::from(&line));
        feature.set_property("leg", self.leg);
        feature.set_property("alternative", self.alternative);
        feature.set_property("length_meters", self.length_meters());
        feature.set_property("color", self.style.color);
        feature.set_property("weight", self.style.weight);
        feature.set_property("opacity", self.style.opacity);
        if let Some(dash) = self.style.dash_array {
            feature.set_property("dashArray", dash);
        }
        feature
    }
}

/// Alternatives for each consecutive pair of route points.
pub type LegPaths = Vec<Vec<GeoPoint>>;

/// Asks the path service for every leg. Any failing leg fails the whole lot,
/// so the caller can fall back to a straight polyline.
pub async fn fetch_leg_paths(route: &[GeoPoint], service: &dyn PathService) -> Result<Vec<LegPaths>, DashError> {
    let mut legs = Vec::with_capacity(route.len().saturating_sub(1));
    for pair in route.windows(2) {
        let alternatives = service.alternatives(pair[0], pair[1]).await?;
        if alternatives.is_empty() {
            return Err(DashError::MalformedResponse(format!("no path from {} to {}", pair[0], pair[1])));
        }
        legs.push(alternatives);
    }
    Ok(legs)
}

/// Draws the route and owns every layer it put on the map. Drawing always
/// starts by removing everything drawn before; dropping removes the rest.
pub struct RouteRenderer<V: MapView> {
    view: V,
    handles: Vec<LayerId>,
    drawn_version: Option<u64>,
}

impl<V: MapView> RouteRenderer<V> {
    pub fn new(view: V) -> Self {
        RouteRenderer { view, handles: Vec::new(), drawn_version: None }
    }

    pub fn layer_count(&self) -> usize {
        self.handles.len()
    }

    pub fn needs_redraw(&self, version: u64) -> bool {
        self.drawn_version != Some(version)
    }

    pub fn clear(&mut self) {
        for id in self.handles.drain(..) {
            self.view.remove_layer(id);
        }
        self.drawn_version = None;
    }

    fn add(&mut self, layer: PathLayer) {
        match self.view.add_layer(&layer) {
            Some(id) => self.handles.push(id),
            None => log::warn!("Map refused layer {}/{}", layer.leg, layer.alternative),
        }
    }

    /// Redraws `route` for the given version. With leg paths, one layer per
    /// leg alternative; without, a single straight polyline. Routes under two
    /// points draw nothing.
    pub fn draw(&mut self, version: u64, route: &[GeoPoint], legs: Option<&[LegPaths]>) -> usize {
        self.clear();
        self.drawn_version = Some(version);
        if route.len() < 2 {
            return 0;
        }
        match legs {
            Some(legs) => {
                for (leg, alternatives) in legs.iter().enumerate() {
                    for (alternative, coords) in alternatives.iter().enumerate() {
                        self.add(PathLayer {
                            coords: coords.clone(),
                            leg,
                            alternative,
                            style: alternative_style(alternative),
                        });
                    }
                }
            }
            None => self.add(PathLayer {
                coords: route.to_vec(),
                leg: 0,
                alternative: 0,
                style: alternative_style(0),
            }),
        }
        log::info!("Drew {} route layers for version {}", self.handles.len(), version);
        self.handles.len()
    }
}

impl<V: MapView> Drop for RouteRenderer<V> {
    fn drop(&mut self) {
        self.clear();
    }
}

// ** OSRM **

#[derive(Deserialize)]
struct OsrmReply {
    code: String,
    #[serde(default)]
    routes: Vec<OsrmRoute>,
}

#[derive(Deserialize)]
struct OsrmRoute {
    geometry: OsrmGeometry,
}

#[derive(Deserialize)]
struct OsrmGeometry {
    coordinates: Vec<[f64; 2]>,
}

/// Driving paths from an OSRM server, the same source leaflet's routing
/// machine uses by default.
pub struct OsrmPathService {
    client: Client,
    base_url: String,
}

impl OsrmPathService {
    pub fn new(base_url: &str) -> Self {
        OsrmPathService { client: Client::new(), base_url: base_url.trim_end_matches('/').to_string() }
    }

    fn url(&self, from: GeoPoint, to: GeoPoint) -> String {
        format!(
            "{}/route/v1/driving/{},{};{},{}?alternatives=true&overview=full&geometries=geojson",
            self.base_url, from.longitude, from.latitude, to.longitude, to.latitude
        )
    }
}

fn parse_osrm_reply(reply: OsrmReply) -> Result<Vec<Vec<GeoPoint>>, DashError> {
    if reply.code != "Ok" {
        return Err(DashError::MalformedResponse(format!("OSRM answered {}", reply.code)));
    }
    Ok(reply
        .routes
        .into_iter()
        .map(|route| route.geometry.coordinates.iter().map(|c| GeoPoint::new(c[1], c[0])).collect())
        .collect())
}

#[async_trait(?Send)]
impl PathService for OsrmPathService {
    async fn alternatives(&self, from: GeoPoint, to: GeoPoint) -> Result<Vec<Vec<GeoPoint>>, DashError> {
        let response = self.client.get(self.url(from, to)).send().await?;
        if !response.status().is_success() {
            return Err(DashError::Network(format!("path service returned {}", response.status())));
        }
        parse_osrm_reply(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{Down, MockView, TwoWays};
    use futures::executor::block_on;

    fn route() -> Vec<GeoPoint> {
        vec![GeoPoint::new(8.22, 124.24), GeoPoint::new(8.23, 124.25), GeoPoint::new(8.24, 124.23)]
    }

    #[test]
    fn direct_route_is_one_polyline() {
        let view = MockView::default();
        let mut renderer = RouteRenderer::new(view.clone());
        assert_eq!(renderer.draw(1, &route(), None), 1);
        let log = view.0.borrow();
        assert_eq!(log.live[0].1.coords, route());
        assert_eq!(log.live[0].1.style.color, "blue");
    }

    #[test]
    fn redraw_releases_previous_layers_first() {
        let view = MockView::default();
        let mut renderer = RouteRenderer::new(view.clone());
        renderer.draw(1, &route(), None);
        renderer.draw(2, &route()[..2], None);
        assert_eq!(view.removed(), vec![1]);
        assert_eq!(view.live(), 1);
    }

    #[test]
    fn alternatives_cycle_through_distinct_styles() {
        let view = MockView::default();
        let mut renderer = RouteRenderer::new(view.clone());
        let legs = block_on(fetch_leg_paths(&route(), &TwoWays)).unwrap();
        assert_eq!(renderer.draw(1, &route(), Some(&legs)), 4);
        let log = view.0.borrow();
        let main = &log.live[0].1;
        let alt = &log.live[1].1;
        assert_eq!((main.leg, main.alternative), (0, 0));
        assert_eq!((alt.leg, alt.alternative), (0, 1));
        assert_ne!(main.style.color, alt.style.color);
        assert_ne!(main.style.dash_array, alt.style.dash_array);
        let wrapped = alternative_style(COLORS.len() * DASHES.len());
        assert_eq!((wrapped.color, wrapped.dash_array), (main.style.color, main.style.dash_array));
    }

    #[test]
    fn one_failing_leg_fails_the_lookup() {
        assert!(block_on(fetch_leg_paths(&route(), &Down)).is_err());
    }

    #[test]
    fn drawn_version_is_remembered_until_cleared() {
        let view = MockView::default();
        let mut renderer = RouteRenderer::new(view.clone());
        assert!(renderer.needs_redraw(1));
        renderer.draw(1, &route(), None);
        assert!(!renderer.needs_redraw(1));
        assert!(renderer.needs_redraw(2));
        renderer.clear();
        assert!(renderer.needs_redraw(1));
        assert_eq!(renderer.layer_count(), 0);
    }

    #[test]
    fn short_route_draws_nothing() {
        let view = MockView::default();
        let mut renderer = RouteRenderer::new(view.clone());
        renderer.draw(1, &route(), None);
        assert_eq!(renderer.draw(2, &[], None), 0);
        assert_eq!(view.live(), 0);
    }

    #[test]
    fn refused_layers_are_never_removed() {
        let view = MockView::rejecting();
        let mut renderer = RouteRenderer::new(view.clone());
        assert_eq!(renderer.draw(1, &route(), None), 0);
        renderer.clear();
        drop(renderer);
        assert!(view.removed().is_empty());
    }

    #[test]
    fn dropping_the_renderer_removes_its_layers() {
        let view = MockView::default();
        {
            let mut renderer = RouteRenderer::new(view.clone());
            let legs = block_on(fetch_leg_paths(&route(), &TwoWays)).unwrap();
            renderer.draw(1, &route(), Some(&legs));
            assert_eq!(view.live(), 4);
        }
        assert_eq!(view.live(), 0);
        assert_eq!(view.removed().len(), 4);
    }

    #[test]
    fn layer_feature_has_style_and_length() {
        let layer = PathLayer { coords: route(), leg: 1, alternative: 1, style: alternative_style(1) };
        let feature = layer.to_feature();
        assert_eq!(feature.property("dashArray").unwrap(), "8 6");
        assert_eq!(feature.property("leg").unwrap(), 1);
        assert!(feature.property("length_meters").unwrap().as_f64().unwrap() > 0.0);
    }

    #[test]
    fn osrm_geometry_is_flipped_to_lat_lng() {
        let reply: OsrmReply = serde_json::from_str(
            r#"{"code": "Ok", "routes": [{"geometry": {"coordinates": [[124.24, 8.22], [124.25, 8.23]]}}]}"#,
        )
        .unwrap();
        let paths = parse_osrm_reply(reply).unwrap();
        assert_eq!(paths[0][0], GeoPoint::new(8.22, 124.24));
        let bad: OsrmReply = serde_json::from_str(r#"{"code": "NoRoute"}"#).unwrap();
        assert!(parse_osrm_reply(bad).is_err());
    }
}

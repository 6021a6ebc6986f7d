use geojson::{Feature, FeatureCollection, GeoJson, Geometry, Value};
use serde_json::{json, Value as JsonValue};
use std::cell::RefCell;
use std::collections::BTreeMap;

use crate::config::DashConfig;
use crate::error::DashError;
use crate::records::{parse_csv, upload_records, RecordsPage};
use crate::render::{fetch_leg_paths, MapView, PathService, RouteRenderer};
use crate::route_service::RouteService;
use crate::store::RecordStore;
use crate::traffic::{load_traffic, to_traffic_counts, TrafficCount};
use crate::types::{GeoPoint, Marker, Role};
use crate::waypoints::{locate_start, AlertSink, LabelPrompt, LocationProvider, Outcome, WaypointController};
use crate::zones::{style_zones, AllowList};

/// The remote and browser collaborators a dashboard talks to.
pub struct Services {
    pub routes: Box<dyn RouteService>,
    /// Road-following paths for drawing. `None` draws straight lines.
    pub paths: Option<Box<dyn PathService>>,
    pub store: Box<dyn RecordStore>,
    pub alerts: Box<dyn AlertSink>,
    pub locator: Box<dyn LocationProvider>,
}

/// Everything one dashboard page needs.
///
/// Methods take `&self` so the page can hold it in an `Rc` and start a new
/// action while an earlier one is still waiting on the network. No
/// `RefCell` borrow is held across an await.
pub struct Dashboard<V: MapView> {
    config: DashConfig,
    allow: AllowList,
    waypoints: RefCell<WaypointController>,
    renderer: RefCell<RouteRenderer<V>>,
    records: RefCell<RecordsPage>,
    traffic: RefCell<BTreeMap<String, u32>>,
    services: Services,
}

fn marker_feature(marker: &Marker) -> Feature {
    let mut feature = Feature::from(Geometry::new(Value::Point(marker.point.to_lng_lat())));
    feature.set_property("role", marker.role.name());
    feature.set_property("title", marker.title.clone());
    feature
}

pub fn markers_geojson(markers: &[Marker]) -> Result<String, DashError> {
    let collection = GeoJson::FeatureCollection(FeatureCollection {
        bbox: None,
        features: markers.iter().map(marker_feature).collect(),
        foreign_members: None,
    });
    Ok(serde_json::to_string(&collection)?)
}

fn parse_zones(zones_json: &str) -> Result<FeatureCollection, DashError> {
    match zones_json.parse::<GeoJson>() {
        Ok(GeoJson::FeatureCollection(collection)) => Ok(collection),
        Ok(_) => Err(DashError::Config("zones must be a FeatureCollection".into())),
        Err(e) => Err(DashError::Config(e.to_string())),
    }
}

impl<V: MapView> Dashboard<V> {
    pub fn new(config: DashConfig, view: V, services: Services) -> Self {
        Dashboard {
            allow: AllowList::new(&config.highlighted_zones),
            waypoints: RefCell::new(WaypointController::new()),
            renderer: RefCell::new(RouteRenderer::new(view)),
            records: RefCell::new(RecordsPage::new()),
            traffic: RefCell::new(BTreeMap::new()),
            services,
            config,
        }
    }

    pub fn config(&self) -> &DashConfig {
        &self.config
    }

    // ** Waypoints **

    pub fn open_context_menu(&self, coord: GeoPoint) {
        self.waypoints.borrow_mut().open_context_menu(coord);
    }

    pub fn place_point(&self, coord: GeoPoint, role_hint: Role) -> Role {
        self.waypoints.borrow_mut().place_point(coord, role_hint)
    }

    pub fn request_label(&self, role: Role, prompt: &dyn LabelPrompt) -> Option<Role> {
        self.waypoints.borrow_mut().request_label(role, prompt)
    }

    pub fn can_route(&self) -> bool {
        self.waypoints.borrow().can_route()
    }

    pub fn markers_geojson(&self) -> Result<String, DashError> {
        markers_geojson(&self.waypoints.borrow().markers())
    }

    /// Current route as `[lat, lng]` pairs, plus optimizer details if any.
    pub fn route_state(&self) -> JsonValue {
        let waypoints = self.waypoints.borrow();
        let details = waypoints.route_details();
        json!({
            "route": waypoints.route(),
            "version": waypoints.route_version(),
            "bestOrder": details.and_then(|d| d.best_order.clone()),
            "totalTime": details.and_then(|d| d.total_time_hours),
            "layers": self.renderer.borrow().layer_count(),
        })
    }

    /// Brings the drawn route in line with the controller. If the route is
    /// replaced while paths are being fetched, this draw is abandoned.
    async fn redraw(&self) {
        let (version, route) = {
            let waypoints = self.waypoints.borrow();
            (waypoints.route_version(), waypoints.route().to_vec())
        };
        if !self.renderer.borrow().needs_redraw(version) {
            return;
        }
        let legs = match &self.services.paths {
            Some(paths) if route.len() >= 2 => match fetch_leg_paths(&route, paths.as_ref()).await {
                Ok(legs) => Some(legs),
                Err(err) => {
                    log::warn!("Path lookup failed, drawing straight lines: {}", err);
                    None
                }
            },
            _ => None,
        };
        if self.waypoints.borrow().route_version() != version {
            log::info!("Route changed while fetching paths, dropping draw of version {}", version);
            return;
        }
        self.renderer.borrow_mut().draw(version, &route, legs.as_deref());
    }

    pub async fn direct_route(&self) -> bool {
        let built = self.waypoints.borrow_mut().build_direct_route();
        self.redraw().await;
        built
    }

    /// `/optimize` when `optimize` is set, otherwise `/route`.
    pub async fn backend_route(&self, optimize: bool) -> Outcome {
        let prepared = self.waypoints.borrow_mut().prepare_route_request();
        let Some((ticket, request)) = prepared else {
            return Outcome::Skipped;
        };
        let result = if optimize {
            self.services.routes.optimize(&request).await
        } else {
            self.services.routes.road_route(&request).await
        };
        let outcome = self
            .waypoints
            .borrow_mut()
            .apply_route_result(ticket, result, self.services.alerts.as_ref());
        if outcome == Outcome::Applied {
            self.redraw().await;
        }
        outcome
    }

    pub fn reset(&self) {
        self.waypoints.borrow_mut().reset();
        self.renderer.borrow_mut().clear();
    }

    pub async fn use_current_location(&self) -> Outcome {
        let ticket = self.waypoints.borrow_mut().prepare_location_request();
        let snapper = if self.config.snap_current_location { Some(self.services.routes.as_ref()) } else { None };
        let result = locate_start(self.services.locator.as_ref(), snapper).await;
        self.waypoints
            .borrow_mut()
            .apply_location_result(ticket, result, self.services.alerts.as_ref())
    }

    // ** Zones **

    /// Highlighted zones styled by record density. A store failure still
    /// draws the zones, all in the lightest bucket.
    pub async fn zones_geojson(&self, zones_json: &str) -> Result<String, DashError> {
        let zones = parse_zones(zones_json)?;
        let counts = match load_traffic(
            self.services.store.as_ref(),
            &self.config.records_collection,
            &self.config.place_field,
            &self.allow,
        )
        .await
        {
            Ok(counts) => counts,
            Err(err) => {
                log::error!("Traffic data unavailable: {}", err);
                BTreeMap::new()
            }
        };
        let styled = style_zones(&zones, &self.allow, &self.config.zone_name_property, &counts);
        *self.traffic.borrow_mut() = counts;
        Ok(serde_json::to_string(&GeoJson::FeatureCollection(styled))?)
    }

    /// Counts behind the last `zones_geojson` call.
    pub fn traffic_counts(&self) -> Vec<TrafficCount> {
        to_traffic_counts(&self.traffic.borrow())
    }

    // ** Records **

    pub async fn refresh_records(&self) {
        self.records.borrow_mut().begin_loading();
        let listing = self.services.store.list(&self.config.records_collection).await;
        self.records.borrow_mut().apply_listing(listing);
    }

    /// Parses, uploads, then re-reads the table. A failed write is an error
    /// even though the rows before it stay written.
    pub async fn upload_csv(&self, bytes: &[u8]) -> Result<usize, DashError> {
        let records = parse_csv(bytes)?;
        let report = upload_records(self.services.store.as_ref(), &self.config.records_collection, &records).await;
        self.refresh_records().await;
        match report.error {
            None => Ok(report.written),
            Some(err) => Err(DashError::Persistence(format!(
                "{} of {} rows written: {:#}",
                report.written,
                records.len(),
                err
            ))),
        }
    }

    /// Table contents: `{records, loading, emptyMessage}`.
    pub fn records_state(&self) -> JsonValue {
        let page = self.records.borrow();
        json!({
            "records": page.records(),
            "loading": page.is_loading(),
            "emptyMessage": page.empty_message(),
        })
    }
}

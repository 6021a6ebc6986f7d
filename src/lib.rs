use serde_json::json;
use std::rc::Rc;
use std::sync::Once;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;

pub mod config;
pub mod dashboard;
pub mod error;
pub mod records;
pub mod render;
pub mod route_service;
pub mod store;
#[cfg(test)]
mod testing;
pub mod traffic;
pub mod types;
pub mod waypoints;
pub mod web;
pub mod zones;

use self::config::DashConfig;
use self::dashboard::{Dashboard, Services};
use self::error::err_to_js;
use self::render::{OsrmPathService, PathService};
use self::route_service::HttpRouteService;
use self::store::{FirestoreStore, MemoryStore, RecordStore};
use self::types::{GeoPoint, Role};
use self::waypoints::Outcome;
use self::web::{BrowserAlerts, BrowserLocator, BrowserPrompt, JsMapView};

static START: Once = Once::new();

fn init_logging(level: log::Level) {
    START.call_once(|| {
        if let Err(e) = console_log::init_with_level(level) {
            web_sys::console::error_1(&JsValue::from_str(&format!("error initializing logger: {}", e)));
        }
        console_error_panic_hook::set_once();
    });
}

#[wasm_bindgen]
pub fn rust_init(level: Option<String>) {
    let level = level.and_then(|l| l.parse().ok()).unwrap_or(log::Level::Info);
    init_logging(level);
    log::info!("Logger initialized from library");
}

fn outcome_name(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::Skipped => "skipped",
        Outcome::Applied => "applied",
        Outcome::Stale => "stale",
        Outcome::Failed => "failed",
    }
}

#[wasm_bindgen]
pub struct JsDashboard {
    inner: Rc<Dashboard<JsMapView>>,
}

#[wasm_bindgen]
impl JsDashboard {
    /// `add_layer(geojson) -> id` and `remove_layer(id)` draw route paths on
    /// the page's map.
    #[wasm_bindgen(constructor)]
    pub fn new(config_json: String, add_layer: js_sys::Function, remove_layer: js_sys::Function) -> Result<JsDashboard, JsValue> {
        let config = DashConfig::from_json(&config_json).map_err(err_to_js)?;
        init_logging(config.log_level());

        let store: Box<dyn RecordStore> = match &config.firestore {
            Some(firestore) => Box::new(FirestoreStore::new(firestore.clone())),
            None => {
                log::warn!("No record store configured, records are kept in memory");
                Box::new(MemoryStore::new())
            }
        };
        let paths = config
            .osrm_url
            .as_deref()
            .map(|url| Box::new(OsrmPathService::new(url)) as Box<dyn PathService>);
        let services = Services {
            routes: Box::new(HttpRouteService::new(&config.backend_url)),
            paths,
            store,
            alerts: Box::new(BrowserAlerts),
            locator: Box::new(BrowserLocator),
        };
        log::info!("Dashboard ready, backend at {}", config.backend_url);
        let view = JsMapView::new(add_layer, remove_layer);
        Ok(JsDashboard { inner: Rc::new(Dashboard::new(config, view, services)) })
    }

    /// `[lat, lng]` the map should open on.
    #[wasm_bindgen(js_name = initialView)]
    pub fn initial_view(&self) -> JsValue {
        let config = self.inner.config();
        let view = json!({ "center": config.center, "zoom": config.zoom });
        serde_wasm_bindgen::to_value(&view).unwrap_or(JsValue::NULL)
    }

    #[wasm_bindgen(js_name = contextMenu)]
    pub fn context_menu(&self, lat: f64, lng: f64) {
        self.inner.open_context_menu(GeoPoint::new(lat, lng));
    }

    /// Left clicks only place points when the page enables it.
    #[wasm_bindgen(js_name = mapClick)]
    pub fn map_click(&self, lat: f64, lng: f64) -> Option<String> {
        if !self.inner.config().click_places_points {
            return None;
        }
        Some(self.place_point(lat, lng, "destination".to_string()))
    }

    #[wasm_bindgen(js_name = placePoint)]
    pub fn place_point(&self, lat: f64, lng: f64, role_hint: String) -> String {
        let hint = Role::parse(&role_hint).unwrap_or(Role::Destination);
        self.inner.place_point(GeoPoint::new(lat, lng), hint).name().to_string()
    }

    /// Context-menu action. Returns the role the point got, or nothing when
    /// the label prompt was cancelled.
    #[wasm_bindgen(js_name = requestLabel)]
    pub fn request_label(&self, role: String) -> Option<String> {
        let role = Role::parse(&role).unwrap_or(Role::Destination);
        self.inner.request_label(role, &BrowserPrompt).map(|r| r.name().to_string())
    }

    #[wasm_bindgen(js_name = canRoute)]
    pub fn can_route(&self) -> bool {
        self.inner.can_route()
    }

    #[wasm_bindgen(js_name = directRoute)]
    pub fn direct_route(&self) -> js_sys::Promise {
        let inner = self.inner.clone();
        future_to_promise(async move { Ok(JsValue::from_bool(inner.direct_route().await)) })
    }

    pub fn optimize(&self) -> js_sys::Promise {
        let inner = self.inner.clone();
        future_to_promise(async move {
            let outcome = inner.backend_route(true).await;
            Ok(JsValue::from_str(outcome_name(outcome)))
        })
    }

    #[wasm_bindgen(js_name = roadRoute)]
    pub fn road_route(&self) -> js_sys::Promise {
        let inner = self.inner.clone();
        future_to_promise(async move {
            let outcome = inner.backend_route(false).await;
            Ok(JsValue::from_str(outcome_name(outcome)))
        })
    }

    pub fn reset(&self) {
        self.inner.reset();
    }

    #[wasm_bindgen(js_name = useMyLocation)]
    pub fn use_my_location(&self) -> js_sys::Promise {
        let inner = self.inner.clone();
        future_to_promise(async move {
            let outcome = inner.use_current_location().await;
            Ok(JsValue::from_str(outcome_name(outcome)))
        })
    }

    #[wasm_bindgen(js_name = markersGeojson)]
    pub fn markers_geojson(&self) -> Result<String, JsValue> {
        self.inner.markers_geojson().map_err(err_to_js)
    }

    #[wasm_bindgen(js_name = routeState)]
    pub fn route_state(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.inner.route_state()).map_err(err_to_js)
    }

    /// Highlighted zones styled by record density.
    #[wasm_bindgen(js_name = zonesGeojson)]
    pub fn zones_geojson(&self, zones_json: String) -> js_sys::Promise {
        let inner = self.inner.clone();
        future_to_promise(async move {
            match inner.zones_geojson(&zones_json).await {
                Ok(geojson_str) => Ok(JsValue::from_str(&geojson_str)),
                Err(e) => Err(err_to_js(e)),
            }
        })
    }

    /// `[{zone, count}]` from the last `zonesGeojson` call.
    #[wasm_bindgen(js_name = trafficCounts)]
    pub fn traffic_counts(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.inner.traffic_counts()).map_err(err_to_js)
    }

    /// Resolves to the number of rows written. Rejects on a bad file, and on
    /// a failed write with how many rows made it before it.
    #[wasm_bindgen(js_name = uploadCsv)]
    pub fn upload_csv(&self, bytes: Vec<u8>) -> js_sys::Promise {
        let inner = self.inner.clone();
        future_to_promise(async move {
            match inner.upload_csv(&bytes).await {
                Ok(written) => Ok(JsValue::from(written as u32)),
                Err(e) => Err(err_to_js(e)),
            }
        })
    }

    #[wasm_bindgen(js_name = refreshRecords)]
    pub fn refresh_records(&self) -> js_sys::Promise {
        let inner = self.inner.clone();
        future_to_promise(async move {
            inner.refresh_records().await;
            Ok(JsValue::UNDEFINED)
        })
    }

    /// Table contents: `{records, loading, emptyMessage}`.
    pub fn records(&self) -> Result<JsValue, JsValue> {
        serde_wasm_bindgen::to_value(&self.inner.records_state()).map_err(err_to_js)
    }
}

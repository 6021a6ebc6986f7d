use async_trait::async_trait;
use futures::channel::oneshot;
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsCast;
use web_sys::{Position, PositionError};

use crate::error::DashError;
use crate::render::{LayerId, MapView, PathLayer};
use crate::types::GeoPoint;
use crate::waypoints::{AlertSink, LabelPrompt, LocationProvider};

pub struct BrowserAlerts;

impl AlertSink for BrowserAlerts {
    fn alert(&self, message: &str) {
        match web_sys::window() {
            Some(window) => {
                if let Err(e) = window.alert_with_message(message) {
                    log::error!("alert failed: {:?}", e);
                }
            }
            None => log::error!("{}", message),
        }
    }
}

pub struct BrowserPrompt;

impl LabelPrompt for BrowserPrompt {
    fn ask(&self, message: &str) -> Option<String> {
        web_sys::window()?.prompt_with_message(message).ok().flatten()
    }
}

pub struct BrowserLocator;

#[async_trait(?Send)]
impl LocationProvider for BrowserLocator {
    async fn current_position(&self) -> Result<GeoPoint, DashError> {
        let window = web_sys::window().ok_or_else(|| DashError::Location("no browser window".into()))?;
        let geolocation = window
            .navigator()
            .geolocation()
            .map_err(|_| DashError::Location("Geolocation is not supported by your browser.".into()))?;

        // Exactly one of the two callbacks fires.
        let (sender, receiver) = oneshot::channel::<Result<GeoPoint, DashError>>();
        let sender = Rc::new(RefCell::new(Some(sender)));
        let error_sender = sender.clone();

        let on_success = Closure::once_into_js(move |position: Position| {
            let coords = position.coords();
            if let Some(tx) = sender.borrow_mut().take() {
                let _ = tx.send(Ok(GeoPoint::new(coords.latitude(), coords.longitude())));
            }
        });
        let on_error = Closure::once_into_js(move |error: PositionError| {
            if let Some(tx) = error_sender.borrow_mut().take() {
                let _ = tx.send(Err(DashError::Location(error.message())));
            }
        });

        geolocation
            .get_current_position_with_error_callback(on_success.unchecked_ref(), Some(on_error.unchecked_ref()))
            .map_err(|e| DashError::Location(format!("{:?}", e)))?;

        receiver
            .await
            .map_err(|_| DashError::Location("location request was abandoned".into()))?
    }
}

/// Map layers live on the JS side. The page passes two callbacks:
/// `addLayer(geojsonString) -> id` and `removeLayer(id)`.
pub struct JsMapView {
    add_layer: js_sys::Function,
    remove_layer: js_sys::Function,
}

impl JsMapView {
    pub fn new(add_layer: js_sys::Function, remove_layer: js_sys::Function) -> Self {
        JsMapView { add_layer, remove_layer }
    }
}

impl MapView for JsMapView {
    fn add_layer(&mut self, layer: &PathLayer) -> Option<LayerId> {
        let feature = match serde_json::to_string(&layer.to_feature()) {
            Ok(json) => json,
            Err(e) => {
                log::error!("Could not serialize route layer: {}", e);
                return None;
            }
        };
        match self.add_layer.call1(&JsValue::NULL, &JsValue::from_str(&feature)) {
            Ok(id) => {
                let id = id.as_f64().map(|id| id as LayerId);
                if id.is_none() {
                    log::error!("addLayer returned a non-numeric id");
                }
                id
            }
            Err(e) => {
                log::error!("addLayer failed: {:?}", e);
                None
            }
        }
    }

    fn remove_layer(&mut self, id: LayerId) {
        if let Err(e) = self.remove_layer.call1(&JsValue::NULL, &JsValue::from(id)) {
            log::error!("removeLayer({}) failed: {:?}", id, e);
        }
    }
}

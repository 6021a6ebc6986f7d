//! In-crate stand-ins for the browser and the remote services.

use async_trait::async_trait;
use futures::channel::oneshot;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::error::DashError;
use crate::render::{LayerId, MapView, PathLayer, PathService};
use crate::route_service::{OptimizedRoute, RouteRequest, RouteService};
use crate::types::GeoPoint;
use crate::waypoints::{AlertSink, LabelPrompt, LocationProvider};

pub fn p(lat: f64, lng: f64) -> GeoPoint {
    GeoPoint::new(lat, lng)
}

/// Holds a future until the paired sender fires (or is dropped).
#[derive(Default)]
pub struct Gate(RefCell<Option<oneshot::Receiver<()>>>);

impl Gate {
    pub fn closed() -> (Gate, oneshot::Sender<()>) {
        let (tx, rx) = oneshot::channel();
        (Gate(RefCell::new(Some(rx))), tx)
    }

    pub async fn pass(&self) {
        let receiver = self.0.borrow_mut().take();
        if let Some(receiver) = receiver {
            let _ = receiver.await;
        }
    }
}

#[derive(Clone, Default)]
pub struct RecordingAlerts(Rc<RefCell<Vec<String>>>);

impl RecordingAlerts {
    pub fn messages(&self) -> Vec<String> {
        self.0.borrow().clone()
    }
}

impl AlertSink for RecordingAlerts {
    fn alert(&self, message: &str) {
        self.0.borrow_mut().push(message.to_string());
    }
}

pub struct FixedPrompt(pub Option<&'static str>);

impl LabelPrompt for FixedPrompt {
    fn ask(&self, _message: &str) -> Option<String> {
        self.0.map(str::to_string)
    }
}

pub enum Reply {
    Route(Vec<[f64; 2]>),
    ServerError,
}

pub struct MockRoutes {
    pub reply: Reply,
    pub snap: Option<GeoPoint>,
    pub calls: Rc<Cell<usize>>,
    pub gate: Gate,
}

impl MockRoutes {
    pub fn new(reply: Reply) -> Self {
        MockRoutes { reply, snap: None, calls: Rc::new(Cell::new(0)), gate: Gate::default() }
    }

    async fn answer(&self) -> Result<OptimizedRoute, DashError> {
        self.calls.set(self.calls.get() + 1);
        self.gate.pass().await;
        match &self.reply {
            Reply::Route(coords) => Ok(OptimizedRoute {
                coords: coords.iter().map(|c| GeoPoint::from(*c)).collect(),
                best_order: None,
                total_time_hours: Some(0.5),
            }),
            Reply::ServerError => Err(DashError::Network("/optimize returned 500 Internal Server Error".into())),
        }
    }
}

#[async_trait(?Send)]
impl RouteService for MockRoutes {
    async fn optimize(&self, _request: &RouteRequest) -> Result<OptimizedRoute, DashError> {
        self.answer().await
    }

    async fn road_route(&self, _request: &RouteRequest) -> Result<OptimizedRoute, DashError> {
        self.answer().await
    }

    async fn snap(&self, _point: GeoPoint) -> Result<GeoPoint, DashError> {
        self.snap.ok_or_else(|| DashError::Network("snap failed".into()))
    }
}

pub struct FixedLocator {
    pub position: Option<GeoPoint>,
    pub gate: Gate,
}

impl FixedLocator {
    pub fn at(position: GeoPoint) -> Self {
        FixedLocator { position: Some(position), gate: Gate::default() }
    }

    pub fn denied() -> Self {
        FixedLocator { position: None, gate: Gate::default() }
    }
}

#[async_trait(?Send)]
impl LocationProvider for FixedLocator {
    async fn current_position(&self) -> Result<GeoPoint, DashError> {
        self.gate.pass().await;
        self.position.ok_or_else(|| DashError::Location("permission denied".into()))
    }
}

#[derive(Default)]
pub struct ViewLog {
    pub next: LayerId,
    pub live: Vec<(LayerId, PathLayer)>,
    pub removed: Vec<LayerId>,
    pub reject_adds: bool,
}

/// Records layer traffic; clones share one log.
#[derive(Clone, Default)]
pub struct MockView(pub Rc<RefCell<ViewLog>>);

impl MockView {
    pub fn rejecting() -> Self {
        let view = MockView::default();
        view.0.borrow_mut().reject_adds = true;
        view
    }

    pub fn live(&self) -> usize {
        self.0.borrow().live.len()
    }

    pub fn removed(&self) -> Vec<LayerId> {
        self.0.borrow().removed.clone()
    }
}

impl MapView for MockView {
    fn add_layer(&mut self, layer: &PathLayer) -> Option<LayerId> {
        let mut log = self.0.borrow_mut();
        if log.reject_adds {
            return None;
        }
        log.next += 1;
        let id = log.next;
        log.live.push((id, layer.clone()));
        Some(id)
    }

    fn remove_layer(&mut self, id: LayerId) {
        let mut log = self.0.borrow_mut();
        log.live.retain(|(live, _)| *live != id);
        log.removed.push(id);
    }
}

/// Two ways between every pair: straight, and via a corner.
pub struct TwoWays;

#[async_trait(?Send)]
impl PathService for TwoWays {
    async fn alternatives(&self, from: GeoPoint, to: GeoPoint) -> Result<Vec<Vec<GeoPoint>>, DashError> {
        let via = GeoPoint::new(from.latitude, to.longitude);
        Ok(vec![vec![from, to], vec![from, via, to]])
    }
}

pub struct Down;

#[async_trait(?Send)]
impl PathService for Down {
    async fn alternatives(&self, _from: GeoPoint, _to: GeoPoint) -> Result<Vec<Vec<GeoPoint>>, DashError> {
        Err(DashError::Network("offline".into()))
    }
}

/// Like `TwoWays` but waits on a gate first.
pub struct GatedPaths(pub Gate);

#[async_trait(?Send)]
impl PathService for GatedPaths {
    async fn alternatives(&self, from: GeoPoint, to: GeoPoint) -> Result<Vec<Vec<GeoPoint>>, DashError> {
        self.0.pass().await;
        TwoWays.alternatives(from, to).await
    }
}

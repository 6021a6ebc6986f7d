use std::error::Error;
use std::fmt;
use wasm_bindgen::JsValue;

/// Everything that can go wrong in a single dashboard interaction. None of
/// these are fatal; the triggering interaction reports it and moves on.
#[derive(Debug)]
pub enum DashError {
    /// The optimize/snap/route request never produced a 2xx reply.
    Network(String),
    /// A reply arrived but was not the shape we expect.
    MalformedResponse(String),
    /// The browser refused or failed to report a position.
    Location(String),
    /// Reading or writing the record store failed.
    Persistence(String),
    Csv(String),
    Config(String),
}

impl fmt::Display for DashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DashError::Network(msg) => write!(f, "Error: {}", msg),
            DashError::MalformedResponse(msg) => write!(f, "Error: unexpected reply from routing service ({})", msg),
            DashError::Location(msg) => write!(f, "Unable to retrieve your location. {}", msg),
            DashError::Persistence(msg) => write!(f, "Record store error: {}", msg),
            DashError::Csv(msg) => write!(f, "Could not read CSV: {}", msg),
            DashError::Config(msg) => write!(f, "Invalid configuration: {}", msg),
        }
    }
}

impl Error for DashError {}

impl From<reqwest::Error> for DashError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            DashError::MalformedResponse(err.to_string())
        } else {
            DashError::Network(err.to_string())
        }
    }
}

impl From<serde_json::Error> for DashError {
    fn from(err: serde_json::Error) -> Self {
        DashError::MalformedResponse(err.to_string())
    }
}

impl From<csv::Error> for DashError {
    fn from(err: csv::Error) -> Self {
        DashError::Csv(err.to_string())
    }
}

pub fn err_to_js<E: fmt::Display>(err: E) -> JsValue {
    JsValue::from_str(&err.to_string())
}

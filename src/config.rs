use serde::Deserialize;

use crate::error::DashError;
use crate::types::GeoPoint;

pub const HIGHLIGHTED_BARANGAYS: [&str; 11] = [
    "BAGONG SILANG",
    "TIBANGA",
    "SAN MIGUEL",
    "SANTIAGO",
    "HINAPLANON",
    "SANTO ROSARIO",
    "DEL CARMEN",
    "LUINAB",
    "SAN ROQUE",
    "UPPER HINAPLANON",
    "SANTA FILOMENA",
];

#[derive(Clone, Debug, Deserialize)]
pub struct FirestoreConfig {
    pub project_id: String,
    pub api_key: String,
    #[serde(default = "default_database")]
    pub database: String,
}

/// Page-level settings, handed over as JSON by the host page. Every field is
/// optional.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct DashConfig {
    pub backend_url: String,
    /// OSRM server for road-following path drawing. `None` draws straight lines.
    pub osrm_url: Option<String>,
    pub center: GeoPoint,
    pub zoom: u8,
    pub zone_name_property: String,
    pub highlighted_zones: Vec<String>,
    pub records_collection: String,
    pub place_field: String,
    pub firestore: Option<FirestoreConfig>,
    pub snap_current_location: bool,
    pub click_places_points: bool,
    pub log_level: String,
}

fn default_database() -> String {
    "(default)".to_string()
}

impl Default for DashConfig {
    fn default() -> Self {
        DashConfig {
            backend_url: "http://localhost:5000".to_string(),
            osrm_url: Some("https://router.project-osrm.org".to_string()),
            center: GeoPoint::new(8.228, 124.245),
            zoom: 14,
            zone_name_property: "adm4_en".to_string(),
            highlighted_zones: HIGHLIGHTED_BARANGAYS.iter().map(|s| s.to_string()).collect(),
            records_collection: "records".to_string(),
            place_field: "placeOfViolation".to_string(),
            firestore: None,
            snap_current_location: true,
            click_places_points: false,
            log_level: "info".to_string(),
        }
    }
}

impl DashConfig {
    pub fn from_json(json: &str) -> Result<Self, DashError> {
        if json.trim().is_empty() {
            return Ok(DashConfig::default());
        }
        serde_json::from_str(json).map_err(|e| DashError::Config(e.to_string()))
    }

    pub fn log_level(&self) -> log::Level {
        self.log_level.parse().unwrap_or(log::Level::Info)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_input_gives_defaults() {
        let config = DashConfig::from_json("").unwrap();
        assert_eq!(config.backend_url, "http://localhost:5000");
        assert_eq!(config.highlighted_zones.len(), 11);
        assert_eq!(config.zone_name_property, "adm4_en");
        assert!(config.firestore.is_none());
        assert!(config.osrm_url.is_some());
    }

    #[test]
    fn partial_json_overrides_only_given_fields() {
        let config = DashConfig::from_json(
            r#"{"backend_url": "https://routes.example.org", "firestore": {"project_id": "p", "api_key": "k"}}"#,
        )
        .unwrap();
        assert_eq!(config.backend_url, "https://routes.example.org");
        assert_eq!(config.zoom, 14);
        assert_eq!(config.firestore.unwrap().database, "(default)");

        let no_paths = DashConfig::from_json(r#"{"osrm_url": null}"#).unwrap();
        assert!(no_paths.osrm_url.is_none());
    }

    #[test]
    fn bad_json_is_a_config_error() {
        assert!(matches!(DashConfig::from_json("{"), Err(DashError::Config(_))));
    }

    #[test]
    fn unknown_log_level_falls_back_to_info() {
        let config = DashConfig { log_level: "chatty".into(), ..Default::default() };
        assert_eq!(config.log_level(), log::Level::Info);
    }
}

use geojson::{Feature, FeatureCollection};
use serde_json::{json, Value as JsonValue};
use std::collections::{BTreeMap, HashSet};

/// Zone names are compared upper-cased and trimmed.
pub fn normalize_name(name: &str) -> String {
    name.trim().to_uppercase()
}

/// The set of highlighted zones, stored normalized.
#[derive(Clone, Debug)]
pub struct AllowList {
    names: HashSet<String>,
}

impl AllowList {
    pub fn new<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        AllowList {
            names: names.into_iter().map(|n| normalize_name(n.as_ref())).collect(),
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(&normalize_name(name))
    }
}

// Lightest to darkest
pub const BUCKET_COLORS: [&str; 6] = ["#FFEDA0", "#FEB24C", "#FC4E2A", "#E31A1C", "#BD0026", "#800026"];

pub fn fill_color(count: u32) -> &'static str {
    match count {
        c if c > 50 => BUCKET_COLORS[5],
        c if c > 30 => BUCKET_COLORS[4],
        c if c > 10 => BUCKET_COLORS[3],
        c if c > 5 => BUCKET_COLORS[2],
        c if c > 0 => BUCKET_COLORS[1],
        _ => BUCKET_COLORS[0],
    }
}

fn zone_name<'a>(feature: &'a Feature, name_property: &str) -> Option<&'a str> {
    feature.property(name_property).and_then(JsonValue::as_str)
}

/// Keeps only the features whose name is on the allow list. Features with no
/// name property are dropped too.
pub fn filter_zones(zones: &FeatureCollection, allow: &AllowList, name_property: &str) -> FeatureCollection {
    let features: Vec<Feature> = zones
        .features
        .iter()
        .filter(|f| zone_name(f, name_property).map_or(false, |name| allow.contains(name)))
        .cloned()
        .collect();
    log::info!("Highlighting {} of {} zones", features.len(), zones.features.len());
    FeatureCollection {
        bbox: zones.bbox.clone(),
        features,
        foreign_members: zones.foreign_members.clone(),
    }
}

/// Filters and then attaches the leaflet style properties the page reads
/// back when drawing each polygon.
pub fn style_zones(
    zones: &FeatureCollection,
    allow: &AllowList,
    name_property: &str,
    counts: &BTreeMap<String, u32>,
) -> FeatureCollection {
    let mut styled = filter_zones(zones, allow, name_property);
    for feature in styled.features.iter_mut() {
        let name = zone_name(feature, name_property).map(normalize_name).unwrap_or_default();
        let count = counts.get(&name).copied().unwrap_or(0);
        feature.set_property("count", count);
        feature.set_property(
            "style",
            json!({
                "fillColor": fill_color(count),
                "weight": 1,
                "color": "gray",
                "fillOpacity": 0.7,
            }),
        );
    }
    styled
}

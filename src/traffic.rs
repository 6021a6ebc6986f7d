use serde::Serialize;
use std::collections::BTreeMap;

use crate::error::DashError;
use crate::store::{RecordStore, StoredDocument};
use crate::zones::{normalize_name, AllowList};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TrafficCount {
    pub zone: String,
    pub count: u32,
}

/// Counts records per highlighted zone. Keys are normalized zone names;
/// records without the place field, or outside the allow list, are skipped.
pub fn aggregate_traffic(records: &[StoredDocument], place_field: &str, allow: &AllowList) -> BTreeMap<String, u32> {
    let mut counts = BTreeMap::new();
    for place in records.iter().filter_map(|doc| doc.field_str(place_field)) {
        if !allow.contains(place) {
            continue;
        }
        *counts.entry(normalize_name(place)).or_insert(0) += 1;
    }
    counts
}

pub fn to_traffic_counts(counts: &BTreeMap<String, u32>) -> Vec<TrafficCount> {
    counts
        .iter()
        .map(|(zone, count)| TrafficCount { zone: zone.clone(), count: *count })
        .collect()
}

/// Takes one snapshot of the collection and aggregates it.
pub async fn load_traffic(
    store: &dyn RecordStore,
    collection: &str,
    place_field: &str,
    allow: &AllowList,
) -> Result<BTreeMap<String, u32>, DashError> {
    let records = store.list(collection).await?;
    let counts = aggregate_traffic(&records, place_field, allow);
    log::info!("Aggregated {} records into {} zones", records.len(), counts.len());
    Ok(counts)
}

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Map, Value as JsonValue};
use std::cell::RefCell;
use std::collections::HashMap;

use crate::config::FirestoreConfig;
use crate::error::DashError;

/// A stored document, with its fields flattened to plain JSON values.
#[derive(Clone, Debug, PartialEq)]
pub struct StoredDocument {
    pub id: String,
    pub fields: Map<String, JsonValue>,
}

impl StoredDocument {
    pub fn field_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(JsonValue::as_str)
    }
}

/// The hosted document database. Everything runs on the browser's single
/// thread, so futures are not `Send`.
#[async_trait(?Send)]
pub trait RecordStore {
    async fn list(&self, collection: &str) -> Result<Vec<StoredDocument>, DashError>;
    async fn append(&self, collection: &str, fields: Map<String, JsonValue>) -> Result<String, DashError>;
}

// ** Firestore REST **

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListDocumentsResponse {
    #[serde(default)]
    documents: Vec<FirestoreDocument>,
    next_page_token: Option<String>,
}

#[derive(Deserialize)]
struct FirestoreDocument {
    name: String,
    #[serde(default)]
    fields: Map<String, JsonValue>,
}

impl FirestoreDocument {
    fn into_stored(self) -> StoredDocument {
        let id = self.name.rsplit('/').next().unwrap_or_default().to_string();
        let fields = self.fields.into_iter().map(|(k, v)| (k, decode_value(&v))).collect();
        StoredDocument { id, fields }
    }
}

// Firestore wraps every value in a one-key object naming its type.
fn decode_value(value: &JsonValue) -> JsonValue {
    let Some(object) = value.as_object() else {
        return JsonValue::Null;
    };
    if let Some(s) = object.get("stringValue") {
        return s.clone();
    }
    if let Some(JsonValue::String(n)) = object.get("integerValue") {
        return n.parse::<i64>().map(JsonValue::from).unwrap_or_else(|_| JsonValue::String(n.clone()));
    }
    if let Some(d) = object.get("doubleValue") {
        return d.clone();
    }
    if let Some(b) = object.get("booleanValue") {
        return b.clone();
    }
    if let Some(t) = object.get("timestampValue") {
        return t.clone();
    }
    if let Some(map) = object.get("mapValue") {
        let fields = map.get("fields").and_then(JsonValue::as_object).cloned().unwrap_or_default();
        return JsonValue::Object(fields.iter().map(|(k, v)| (k.clone(), decode_value(v))).collect());
    }
    if let Some(array) = object.get("arrayValue") {
        let values = array.get("values").and_then(JsonValue::as_array).cloned().unwrap_or_default();
        return JsonValue::Array(values.iter().map(decode_value).collect());
    }
    JsonValue::Null
}

fn encode_value(value: &JsonValue) -> JsonValue {
    match value {
        JsonValue::Null => json!({ "nullValue": null }),
        JsonValue::Bool(b) => json!({ "booleanValue": b }),
        JsonValue::Number(n) if n.is_i64() => json!({ "integerValue": n.to_string() }),
        JsonValue::Number(n) => json!({ "doubleValue": n }),
        JsonValue::String(s) => json!({ "stringValue": s }),
        JsonValue::Array(values) => json!({ "arrayValue": { "values": values.iter().map(encode_value).collect::<Vec<_>>() } }),
        JsonValue::Object(map) => {
            let fields: Map<String, JsonValue> = map.iter().map(|(k, v)| (k.clone(), encode_value(v))).collect();
            json!({ "mapValue": { "fields": fields } })
        }
    }
}

pub struct FirestoreStore {
    client: Client,
    config: FirestoreConfig,
}

impl FirestoreStore {
    pub fn new(config: FirestoreConfig) -> Self {
        FirestoreStore { client: Client::new(), config }
    }

    fn collection_url(&self, collection: &str) -> String {
        format!(
            "https://firestore.googleapis.com/v1/projects/{}/databases/{}/documents/{}",
            self.config.project_id, self.config.database, collection
        )
    }
}

fn persistence(err: reqwest::Error) -> DashError {
    DashError::Persistence(err.to_string())
}

#[async_trait(?Send)]
impl RecordStore for FirestoreStore {
    async fn list(&self, collection: &str) -> Result<Vec<StoredDocument>, DashError> {
        let url = self.collection_url(collection);
        let mut documents = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut query = vec![("key", self.config.api_key.clone()), ("pageSize", "300".to_string())];
            if let Some(token) = &page_token {
                query.push(("pageToken", token.clone()));
            }
            let response = self.client.get(&url).query(&query).send().await.map_err(persistence)?;
            if !response.status().is_success() {
                return Err(DashError::Persistence(format!("listing {} returned {}", collection, response.status())));
            }
            let page: ListDocumentsResponse = response.json().await.map_err(persistence)?;
            documents.extend(page.documents.into_iter().map(FirestoreDocument::into_stored));
            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }
        log::info!("Fetched {} documents from {}", documents.len(), collection);
        Ok(documents)
    }

    async fn append(&self, collection: &str, fields: Map<String, JsonValue>) -> Result<String, DashError> {
        let encoded: Map<String, JsonValue> = fields.iter().map(|(k, v)| (k.clone(), encode_value(v))).collect();
        let response = self
            .client
            .post(self.collection_url(collection))
            .query(&[("key", self.config.api_key.as_str())])
            .json(&json!({ "fields": encoded }))
            .send()
            .await
            .map_err(persistence)?;
        if !response.status().is_success() {
            return Err(DashError::Persistence(format!("writing to {} returned {}", collection, response.status())));
        }
        let created: FirestoreDocument = response.json().await.map_err(persistence)?;
        Ok(created.into_stored().id)
    }
}

// ** In-memory **

/// Stand-in store for pages without a configured backend, and for tests.
#[derive(Default)]
pub struct MemoryStore {
    collections: RefCell<HashMap<String, Vec<StoredDocument>>>,
    fail_writes_after: Option<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Every append past the first `n` is rejected.
    pub fn failing_after(n: usize) -> Self {
        MemoryStore { fail_writes_after: Some(n), ..Default::default() }
    }

    pub fn insert(&self, collection: &str, fields: Map<String, JsonValue>) {
        let mut collections = self.collections.borrow_mut();
        let docs = collections.entry(collection.to_string()).or_default();
        let id = format!("doc{}", docs.len());
        docs.push(StoredDocument { id, fields });
    }
}

#[async_trait(?Send)]
impl RecordStore for MemoryStore {
    async fn list(&self, collection: &str) -> Result<Vec<StoredDocument>, DashError> {
        Ok(self.collections.borrow().get(collection).cloned().unwrap_or_default())
    }

    async fn append(&self, collection: &str, fields: Map<String, JsonValue>) -> Result<String, DashError> {
        let written = self.collections.borrow().get(collection).map_or(0, Vec::len);
        if self.fail_writes_after.map_or(false, |n| written >= n) {
            return Err(DashError::Persistence("write rejected".into()));
        }
        self.insert(collection, fields);
        Ok(format!("doc{}", written))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::executor::block_on;

    #[test]
    fn firestore_values_are_unwrapped() {
        let raw = json!({
            "name": "projects/p/databases/(default)/documents/records/abc123",
            "fields": {
                "name": {"stringValue": "Juan"},
                "amount": {"integerValue": "1500"},
                "paid": {"booleanValue": false},
                "meta": {"mapValue": {"fields": {"zone": {"stringValue": "TIBANGA"}}}}
            }
        });
        let doc: FirestoreDocument = serde_json::from_value(raw).unwrap();
        let stored = doc.into_stored();
        assert_eq!(stored.id, "abc123");
        assert_eq!(stored.field_str("name"), Some("Juan"));
        assert_eq!(stored.fields["amount"], json!(1500));
        assert_eq!(stored.fields["paid"], json!(false));
        assert_eq!(stored.fields["meta"]["zone"], json!("TIBANGA"));
    }

    #[test]
    fn encoding_wraps_strings() {
        assert_eq!(encode_value(&json!("x")), json!({"stringValue": "x"}));
        assert_eq!(encode_value(&json!(3)), json!({"integerValue": "3"}));
    }

    #[test]
    fn memory_store_keeps_appended_documents() {
        let store = MemoryStore::new();
        let mut fields = Map::new();
        fields.insert("name".into(), json!("Ana"));
        block_on(store.append("records", fields)).unwrap();
        let listed = block_on(store.list("records")).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].field_str("name"), Some("Ana"));
        assert!(block_on(store.list("other")).unwrap().is_empty());
    }

    #[test]
    fn memory_store_can_reject_writes() {
        let store = MemoryStore::failing_after(1);
        block_on(store.append("records", Map::new())).unwrap();
        assert!(matches!(block_on(store.append("records", Map::new())), Err(DashError::Persistence(_))));
    }
}

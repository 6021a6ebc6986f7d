use anyhow::Context;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use crate::error::DashError;
use crate::store::{RecordStore, StoredDocument};

/// One member record. Every field is kept exactly as it appeared in the CSV.
#[derive(Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Record {
    pub name: String,
    pub contact_info: String,
    pub address: String,
    pub amount: String,
}

fn field_text(doc: &StoredDocument, name: &str) -> String {
    match doc.fields.get(name) {
        Some(JsonValue::String(s)) => s.clone(),
        Some(JsonValue::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

impl Record {
    pub fn to_fields(&self) -> Map<String, JsonValue> {
        let mut fields = Map::new();
        fields.insert("name".into(), JsonValue::from(self.name.as_str()));
        fields.insert("contactInfo".into(), JsonValue::from(self.contact_info.as_str()));
        fields.insert("address".into(), JsonValue::from(self.address.as_str()));
        fields.insert("amount".into(), JsonValue::from(self.amount.as_str()));
        fields
    }

    pub fn from_document(doc: &StoredDocument) -> Self {
        Record {
            name: field_text(doc, "name"),
            contact_info: field_text(doc, "contactInfo"),
            address: field_text(doc, "address"),
            amount: field_text(doc, "amount"),
        }
    }
}

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Reads rows by position: name, contact, address, amount. There is no
/// header row; short rows get empty fields and blank rows are skipped.
/// Bytes that are not valid UTF-8 become U+FFFD instead of failing the file.
pub fn parse_csv(bytes: &[u8]) -> Result<Vec<Record>, DashError> {
    let bytes = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    let mut reader = csv::ReaderBuilder::new().has_headers(false).flexible(true).from_reader(bytes);
    let mut records = Vec::new();
    for row in reader.byte_records() {
        let row = row?;
        if row.iter().all(|field| field.is_empty()) {
            continue;
        }
        let column = |i: usize| String::from_utf8_lossy(row.get(i).unwrap_or_default()).into_owned();
        records.push(Record {
            name: column(0),
            contact_info: column(1),
            address: column(2),
            amount: column(3),
        });
    }
    Ok(records)
}

pub struct UploadReport {
    pub written: usize,
    /// Set when a write failed; rows after it were not attempted and rows
    /// before it stay written.
    pub error: Option<anyhow::Error>,
}

/// Writes the records one at a time, in order.
pub async fn upload_records(store: &dyn RecordStore, collection: &str, records: &[Record]) -> UploadReport {
    let mut written = 0;
    for (i, record) in records.iter().enumerate() {
        let result = store
            .append(collection, record.to_fields())
            .await
            .with_context(|| format!("writing row {} ({})", i + 1, record.name));
        if let Err(err) = result {
            log::error!("Upload stopped after {} of {} rows: {:#}", written, records.len(), err);
            return UploadReport { written, error: Some(err) };
        }
        written += 1;
    }
    log::info!("Uploaded {} records to {}", written, collection);
    UploadReport { written, error: None }
}

/// State behind the records table.
#[derive(Debug, Default)]
pub struct RecordsPage {
    records: Vec<Record>,
    loading: bool,
}

impl RecordsPage {
    pub fn new() -> Self {
        RecordsPage::default()
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn empty_message(&self) -> Option<&'static str> {
        if self.loading || !self.records.is_empty() {
            None
        } else {
            Some("No records uploaded yet.")
        }
    }

    pub fn begin_loading(&mut self) {
        self.loading = true;
    }

    /// On failure the previous rows stay on screen.
    pub fn apply_listing(&mut self, listing: Result<Vec<StoredDocument>, DashError>) {
        self.loading = false;
        match listing {
            Ok(docs) => self.records = docs.iter().map(Record::from_document).collect(),
            Err(err) => log::error!("Could not load records: {}", err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use futures::executor::block_on;

    const TWO_ROWS: &[u8] = b"Juan Dela Cruz,0917 123 4567,\"Purok 3, Tibanga\",1500\nMaria Santos,0918 765 4321,San Miguel,250.50\n";

    #[test]
    fn rows_map_by_position() {
        let records = parse_csv(TWO_ROWS).unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0],
            Record {
                name: "Juan Dela Cruz".into(),
                contact_info: "0917 123 4567".into(),
                address: "Purok 3, Tibanga".into(),
                amount: "1500".into(),
            }
        );
    }

    #[test]
    fn short_and_blank_rows() {
        let records = parse_csv(b"Ana,0917\n\n,,,\nBen,0918,Luinab,10,extra\n").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].address, "");
        assert_eq!(records[0].amount, "");
        assert_eq!(records[1].amount, "10");
    }

    #[test]
    fn invalid_utf8_is_replaced_not_rejected() {
        let records = parse_csv(b"Ana,0917,Tibanga,10\nPe\xF1aranda,0918,Luinab,20\n").unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].name, "Pe\u{FFFD}aranda");
        assert_eq!(records[1].address, "Luinab");
    }

    #[test]
    fn leading_byte_order_mark_is_dropped() {
        let records = parse_csv(b"\xEF\xBB\xBFAna,0917,Tibanga,10\n").unwrap();
        assert_eq!(records[0].name, "Ana");
    }

    #[test]
    fn upload_stops_at_the_first_failed_write() {
        let store = MemoryStore::failing_after(1);
        let records = parse_csv(TWO_ROWS).unwrap();
        let report = block_on(upload_records(&store, "records", &records));
        assert_eq!(report.written, 1);
        let message = format!("{:#}", report.error.unwrap());
        assert!(message.contains("writing row 2 (Maria Santos)"));
        assert_eq!(block_on(store.list("records")).unwrap().len(), 1);
    }

    #[test]
    fn failed_listing_clears_loading_and_keeps_stale_rows() {
        let mut page = RecordsPage::new();
        assert_eq!(page.empty_message(), Some("No records uploaded yet."));
        page.apply_listing(Ok(vec![StoredDocument { id: "1".into(), fields: Record::default().to_fields() }]));
        page.begin_loading();
        assert_eq!(page.empty_message(), None);
        page.apply_listing(Err(DashError::Persistence("unavailable".into())));
        assert!(!page.is_loading());
        assert_eq!(page.records().len(), 1);
    }

    #[test]
    fn numeric_fields_read_back_as_text() {
        let mut fields = Map::new();
        fields.insert("name".into(), JsonValue::from("Ana"));
        fields.insert("amount".into(), JsonValue::from(1500));
        let record = Record::from_document(&StoredDocument { id: "x".into(), fields });
        assert_eq!(record.amount, "1500");
        assert_eq!(record.address, "");
    }
}

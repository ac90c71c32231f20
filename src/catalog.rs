// 📦 Catalog Entity - Remote product record, read-only projection
//
// The backend encodes "no value" as `false`, and many-to-one fields as
// `[id, "display name"]`. Both are normalized here.

use crate::session::Record;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Remote entity holding the catalog
pub const PRODUCT_ENTITY: &str = "product.template";

// Remote field names
pub const FIELD_ID: &str = "id";
pub const FIELD_NAME: &str = "name";
pub const FIELD_BARCODE: &str = "barcode";
pub const FIELD_PRICE: &str = "list_price";
pub const FIELD_CODE: &str = "default_code";
pub const FIELD_CATEGORY: &str = "categ_id";

/// Fields fetched by a single-product lookup
pub const LOOKUP_FIELDS: [&str; 6] = [
    FIELD_ID,
    FIELD_NAME,
    FIELD_BARCODE,
    FIELD_PRICE,
    FIELD_CODE,
    FIELD_CATEGORY,
];

/// Fields fetched by the bulk catalog load
pub const CATALOG_FIELDS: [&str; 5] = [FIELD_ID, FIELD_NAME, FIELD_BARCODE, FIELD_PRICE, FIELD_CODE];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntity {
    pub id: i64,
    pub name: String,
    pub external_id: Option<String>,
    pub price: Decimal,
    pub short_code: Option<String>,
    pub category: Option<String>,
}

impl CatalogEntity {
    /// Project a remote record. Returns None when the record has no integer id
    /// or no numeric list price.
    pub fn from_record(record: &Record) -> Option<Self> {
        let id = record.get(FIELD_ID)?.as_i64()?;
        let price = decimal(record.get(FIELD_PRICE)?)?;

        Some(CatalogEntity {
            id,
            name: text(record.get(FIELD_NAME)).unwrap_or_default(),
            external_id: text(record.get(FIELD_BARCODE)),
            price,
            short_code: text(record.get(FIELD_CODE)),
            category: record.get(FIELD_CATEGORY).and_then(many2one_name),
        })
    }

    pub fn has_external_id(&self) -> bool {
        self.external_id
            .as_deref()
            .map(|id| !id.trim().is_empty())
            .unwrap_or(false)
    }
}

/// `false`, null and blank strings are all "no value"
fn text(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn decimal(value: &Value) -> Option<Decimal> {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(Decimal::from(i)),
            None => n.as_f64().and_then(Decimal::from_f64),
        },
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// `[7, "All / Saleable"]` -> "All / Saleable"
fn many2one_name(value: &Value) -> Option<String> {
    match value {
        Value::Array(pair) => pair.get(1).and_then(Value::as_str).map(str::to_string),
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        _ => None,
    }
}

// 💲 Update Engine - Write prices to every product sharing an identifier
//
// Every public operation returns a value. Validation failures, "not found"
// and transport faults all become a failed UpdateOutcome; nothing here
// propagates a raw remote error to the caller.

use crate::catalog::{CatalogEntity, FIELD_BARCODE, FIELD_PRICE, LOOKUP_FIELDS, PRODUCT_ENTITY};
use crate::logging::SharedLog;
use crate::reconciliation::{approved_updates, PriceComparison};
use crate::record_store::{processed_key, ProcessedRecord, RecordStore};
use crate::session::{Domain, Record, SessionClient, SessionError};
use crate::validation::{validate_external_id, validate_price, PriceInput, ValidationError};
use anyhow::{bail, Context, Result};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::Read;
use std::path::Path;
use thiserror::Error;

/// Batch row numbers: 1-based position plus the header row
pub const ROW_OFFSET: usize = 2;

/// Columns a batch CSV must carry
pub const REQUIRED_COLUMNS: [&str; 2] = ["barcode", "price"];

// ============================================================================
// REQUEST / OUTCOME TYPES
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceUpdateRequest {
    pub external_id: String,
    pub price: PriceInput,
}

impl PriceUpdateRequest {
    pub fn new(external_id: impl Into<String>, price: impl Into<PriceInput>) -> Self {
        PriceUpdateRequest {
            external_id: external_id.into(),
            price: price.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateOutcome {
    pub success: bool,
    pub message: String,
    pub updated_count: usize,
    pub external_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub row_number: Option<usize>,
}

impl UpdateOutcome {
    fn succeeded(external_id: &str, updated_count: usize, message: String) -> Self {
        UpdateOutcome {
            success: true,
            message,
            updated_count,
            external_id: external_id.to_string(),
            row_number: None,
        }
    }

    fn failed(external_id: &str, message: String) -> Self {
        UpdateOutcome {
            success: false,
            message,
            updated_count: 0,
            external_id: external_id.to_string(),
            row_number: None,
        }
    }

    /// Annotate with a batch row number
    pub fn at_row(mut self, row_number: usize) -> Self {
        self.row_number = Some(row_number);
        self
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchOutcome {
    pub succeeded: usize,
    pub failed: usize,
    pub total_processed: usize,
    pub results: Vec<UpdateOutcome>,
}

impl BatchOutcome {
    /// Fold step: counts always move together with `results`
    fn record(mut self, outcome: UpdateOutcome) -> Self {
        if outcome.success {
            self.succeeded += 1;
        } else {
            self.failed += 1;
        }
        self.total_processed += 1;
        self.results.push(outcome);
        self
    }

    pub fn summary(&self) -> String {
        format!(
            "Batch update completed. Successful: {}, Failed: {}, Total: {}",
            self.succeeded, self.failed, self.total_processed
        )
    }
}

/// Result of applying a reviewed change list against a record store
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ApplyOutcome {
    /// Identifiers skipped because the store had already seen the change
    pub skipped: Vec<String>,
    pub batch: BatchOutcome,
}

// ============================================================================
// ERRORS
// ============================================================================

/// Internal failure of a single update, folded into an UpdateOutcome
#[derive(Debug, Error)]
enum UpdateError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("price {0} cannot be sent to the server")]
    Unrepresentable(Decimal),

    #[error("server did not acknowledge the write")]
    NotAcknowledged,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum LookupError {
    #[error("No products found with barcode: {0}")]
    NotFound(String),

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error(transparent)]
    Session(#[from] SessionError),
}

// ============================================================================
// UPDATE ENGINE
// ============================================================================

pub struct UpdateEngine<'s> {
    session: &'s SessionClient,
    log: SharedLog,
}

impl<'s> UpdateEngine<'s> {
    /// Engine logging through the session's log
    pub fn new(session: &'s SessionClient) -> Self {
        UpdateEngine {
            session,
            log: session.log().clone(),
        }
    }

    pub fn with_log(session: &'s SessionClient, log: SharedLog) -> Self {
        UpdateEngine { session, log }
    }

    /// Set the price of every product whose barcode equals `external_id`
    pub fn update_by_identifier(&self, external_id: &str, price: &PriceInput) -> UpdateOutcome {
        match self.try_update(external_id, price) {
            Ok(outcome) => outcome,
            Err(e) => {
                let message = format!(
                    "Error updating product with barcode {}: {}",
                    external_id, e
                );
                self.log.error(&message);
                UpdateOutcome::failed(external_id.trim(), message)
            }
        }
    }

    fn try_update(&self, external_id: &str, price: &PriceInput) -> Result<UpdateOutcome, UpdateError> {
        let external_id = validate_external_id(external_id)?;
        let price = validate_price(price)?;

        self.log
            .info(&format!("Searching for products with barcode: {}", external_id));

        let ids = self
            .session
            .search(PRODUCT_ENTITY, &Domain::equals(FIELD_BARCODE, external_id.as_str()))?;

        if ids.is_empty() {
            let message = format!("No products found with barcode: {}", external_id);
            self.log.warn(&message);
            return Ok(UpdateOutcome::failed(&external_id, message));
        }

        self.log.info(&format!(
            "Found {} product(s) with barcode: {}",
            ids.len(),
            external_id
        ));

        // One write covers every duplicate
        let mut values = Record::new();
        values.insert(FIELD_PRICE.to_string(), price_value(price)?);

        if !self.session.write(PRODUCT_ENTITY, &ids, values)? {
            return Err(UpdateError::NotAcknowledged);
        }

        self.log.info(&format!(
            "Successfully updated {} product(s) with barcode {} to ${}",
            ids.len(),
            external_id,
            price
        ));

        Ok(UpdateOutcome::succeeded(
            &external_id,
            ids.len(),
            format!("Updated {} product(s) to ${}", ids.len(), price),
        ))
    }

    /// Apply requests strictly in order. No request can stop the batch.
    pub fn batch_update(&self, requests: &[PriceUpdateRequest]) -> BatchOutcome {
        self.log
            .info(&format!("Processing batch update of {} request(s)", requests.len()));

        let outcome = requests
            .iter()
            .enumerate()
            .fold(BatchOutcome::default(), |batch, (index, request)| {
                let outcome = self
                    .update_by_identifier(&request.external_id, &request.price)
                    .at_row(index + ROW_OFFSET);
                batch.record(outcome)
            });

        self.log.info(&outcome.summary());
        outcome
    }

    /// Read-only: first product with this barcode
    pub fn lookup_by_identifier(&self, external_id: &str) -> Result<CatalogEntity, LookupError> {
        let external_id = validate_external_id(external_id)?;

        let ids = self
            .session
            .search(PRODUCT_ENTITY, &Domain::equals(FIELD_BARCODE, external_id.as_str()))?;

        let Some(first) = ids.first() else {
            return Err(LookupError::NotFound(external_id));
        };

        self.session
            .read(PRODUCT_ENTITY, &[*first], &LOOKUP_FIELDS)?
            .iter()
            .find_map(CatalogEntity::from_record)
            .ok_or(LookupError::NotFound(external_id))
    }

    /// Load requests from a CSV file and run them as one batch
    ///
    /// A missing or unreadable file fails before any network call.
    pub fn batch_update_from_csv(&self, csv_path: &Path) -> Result<BatchOutcome> {
        if !csv_path.exists() {
            bail!("CSV file not found: {}", csv_path.display());
        }

        self.log
            .info(&format!("Processing batch update from CSV: {}", csv_path.display()));

        let file = std::fs::File::open(csv_path)
            .with_context(|| format!("Failed to open file: {}", csv_path.display()))?;
        let requests = load_update_requests(file)?;

        Ok(self.batch_update(&requests))
    }

    /// Batch-apply `requests`, skipping changes the store already holds and
    /// recording each success. Store failures are warnings only.
    pub fn apply_with_store(&self, requests: &[PriceUpdateRequest], store: &dyn RecordStore) -> ApplyOutcome {
        let mut skipped = Vec::new();
        let mut pending = Vec::new();

        for request in requests {
            match request_key(request).map(|key| store.is_processed(&key)) {
                Some(Ok(true)) => {
                    self.log.info(&format!(
                        "Skipping {}: change already recorded",
                        request.external_id.trim()
                    ));
                    skipped.push(request.external_id.trim().to_string());
                }
                Some(Err(e)) => {
                    self.log.warn(&format!(
                        "Record store check failed for {}: {}",
                        request.external_id.trim(),
                        e
                    ));
                    pending.push(request.clone());
                }
                _ => pending.push(request.clone()),
            }
        }

        let batch = self.batch_update(&pending);

        for (request, outcome) in pending.iter().zip(&batch.results) {
            if !outcome.success {
                continue;
            }
            let Ok(price) = validate_price(&request.price) else {
                continue;
            };
            let record = ProcessedRecord::new(&outcome.external_id, price, outcome.updated_count);
            if let Err(e) = store.record_processed(record) {
                self.log.warn(&format!(
                    "Could not record processed change for {}: {}",
                    outcome.external_id, e
                ));
            }
        }

        ApplyOutcome { skipped, batch }
    }

    /// Push every increase/decrease from a reconciliation back to the catalog
    pub fn apply_approved(&self, comparisons: &[PriceComparison], store: &dyn RecordStore) -> ApplyOutcome {
        let requests = approved_updates(comparisons);
        self.log.info(&format!(
            "Applying {} approved change(s) of {} compared",
            requests.len(),
            comparisons.len()
        ));
        self.apply_with_store(&requests, store)
    }
}

/// Idempotency key, when the request is well-formed
fn request_key(request: &PriceUpdateRequest) -> Option<String> {
    let external_id = validate_external_id(&request.external_id).ok()?;
    let price = validate_price(&request.price).ok()?;
    Some(processed_key(&external_id, price))
}

/// Prices travel as XML-RPC doubles
fn price_value(price: Decimal) -> Result<Value, UpdateError> {
    price
        .to_f64()
        .and_then(serde_json::Number::from_f64)
        .map(Value::Number)
        .ok_or(UpdateError::Unrepresentable(price))
}

// ============================================================================
// CSV LOADING
// ============================================================================

/// Pick the delimiter that occurs most often in the header line
pub fn sniff_delimiter(sample: &str) -> u8 {
    let header = sample.lines().next().unwrap_or("");

    [b',', b';', b'\t', b'|']
        .iter()
        .map(|&d| (d, header.bytes().filter(|&b| b == d).count()))
        .filter(|(_, count)| *count > 0)
        .max_by_key(|(_, count)| *count)
        .map(|(d, _)| d)
        .unwrap_or(b',')
}

/// Parse a batch CSV with at least `barcode` and `price` columns
///
/// Short rows yield empty fields and fail validation later, in their own row.
pub fn load_update_requests<R: Read>(mut reader: R) -> Result<Vec<PriceUpdateRequest>> {
    let mut content = String::new();
    reader
        .read_to_string(&mut content)
        .context("Failed to read CSV input")?;

    let content = content.trim_start_matches('\u{feff}');
    let delimiter = sniff_delimiter(content);

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .flexible(true)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = rdr
        .headers()
        .context("Failed to read CSV header")?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();

    let column = |name: &str| headers.iter().position(|h| h == name);
    let (Some(barcode_col), Some(price_col)) = (column(REQUIRED_COLUMNS[0]), column(REQUIRED_COLUMNS[1])) else {
        bail!(
            "CSV must contain columns: {}. Found: {}",
            REQUIRED_COLUMNS.join(", "),
            headers.join(", ")
        );
    };

    let mut requests = Vec::new();
    for (line_num, result) in rdr.records().enumerate() {
        let record = result
            .with_context(|| format!("Failed to parse CSV line {}", line_num + ROW_OFFSET))?;

        requests.push(PriceUpdateRequest::new(
            record.get(barcode_col).unwrap_or(""),
            record.get(price_col).unwrap_or(""),
        ));
    }

    Ok(requests)
}

// ============================================================================
// TESTS
// ============================================================================

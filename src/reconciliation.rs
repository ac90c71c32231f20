// ⚖️ Reconciliation Engine - Remote catalog vs external price list
//
// Loads the whole remote catalog once, joins it in memory against a price
// list keyed by the same external identifier, and classifies every pairing:
//
//   difference = proposed_price - remote_price
//   |difference| < tolerance  -> match
//   difference > 0            -> increase
//   difference < 0            -> decrease
//   no remote entity          -> not_found_in_remote
//
// The catalog snapshot is never mutated after load. Writes issued later from
// this report can race with other editors of the catalog; that staleness is
// accepted here.

use crate::catalog::{CatalogEntity, CATALOG_FIELDS, PRODUCT_ENTITY};
use crate::logging::{SharedLog, TracingLog};
use crate::session::{Domain, SessionClient};
use crate::update::{sniff_delimiter, PriceUpdateRequest};
use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Read;
use thiserror::Error;

// ============================================================================
// CLASSIFICATION
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Classification {
    Match,
    Increase,
    Decrease,
    NotFoundInRemote,
    /// Reserved: present remotely, absent from the price list. `compare`
    /// walks price-list rows only and never produces it.
    New,
}

impl Classification {
    /// Sort key: most actionable first
    pub fn priority(&self) -> u8 {
        match self {
            Classification::NotFoundInRemote => 1,
            Classification::Decrease => 2,
            Classification::Increase => 3,
            Classification::Match => 4,
            Classification::New => 5,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Classification::Match => "match",
            Classification::Increase => "increase",
            Classification::Decrease => "decrease",
            Classification::NotFoundInRemote => "not_found_in_remote",
            Classification::New => "new",
        }
    }

    /// Price changes worth pushing to the remote catalog
    pub fn is_actionable(&self) -> bool {
        matches!(self, Classification::Increase | Classification::Decrease)
    }
}

// ============================================================================
// ROWS & COMPARISONS
// ============================================================================

/// A price-list row as read from the file, before filtering
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPriceRow {
    pub item_type: String,
    pub external_id: String,
    pub description: String,
    pub price: String,
}

/// A retained price-list row: stocked, identified, priced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalPriceRow {
    pub external_id: String,
    pub description: String,
    pub proposed_price: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceComparison {
    pub external_id: String,
    pub description: String,
    pub remote_price: Option<Decimal>,
    pub proposed_price: Decimal,
    pub difference: Decimal,
    /// Unrounded; rounding is left to whoever displays it
    pub percent_change: Decimal,
    pub classification: Classification,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonSummary {
    pub total: usize,
    pub matched: usize,
    pub increases: usize,
    pub decreases: usize,
    pub not_found: usize,
    pub new: usize,
}

impl ComparisonSummary {
    pub fn count(&self, classification: Classification) -> usize {
        match classification {
            Classification::Match => self.matched,
            Classification::Increase => self.increases,
            Classification::Decrease => self.decreases,
            Classification::NotFoundInRemote => self.not_found,
            Classification::New => self.new,
        }
    }

    pub fn summary(&self) -> String {
        format!(
            "{} compared: {} match, {} increase, {} decrease, {} not found in remote, {} new",
            self.total, self.matched, self.increases, self.decreases, self.not_found, self.new
        )
    }
}

// ============================================================================
// RECONCILIATION REPORT
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReconciliationReport {
    pub report_id: String,
    pub comparisons: Vec<PriceComparison>,
    pub summary: ComparisonSummary,
    pub catalog_size: usize,
    pub reconciled_at: DateTime<Utc>,
}

impl ReconciliationReport {
    pub fn has_changes(&self) -> bool {
        self.summary.increases + self.summary.decreases > 0
    }

    pub fn summary(&self) -> String {
        format!(
            "Reconciliation {} against {} catalog products: {}",
            self.report_id,
            self.catalog_size,
            self.summary.summary()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ReconciliationError {
    #[error("failed to load remote catalog: {0}")]
    CatalogUnavailable(String),
}

// ============================================================================
// RECONCILIATION ENGINE
// ============================================================================

pub struct ReconciliationEngine {
    /// Differences strictly below this are a match (default: $0.01)
    pub tolerance: Decimal,

    /// Lower-case type tags that mark a row as stocked inventory
    pub inventory_tags: Vec<String>,

    log: SharedLog,
}

impl ReconciliationEngine {
    pub fn new() -> Self {
        ReconciliationEngine {
            tolerance: Decimal::new(1, 2),
            inventory_tags: vec![
                "inventory".to_string(),
                "inventory part".to_string(),
                "stock".to_string(),
                "stocked".to_string(),
            ],
            log: TracingLog::shared("reconciliation"),
        }
    }

    pub fn with_tolerance(tolerance: Decimal) -> Self {
        ReconciliationEngine {
            tolerance,
            ..Self::new()
        }
    }

    pub fn with_log(mut self, log: SharedLog) -> Self {
        self.log = log;
        self
    }

    /// One bulk read of the catalog, keyed by external identifier
    ///
    /// Products without an identifier are dropped. When several products share
    /// one identifier the last one read wins; `update_by_identifier` still
    /// writes to all of them.
    pub fn load_remote_catalog(
        &self,
        session: &SessionClient,
    ) -> Result<HashMap<String, CatalogEntity>, ReconciliationError> {
        self.log.info("Loading remote catalog");

        let records = session
            .search_read(PRODUCT_ENTITY, &Domain::all(), &CATALOG_FIELDS)
            .map_err(|e| {
                let message = e.to_string();
                self.log.error(&format!("Catalog load failed: {}", message));
                ReconciliationError::CatalogUnavailable(message)
            })?;

        let mut catalog = HashMap::new();
        let mut duplicates = 0;
        let mut unusable = 0;

        for record in &records {
            let Some(entity) = CatalogEntity::from_record(record) else {
                unusable += 1;
                continue;
            };
            let Some(external_id) = entity.external_id.clone().filter(|id| !id.is_empty()) else {
                continue;
            };
            if catalog.insert(external_id, entity).is_some() {
                duplicates += 1;
            }
        }

        if unusable > 0 {
            self.log.warn(&format!(
                "{} catalog record(s) skipped: missing id or numeric list price",
                unusable
            ));
        }
        if duplicates > 0 {
            self.log.warn(&format!(
                "{} product(s) share an identifier with another product; last one read kept",
                duplicates
            ));
        }
        self.log.info(&format!(
            "Loaded {} of {} catalog products with identifiers",
            catalog.len(),
            records.len()
        ));

        Ok(catalog)
    }

    /// Keep stocked rows with an identifier and a non-negative price
    pub fn parse_external_rows(&self, raw_rows: &[RawPriceRow]) -> Vec<ExternalPriceRow> {
        raw_rows
            .iter()
            .filter(|row| self.is_inventory(&row.item_type))
            .filter_map(|row| {
                let external_id = row.external_id.trim();
                if external_id.is_empty() {
                    return None;
                }
                let proposed_price = parse_list_price(&row.price)?;
                Some(ExternalPriceRow {
                    external_id: external_id.to_string(),
                    description: row.description.trim().to_string(),
                    proposed_price,
                })
            })
            .collect()
    }

    fn is_inventory(&self, item_type: &str) -> bool {
        let tag = item_type.trim().to_lowercase();
        self.inventory_tags.iter().any(|t| *t == tag)
    }

    /// Classify each row against the catalog, most actionable first
    pub fn compare(
        &self,
        rows: &[ExternalPriceRow],
        catalog: &HashMap<String, CatalogEntity>,
    ) -> Vec<PriceComparison> {
        let mut comparisons: Vec<PriceComparison> = rows
            .iter()
            .filter_map(|row| {
                let comparison = self.classify(row, catalog);
                if comparison.is_none() {
                    self.log.warn(&format!(
                        "Skipping {}: price difference out of range",
                        row.external_id
                    ));
                }
                comparison
            })
            .collect();

        // sort_by is stable: equal keys keep input order
        comparisons.sort_by(|a, b| {
            a.classification
                .priority()
                .cmp(&b.classification.priority())
                .then_with(|| b.difference.abs().cmp(&a.difference.abs()))
        });

        comparisons
    }

    /// None when the difference overflows `Decimal`
    fn classify(&self, row: &ExternalPriceRow, catalog: &HashMap<String, CatalogEntity>) -> Option<PriceComparison> {
        let Some(entity) = catalog.get(&row.external_id) else {
            return Some(PriceComparison {
                external_id: row.external_id.clone(),
                description: row.description.clone(),
                remote_price: None,
                proposed_price: row.proposed_price,
                difference: row.proposed_price,
                percent_change: Decimal::ZERO,
                classification: Classification::NotFoundInRemote,
            });
        };

        let remote_price = entity.price;
        let difference = row.proposed_price.checked_sub(remote_price)?;

        let classification = if difference.abs() < self.tolerance {
            Classification::Match
        } else if difference > Decimal::ZERO {
            Classification::Increase
        } else {
            Classification::Decrease
        };

        Some(PriceComparison {
            external_id: row.external_id.clone(),
            description: row.description.clone(),
            remote_price: Some(remote_price),
            proposed_price: row.proposed_price,
            difference,
            percent_change: percent_change(difference, remote_price),
            classification,
        })
    }

    /// Tally by classification; always recomputed, never cached
    pub fn summarize(&self, comparisons: &[PriceComparison]) -> ComparisonSummary {
        comparisons
            .iter()
            .fold(ComparisonSummary::default(), |mut summary, c| {
                summary.total += 1;
                match c.classification {
                    Classification::Match => summary.matched += 1,
                    Classification::Increase => summary.increases += 1,
                    Classification::Decrease => summary.decreases += 1,
                    Classification::NotFoundInRemote => summary.not_found += 1,
                    Classification::New => summary.new += 1,
                }
                summary
            })
    }

    /// Load, parse, compare and summarize in one pass
    pub fn reconcile(
        &self,
        session: &SessionClient,
        raw_rows: &[RawPriceRow],
    ) -> Result<ReconciliationReport, ReconciliationError> {
        let catalog = self.load_remote_catalog(session)?;
        let rows = self.parse_external_rows(raw_rows);
        self.log.info(&format!(
            "Retained {} of {} price-list rows",
            rows.len(),
            raw_rows.len()
        ));

        let comparisons = self.compare(&rows, &catalog);
        let summary = self.summarize(&comparisons);

        let report = ReconciliationReport {
            report_id: uuid::Uuid::new_v4().to_string(),
            comparisons,
            summary,
            catalog_size: catalog.len(),
            reconciled_at: Utc::now(),
        };
        self.log.info(&report.summary());

        Ok(report)
    }
}

impl Default for ReconciliationEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Requests for every increase/decrease, in report order
pub fn approved_updates(comparisons: &[PriceComparison]) -> Vec<PriceUpdateRequest> {
    comparisons
        .iter()
        .filter(|c| c.classification.is_actionable())
        .map(|c| PriceUpdateRequest::new(c.external_id.clone(), c.proposed_price))
        .collect()
}

/// difference / remote * 100, or 0 when there is no positive base
fn percent_change(difference: Decimal, remote_price: Decimal) -> Decimal {
    if remote_price <= Decimal::ZERO {
        return Decimal::ZERO;
    }
    difference
        .checked_div(remote_price)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .unwrap_or(Decimal::ZERO)
}

/// "$1,234.50" -> 1234.50; negative or unparseable -> None
fn parse_list_price(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | ',' | ' '))
        .collect();
    let price: Decimal = cleaned.parse().ok()?;
    (!price.is_sign_negative() || price.is_zero()).then_some(price)
}

// ============================================================================
// PRICE LIST CSV
// ============================================================================

const TYPE_HEADERS: [&str; 4] = ["type", "item type", "category", "item_type"];
const ID_HEADERS: [&str; 5] = ["barcode", "upc", "sku", "item", "external_id"];
const DESCRIPTION_HEADERS: [&str; 4] = ["description", "name", "item description", "sales description"];
const PRICE_HEADERS: [&str; 5] = ["price", "sales price", "unit price", "list price", "rate"];

/// Read a price-list export; header names are matched case-insensitively and
/// the delimiter is sniffed like batch files
pub fn read_price_rows<R: Read>(mut reader: R) -> Result<Vec<RawPriceRow>> {
    let mut content = String::new();
    reader
        .read_to_string(&mut content)
        .context("Failed to read price list")?;

    let content = content.trim_start_matches('\u{feff}');

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(sniff_delimiter(content))
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = rdr
        .headers()
        .context("Failed to read price list header")?
        .iter()
        .map(|h| h.trim().to_lowercase())
        .collect();

    let find = |variants: &[&str]| {
        variants
            .iter()
            .find_map(|v| headers.iter().position(|h| h == v))
    };

    let (Some(type_col), Some(id_col), Some(price_col)) =
        (find(&TYPE_HEADERS[..]), find(&ID_HEADERS[..]), find(&PRICE_HEADERS[..]))
    else {
        bail!(
            "Price list must contain type, identifier and price columns. Found: {}",
            headers.join(", ")
        );
    };
    let description_col = find(&DESCRIPTION_HEADERS[..]);

    let mut rows = Vec::new();
    for (line_num, result) in rdr.records().enumerate() {
        let record = result
            .with_context(|| format!("Failed to parse price list line {}", line_num + 2))?;
        let field = |col: usize| record.get(col).unwrap_or("").to_string();

        rows.push(RawPriceRow {
            item_type: field(type_col),
            external_id: field(id_col),
            description: description_col.map(field).unwrap_or_default(),
            price: field(price_col),
        });
    }

    Ok(rows)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::{Level, MemoryLog};
    use crate::session::tests::connected_client;
    use crate::transport::fake::FakeTransport;
    use crate::transport::TransportError;
    use serde_json::json;
    use std::sync::Arc;

    fn entity(external_id: &str, price: Decimal) -> CatalogEntity {
        CatalogEntity {
            id: 1,
            name: format!("Product {}", external_id),
            external_id: Some(external_id.to_string()),
            price,
            short_code: None,
            category: None,
        }
    }

    fn row(external_id: &str, price: Decimal) -> ExternalPriceRow {
        ExternalPriceRow {
            external_id: external_id.to_string(),
            description: format!("Row {}", external_id),
            proposed_price: price,
        }
    }

    fn raw(item_type: &str, external_id: &str, price: &str) -> RawPriceRow {
        RawPriceRow {
            item_type: item_type.to_string(),
            external_id: external_id.to_string(),
            description: "desc".to_string(),
            price: price.to_string(),
        }
    }

    fn catalog(entries: &[(&str, Decimal)]) -> HashMap<String, CatalogEntity> {
        entries
            .iter()
            .map(|(id, price)| (id.to_string(), entity(id, *price)))
            .collect()
    }

    #[test]
    fn test_compare_match() {
        let engine = ReconciliationEngine::new();
        let result = engine.compare(
            &[row("111", Decimal::new(1000, 2))],
            &catalog(&[("111", Decimal::new(1000, 2))]),
        );

        assert_eq!(result[0].classification, Classification::Match);
        assert_eq!(result[0].difference, Decimal::ZERO);
        assert_eq!(result[0].percent_change, Decimal::ZERO);
        assert_eq!(result[0].remote_price, Some(Decimal::new(10, 0)));
    }

    #[test]
    fn test_compare_within_tolerance_is_match() {
        let engine = ReconciliationEngine::new();
        let result = engine.compare(
            &[row("111", Decimal::new(10005, 3))],
            &catalog(&[("111", Decimal::new(10, 0))]),
        );
        assert_eq!(result[0].classification, Classification::Match);

        let result = engine.compare(
            &[row("111", Decimal::new(1001, 2))],
            &catalog(&[("111", Decimal::new(10, 0))]),
        );
        assert_eq!(result[0].classification, Classification::Increase);
    }

    #[test]
    fn test_compare_not_found() {
        let engine = ReconciliationEngine::new();
        let result = engine.compare(&[row("222", Decimal::new(1500, 2))], &HashMap::new());

        assert_eq!(result[0].classification, Classification::NotFoundInRemote);
        assert_eq!(result[0].remote_price, None);
        assert_eq!(result[0].difference, Decimal::new(15, 0));
        assert_eq!(result[0].percent_change, Decimal::ZERO);
    }

    #[test]
    fn test_compare_increase_and_decrease() {
        let engine = ReconciliationEngine::new();
        let result = engine.compare(
            &[row("up", Decimal::new(25, 0)), row("down", Decimal::new(15, 0))],
            &catalog(&[("up", Decimal::new(20, 0)), ("down", Decimal::new(20, 0))]),
        );

        let down = &result[0];
        assert_eq!(down.external_id, "down");
        assert_eq!(down.classification, Classification::Decrease);
        assert_eq!(down.difference, Decimal::new(-5, 0));
        assert_eq!(down.percent_change, Decimal::new(-25, 0));

        let up = &result[1];
        assert_eq!(up.classification, Classification::Increase);
        assert_eq!(up.difference, Decimal::new(5, 0));
        assert_eq!(up.percent_change, Decimal::new(25, 0));
    }

    #[test]
    fn test_zero_remote_price_percent_is_zero() {
        let engine = ReconciliationEngine::new();
        let result = engine.compare(
            &[row("free", Decimal::new(3, 0))],
            &catalog(&[("free", Decimal::ZERO)]),
        );
        assert_eq!(result[0].classification, Classification::Increase);
        assert_eq!(result[0].percent_change, Decimal::ZERO);
    }

    #[test]
    fn test_ordering_priority_then_magnitude_then_input() {
        let engine = ReconciliationEngine::new();
        let rows = vec![
            row("m1", Decimal::new(10, 0)),
            row("inc_small", Decimal::new(11, 0)),
            row("nf_a", Decimal::new(5, 0)),
            row("inc_big", Decimal::new(30, 0)),
            row("dec", Decimal::new(1, 0)),
            row("nf_b", Decimal::new(5, 0)),
            row("m2", Decimal::new(10, 0)),
        ];
        let cat = catalog(&[
            ("m1", Decimal::new(10, 0)),
            ("m2", Decimal::new(10, 0)),
            ("inc_small", Decimal::new(10, 0)),
            ("inc_big", Decimal::new(10, 0)),
            ("dec", Decimal::new(10, 0)),
        ]);

        let ids: Vec<String> = engine
            .compare(&rows, &cat)
            .into_iter()
            .map(|c| c.external_id)
            .collect();

        assert_eq!(ids, vec!["nf_a", "nf_b", "dec", "inc_big", "inc_small", "m1", "m2"]);
    }

    #[test]
    fn test_summarize_matches_filtered_counts() {
        let engine = ReconciliationEngine::new();
        let comparisons = engine.compare(
            &[
                row("a", Decimal::new(10, 0)),
                row("b", Decimal::new(12, 0)),
                row("c", Decimal::new(8, 0)),
                row("d", Decimal::new(1, 0)),
                row("e", Decimal::new(2, 0)),
            ],
            &catalog(&[("a", Decimal::new(10, 0)), ("b", Decimal::new(10, 0)), ("c", Decimal::new(10, 0))]),
        );

        let summary = engine.summarize(&comparisons);
        for classification in [
            Classification::Match,
            Classification::Increase,
            Classification::Decrease,
            Classification::NotFoundInRemote,
            Classification::New,
        ] {
            let expected = comparisons
                .iter()
                .filter(|c| c.classification == classification)
                .count();
            assert_eq!(summary.count(classification), expected);
        }
        assert_eq!(summary.total, comparisons.len());
        assert_eq!(summary.not_found, 2);

        println!("✅ {}", summary.summary());
    }

    #[test]
    fn test_parse_external_rows_filters() {
        let engine = ReconciliationEngine::new();
        let rows = engine.parse_external_rows(&[
            raw("Inventory Part", "111", "$1,299.50"),
            raw("Service", "222", "10"),
            raw("inventory", "  ", "10"),
            raw("Inventory", "333", "n/a"),
            raw("Stock", "444", "-2"),
            raw(" STOCKED ", " 555 ", "0"),
        ]);

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].external_id, "111");
        assert_eq!(rows[0].proposed_price, Decimal::new(129950, 2));
        assert_eq!(rows[1].external_id, "555");
        assert_eq!(rows[1].proposed_price, Decimal::ZERO);
    }

    #[test]
    fn test_read_price_rows_header_variants() {
        let csv = "Item Type,UPC,Item Description,Sales Price\n\
                   Inventory Part,111,Cold brew,4.50\n\
                   Service,222,Delivery,5\n";
        let rows = read_price_rows(csv.as_bytes()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(
            rows[0],
            RawPriceRow {
                item_type: "Inventory Part".to_string(),
                external_id: "111".to_string(),
                description: "Cold brew".to_string(),
                price: "4.50".to_string(),
            }
        );
    }

    #[test]
    fn test_compare_skips_overflowing_difference() {
        let log = Arc::new(MemoryLog::new());
        let engine = ReconciliationEngine::new().with_log(log.clone());
        let huge = Decimal::from_i128_with_scale(50_000_000_000_000_000_000_000_000_000, 0);

        let result = engine.compare(
            &[row("huge", huge), row("ok", Decimal::new(12, 0))],
            &catalog(&[("huge", -huge), ("ok", Decimal::new(10, 0))]),
        );

        assert_eq!(result.len(), 1);
        assert_eq!(result[0].external_id, "ok");
        assert_eq!(result[0].classification, Classification::Increase);
        assert!(log.contains(Level::Warn, "Skipping huge"));
    }

    #[test]
    fn test_percent_change_keeps_precision() {
        let engine = ReconciliationEngine::new();
        let result = engine.compare(
            &[row("third", Decimal::new(4, 0))],
            &catalog(&[("third", Decimal::new(3, 0))]),
        );

        let pct = result[0].percent_change;
        assert!(pct > Decimal::new(3333, 2));
        assert!(pct < Decimal::new(3334, 2));
        assert_eq!(pct.round_dp(2), Decimal::new(3333, 2));
    }

    #[test]
    fn test_read_price_rows_sniffs_semicolon() {
        let csv = "\u{feff}Type;Barcode;Name;Price\nInventory;111;Cold brew;4,50\nStock;222;Tea;3\n";
        let rows = read_price_rows(csv.as_bytes()).unwrap();

        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].item_type, "Inventory");
        assert_eq!(rows[0].external_id, "111");
        assert_eq!(rows[0].description, "Cold brew");
        assert_eq!(rows[1].price, "3");
    }

    #[test]
    fn test_load_remote_catalog_skips_records_without_price() {
        let object = FakeTransport::new();
        object.respond(
            "product.template.search_read",
            Ok(json!([
                {"id": 1, "name": "Priced", "barcode": "111", "list_price": 10.0, "default_code": false},
                {"id": 2, "name": "Unpriced", "barcode": "222", "list_price": false, "default_code": false},
                {"id": 3, "name": "No field", "barcode": "333", "default_code": false},
            ])),
        );
        let log = Arc::new(MemoryLog::new());
        let client = connected_client(&object, log.clone());
        let engine = ReconciliationEngine::new().with_log(log.clone());

        let catalog = engine.load_remote_catalog(&client).unwrap();
        assert_eq!(catalog.len(), 1);
        assert!(catalog.contains_key("111"));
        assert!(log.contains(Level::Warn, "2 catalog record(s) skipped"));

        // Unpriced products surface as not found instead of a bogus increase
        let comparisons = engine.compare(&[row("222", Decimal::new(5, 0))], &catalog);
        assert_eq!(comparisons[0].classification, Classification::NotFoundInRemote);
    }

    #[test]
    fn test_read_price_rows_missing_columns() {
        let err = read_price_rows("name,cost\nx,1\n".as_bytes()).unwrap_err();
        assert!(err.to_string().contains("Found: name, cost"));
    }

    #[test]
    fn test_load_remote_catalog_last_wins() {
        let object = FakeTransport::new();
        object.respond(
            "product.template.search_read",
            Ok(json!([
                {"id": 1, "name": "First", "barcode": "111", "list_price": 10.0, "default_code": false},
                {"id": 2, "name": "No barcode", "barcode": false, "list_price": 3.0, "default_code": false},
                {"id": 3, "name": "Second", "barcode": "111", "list_price": 12.0, "default_code": "S"},
                {"id": 4, "name": "Other", "barcode": "222", "list_price": 7.5, "default_code": false},
            ])),
        );
        let log = Arc::new(MemoryLog::new());
        let client = connected_client(&object, log.clone());
        let engine = ReconciliationEngine::new().with_log(log.clone());

        let catalog = engine.load_remote_catalog(&client).unwrap();

        assert_eq!(catalog.len(), 2);
        assert_eq!(catalog["111"].id, 3);
        assert_eq!(catalog["222"].price, Decimal::new(75, 1));
        assert!(log.contains(Level::Warn, "last one read kept"));

        assert_eq!(
            object.calls()[0].args(),
            Some(&json!([[], ["id", "name", "barcode", "list_price", "default_code"]]))
        );
    }

    #[test]
    fn test_load_remote_catalog_failure_is_structured() {
        let object = FakeTransport::new();
        object.respond(
            "product.template.search_read",
            Err(TransportError::Connection("timed out".to_string())),
        );
        let log = Arc::new(MemoryLog::new());
        let client = connected_client(&object, log.clone());

        let err = ReconciliationEngine::new()
            .with_log(log.clone())
            .load_remote_catalog(&client)
            .unwrap_err();

        assert!(matches!(err, ReconciliationError::CatalogUnavailable(ref m) if m.contains("timed out")));
        assert!(log.contains(Level::Error, "Catalog load failed"));
    }

    #[test]
    fn test_reconcile_end_to_end_and_approved_updates() {
        let object = FakeTransport::new();
        object.respond(
            "product.template.search_read",
            Ok(json!([
                {"id": 1, "name": "A", "barcode": "111", "list_price": 10.0, "default_code": false},
                {"id": 2, "name": "B", "barcode": "333", "list_price": 20.0, "default_code": false},
            ])),
        );
        let log = Arc::new(MemoryLog::new());
        let client = connected_client(&object, log.clone());
        let engine = ReconciliationEngine::new().with_log(log);

        let report = engine
            .reconcile(
                &client,
                &[
                    raw("Inventory", "111", "10.00"),
                    raw("Inventory", "222", "15.00"),
                    raw("Inventory", "333", "25.00"),
                    raw("Service", "444", "1"),
                ],
            )
            .unwrap();

        assert_eq!(report.catalog_size, 2);
        assert_eq!(report.summary.total, 3);
        assert!(report.has_changes());
        assert_eq!(report.comparisons[0].classification, Classification::NotFoundInRemote);
        assert_eq!(report.comparisons[2].classification, Classification::Match);

        let updates = approved_updates(&report.comparisons);
        assert_eq!(updates, vec![PriceUpdateRequest::new("333", Decimal::new(2500, 2))]);

        println!("✅ {}", report.summary());
    }

    #[test]
    fn test_classification_serializes_snake_case() {
        assert_eq!(
            serde_json::to_string(&Classification::NotFoundInRemote).unwrap(),
            "\"not_found_in_remote\""
        );
        assert_eq!(Classification::NotFoundInRemote.as_str(), "not_found_in_remote");
        assert!(Classification::NotFoundInRemote.priority() < Classification::Match.priority());
    }
}

// Price Sync - Core Library
// Keeps catalog prices in the remote product backend in line with external
// price lists. Exposes all modules for the CLI and tests.

pub mod config;         // Credentials from env / lookup
pub mod logging;        // Injected EventLog + tracing setup
pub mod xmlrpc;         // Wire codec
pub mod transport;      // One endpoint, one attempt per call
pub mod session;        // Authenticated session + typed remote methods
pub mod validation;     // Identifier / price checks
pub mod catalog;        // Remote product projection
pub mod record_store;   // "Already processed" ledger
pub mod update;         // Update Engine
pub mod reconciliation; // Reconciliation Engine

// Re-export commonly used types
pub use config::{ConfigError, Credentials};
pub use logging::{init_tracing, EventLog, MemoryLog, SharedLog, TracingLog};
pub use transport::{HttpTransport, Transport, TransportError};
pub use session::{Domain, Record, SessionClient, SessionError};
pub use validation::{validate_external_id, validate_price, PriceInput, ValidationError};
pub use catalog::CatalogEntity;
pub use record_store::{MemoryRecordStore, ProcessedRecord, RecordStore, RecordStoreError};
pub use update::{
    ApplyOutcome, BatchOutcome, LookupError, PriceUpdateRequest, UpdateEngine, UpdateOutcome,
    load_update_requests,
};
pub use reconciliation::{
    ReconciliationEngine, ReconciliationReport, ReconciliationError,
    Classification, ComparisonSummary, ExternalPriceRow, PriceComparison, RawPriceRow,
    approved_updates, read_price_rows,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

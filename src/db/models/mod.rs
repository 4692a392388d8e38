pub mod scan_record;

pub use scan_record::{FreshnessFilter, Freshness, HistoryFilter, PinOutcome, ScanRecord};

//! Pipeline entry points for harvester operations.
//!
//! - `IngestEngine`: staging-to-canonical merge of fetched records
//! - `Monitor`: search, update, and migrate operations for a query

pub mod ingest;
pub mod monitor;

pub use ingest::IngestEngine;
pub use monitor::Monitor;

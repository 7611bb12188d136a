//! formvault — cost-aware extraction core for scanned insurance documents.
//!
//! Three ideas carry the crate: a strategy router that decides how much to
//! spend extracting each document, a form catalog that extracts boilerplate
//! forms once and reuses them forever, and an orchestrator that drives
//! phased extraction against that catalog. The actual OCR/vision calls are
//! collaborator traits injected by the surrounding ingestion pipeline.
//!
//! ```no_run
//! # use formvault::pipeline::router::route;
//! let plan = route("policy", 87, None, false);
//! assert_eq!(plan.strategy.as_str(), "tiered_policy");
//! ```

pub mod config;
pub mod db;
pub mod models;
pub mod pipeline;

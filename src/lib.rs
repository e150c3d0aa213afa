//! Incremental, idempotent CSV ledger for CKAN datastore resources.
//!
//! Every run re-reads the whole package, fingerprints each row from its `_id`
//! and canonical occupancy date, and appends only rows the ledger has never
//! held.

pub mod app;
pub mod ckan;
pub mod config;
pub mod domain;
pub mod error;
pub mod fingerprint;
pub mod ledger;
pub mod normalize;
pub mod output;

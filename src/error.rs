use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum LedgerError {
    #[error("invalid package id: {0}")]
    InvalidPackageId(String),

    #[error("invalid resource id: {0}")]
    InvalidResourceId(String),

    #[error("invalid base url: {0}")]
    #[diagnostic(help("expected an absolute http(s) url such as https://ckan0.cf.opendata.inter.prod-toronto.ca"))]
    InvalidBaseUrl(String),

    #[error("invalid config value: {0}")]
    InvalidConfig(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("CKAN request failed: {0}")]
    CkanHttp(String),

    #[error("CKAN returned status {status}: {message}")]
    CkanStatus { status: u16, message: String },

    #[error("CKAN action failed: {0}")]
    CkanApi(String),

    #[error("required column missing from header: {0}")]
    #[diagnostic(help("the dataset schema changed or the ledger was written for another dataset"))]
    MissingColumn(String),

    #[error("row {line} of resource {resource} has {found} fields, need at least {needed}")]
    ShortRow {
        resource: String,
        line: u64,
        found: usize,
        needed: usize,
    },

    #[error("csv error: {0}")]
    Csv(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl From<csv::Error> for LedgerError {
    fn from(err: csv::Error) -> Self {
        if err.is_io_error() {
            LedgerError::Filesystem(err.to_string())
        } else {
            LedgerError::Csv(err.to_string())
        }
    }
}

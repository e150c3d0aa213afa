use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};

use camino::{Utf8Path, Utf8PathBuf};
use tracing::{debug, warn};

use crate::domain::Fingerprint;
use crate::error::LedgerError;
use crate::normalize::Record;

/// What an existing ledger file already holds.
#[derive(Debug, Clone, Default)]
pub struct LedgerScan {
    pub fingerprint_column: Option<String>,
    pub header: Option<Vec<String>>,
    pub fingerprints: HashSet<Fingerprint>,
    pub rows: usize,
}

/// Append-only CSV file keyed by fingerprint in its first column.
pub struct Ledger {
    path: Utf8PathBuf,
    fingerprint_column: String,
    header: Option<Vec<String>>,
    seen: HashSet<Fingerprint>,
    writer: Option<csv::Writer<File>>,
    dry_run: bool,
}

impl Ledger {
    /// Reads every fingerprint already on disk before anything is appended.
    pub fn open(
        path: &Utf8Path,
        fingerprint_column: &str,
        dry_run: bool,
    ) -> Result<Self, LedgerError> {
        let scan = Self::scan(path)?;
        let fingerprint_column = match scan.fingerprint_column {
            Some(existing) => {
                if existing != fingerprint_column {
                    warn!(
                        ledger = %path,
                        existing = %existing,
                        configured = fingerprint_column,
                        "keeping the fingerprint column name already in the ledger"
                    );
                }
                existing
            }
            None => fingerprint_column.to_string(),
        };
        debug!(ledger = %path, rows = scan.rows, "ledger scanned");

        Ok(Self {
            path: path.to_path_buf(),
            fingerprint_column,
            header: scan.header,
            seen: scan.fingerprints,
            writer: None,
            dry_run,
        })
    }

    pub fn scan(path: &Utf8Path) -> Result<LedgerScan, LedgerError> {
        if !path.as_std_path().exists() {
            return Ok(LedgerScan::default());
        }
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_path(path.as_std_path())?;

        let mut scan = LedgerScan::default();
        let mut records = reader.records();
        let Some(first) = records.next() else {
            return Ok(scan);
        };
        let first = first?;
        let mut columns = first.iter().map(|value| value.to_string());
        scan.fingerprint_column = columns.next();
        scan.header = Some(columns.collect());

        for record in records {
            let record = record?;
            if let Some(value) = record.get(0).filter(|value| !value.is_empty()) {
                scan.fingerprints.insert(Fingerprint::from_ledger(value));
                scan.rows += 1;
            }
        }
        Ok(scan)
    }

    pub fn fingerprint_column(&self) -> &str {
        &self.fingerprint_column
    }

    /// Dataset columns, without the fingerprint column.
    pub fn header(&self) -> Option<&[String]> {
        self.header.as_deref()
    }

    pub fn contains(&self, fingerprint: &Fingerprint) -> bool {
        self.seen.contains(fingerprint)
    }

    pub fn known(&self) -> usize {
        self.seen.len()
    }

    pub fn establish_header(&mut self, columns: Vec<String>) -> Result<(), LedgerError> {
        if self.header.is_some() {
            return Ok(());
        }
        let mut row = Vec::with_capacity(columns.len() + 1);
        row.push(self.fingerprint_column.clone());
        row.extend(columns.iter().cloned());
        self.write_row(&row)?;
        self.header = Some(columns);
        Ok(())
    }

    /// Appends the record unless its fingerprint was seen before, on disk or
    /// earlier in this run. Returns whether a row was added.
    pub fn append(&mut self, record: &Record) -> Result<bool, LedgerError> {
        if self.seen.contains(&record.fingerprint) {
            return Ok(false);
        }
        let mut row = Vec::with_capacity(record.fields.len() + 1);
        row.push(record.fingerprint.as_str());
        row.extend(record.fields.iter().map(String::as_str));
        self.write_row(&row)?;
        self.seen.insert(record.fingerprint.clone());
        Ok(true)
    }

    pub fn flush(&mut self) -> Result<(), LedgerError> {
        if let Some(writer) = self.writer.as_mut() {
            writer
                .flush()
                .map_err(|err| LedgerError::Filesystem(err.to_string()))?;
        }
        Ok(())
    }

    fn write_row<I, T>(&mut self, row: I) -> Result<(), LedgerError>
    where
        I: IntoIterator<Item = T>,
        T: AsRef<[u8]>,
    {
        if self.dry_run {
            return Ok(());
        }
        if self.writer.is_none() {
            self.writer = Some(self.open_writer()?);
        }
        if let Some(writer) = self.writer.as_mut() {
            writer.write_record(row)?;
        }
        Ok(())
    }

    fn open_writer(&self) -> Result<csv::Writer<File>, LedgerError> {
        if let Some(parent) = self.path.parent().filter(|parent| !parent.as_str().is_empty()) {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| LedgerError::Filesystem(err.to_string()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.path.as_std_path())
            .map_err(|err| LedgerError::Filesystem(format!("open {}: {err}", self.path)))?;
        // Row width follows the dump it came from, not the ledger header.
        Ok(csv::WriterBuilder::new()
            .flexible(true)
            .terminator(csv::Terminator::CRLF)
            .from_writer(file))
    }
}

impl Drop for Ledger {
    fn drop(&mut self) {
        if let Err(err) = self.flush() {
            warn!(ledger = %self.path, error = %err, "failed to flush ledger");
        }
    }
}

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::ckan::CkanClient;
use crate::config::ResolvedConfig;
use crate::domain::{Resource, UnparsedDatePolicy};
use crate::error::LedgerError;
use crate::ledger::Ledger;
use crate::normalize::{DumpRows, Normalized, Normalizer};

#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    pub dry_run: bool,
}

/// Counters for one run. `total_records` excludes header rows.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub package_id: String,
    pub ledger_path: String,
    pub dry_run: bool,
    pub resources_processed: usize,
    pub resources_skipped: usize,
    pub total_records: u64,
    pub new_records: u64,
    pub duplicate_records: u64,
    pub rejected_records: u64,
    pub unparsed_dates: u64,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct App<C: CkanClient> {
    client: C,
    config: ResolvedConfig,
}

impl<C: CkanClient> App<C> {
    pub fn new(client: C, config: ResolvedConfig) -> Self {
        Self { client, config }
    }

    /// Fetches every active resource of the package and appends the records
    /// the ledger has not seen yet.
    pub fn run(
        &self,
        options: RunOptions,
        sink: &dyn ProgressSink,
    ) -> Result<RunSummary, LedgerError> {
        let started_at = Utc::now();
        let mut summary = RunSummary {
            package_id: self.config.package_id.to_string(),
            ledger_path: self.config.ledger_path.to_string(),
            dry_run: options.dry_run,
            resources_processed: 0,
            resources_skipped: 0,
            total_records: 0,
            new_records: 0,
            duplicate_records: 0,
            rejected_records: 0,
            unparsed_dates: 0,
            started_at,
            finished_at: started_at,
        };

        sink.event(ProgressEvent {
            message: format!("phase=Scan; reading ledger {}", self.config.ledger_path),
            elapsed: None,
        });
        let mut ledger = Ledger::open(
            &self.config.ledger_path,
            &self.config.fingerprint_column,
            options.dry_run,
        )?;
        let mut normalizer = ledger.header().map(Normalizer::new).transpose()?;
        sink.event(ProgressEvent {
            message: format!("phase=Scan; {} fingerprints known", ledger.known()),
            elapsed: None,
        });

        sink.event(ProgressEvent {
            message: format!("phase=Fetch; package {}", self.config.package_id),
            elapsed: None,
        });
        let resources = self.client.package_show(&self.config.package_id)?;
        debug!(count = resources.len(), "package resources listed");

        for resource in &resources {
            if !resource.datastore_active {
                summary.resources_skipped += 1;
                sink.event(ProgressEvent {
                    message: format!("phase=Fetch; skipping inactive resource {}", resource.label()),
                    elapsed: None,
                });
                continue;
            }
            self.process_resource(resource, &mut ledger, &mut normalizer, &mut summary, sink)?;
            summary.resources_processed += 1;
        }

        ledger.flush()?;
        summary.finished_at = Utc::now();
        info!(
            total = summary.total_records,
            new = summary.new_records,
            duplicates = summary.duplicate_records,
            rejected = summary.rejected_records,
            dry_run = summary.dry_run,
            "run complete"
        );
        Ok(summary)
    }

    fn process_resource(
        &self,
        resource: &Resource,
        ledger: &mut Ledger,
        normalizer: &mut Option<Normalizer>,
        summary: &mut RunSummary,
        sink: &dyn ProgressSink,
    ) -> Result<(), LedgerError> {
        let label = resource.label();
        sink.event(ProgressEvent {
            message: format!("phase=Fetch; dumping resource {label}"),
            elapsed: None,
        });
        let start = Instant::now();
        let text = self.client.datastore_dump(&resource.id)?;
        sink.event(ProgressEvent {
            message: format!("ckan.response bytes={}", text.len()),
            elapsed: Some(start.elapsed()),
        });

        let (mut added, mut seen) = (0u64, 0u64);
        let mut rows = DumpRows::new(&text, self.config.strip_embedded_commas);

        // The first row ever read becomes the ledger header; later header
        // rows fall through to the stray-header check below.
        if normalizer.is_none() {
            if let Some(first) = rows.next() {
                let columns = first?.fields;
                let established = Normalizer::new(&columns)?;
                ledger.establish_header(columns)?;
                *normalizer = Some(established);
            }
        }
        let Some(active) = normalizer.as_ref() else {
            return Ok(());
        };

        for row in rows {
            let record = match active.normalize(row?, label)? {
                Normalized::StrayHeader(line) => {
                    debug!(resource = label, line, "skipping header row");
                    continue;
                }
                Normalized::Record(record) => record,
            };
            summary.total_records += 1;
            seen += 1;

            if !record.date_parsed {
                summary.unparsed_dates += 1;
                if self.config.unparsed_dates == UnparsedDatePolicy::Reject {
                    summary.rejected_records += 1;
                    continue;
                }
            }

            if ledger.append(&record)? {
                summary.new_records += 1;
                added += 1;
            } else {
                summary.duplicate_records += 1;
            }
        }
        ledger.flush()?;

        sink.event(ProgressEvent {
            message: format!("phase=Store; {label}: {seen} records, {added} new"),
            elapsed: Some(start.elapsed()),
        });
        Ok(())
    }
}

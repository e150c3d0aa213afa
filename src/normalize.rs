use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use tracing::warn;

use crate::domain::{DATE_COLUMN, Fingerprint, ID_COLUMN};
use crate::error::LedgerError;
use crate::fingerprint::fingerprint;

static FOUR_DIGIT_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}-\d{1,2}-\d{1,2}$").unwrap());
static TWO_DIGIT_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(\d{2})-(\d{1,2})-(\d{1,2})$").unwrap());

/// Two-digit years below this land in the 2000s, the rest in the 1900s
/// (POSIX `strptime` rules, so `69` is 1969).
const TWO_DIGIT_YEAR_PIVOT: i32 = 69;

pub const CANONICAL_DATE_FORMAT: &str = "%Y-%m-%d";

/// Returns the `YYYY-MM-DD` form of an occupancy date, or `None` when the
/// value is neither a four-digit nor a two-digit year date.
pub fn canonicalize_date(value: &str) -> Option<String> {
    let parsed = if FOUR_DIGIT_YEAR.is_match(value) {
        NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()
    } else {
        two_digit_year_date(value)
    };
    parsed.map(|date| date.format(CANONICAL_DATE_FORMAT).to_string())
}

fn two_digit_year_date(value: &str) -> Option<NaiveDate> {
    let caps = TWO_DIGIT_YEAR.captures(value)?;
    let short: i32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let day: u32 = caps[3].parse().ok()?;
    let century = if short < TWO_DIGIT_YEAR_PIVOT { 2000 } else { 1900 };
    NaiveDate::from_ymd_opt(century + short, month, day)
}

/// Removes separators left inside a field after unquoting. Ledgers written
/// before quoting was supported never contain a comma in a field.
pub fn strip_embedded_commas(field: &str) -> String {
    field.replace(',', "")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawRow {
    pub line: u64,
    pub fields: Vec<String>,
}

/// Rows of a datastore dump, read with a real CSV reader.
pub struct DumpRows<'a> {
    records: csv::StringRecordsIntoIter<&'a [u8]>,
    strip_commas: bool,
}

impl<'a> DumpRows<'a> {
    pub fn new(text: &'a str, strip_commas: bool) -> Self {
        let text = text.strip_prefix('\u{feff}').unwrap_or(text);
        let reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());
        Self {
            records: reader.into_records(),
            strip_commas,
        }
    }
}

impl Iterator for DumpRows<'_> {
    type Item = Result<RawRow, LedgerError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let record = match self.records.next()? {
                Ok(record) => record,
                Err(err) => return Some(Err(err.into())),
            };
            if record.iter().all(|field| field.trim().is_empty()) {
                continue;
            }
            let line = record.position().map(|pos| pos.line()).unwrap_or(0);
            let fields = record
                .iter()
                .map(|field| {
                    if self.strip_commas {
                        strip_embedded_commas(field)
                    } else {
                        field.to_string()
                    }
                })
                .collect();
            return Some(Ok(RawRow { line, fields }));
        }
    }
}

/// Positions of the columns the pipeline reads, resolved once per run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnIndex {
    pub date: usize,
    pub id: usize,
}

impl ColumnIndex {
    pub fn from_header(header: &[String]) -> Result<Self, LedgerError> {
        let position = |name: &str| {
            header
                .iter()
                .position(|column| column == name)
                .ok_or_else(|| LedgerError::MissingColumn(name.to_string()))
        };
        Ok(Self {
            date: position(DATE_COLUMN)?,
            id: position(ID_COLUMN)?,
        })
    }

    pub fn min_fields(&self) -> usize {
        self.date.max(self.id) + 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    pub fingerprint: Fingerprint,
    pub fields: Vec<String>,
    pub date_parsed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Normalized {
    /// A repeated header row (`_id` field holds the literal `_id`), by line.
    StrayHeader(u64),
    Record(Record),
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    columns: ColumnIndex,
}

impl Normalizer {
    pub fn new(header: &[String]) -> Result<Self, LedgerError> {
        Ok(Self {
            columns: ColumnIndex::from_header(header)?,
        })
    }

    pub fn normalize(&self, row: RawRow, resource: &str) -> Result<Normalized, LedgerError> {
        let RawRow { line, mut fields } = row;
        if fields.get(self.columns.id).map(String::as_str) == Some(ID_COLUMN) {
            return Ok(Normalized::StrayHeader(line));
        }

        let needed = self.columns.min_fields();
        if fields.len() < needed {
            return Err(LedgerError::ShortRow {
                resource: resource.to_string(),
                line,
                found: fields.len(),
                needed,
            });
        }

        let date_parsed = match canonicalize_date(&fields[self.columns.date]) {
            Some(canonical) => {
                fields[self.columns.date] = canonical;
                true
            }
            None => {
                warn!(
                    resource,
                    line,
                    date = %fields[self.columns.date],
                    "unrecognized occupancy date left as-is"
                );
                false
            }
        };

        let fingerprint = fingerprint(&fields[self.columns.id], &fields[self.columns.date]);
        Ok(Normalized::Record(Record {
            fingerprint,
            fields,
            date_parsed,
        }))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn header(columns: &[&str]) -> Vec<String> {
        columns.iter().map(|column| column.to_string()).collect()
    }

    fn row(fields: &[&str]) -> RawRow {
        RawRow {
            line: 2,
            fields: fields.iter().map(|field| field.to_string()).collect(),
        }
    }

    #[test]
    fn canonical_date_passes_through() {
        assert_eq!(
            canonicalize_date("2024-03-05").as_deref(),
            Some("2024-03-05")
        );
    }

    #[test]
    fn unpadded_four_digit_date_is_padded() {
        assert_eq!(canonicalize_date("2024-3-5").as_deref(), Some("2024-03-05"));
    }

    #[test]
    fn two_digit_year_is_expanded() {
        assert_eq!(canonicalize_date("24-03-05").as_deref(), Some("2024-03-05"));
    }

    #[test]
    fn two_digit_years_pivot_at_sixty_nine() {
        assert_eq!(canonicalize_date("68-12-31").as_deref(), Some("2068-12-31"));
        assert_eq!(canonicalize_date("69-01-01").as_deref(), Some("1969-01-01"));
        assert_eq!(canonicalize_date("99-1-2").as_deref(), Some("1999-01-02"));
        assert_eq!(canonicalize_date("24-02-30"), None);
    }

    #[test]
    fn unknown_formats_are_not_dates() {
        assert_eq!(canonicalize_date("not-a-date"), None);
        assert_eq!(canonicalize_date("2024-02-30"), None);
        assert_eq!(canonicalize_date("2024-01-01T00:00:00"), None);
        assert_eq!(canonicalize_date(""), None);
    }

    #[test]
    fn quoted_commas_are_stripped() {
        let rows = DumpRows::new("id,\"1,234\",2024-01-01\n", true)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].fields, vec!["id", "1234", "2024-01-01"]);
    }

    #[test]
    fn quoted_commas_survive_when_stripping_is_off() {
        let rows = DumpRows::new("id,\"1,234\",2024-01-01\n", false)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(rows[0].fields, vec!["id", "1,234", "2024-01-01"]);
    }

    #[test]
    fn blank_lines_and_bom_are_ignored() {
        let text = "\u{feff}_id,OCCUPANCY_DATE\r\n\r\n1,2024-01-01\r\n   \r\n2,2024-01-02\r\n";
        let rows = DumpRows::new(text, true)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].fields, vec!["_id", "OCCUPANCY_DATE"]);
        assert_eq!(rows[2].fields, vec!["2", "2024-01-02"]);
    }

    #[test]
    fn column_index_requires_both_columns() {
        let err = ColumnIndex::from_header(&header(&["_id", "SHELTER"])).unwrap_err();
        assert_matches!(err, LedgerError::MissingColumn(name) if name == "OCCUPANCY_DATE");

        let err = ColumnIndex::from_header(&header(&["OCCUPANCY_DATE"])).unwrap_err();
        assert_matches!(err, LedgerError::MissingColumn(name) if name == "_id");

        let index =
            ColumnIndex::from_header(&header(&["_id", "SHELTER", "OCCUPANCY_DATE"])).unwrap();
        assert_eq!(index, ColumnIndex { date: 2, id: 0 });
        assert_eq!(index.min_fields(), 3);
    }

    #[test]
    fn normalize_rewrites_date_and_fingerprints() {
        let normalizer = Normalizer::new(&header(&["_id", "OCCUPANCY_DATE", "CAPACITY"])).unwrap();
        let normalized = normalizer
            .normalize(row(&["7", "24-01-01", "40"]), "res")
            .unwrap();
        let Normalized::Record(record) = normalized else {
            panic!("expected a record");
        };
        assert_eq!(record.fields, vec!["7", "2024-01-01", "40"]);
        assert_eq!(record.fingerprint, fingerprint("7", "2024-01-01"));
        assert!(record.date_parsed);
    }

    #[test]
    fn normalize_keeps_unparsed_dates() {
        let normalizer = Normalizer::new(&header(&["_id", "OCCUPANCY_DATE"])).unwrap();
        let Normalized::Record(record) = normalizer
            .normalize(row(&["7", "Jan 1 2024"]), "res")
            .unwrap()
        else {
            panic!("expected a record");
        };
        assert_eq!(record.fields, vec!["7", "Jan 1 2024"]);
        assert_eq!(record.fingerprint, fingerprint("7", "Jan 1 2024"));
        assert!(!record.date_parsed);
    }

    #[test]
    fn normalize_flags_stray_headers() {
        let normalizer = Normalizer::new(&header(&["_id", "OCCUPANCY_DATE"])).unwrap();
        let normalized = normalizer
            .normalize(row(&["_id", "OCCUPANCY_DATE"]), "res")
            .unwrap();
        assert_matches!(normalized, Normalized::StrayHeader(2));
    }

    #[test]
    fn short_header_rows_are_still_stray() {
        let normalizer =
            Normalizer::new(&header(&["_id", "SHELTER", "CAPACITY", "OCCUPANCY_DATE"])).unwrap();
        let normalized = normalizer.normalize(row(&["_id", "SHELTER"]), "res").unwrap();
        assert_matches!(normalized, Normalized::StrayHeader(2));
    }

    #[test]
    fn normalize_rejects_short_rows() {
        let normalizer = Normalizer::new(&header(&["_id", "SHELTER", "OCCUPANCY_DATE"])).unwrap();
        let err = normalizer.normalize(row(&["7", "A"]), "res").unwrap_err();
        assert_matches!(
            err,
            LedgerError::ShortRow {
                found: 2,
                needed: 3,
                ..
            }
        );
    }
}

use camino::Utf8PathBuf;

use shelter_ledger::domain::Fingerprint;
use shelter_ledger::fingerprint::fingerprint;
use shelter_ledger::ledger::Ledger;

#[test]
fn scan_reads_header_and_every_fingerprint() {
    let temp = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp.path().join("ledger.csv")).unwrap();
    let first = fingerprint("7", "2024-01-01");
    let second = fingerprint("8", "2024-01-02");
    std::fs::write(
        path.as_std_path(),
        format!("FINGERPRINT,_id,OCCUPANCY_DATE\r\n{first},7,2024-01-01\r\n\r\n{second},8,2024-01-02\r\n"),
    )
    .unwrap();

    let scan = Ledger::scan(&path).unwrap();
    assert_eq!(scan.fingerprint_column.as_deref(), Some("FINGERPRINT"));
    assert_eq!(
        scan.header,
        Some(vec!["_id".to_string(), "OCCUPANCY_DATE".to_string()])
    );
    assert_eq!(scan.rows, 2);
    assert!(scan.fingerprints.contains(&first));
    assert!(scan.fingerprints.contains(&second));
}

#[test]
fn empty_file_has_no_header() {
    let temp = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp.path().join("ledger.csv")).unwrap();
    std::fs::write(path.as_std_path(), "").unwrap();

    let ledger = Ledger::open(&path, "FINGERPRINT", false).unwrap();
    assert!(ledger.header().is_none());
    assert_eq!(ledger.known(), 0);
    assert_eq!(ledger.fingerprint_column(), "FINGERPRINT");
}

#[test]
fn open_knows_what_is_on_disk() {
    let temp = tempfile::tempdir().unwrap();
    let path = Utf8PathBuf::from_path_buf(temp.path().join("ledger.csv")).unwrap();
    std::fs::write(
        path.as_std_path(),
        "IDEMPOTENT_KEY,_id,OCCUPANCY_DATE\r\nabc123,7,2024-01-01\r\n",
    )
    .unwrap();

    let ledger = Ledger::open(&path, "FINGERPRINT", false).unwrap();
    assert_eq!(ledger.fingerprint_column(), "IDEMPOTENT_KEY");
    assert!(ledger.contains(&Fingerprint::from_ledger("abc123")));
    assert!(!ledger.contains(&fingerprint("7", "2024-01-01")));
}

// Monthly summaries feeding semester and yearly rollups
use mailscan::report::{self, read_summary, write_rollups, write_summary, SummaryRow};
use mailscan::types::PageRecord;
use rstest::rstest;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn row(address: &str, count: u64, files: &[&str], savings: f64) -> SummaryRow {
    SummaryRow {
        address: address.to_string(),
        count,
        files: files.iter().map(|f| f.to_string()).collect(),
        total_pages: count,
        sample_raw: format!("{} (raw)", address.to_lowercase()),
        estimated_savings: savings,
    }
}

fn monthly(dir: &Path, month: &str, rows: &[SummaryRow]) {
    write_summary(&dir.join(format!("{}_summary.csv", month)), rows).unwrap();
}

#[test]
fn empty_month_writes_header_only() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("monthly/2025-03_summary.csv");
    write_summary(&path, &[]).unwrap();

    let content = fs::read_to_string(&path).unwrap();
    assert_eq!(content.trim(), "address,count,files,total_pages,sample_raw,estimated_savings");
    assert!(read_summary(&path).unwrap().is_empty());
}

#[test]
fn summary_round_trips_file_lists() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("2025-01_summary.csv");
    let rows = vec![row("1 MAIN ST", 2, &["a.pdf", "b, c.pdf"], 1.25)];
    write_summary(&path, &rows).unwrap();

    assert_eq!(read_summary(&path).unwrap(), rows);
}

#[test]
fn scan_records_price_by_page() {
    let record = |file: &str, norm: &str| PageRecord {
        file: file.to_string(),
        page: 1,
        address_raw: norm.to_lowercase(),
        address_norm: norm.to_string(),
        county: None,
        instrument: None,
        pages_for_cost: 1,
    };
    let records = vec![
        record("x.pdf", "9 ELM RD"),
        record("x.pdf", "1 MAIN ST"),
        record("y.pdf", "1 MAIN ST"),
    ];

    let rows = report::summarize(&records, 0.73);
    assert_eq!(rows[0].address, "1 MAIN ST");
    assert_eq!(rows[0].total_pages, 2);
    assert!((rows[0].estimated_savings - 1.46).abs() < 1e-9);
    assert!((rows[1].estimated_savings - 0.73).abs() < 1e-9);
}

#[test]
fn rollups_split_semesters_and_merge_years() {
    let dir = TempDir::new().unwrap();
    let monthly_dir = dir.path().join("monthly");
    let semester_dir = dir.path().join("semester");
    let yearly_dir = dir.path().join("yearly");

    monthly(&monthly_dir, "2025-01", &[row("1 MAIN ST", 2, &["jan.pdf"], 1.0), row("9 ELM RD", 1, &["jan.pdf"], 0.5)]);
    monthly(&monthly_dir, "2025-06", &[row("1 MAIN ST", 3, &["jun.pdf", "jan.pdf"], 1.5)]);
    monthly(&monthly_dir, "2025-07", &[row("9 ELM RD", 4, &["jul.pdf"], 2.5)]);
    monthly(&monthly_dir, "2024-12", &[row("5 OAK DR", 1, &["dec.pdf"], 0.5)]);
    fs::write(monthly_dir.join("notes_summary.csv"), "whatever\n").unwrap();

    let outputs = write_rollups(&monthly_dir, &semester_dir, &yearly_dir).unwrap();
    assert_eq!(outputs.semester.len(), 3);
    assert_eq!(outputs.yearly.len(), 2);

    let h1 = read_summary(&semester_dir.join("2025_H1_summary.csv")).unwrap();
    assert_eq!(h1[0].address, "1 MAIN ST");
    assert_eq!(h1[0].count, 5);
    assert_eq!(h1[0].files, vec!["jan.pdf", "jun.pdf"]);
    assert_eq!(h1[0].sample_raw, "1 main st (raw)");
    assert!((h1[0].estimated_savings - 2.5).abs() < 1e-9);
    assert_eq!(h1[1].address, "9 ELM RD");

    let h2 = read_summary(&semester_dir.join("2025_H2_summary.csv")).unwrap();
    assert_eq!(h2.len(), 1);
    assert!(semester_dir.join("2024_H2_summary.csv").exists());

    let year = read_summary(&yearly_dir.join("2025_summary.csv")).unwrap();
    assert_eq!(year[0].address, "9 ELM RD");
    assert_eq!(year[0].count, 5);
    assert_eq!(year[1].address, "1 MAIN ST");

    let flat = fs::read_to_string(yearly_dir.join("_all_months_flat.csv")).unwrap();
    let months: Vec<&str> = flat
        .lines()
        .skip(1)
        .map(|l| l.rsplit(',').next().unwrap())
        .collect();
    assert_eq!(months, vec!["2024-12", "2025-01", "2025-01", "2025-06", "2025-07"]);
    assert!(flat.lines().nth(2).unwrap().starts_with("1 MAIN ST,"));
}

#[test]
fn no_monthly_files_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let outputs = write_rollups(&dir.path().join("missing"), &dir.path().join("s"), &dir.path().join("y")).unwrap();
    assert!(outputs.flat.is_none());
    assert!(!dir.path().join("y").exists());
}

#[test]
fn missing_columns_name_the_file() {
    let dir = TempDir::new().unwrap();
    fs::write(dir.path().join("2025-02_summary.csv"), "address,count\n1 MAIN ST,2\n").unwrap();

    let err = report::load_monthly(dir.path()).unwrap_err().to_string();
    assert!(err.contains("2025-02_summary.csv"));
    assert!(err.contains("estimated_savings"));
}

#[rstest]
#[case("abc", 0)]
#[case("", 0)]
#[case("3", 3)]
#[case("2.0", 2)]
fn non_numeric_counts_become_zero(#[case] cell: &str, #[case] expected: u64) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("2025-04_summary.csv");
    fs::write(
        &path,
        format!(
            "address,count,files,total_pages,sample_raw,estimated_savings\n1 MAIN ST,{},['a.pdf'],x,raw,nan\n",
            cell
        ),
    )
    .unwrap();

    let rows = read_summary(&path).unwrap();
    assert_eq!(rows[0].count, expected);
    assert_eq!(rows[0].total_pages, 0);
    assert_eq!(rows[0].estimated_savings, 0.0);
    assert_eq!(rows[0].files, vec!["a.pdf"]);
}

// Monthly summaries and semester / yearly rollups
use chrono::{Datelike, NaiveDate};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::types::{MailscanError, PageRecord, Result};

pub const SUMMARY_COLUMNS: [&str; 6] = ["address", "count", "files", "total_pages", "sample_raw", "estimated_savings"];

/// One grouped address.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub address: String,
    pub count: u64,
    pub files: Vec<String>,
    pub total_pages: u64,
    pub sample_raw: String,
    pub estimated_savings: f64,
}

#[derive(Serialize)]
struct CsvRow<'a> {
    address: &'a str,
    count: u64,
    files: String,
    total_pages: u64,
    sample_raw: &'a str,
    estimated_savings: f64,
}

impl SummaryRow {
    fn to_csv(&self) -> Result<CsvRow<'_>> {
        Ok(CsvRow {
            address: &self.address,
            count: self.count,
            files: serde_json::to_string(&self.files)?,
            total_pages: self.total_pages,
            sample_raw: &self.sample_raw,
            estimated_savings: self.estimated_savings,
        })
    }
}

/// Group page records by normalized address and price them.
pub fn summarize(records: &[PageRecord], avg_per_page: f64) -> Vec<SummaryRow> {
    struct Group<'a> {
        count: u64,
        files: BTreeSet<&'a str>,
        total_pages: u64,
        sample_raw: &'a str,
    }

    let mut order: Vec<&str> = Vec::new();
    let mut groups: HashMap<&str, Group> = HashMap::new();

    for record in records {
        let key = record.address_norm.as_str();
        let group = groups.entry(key).or_insert_with(|| {
            order.push(key);
            Group {
                count: 0,
                files: BTreeSet::new(),
                total_pages: 0,
                sample_raw: &record.address_raw,
            }
        });
        group.count += 1;
        group.files.insert(&record.file);
        group.total_pages += record.pages_for_cost as u64;
    }

    let mut rows: Vec<SummaryRow> = order
        .into_iter()
        .filter_map(|key| {
            groups.remove(key).map(|g| SummaryRow {
                address: key.to_string(),
                count: g.count,
                files: g.files.into_iter().map(str::to_string).collect(),
                total_pages: g.total_pages,
                sample_raw: g.sample_raw.to_string(),
                estimated_savings: g.total_pages as f64 * avg_per_page,
            })
        })
        .collect();
    sort_rows(&mut rows);
    rows
}

/// Highest savings first, then most frequent.
pub fn sort_rows(rows: &mut [SummaryRow]) {
    rows.sort_by(|a, b| {
        b.estimated_savings
            .total_cmp(&a.estimated_savings)
            .then(b.count.cmp(&a.count))
    });
}

/// Writes the header even when there are no rows.
pub fn write_summary(path: &Path, rows: &[SummaryRow]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_path(path)?;
    writer.write_record(SUMMARY_COLUMNS)?;
    for row in rows {
        writer.serialize(row.to_csv()?)?;
    }
    writer.flush()?;
    Ok(())
}

/// Accepts a JSON array or a Python-style list of quoted names.
pub fn parse_files_cell(cell: &str) -> Vec<String> {
    let cell = cell.trim();
    if !(cell.starts_with('[') && cell.ends_with(']')) {
        return Vec::new();
    }
    serde_json::from_str(cell)
        .or_else(|_| serde_json::from_str(&cell.replace('\'', "\"")))
        .unwrap_or_default()
}

fn number(cell: &str) -> f64 {
    cell.trim().parse::<f64>().ok().filter(|v| v.is_finite()).unwrap_or(0.0)
}

/// A monthly row tagged with its `YYYY-MM` label.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyRow {
    pub month: String,
    pub year: i32,
    pub month_number: u32,
    pub row: SummaryRow,
}

/// `2025-01` -> (2025, 1).
pub fn parse_month(label: &str) -> Result<(i32, u32)> {
    let date = NaiveDate::parse_from_str(&format!("{}-01", label), "%Y-%m-%d")
        .map_err(|_| MailscanError::InvalidInput(format!("month must look like YYYY-MM, got {:?}", label)))?;
    Ok((date.year(), date.month()))
}

pub fn semester(month: u32) -> &'static str {
    if (1..=6).contains(&month) {
        "H1"
    } else {
        "H2"
    }
}

pub fn read_summary(path: &Path) -> Result<Vec<SummaryRow>> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let missing: Vec<&str> = SUMMARY_COLUMNS
        .iter()
        .copied()
        .filter(|c| !headers.iter().any(|h| h == *c))
        .collect();
    if !missing.is_empty() {
        return Err(MailscanError::InvalidInput(format!(
            "{} is missing columns: {}",
            path.display(),
            missing.join(", ")
        )));
    }

    let index = |name: &str| headers.iter().position(|h| h == name).unwrap_or(0);
    let (i_address, i_count, i_files, i_pages, i_sample, i_savings) = (
        index("address"),
        index("count"),
        index("files"),
        index("total_pages"),
        index("sample_raw"),
        index("estimated_savings"),
    );

    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        let cell = |i: usize| record.get(i).unwrap_or("");
        rows.push(SummaryRow {
            address: cell(i_address).to_string(),
            count: number(cell(i_count)) as u64,
            files: parse_files_cell(cell(i_files)),
            total_pages: number(cell(i_pages)) as u64,
            sample_raw: cell(i_sample).to_string(),
            estimated_savings: number(cell(i_savings)),
        });
    }
    Ok(rows)
}

/// Every `YYYY-MM_summary.csv` in `monthly_dir`, in file-name order.
pub fn load_monthly(monthly_dir: &Path) -> Result<Vec<MonthlyRow>> {
    if !monthly_dir.exists() {
        return Ok(Vec::new());
    }

    let mut paths: Vec<PathBuf> = fs::read_dir(monthly_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.ends_with("_summary.csv"))
                .unwrap_or(false)
        })
        .collect();
    paths.sort();

    let mut all = Vec::new();
    for path in paths {
        let file_name = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
        let label = file_name.split('_').next().unwrap_or_default().to_string();
        let (year, month_number) = match parse_month(&label) {
            Ok(parsed) => parsed,
            Err(_) => {
                warn!("skipping {}: not a monthly summary", path.display());
                continue;
            }
        };
        for row in read_summary(&path)? {
            all.push(MonthlyRow {
                month: label.clone(),
                year,
                month_number,
                row,
            });
        }
    }
    Ok(all)
}

/// Sum counts, pages and savings; merge files keeping first-seen order; keep
/// the first sample.
fn combine<'a>(rows: impl Iterator<Item = &'a SummaryRow>) -> Vec<SummaryRow> {
    let mut order: Vec<String> = Vec::new();
    let mut merged: HashMap<String, (SummaryRow, HashSet<String>)> = HashMap::new();

    for row in rows {
        let (acc, seen) = merged.entry(row.address.clone()).or_insert_with(|| {
            order.push(row.address.clone());
            (
                SummaryRow {
                    address: row.address.clone(),
                    count: 0,
                    files: Vec::new(),
                    total_pages: 0,
                    sample_raw: row.sample_raw.clone(),
                    estimated_savings: 0.0,
                },
                HashSet::new(),
            )
        });
        acc.count += row.count;
        acc.total_pages += row.total_pages;
        acc.estimated_savings += row.estimated_savings;
        for file in &row.files {
            if seen.insert(file.clone()) {
                acc.files.push(file.clone());
            }
        }
    }

    let mut out: Vec<SummaryRow> = order
        .into_iter()
        .filter_map(|address| merged.remove(&address).map(|(row, _)| row))
        .collect();
    sort_rows(&mut out);
    out
}

/// Rollups keyed by `(year, "H1"|"H2")`.
pub fn semester_rollups(rows: &[MonthlyRow]) -> BTreeMap<(i32, &'static str), Vec<SummaryRow>> {
    let mut buckets: BTreeMap<(i32, &'static str), Vec<&SummaryRow>> = BTreeMap::new();
    for r in rows {
        buckets.entry((r.year, semester(r.month_number))).or_default().push(&r.row);
    }
    buckets
        .into_iter()
        .map(|(key, group)| (key, combine(group.into_iter())))
        .collect()
}

pub fn yearly_rollups(rows: &[MonthlyRow]) -> BTreeMap<i32, Vec<SummaryRow>> {
    let mut buckets: BTreeMap<i32, Vec<&SummaryRow>> = BTreeMap::new();
    for r in rows {
        buckets.entry(r.year).or_default().push(&r.row);
    }
    buckets
        .into_iter()
        .map(|(year, group)| (year, combine(group.into_iter())))
        .collect()
}

/// Every monthly row in one file, month ascending then savings descending.
pub fn write_flat(path: &Path, rows: &[MonthlyRow]) -> Result<()> {
    let mut sorted: Vec<&MonthlyRow> = rows.iter().collect();
    sorted.sort_by(|a, b| {
        a.month
            .cmp(&b.month)
            .then(b.row.estimated_savings.total_cmp(&a.row.estimated_savings))
    });

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = csv::WriterBuilder::new().has_headers(false).from_path(path)?;
    let mut header: Vec<&str> = SUMMARY_COLUMNS.to_vec();
    header.push("month");
    writer.write_record(&header)?;
    for r in sorted {
        let row = r.row.to_csv()?;
        writer.write_record([
            row.address.to_string(),
            row.count.to_string(),
            row.files,
            row.total_pages.to_string(),
            row.sample_raw.to_string(),
            row.estimated_savings.to_string(),
            r.month.clone(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Output paths written by [`write_rollups`].
#[derive(Debug, Default)]
pub struct RollupOutputs {
    pub semester: Vec<PathBuf>,
    pub yearly: Vec<PathBuf>,
    pub flat: Option<PathBuf>,
}

pub fn write_rollups(monthly_dir: &Path, semester_dir: &Path, yearly_dir: &Path) -> Result<RollupOutputs> {
    let rows = load_monthly(monthly_dir)?;
    let mut outputs = RollupOutputs::default();
    if rows.is_empty() {
        warn!("No monthly CSVs found in {}", monthly_dir.display());
        return Ok(outputs);
    }

    for ((year, half), group) in semester_rollups(&rows) {
        let path = semester_dir.join(format!("{}_{}_summary.csv", year, half));
        write_summary(&path, &group)?;
        info!("Wrote {}", path.display());
        outputs.semester.push(path);
    }

    for (year, group) in yearly_rollups(&rows) {
        let path = yearly_dir.join(format!("{}_summary.csv", year));
        write_summary(&path, &group)?;
        info!("Wrote {}", path.display());
        outputs.yearly.push(path);
    }

    let flat = yearly_dir.join("_all_months_flat.csv");
    write_flat(&flat, &rows)?;
    info!("Wrote {}", flat.display());
    outputs.flat = Some(flat);

    Ok(outputs)
}

// Two-stage workflow: anchor extraction to CSV, then reconciliation with a checked sheet
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::anchor_parser::Confidence;
use crate::pipeline::{AnchorRow, Pipeline};
use crate::pdf_extraction::DocumentBatch;
use crate::types::{MailscanError, Result};

pub const STAGE_A_COLUMNS: [&str; 6] = ["County", "Instrument Number", "Recipient", "Address", "Page", "Confidence"];
const JOIN_KEYS: [&str; 2] = ["County", "Instrument Number"];
const CHECKED_COLUMNS: [&str; 4] = ["County", "Instrument Number", "Recipient", "Address"];

fn create_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(())
}

pub fn write_stage_a(rows: &[AnchorRow], out: &Path) -> Result<()> {
    create_parent(out)?;
    let mut writer = csv::Writer::from_path(out)?;
    writer.write_record(STAGE_A_COLUMNS)?;
    for row in rows {
        let page = row.page.to_string();
        writer.write_record([
            row.county.as_str(),
            row.instrument.as_str(),
            row.recipient.as_str(),
            row.address.as_str(),
            page.as_str(),
            row.confidence.as_str(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

/// Extract one anchor row per page and write them out.
pub fn stage_a(pipeline: &Pipeline, doc: &dyn DocumentBatch, out: &Path) -> Result<usize> {
    let rows = pipeline.anchor_rows(doc);
    let anchored = rows.iter().filter(|r| r.confidence == Confidence::Anchored).count();
    if anchored < rows.len() {
        warn!("{}: {} of {} pages had no anchor phrase", doc.name(), rows.len() - anchored, rows.len());
    }
    write_stage_a(&rows, out)?;
    info!("Wrote {} rows to {}", rows.len(), out.display());
    Ok(rows.len())
}

fn join_key(value: &str) -> String {
    value.trim().to_uppercase()
}

struct Sheet {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Sheet {
    fn read(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)?;
        let headers: Vec<String> = reader.headers()?.iter().map(|h| h.trim().to_string()).collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record?;
            let mut row: Vec<String> = record.iter().map(str::to_string).collect();
            row.resize(headers.len(), String::new());
            rows.push(row);
        }
        Ok(Self { headers, rows })
    }

    fn column(&self, name: &str, path: &Path) -> Result<usize> {
        self.headers.iter().position(|h| h == name).ok_or_else(|| {
            MailscanError::InvalidInput(format!("{} has no {:?} column", path.display(), name))
        })
    }

    /// Trim and upper-case the join keys in place.
    fn normalize_keys(&mut self, path: &Path) -> Result<[usize; 2]> {
        let county = self.column(JOIN_KEYS[0], path)?;
        let instrument = self.column(JOIN_KEYS[1], path)?;
        for row in &mut self.rows {
            row[county] = join_key(&row[county]);
            row[instrument] = join_key(&row[instrument]);
        }
        Ok([county, instrument])
    }
}

/// Left join of the stage A sheet with the hand-checked sheet on
/// (County, Instrument Number). Returns the number of rows written.
pub fn stage_b(stage_a_csv: &Path, checked_csv: &Path, out: &Path) -> Result<usize> {
    let mut left = Sheet::read(stage_a_csv)?;
    let [l_county, l_instrument] = left.normalize_keys(stage_a_csv)?;

    let mut right = Sheet::read(checked_csv)?;
    right.normalize_keys(checked_csv)?;
    let projection = CHECKED_COLUMNS
        .iter()
        .map(|c| right.column(c, checked_csv))
        .collect::<Result<Vec<_>>>()?;

    let mut seen: HashSet<Vec<String>> = HashSet::new();
    let mut matches: HashMap<(String, String), Vec<(String, String)>> = HashMap::new();
    for row in &right.rows {
        let projected: Vec<String> = projection.iter().map(|&i| row[i].clone()).collect();
        if !seen.insert(projected.clone()) {
            continue;
        }
        let [county, instrument, recipient, address]: [String; 4] = match projected.try_into() {
            Ok(fields) => fields,
            Err(_) => continue,
        };
        matches.entry((county, instrument)).or_default().push((recipient, address));
    }

    create_parent(out)?;
    let mut writer = csv::Writer::from_path(out)?;
    let mut header = left.headers.clone();
    header.push("Checked Recipient".to_string());
    header.push("Checked Address".to_string());
    writer.write_record(&header)?;

    let mut written = 0;
    let mut unmatched = 0;
    for row in &left.rows {
        let key = (row[l_county].clone(), row[l_instrument].clone());
        match matches.get(&key) {
            Some(found) => {
                for (recipient, address) in found {
                    let mut out_row = row.clone();
                    out_row.push(recipient.clone());
                    out_row.push(address.clone());
                    writer.write_record(&out_row)?;
                    written += 1;
                }
            }
            None => {
                let mut out_row = row.clone();
                out_row.push(String::new());
                out_row.push(String::new());
                writer.write_record(&out_row)?;
                written += 1;
                unmatched += 1;
            }
        }
    }
    writer.flush()?;

    if unmatched > 0 {
        warn!("{} stage A rows had no checked match", unmatched);
    }
    info!("Wrote {} rows to {}", written, out.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn stage_a_csv_has_fixed_columns() {
        let dir = TempDir::new().unwrap();
        let out = dir.path().join("a/stage_a.csv");
        let rows = vec![AnchorRow {
            county: "San Diego County".to_string(),
            instrument: "2024-000123".to_string(),
            recipient: "JOHN DOE".to_string(),
            address: "1 MAIN ST\nTOWN, CA 90210".to_string(),
            page: 3,
            confidence: Confidence::Anchored,
        }];
        write_stage_a(&rows, &out).unwrap();

        let mut reader = csv::Reader::from_path(&out).unwrap();
        let headers: Vec<String> = reader.headers().unwrap().iter().map(str::to_string).collect();
        assert_eq!(headers, STAGE_A_COLUMNS);
        let record = reader.records().next().unwrap().unwrap();
        assert_eq!(&record[3], "1 MAIN ST\nTOWN, CA 90210");
        assert_eq!(&record[4], "3");
        assert_eq!(&record[5], "anchored");
    }

    #[test]
    fn missing_key_column_names_the_file() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.csv");
        let checked = dir.path().join("checked.csv");
        fs::write(&a, "County,Page\nX,1\n").unwrap();
        fs::write(&checked, "County,Instrument Number,Recipient,Address\n").unwrap();
        let err = stage_b(&a, &checked, &dir.path().join("out.csv")).unwrap_err().to_string();
        assert!(err.contains("a.csv"));
        assert!(err.contains("Instrument Number"));
    }
}

// Average postage per page from a mailing export
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

use crate::types::{MailscanError, Result};

/// Preferred first: `Page Count.1` is the mailed-pages column when both exist.
pub const PAGE_COLUMNS: [&str; 2] = ["Page Count.1", "Page Count"];
pub const POSTAGE_COLUMN: &str = "Postage";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostMetrics {
    pub source_file: String,
    pub page_column_used: String,
    pub total_paid_postage: f64,
    pub total_paid_pages: u64,
    pub avg_postage_per_page: f64,
}

fn numeric(cell: &str) -> Option<f64> {
    let cell = cell.trim();
    if cell.is_empty() {
        return None;
    }
    cell.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Only rows with a numeric postage count towards either total.
pub fn compute(path: &Path) -> Result<CostMetrics> {
    let mut reader = csv::Reader::from_path(path)?;
    let headers = reader.headers()?.clone();

    let (page_index, page_column) = PAGE_COLUMNS
        .iter()
        .find_map(|name| headers.iter().position(|h| h.trim() == *name).map(|i| (i, *name)))
        .ok_or_else(|| {
            MailscanError::InvalidInput(format!(
                "Could not find a page column in {}. Expected one of: {}. Columns present: {}",
                path.display(),
                PAGE_COLUMNS.join(", "),
                headers.iter().collect::<Vec<_>>().join(", ")
            ))
        })?;
    let postage_index = headers.iter().position(|h| h.trim() == POSTAGE_COLUMN);

    let mut total_postage = 0.0;
    let mut total_pages = 0.0;
    for record in reader.records() {
        let record = record?;
        let postage = postage_index.and_then(|i| record.get(i)).and_then(numeric);
        if let Some(postage) = postage {
            total_postage += postage;
            total_pages += record.get(page_index).and_then(numeric).unwrap_or(0.0);
        }
    }

    if total_pages <= 0.0 {
        return Err(MailscanError::InvalidInput(format!(
            "No valid pages found among paid rows in {}",
            path.display()
        )));
    }

    Ok(CostMetrics {
        source_file: path.display().to_string(),
        page_column_used: page_column.to_string(),
        total_paid_postage: total_postage,
        total_paid_pages: total_pages as u64,
        avg_postage_per_page: total_postage / total_pages,
    })
}

pub fn write(metrics: &CostMetrics, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(metrics)?)?;
    info!("Wrote {}", path.display());
    Ok(())
}

/// The average the monthly scan prices pages with.
/// The one field a scan needs; other keys in the file are ignored.
#[derive(Deserialize)]
struct PostageRate {
    avg_postage_per_page: f64,
}

pub fn load_avg_per_page(path: &Path) -> Result<f64> {
    if !path.exists() {
        return Err(MailscanError::MissingInput {
            resource: path.to_path_buf(),
            remedy: "Run `mailscan metrics` first.".to_string(),
        });
    }
    let rate: PostageRate = serde_json::from_str(&fs::read_to_string(path)?)?;
    Ok(rate.avg_postage_per_page)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn export(dir: &TempDir, body: &str) -> std::path::PathBuf {
        let path = dir.path().join("export.csv");
        fs::write(&path, body).unwrap();
        path
    }

    #[test]
    fn prefers_mailed_page_column_and_skips_unpaid_rows() {
        let dir = TempDir::new().unwrap();
        let path = export(
            &dir,
            "Name,Postage,Page Count,Page Count.1\nA,1.50,10,3\nB,,10,50\nC,n/a,4,4\nD,0.50,2,1\n",
        );
        let m = compute(&path).unwrap();
        assert_eq!(m.page_column_used, "Page Count.1");
        assert_eq!(m.total_paid_pages, 4);
        assert!((m.total_paid_postage - 2.0).abs() < 1e-9);
        assert!((m.avg_postage_per_page - 0.5).abs() < 1e-9);
    }

    #[test]
    fn missing_page_column_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = export(&dir, "Postage,Pages\n1.0,2\n");
        let err = compute(&path).unwrap_err().to_string();
        assert!(err.contains("Page Count"));
    }

    #[test]
    fn zero_pages_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = export(&dir, "Postage,Page Count\n,5\n");
        assert!(compute(&path).is_err());
    }

    #[test]
    fn written_metrics_load_back() {
        let dir = TempDir::new().unwrap();
        let path = export(&dir, "Postage,Page Count\n3.0,6\n");
        let json = dir.path().join("out/metrics.json");
        write(&compute(&path).unwrap(), &json).unwrap();
        assert!((load_avg_per_page(&json).unwrap() - 0.5).abs() < 1e-9);
    }

    #[test]
    fn rate_loads_from_metrics_with_other_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("xlsx_metrics.json");
        fs::write(
            &path,
            r#"{"excel_file": "mailing.xlsx", "page_column_used": "Page Count.1", "avg_postage_per_page": 0.42}"#,
        )
        .unwrap();
        assert_eq!(load_avg_per_page(&path).unwrap(), 0.42);
    }

    #[test]
    fn absent_metrics_names_the_remedy() {
        let err = load_avg_per_page(Path::new("/nope/xlsx_metrics.json")).unwrap_err();
        assert!(err.to_string().contains("mailscan metrics"));
    }
}

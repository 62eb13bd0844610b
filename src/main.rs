// mailscan CLI: monthly scans, metrics, rollups and the two-stage workflow
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{info, Level};

use mailscan::config::Config;
use mailscan::pipeline::Pipeline;
use mailscan::types::MailscanError;
use mailscan::{metrics, report, stages};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// TOML config; defaults to ./mailscan.toml when present
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan one month of PDFs and write its address summary
    Scan {
        /// Month label, YYYY-MM
        month: String,
        #[arg(long, default_value = "data/pdfs")]
        pdf_base: PathBuf,
        #[arg(long, default_value = "outputs/monthly")]
        output_dir: PathBuf,
        #[arg(long, default_value = "outputs/xlsx_metrics.json")]
        metrics: PathBuf,
        /// Also write every page record as JSON lines
        #[arg(long)]
        records: Option<PathBuf>,
    },
    /// Average postage per page from a mailing export CSV
    Metrics {
        export: PathBuf,
        #[arg(long, default_value = "outputs/xlsx_metrics.json")]
        out: PathBuf,
    },
    /// Semester and yearly rollups of the monthly summaries
    Rollup {
        #[arg(long, default_value = "outputs/monthly")]
        monthly_dir: PathBuf,
        #[arg(long, default_value = "outputs/semester")]
        semester_dir: PathBuf,
        #[arg(long, default_value = "outputs/yearly")]
        yearly_dir: PathBuf,
    },
    /// Anchor-based recipient and recording fields, one row per page
    StageA { pdf: PathBuf, out: PathBuf },
    /// Join stage A rows with a hand-checked sheet
    StageB {
        stage_a: PathBuf,
        checked: PathBuf,
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_max_level(if cli.verbose { Level::DEBUG } else { Level::INFO })
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let config = Config::load(cli.config.as_deref()).context("Failed to load config")?;

    match cli.command {
        Command::Scan {
            month,
            pdf_base,
            output_dir,
            metrics,
            records,
        } => scan(&config, &month, &pdf_base, &output_dir, &metrics, records.as_deref()),
        Command::Metrics { export, out } => {
            let computed = metrics::compute(&export)
                .with_context(|| format!("Failed to compute metrics from {}", export.display()))?;
            metrics::write(&computed, &out)?;
            println!("Wrote {}", out.display());
            println!("Average postage per page: ${:.4}", computed.avg_postage_per_page);
            Ok(())
        }
        Command::Rollup {
            monthly_dir,
            semester_dir,
            yearly_dir,
        } => {
            let outputs = report::write_rollups(&monthly_dir, &semester_dir, &yearly_dir)?;
            for path in outputs.semester.iter().chain(&outputs.yearly).chain(&outputs.flat) {
                println!("Wrote {}", path.display());
            }
            Ok(())
        }
        Command::StageA { pdf, out } => {
            let pipeline = Pipeline::from_config(&config)?;
            let doc = pipeline
                .open(&pdf)
                .with_context(|| format!("Failed to open {}", pdf.display()))?;
            let rows = stages::stage_a(&pipeline, &doc, &out)?;
            println!("Wrote {} rows to {}", rows, out.display());
            Ok(())
        }
        Command::StageB { stage_a, checked, out } => {
            let rows = stages::stage_b(&stage_a, &checked, &out)?;
            println!("Wrote {} rows to {}", rows, out.display());
            Ok(())
        }
    }
}

fn scan(
    config: &Config,
    month: &str,
    pdf_base: &Path,
    output_dir: &Path,
    metrics_path: &Path,
    records_path: Option<&Path>,
) -> Result<()> {
    report::parse_month(month)?;

    let month_dir = pdf_base.join(month);
    if !month_dir.is_dir() {
        return Err(MailscanError::MissingInput {
            resource: month_dir,
            remedy: "Put the month's PDFs in that folder.".to_string(),
        }
        .into());
    }

    let avg_per_page = metrics::load_avg_per_page(metrics_path)?;
    info!("Using avg_per_page=${:.6}", avg_per_page);

    let mut pdfs: Vec<PathBuf> = fs::read_dir(&month_dir)
        .with_context(|| format!("Failed to list {}", month_dir.display()))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().map(|ext| ext == "pdf").unwrap_or(false))
        .collect();
    pdfs.sort();
    info!("PDFs found: {} in {}", pdfs.len(), month_dir.display());

    let out_csv = output_dir.join(format!("{}_summary.csv", month));
    if pdfs.is_empty() {
        report::write_summary(&out_csv, &[])?;
        println!("No PDFs for {}; wrote empty {}", month, out_csv.display());
        return Ok(());
    }

    let pipeline = Pipeline::from_config(config)?;
    let records = pipeline.process_files(&pdfs);
    info!("Pages with address-like text: {}", records.len());

    if let Some(path) = records_path {
        write_records(path, &records).with_context(|| format!("Failed to write {}", path.display()))?;
    }

    let rows = report::summarize(&records, avg_per_page);
    report::write_summary(&out_csv, &rows)?;
    println!("Wrote {} ({} addresses)", out_csv.display(), rows.len());
    Ok(())
}

fn write_records(path: &Path, records: &[mailscan::PageRecord]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut out = BufWriter::new(fs::File::create(path)?);
    for record in records {
        serde_json::to_writer(&mut out, record)?;
        out.write_all(b"\n")?;
    }
    out.flush()?;
    Ok(())
}

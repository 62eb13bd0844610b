// Per-page extraction pipeline producing page records
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::address::{looks_like_address_block, LineSelector, Normalizer};
use crate::anchor_parser::{parse_county_and_instrument, Confidence, RecipientParser};
use crate::config::Config;
use crate::pdf_extraction::{ocr_available, DocumentBatch, PdfDocument, RegionExtractor, TesseractRecognizer, TextRecognizer};
use crate::system_pdf_renderer::SystemPdfRenderer;
use crate::types::{Page, PageRecord, RegionKind, Result};

/// One row of the anchor-based (stage A) extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct AnchorRow {
    pub county: String,
    pub instrument: String,
    pub recipient: String,
    pub address: String,
    /// 1-based.
    pub page: usize,
    pub confidence: Confidence,
}

pub struct Pipeline {
    regions: RegionExtractor,
    anchor_regions: RegionExtractor,
    selector: LineSelector,
    normalizer: Normalizer,
    recipients: RecipientParser,
    parse_metadata: bool,
    renderer: SystemPdfRenderer,
}

impl Pipeline {
    /// Production pipeline; probes pdftoppm/tesseract once.
    pub fn from_config(config: &Config) -> Result<Self> {
        let recognizer = if ocr_available(&config.ocr) {
            info!("OCR fallback enabled ({} dpi)", config.ocr.dpi);
            Some(TesseractRecognizer::from_config(&config.ocr))
        } else {
            warn!("OCR fallback unavailable; scanned pages will be skipped");
            None
        };
        Self::with_recognizer(config, recognizer)
    }

    /// Pipeline with an explicit recognizer, or none to run text-layer only.
    pub fn with_recognizer<R>(config: &Config, recognizer: Option<R>) -> Result<Self>
    where
        R: TextRecognizer + Clone + 'static,
    {
        let dpi = config.ocr.dpi;
        Ok(Self {
            regions: RegionExtractor::with_fallback(config.scan.regions, dpi, recognizer.clone()),
            anchor_regions: RegionExtractor::with_fallback(config.anchor.regions, dpi, recognizer),
            selector: LineSelector::new(&config.address.denylist, config.scan.max_address_lines),
            normalizer: Normalizer::new(&config.address.substitutions)?,
            recipients: RecipientParser::new(&config.anchor.phrases, config.anchor.max_lines_after)?,
            parse_metadata: config.scan.parse_metadata,
            renderer: SystemPdfRenderer::new(&config.ocr.pdftoppm_cmd),
        })
    }

    pub fn has_ocr(&self) -> bool {
        self.regions.has_ocr()
    }

    /// Address record for one page, if the top-left region holds one.
    pub fn process_page(&self, doc: &dyn DocumentBatch, page: &Page) -> Option<PageRecord> {
        let text_block = self.regions.extract(doc, page, RegionKind::TopLeft)?;
        if !looks_like_address_block(&text_block) {
            debug!("{} page {}: no address-like block", doc.name(), page.index + 1);
            return None;
        }

        let address_raw = self.selector.select(&text_block);
        if address_raw.is_empty() {
            return None;
        }
        let address_norm = self.normalizer.normalize(&address_raw);

        let (county, instrument) = if self.parse_metadata {
            let meta = self
                .regions
                .extract(doc, page, RegionKind::TopRight)
                .map(|text| parse_county_and_instrument(&text))
                .unwrap_or_default();
            (non_empty(meta.county), non_empty(meta.instrument))
        } else {
            (None, None)
        };

        Some(PageRecord {
            file: doc.name().to_string(),
            page: page.index + 1,
            address_raw,
            address_norm,
            county,
            instrument,
            pages_for_cost: 1,
        })
    }

    /// Every record in a document; unreadable pages are logged and skipped.
    pub fn process_document(&self, doc: &dyn DocumentBatch) -> Vec<PageRecord> {
        let mut records = Vec::new();
        for index in 0..doc.page_count() {
            match doc.page(index) {
                Ok(page) => records.extend(self.process_page(doc, &page)),
                Err(e) => warn!("{} page {}: {}", doc.name(), index + 1, e),
            }
        }
        records
    }

    /// Open, scan and close each file in turn. A broken file contributes nothing.
    pub fn process_files(&self, paths: &[PathBuf]) -> Vec<PageRecord> {
        let mut records = Vec::new();
        for path in paths {
            match self.open(path) {
                Ok(doc) => {
                    info!("Processing {} ({} pages)", doc.name(), doc.page_count());
                    let found = self.process_document(&doc);
                    debug!("{}: {} records", doc.name(), found.len());
                    records.extend(found);
                }
                Err(e) => error!("{}: {}", path.display(), e),
            }
        }
        records
    }

    pub fn open(&self, path: &Path) -> Result<PdfDocument> {
        PdfDocument::open(path, self.renderer.clone())
    }

    /// Stage A rows: recipient from the left region, county/instrument from the right.
    pub fn anchor_rows(&self, doc: &dyn DocumentBatch) -> Vec<AnchorRow> {
        let mut rows = Vec::new();
        for index in 0..doc.page_count() {
            let page = match doc.page(index) {
                Ok(page) => page,
                Err(e) => {
                    warn!("{} page {}: {}", doc.name(), index + 1, e);
                    continue;
                }
            };

            let left = self.anchor_regions.extract(doc, &page, RegionKind::TopLeft).unwrap_or_default();
            let right = self.anchor_regions.extract(doc, &page, RegionKind::TopRight).unwrap_or_default();
            let recipient = self.recipients.parse(&left);
            let meta = parse_county_and_instrument(&right);

            rows.push(AnchorRow {
                county: meta.county,
                instrument: meta.instrument,
                recipient: recipient.recipient,
                address: recipient.address,
                page: index + 1,
                confidence: recipient.confidence,
            });
        }
        rows
    }
}

fn non_empty(value: String) -> Option<String> {
    (!value.is_empty()).then_some(value)
}

// Region text sources: text layer first, OCR only when that comes back empty
use image::DynamicImage;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::{debug, warn};

use super::geometry::{pixel_crop, region_rect};
use super::ocr_engine::TextRecognizer;
use super::pdf_document::DocumentBatch;
use super::text_layer::crop_text;
use crate::config::RegionRatios;
use crate::types::{Page, RegionKind, Result};

/// One way of getting the text inside a page region.
pub trait RegionTextSource {
    fn label(&self) -> &'static str;
    fn extract(&self, doc: &dyn DocumentBatch, page: &Page, region: RegionKind) -> Option<String>;
}

pub struct TextLayerSource {
    ratios: RegionRatios,
}

impl TextLayerSource {
    pub fn new(ratios: RegionRatios) -> Self {
        Self { ratios }
    }
}

impl RegionTextSource for TextLayerSource {
    fn label(&self) -> &'static str {
        "text-layer"
    }

    fn extract(&self, _doc: &dyn DocumentBatch, page: &Page, region: RegionKind) -> Option<String> {
        let bbox = region_rect(region, page.width, page.height, &self.ratios);
        let text = crop_text(page, &bbox);
        (!text.is_empty()).then_some(text)
    }
}

/// Rasterize, crop the same ratio box in pixels, recognize.
pub struct OcrSource<R: TextRecognizer> {
    ratios: RegionRatios,
    dpi: u32,
    recognizer: R,
    // Last rendered page, keyed by (document, page index)
    last_render: RefCell<Option<(String, usize, Rc<DynamicImage>)>>,
}

impl<R: TextRecognizer> OcrSource<R> {
    pub fn new(ratios: RegionRatios, dpi: u32, recognizer: R) -> Self {
        Self {
            ratios,
            dpi,
            recognizer,
            last_render: RefCell::new(None),
        }
    }

    fn rendered(&self, doc: &dyn DocumentBatch, index: usize) -> Result<Rc<DynamicImage>> {
        if let Some((name, cached_index, image)) = self.last_render.borrow().as_ref() {
            if name == doc.name() && *cached_index == index {
                return Ok(Rc::clone(image));
            }
        }
        let image = Rc::new(doc.rasterize(index, self.dpi)?);
        *self.last_render.borrow_mut() = Some((doc.name().to_string(), index, Rc::clone(&image)));
        Ok(image)
    }

    fn ocr_region(&self, doc: &dyn DocumentBatch, page: &Page, region: RegionKind) -> Result<String> {
        let image = self.rendered(doc, page.index)?;
        let (x, y, w, h) = pixel_crop(region, image.width(), image.height(), &self.ratios);
        if w == 0 || h == 0 {
            return Ok(String::new());
        }
        let crop = image.crop_imm(x, y, w, h);
        self.recognizer.recognize(&crop)
    }
}

impl<R: TextRecognizer> RegionTextSource for OcrSource<R> {
    fn label(&self) -> &'static str {
        "ocr"
    }

    fn extract(&self, doc: &dyn DocumentBatch, page: &Page, region: RegionKind) -> Option<String> {
        match self.ocr_region(doc, page, region) {
            Ok(text) => {
                let text = text.trim();
                (!text.is_empty()).then(|| text.to_string())
            }
            Err(e) => {
                warn!("OCR failed on {} page {}: {}", doc.name(), page.index + 1, e);
                None
            }
        }
    }
}

/// Ordered strategy chain; the first non-empty block wins.
pub struct RegionExtractor {
    sources: Vec<Box<dyn RegionTextSource>>,
}

impl RegionExtractor {
    /// Text layer always, OCR appended only when it is usable in this process.
    pub fn with_fallback<R>(ratios: RegionRatios, dpi: u32, recognizer: Option<R>) -> Self
    where
        R: TextRecognizer + 'static,
    {
        let mut sources: Vec<Box<dyn RegionTextSource>> = vec![Box::new(TextLayerSource::new(ratios))];
        if let Some(recognizer) = recognizer {
            sources.push(Box::new(OcrSource::new(ratios, dpi, recognizer)));
        }
        Self { sources }
    }

    pub fn has_ocr(&self) -> bool {
        self.sources.iter().any(|s| s.label() == "ocr")
    }

    pub fn extract(&self, doc: &dyn DocumentBatch, page: &Page, region: RegionKind) -> Option<String> {
        for source in &self.sources {
            if let Some(text) = source.extract(doc, page, region) {
                debug!("{} page {} {:?}: {}", doc.name(), page.index + 1, region, source.label());
                return Some(text);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScanConfig;
    use std::cell::Cell;

    struct Blank {
        renders: Cell<usize>,
    }

    impl DocumentBatch for Blank {
        fn name(&self) -> &str {
            "blank.pdf"
        }

        fn page_count(&self) -> usize {
            2
        }

        fn page(&self, index: usize) -> Result<Page> {
            Ok(Page::new(index, 612.0, 792.0, Vec::new()))
        }

        fn rasterize(&self, _index: usize, _dpi: u32) -> Result<DynamicImage> {
            self.renders.set(self.renders.get() + 1);
            Ok(DynamicImage::new_luma8(255, 330))
        }
    }

    struct Silent;

    impl TextRecognizer for Silent {
        fn recognize(&self, _image: &DynamicImage) -> Result<String> {
            Ok(String::new())
        }
    }

    #[test]
    fn same_page_shares_one_render() {
        let doc = Blank { renders: Cell::new(0) };
        let source = OcrSource::new(ScanConfig::default().regions, 30, Silent);

        let first = source.rendered(&doc, 0).unwrap();
        let again = source.rendered(&doc, 0).unwrap();
        assert!(Rc::ptr_eq(&first, &again));
        assert_eq!(doc.renders.get(), 1);

        let next = source.rendered(&doc, 1).unwrap();
        assert!(!Rc::ptr_eq(&first, &next));
        assert_eq!(doc.renders.get(), 2);
    }

    #[test]
    fn blank_ocr_text_is_no_answer() {
        let doc = Blank { renders: Cell::new(0) };
        let page = doc.page(0).unwrap();
        let source = OcrSource::new(ScanConfig::default().regions, 30, Silent);
        assert_eq!(source.extract(&doc, &page, RegionKind::TopLeft), None);
    }
}

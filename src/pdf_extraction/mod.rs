// PDF extraction module
pub mod geometry;
pub mod ocr_engine;
pub mod pdf_document;
pub mod region_source;
pub mod text_layer;

pub use geometry::{page_regions, pixel_crop, region_rect};
pub use ocr_engine::{ocr_available, TesseractRecognizer, TextRecognizer};
pub use pdf_document::{DocumentBatch, PdfDocument};
pub use region_source::{OcrSource, RegionExtractor, RegionTextSource, TextLayerSource};
pub use text_layer::{crop_text, words_to_text};

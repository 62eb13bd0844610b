// Core types and error definitions for mailscan
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Axis-aligned rectangle in page space, origin at the top-left corner.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct Rect {
    pub left: f32,
    pub top: f32,
    pub right: f32,
    pub bottom: f32,
}

impl Rect {
    pub const fn new(left: f32, top: f32, right: f32, bottom: f32) -> Self {
        Self { left, top, right, bottom }
    }

    /// Inclusive point containment.
    pub fn contains(&self, x: f32, y: f32) -> bool {
        self.left <= x && x <= self.right && self.top <= y && y <= self.bottom
    }
}

/// A run of glyphs from the text layer with its bounding box.
#[derive(Debug, Clone, PartialEq)]
pub struct WordBox {
    pub text: String,
    pub x0: f32,
    pub top: f32,
    pub x1: f32,
    pub bottom: f32,
}

impl WordBox {
    pub fn new(text: impl Into<String>, x0: f32, top: f32, x1: f32, bottom: f32) -> Self {
        Self { text: text.into(), x0, top, x1, bottom }
    }
}

/// One page of a document batch.
#[derive(Debug, Clone, Default)]
pub struct Page {
    pub index: usize,
    pub width: f32,
    pub height: f32,
    pub words: Vec<WordBox>,
}

impl Page {
    pub fn new(index: usize, width: f32, height: f32, words: Vec<WordBox>) -> Self {
        Self { index, width, height, words }
    }

    pub fn has_text_layer(&self) -> bool {
        self.words.iter().any(|w| !w.text.trim().is_empty())
    }
}

/// Which of the two canonical regions is being scanned.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum RegionKind {
    TopLeft,
    TopRight,
}

/// Per-page output consumed by the grouping/aggregation stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageRecord {
    pub file: String,
    /// 1-based for humans.
    pub page: usize,
    pub address_raw: String,
    pub address_norm: String,
    pub county: Option<String>,
    pub instrument: Option<String>,
    pub pages_for_cost: u32,
}

// Error types
#[derive(Debug, thiserror::Error)]
pub enum MailscanError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF error: {0}")]
    Pdf(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("OCR error: {0}")]
    Ocr(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("{resource} not found. {remedy}")]
    MissingInput { resource: PathBuf, remedy: String },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<lopdf::Error> for MailscanError {
    fn from(err: lopdf::Error) -> Self {
        MailscanError::Pdf(err.to_string())
    }
}

impl From<toml::de::Error> for MailscanError {
    fn from(err: toml::de::Error) -> Self {
        MailscanError::Config(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MailscanError>;

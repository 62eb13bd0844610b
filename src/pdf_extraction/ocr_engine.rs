// OCR engine: tesseract over a cropped page image
use image::DynamicImage;
use std::process::Command;
use tempfile::TempDir;
use tracing::debug;

use crate::config::OcrConfig;
use crate::system_pdf_renderer::{command_available, SystemPdfRenderer};
use crate::types::{MailscanError, Result};

/// Anything that turns an image into raw text.
pub trait TextRecognizer {
    fn recognize(&self, image: &DynamicImage) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    command: String,
    language: String,
}

impl TesseractRecognizer {
    pub fn new(command: impl Into<String>, language: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            language: language.into(),
        }
    }

    pub fn from_config(config: &OcrConfig) -> Self {
        Self::new(&config.tesseract_cmd, &config.language)
    }

    pub fn is_available(&self) -> bool {
        command_available(&self.command, "--version")
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn recognize(&self, image: &DynamicImage) -> Result<String> {
        let temp_dir = TempDir::new()?;
        let input = temp_dir.path().join("region.png");
        image.save(&input)?;

        let output = Command::new(&self.command)
            .arg(&input)
            .arg("stdout")
            .args(["-l", &self.language])
            .output()
            .map_err(|e| MailscanError::Ocr(format!("{}: {}", self.command, e)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(MailscanError::Ocr(format!("{} failed: {}", self.command, stderr.trim())));
        }

        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!("tesseract returned {} chars", text.len());
        Ok(text)
    }
}

/// Decide once, at start-up, whether the OCR fallback can run at all.
pub fn ocr_available(config: &OcrConfig) -> bool {
    if !config.enabled {
        return false;
    }
    SystemPdfRenderer::new(&config.pdftoppm_cmd).is_available()
        && TesseractRecognizer::from_config(config).is_available()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn disabled_config_is_never_available() {
        let config = OcrConfig {
            enabled: false,
            ..OcrConfig::default()
        };
        assert!(!ocr_available(&config));
    }

    #[test]
    fn missing_tesseract_is_unavailable() {
        let config = OcrConfig {
            tesseract_cmd: "mailscan-no-such-tesseract".to_string(),
            ..OcrConfig::default()
        };
        assert!(!ocr_available(&config));
    }

    #[test]
    fn missing_tesseract_is_an_ocr_error() {
        let recognizer = TesseractRecognizer::new("mailscan-no-such-tesseract", "eng");
        let image = DynamicImage::new_rgb8(4, 4);
        let err = recognizer.recognize(&image).unwrap_err();
        assert!(matches!(err, MailscanError::Ocr(_)));
    }
}

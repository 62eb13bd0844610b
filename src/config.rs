// Configuration for mailscan, loaded from mailscan.toml
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

use crate::types::{MailscanError, Result};

pub const DEFAULT_CONFIG_FILE: &str = "mailscan.toml";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub scan: ScanConfig,
    #[serde(default)]
    pub anchor: AnchorConfig,
    #[serde(default)]
    pub ocr: OcrConfig,
    #[serde(default)]
    pub address: AddressConfig,
}

/// Region fractions. `right_height` falls back to `left_height` when unset.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct RegionRatios {
    #[serde(default)]
    pub header_skip: f32,
    pub left_width: f32,
    pub left_height: f32,
    pub right_width: f32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right_height: Option<f32>,
}

impl RegionRatios {
    pub fn right_height(&self) -> f32 {
        self.right_height.unwrap_or(self.left_height)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScanConfig {
    #[serde(default = "default_scan_regions")]
    pub regions: RegionRatios,
    #[serde(default = "default_max_address_lines")]
    pub max_address_lines: usize,
    #[serde(default)]
    pub parse_metadata: bool,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            regions: default_scan_regions(),
            max_address_lines: default_max_address_lines(),
            parse_metadata: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AnchorConfig {
    #[serde(default = "default_anchor_regions")]
    pub regions: RegionRatios,
    #[serde(default = "default_max_lines_after")]
    pub max_lines_after: usize,
    #[serde(default = "default_anchor_phrases")]
    pub phrases: Vec<String>,
}

impl Default for AnchorConfig {
    fn default() -> Self {
        Self {
            regions: default_anchor_regions(),
            max_lines_after: default_max_lines_after(),
            phrases: default_anchor_phrases(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OcrConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_dpi")]
    pub dpi: u32,
    #[serde(default = "default_tesseract_cmd")]
    pub tesseract_cmd: String,
    #[serde(default = "default_pdftoppm_cmd")]
    pub pdftoppm_cmd: String,
    #[serde(default = "default_language")]
    pub language: String,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dpi: default_dpi(),
            tesseract_cmd: default_tesseract_cmd(),
            pdftoppm_cmd: default_pdftoppm_cmd(),
            language: default_language(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AddressConfig {
    #[serde(default = "default_denylist")]
    pub denylist: Vec<String>,
    /// Ordered whole-word replacements applied by the normalizer.
    #[serde(default = "default_substitutions")]
    pub substitutions: Vec<(String, String)>,
}

impl Default for AddressConfig {
    fn default() -> Self {
        Self {
            denylist: default_denylist(),
            substitutions: default_substitutions(),
        }
    }
}

fn default_true() -> bool { true }
fn default_dpi() -> u32 { 300 }
fn default_max_address_lines() -> usize { 6 }
fn default_max_lines_after() -> usize { 5 }
fn default_tesseract_cmd() -> String { "tesseract".to_string() }
fn default_pdftoppm_cmd() -> String { "pdftoppm".to_string() }
fn default_language() -> String { "eng".to_string() }

// Skip the recorder banner, then a large top-left block where the mail-to sits.
fn default_scan_regions() -> RegionRatios {
    RegionRatios {
        header_skip: 0.12,
        left_width: 0.62,
        left_height: 0.45,
        right_width: 0.38,
        right_height: None,
    }
}

fn default_anchor_regions() -> RegionRatios {
    RegionRatios {
        header_skip: 0.0,
        left_width: 0.35,
        left_height: 0.28,
        right_width: 0.35,
        right_height: None,
    }
}

fn default_anchor_phrases() -> Vec<String> {
    [
        "after recording mail to",
        "when recorded mail to",
        "recording mail to",
        "return to",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_denylist() -> Vec<String> {
    [
        "OFFICIAL RECORDS",
        "RECORDER",
        "DOCUMENT",
        "DOC#",
        "INSTRUMENT",
        "PAGES",
        "DATE",
        "TIME",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

fn default_substitutions() -> Vec<(String, String)> {
    [
        ("STREET", "ST"),
        ("AVENUE", "AVE"),
        ("ROAD", "RD"),
        ("BOULEVARD", "BLVD"),
        ("DRIVE", "DR"),
        ("COURT", "CT"),
        ("LANE", "LN"),
        ("TERRACE", "TER"),
        ("APARTMENT", "APT"),
        ("SUITE", "STE"),
    ]
    .iter()
    .map(|(from, to)| (from.to_string(), to.to_string()))
    .collect()
}

impl Config {
    /// Load from an explicit path (must exist), or from `mailscan.toml` in the
    /// working directory when present, or fall back to defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => {
                if !path.exists() {
                    return Err(MailscanError::MissingInput {
                        resource: path.to_path_buf(),
                        remedy: "Create it or drop --config to use the defaults.".to_string(),
                    });
                }
                Self::from_file(path)
            }
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::from_file(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| MailscanError::Config(e.to_string()))?;
        fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_recorder_layout() {
        let config = Config::default();
        assert_eq!(config.scan.regions.header_skip, 0.12);
        assert_eq!(config.scan.regions.left_width, 0.62);
        assert_eq!(config.scan.regions.right_height(), 0.45);
        assert_eq!(config.scan.max_address_lines, 6);
        assert_eq!(config.anchor.max_lines_after, 5);
        assert_eq!(config.ocr.dpi, 300);
        assert_eq!(config.address.denylist.len(), 8);
        assert_eq!(config.address.substitutions[0], ("STREET".to_string(), "ST".to_string()));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = Config::from_toml(
            r#"
            [ocr]
            enabled = false

            [scan]
            max_address_lines = 4
            "#,
        )
        .unwrap();
        assert!(!config.ocr.enabled);
        assert_eq!(config.ocr.dpi, 300);
        assert_eq!(config.scan.max_address_lines, 4);
        assert_eq!(config.scan.regions.left_height, 0.45);
        assert_eq!(config.anchor.phrases.len(), 4);
    }

    #[test]
    fn right_height_override() {
        let config = Config::from_toml(
            r#"
            [scan.regions]
            left_width = 0.5
            left_height = 0.3
            right_width = 0.4
            right_height = 0.2
            "#,
        )
        .unwrap();
        assert_eq!(config.scan.regions.header_skip, 0.0);
        assert_eq!(config.scan.regions.right_height(), 0.2);
    }

    #[test]
    fn explicit_missing_config_is_fatal() {
        let err = Config::load(Some(Path::new("/definitely/not/here.toml"))).unwrap_err();
        assert!(matches!(err, MailscanError::MissingInput { .. }));
    }

    #[test]
    fn save_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mailscan.toml");
        let mut config = Config::default();
        config.scan.parse_metadata = true;
        config.save(&path).unwrap();
        let loaded = Config::load(Some(path.as_path())).unwrap();
        assert!(loaded.scan.parse_metadata);
        assert_eq!(loaded.address.substitutions, config.address.substitutions);
    }
}

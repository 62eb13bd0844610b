// Anchor-driven field parsing for the two-stage workflow
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::types::{MailscanError, Result};

static COUNTY: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\bcounty\b").unwrap());
static INSTRUMENT_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(?:instrument(?:\s*(?:number|no)\b\.?)?|inst\.?\s*no\b\.?|doc(?:ument)?\s*no\b\.?)\s*[:#]?\s*(?P<value>[A-Za-z0-9\-/]+)",
    )
    .unwrap()
});
static GENERIC_ID: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[A-Za-z0-9]{4,}[A-Za-z0-9\-/]*\b").unwrap());

/// How the recipient block was found.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Confidence {
    /// An anchor phrase delimited the block.
    Anchored,
    /// No anchor; the first lines were taken as a guess.
    Fallback,
    Empty,
}

impl Confidence {
    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::Anchored => "anchored",
            Confidence::Fallback => "fallback",
            Confidence::Empty => "empty",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecipientParse {
    pub recipient: String,
    pub address: String,
    pub confidence: Confidence,
}

impl RecipientParse {
    fn empty() -> Self {
        Self {
            recipient: String::new(),
            address: String::new(),
            confidence: Confidence::Empty,
        }
    }

    fn from_lines(lines: &[&str], confidence: Confidence) -> Self {
        match lines.split_first() {
            Some((name, rest)) => Self {
                recipient: name.to_string(),
                address: rest.join("\n"),
                confidence,
            },
            None => Self::empty(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecipientParser {
    anchor: Regex,
    max_lines_after: usize,
}

impl RecipientParser {
    /// Phrases match case-insensitively with flexible inner whitespace and an
    /// optional trailing colon.
    pub fn new<S: AsRef<str>>(phrases: &[S], max_lines_after: usize) -> Result<Self> {
        let alternatives: Vec<String> = phrases
            .iter()
            .map(|p| {
                p.as_ref()
                    .split_whitespace()
                    .map(regex::escape)
                    .collect::<Vec<_>>()
                    .join(r"\s+")
            })
            .filter(|p| !p.is_empty())
            .collect();
        if alternatives.is_empty() {
            return Err(MailscanError::Config("no anchor phrases configured".to_string()));
        }

        let anchor = Regex::new(&format!(r"(?i)(?:{}):?", alternatives.join("|")))
            .map_err(|e| MailscanError::Config(format!("bad anchor phrase: {}", e)))?;
        Ok(Self { anchor, max_lines_after })
    }

    pub fn parse(&self, text: &str) -> RecipientParse {
        let text = text.replace('\r', "\n");
        let lines: Vec<&str> = text.split('\n').map(str::trim).collect();

        let start = lines.iter().position(|l| self.anchor.is_match(l)).map(|i| i + 1);
        let (from, confidence) = match start {
            Some(start) => (start, Confidence::Anchored),
            None => (0, Confidence::Fallback),
        };

        let candidate: Vec<&str> = lines[from..]
            .iter()
            .copied()
            .filter(|l| !l.is_empty())
            .take(self.max_lines_after)
            .collect();

        RecipientParse::from_lines(&candidate, confidence)
    }
}

/// County line and instrument number from the top-right region.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecordingMeta {
    pub county: String,
    pub instrument: String,
}

pub fn parse_county_and_instrument(text: &str) -> RecordingMeta {
    let text = text.replace('\r', "\n");
    let lines: Vec<&str> = text.split('\n').map(str::trim).filter(|l| !l.is_empty()).collect();

    let county = lines
        .iter()
        .find(|l| COUNTY.is_match(l))
        .map(|l| l.to_string())
        .unwrap_or_default();

    let labelled = lines.iter().find_map(|l| {
        INSTRUMENT_LABEL
            .captures(l)
            .and_then(|c| c.name("value"))
            .map(|m| m.as_str().to_string())
    });

    // Common shapes: 2024-012345, 1234567, 2024R012345
    let instrument = labelled.unwrap_or_else(|| {
        let joined = lines.join(" ");
        GENERIC_ID
            .find_iter(&joined)
            .map(|m| m.as_str())
            .find(|tok| tok.chars().any(|c| c.is_ascii_digit()) && (6..=18).contains(&tok.len()))
            .map(str::to_string)
            .unwrap_or_default()
    });

    RecordingMeta { county, instrument }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AnchorConfig;
    use rstest::rstest;

    fn parser() -> RecipientParser {
        let config = AnchorConfig::default();
        RecipientParser::new(&config.phrases, config.max_lines_after).unwrap()
    }

    #[test]
    fn anchored_block() {
        let parsed = parser().parse("After Recording Mail to:\nJOHN DOE\n123 MAIN ST\nTOWN, CA 90210");
        assert_eq!(parsed.recipient, "JOHN DOE");
        assert_eq!(parsed.address, "123 MAIN ST\nTOWN, CA 90210");
        assert_eq!(parsed.confidence, Confidence::Anchored);
    }

    #[test]
    fn anchor_skips_blank_lines_and_caps_length() {
        let text = "RECORDING REQUESTED BY\nWhen   recorded, mail to\nWHEN RECORDED MAIL TO\n\nACME LLC\n\n1 A ST\n2\n3\n4\n5";
        let parsed = parser().parse(text);
        assert_eq!(parsed.recipient, "ACME LLC");
        assert_eq!(parsed.address, "1 A ST\n2\n3\n4");
    }

    #[test]
    fn return_to_anchor_mid_line() {
        let parsed = parser().parse("Please return to: \r\nJane Roe\r\nPO Box 5");
        assert_eq!(parsed.recipient, "Jane Roe");
        assert_eq!(parsed.address, "PO Box 5");
    }

    #[test]
    fn no_anchor_falls_back_to_first_lines() {
        let parsed = parser().parse("\nJANE ROE\n9 ELM RD\nCITY, NV 89501");
        assert_eq!(parsed.recipient, "JANE ROE");
        assert_eq!(parsed.address, "9 ELM RD\nCITY, NV 89501");
        assert_eq!(parsed.confidence, Confidence::Fallback);
    }

    #[test]
    fn nothing_after_anchor_is_empty() {
        let parsed = parser().parse("AFTER RECORDING MAIL TO:");
        assert_eq!(parsed, RecipientParse::empty());
        assert_eq!(parser().parse("  \n "), RecipientParse::empty());
    }

    #[test]
    fn empty_phrase_list_is_rejected() {
        let phrases: Vec<String> = vec![];
        assert!(RecipientParser::new(&phrases, 5).is_err());
    }

    #[test]
    fn county_line_is_whole_word() {
        let meta = parse_county_and_instrument("Countywide Services\nOfficial Records\nSan Diego County Recorder");
        assert_eq!(meta.county, "San Diego County Recorder");
    }

    #[rstest]
    #[case("DOC# 2024-0001234\nInstrument Number: 2024R012345", "2024R012345")]
    #[case("INST NO. 778899", "778899")]
    #[case("Document No: AB-12/34", "AB-12/34")]
    #[case("doc no 5566778", "5566778")]
    #[case("Instrument # 2023-045", "2023-045")]
    #[case("INSTRUMENT NOTICE 2024", "NOTICE")]
    #[case("Instrument No. 2024-77", "2024-77")]
    fn labelled_instrument(#[case] text: &str, #[case] expected: &str) {
        assert_eq!(parse_county_and_instrument(text).instrument, expected);
    }

    #[rstest]
    #[case("RECORDED IN OFFICIAL RECORDS\n2024012345\nFEES 12.00", "2024012345")]
    #[case("PAGE 1 OF 3\nABCD 12345 2024-000777", "2024-000777")]
    #[case("no ids here", "")]
    #[case("TOKEN1234567890123456789", "")]
    fn unlabelled_instrument(#[case] text: &str, #[case] expected: &str) {
        assert_eq!(parse_county_and_instrument(text).instrument, expected);
    }

    #[test]
    fn empty_region_yields_empty_meta() {
        assert_eq!(parse_county_and_instrument(""), RecordingMeta::default());
    }
}

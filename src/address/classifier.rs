// Does a block of text plausibly hold a US mailing address?
use once_cell::sync::Lazy;
use regex::Regex;

// 'SAN DIEGO, CA 92101' (comma optional)
static STATE_ZIP: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b[A-Z]{2}\b[\s,]+\d{5}(-\d{4})?\b").unwrap());
static BARE_ZIP: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{5}(-\d{4})?\b").unwrap());

/// True for a state + ZIP pair or any bare ZIP (ZIP+4 included).
pub fn looks_like_address_block(text_block: &str) -> bool {
    let text = text_block.to_uppercase();
    STATE_ZIP.is_match(&text) || BARE_ZIP.is_match(&text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("JOHN DOE\n123 MAIN ST\nSAN DIEGO, CA 92101")]
    #[case("San Diego CA 92101")]
    #[case("somewhere CA 92101 more text")]
    #[case("zip only 90210-1234")]
    #[case("90210")]
    #[case("ca, 92101")]
    fn positives(#[case] text: &str) {
        assert!(looks_like_address_block(text));
    }

    #[rstest]
    #[case("")]
    #[case("JOHN DOE\n123 MAIN ST")]
    #[case("PHONE 1234")]
    #[case("ORDER 123456")]
    #[case("A1234B")]
    fn negatives(#[case] text: &str) {
        assert!(!looks_like_address_block(text));
    }
}

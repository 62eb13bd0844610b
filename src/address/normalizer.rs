// Address normalization into a grouping key
use once_cell::sync::Lazy;
use regex::{NoExpand, Regex};

use crate::types::{MailscanError, Result};

static DISALLOWED: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w\s#&/,-]").unwrap());
static COMMA: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*,\s*").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

/// Compiled substitution table. Build once, share everywhere.
#[derive(Debug, Clone)]
pub struct Normalizer {
    substitutions: Vec<(Regex, String)>,
}

impl Normalizer {
    /// `table` is applied in order, each entry as a whole-word match.
    pub fn new<S: AsRef<str>>(table: &[(S, S)]) -> Result<Self> {
        let substitutions = table
            .iter()
            .map(|(from, to)| {
                let pattern = format!(r"\b{}\b", regex::escape(&from.as_ref().to_uppercase()));
                Regex::new(&pattern)
                    .map(|re| (re, to.as_ref().to_uppercase()))
                    .map_err(|e| MailscanError::Config(format!("bad substitution {:?}: {}", from.as_ref(), e)))
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { substitutions })
    }

    /// Uppercase, prune punctuation (keeping `#&/-`), fold commas and
    /// whitespace to single spaces, then abbreviate suffixes and units.
    pub fn normalize(&self, addr: &str) -> String {
        let s = addr.to_uppercase();
        let s = DISALLOWED.replace_all(&s, " ");
        let s = COMMA.replace_all(&s, " ");
        let mut s = WHITESPACE.replace_all(&s, " ").trim().to_string();

        for (pattern, replacement) in &self.substitutions {
            s = pattern.replace_all(&s, NoExpand(replacement)).into_owned();
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AddressConfig;
    use rstest::rstest;

    fn normalizer() -> Normalizer {
        Normalizer::new(&AddressConfig::default().substitutions).unwrap()
    }

    #[test]
    fn street_and_unit_variants_share_a_key() {
        let n = normalizer();
        assert_eq!(
            n.normalize("123 Main Street, Apt. 4B"),
            n.normalize("123 MAIN ST APT 4B")
        );
        assert_eq!(n.normalize("123 MAIN ST APT 4B"), "123 MAIN ST APT 4B");
    }

    #[rstest]
    #[case("456 Ocean Avenue\nSuite 200", "456 OCEAN AVE STE 200")]
    #[case("9 Elm   Road", "9 ELM RD")]
    #[case("1 Sunset Boulevard", "1 SUNSET BLVD")]
    #[case("77 Oak Drive Apartment 3", "77 OAK DR APT 3")]
    #[case("5 King Court; Lane 2", "5 KING CT LN 2")]
    #[case("PO Box #12 & Co/ 3-A", "PO BOX #12 & CO/ 3-A")]
    #[case("SAN DIEGO, CA 92101", "SAN DIEGO CA 92101")]
    #[case("", "")]
    fn canonical_forms(#[case] raw: &str, #[case] key: &str) {
        assert_eq!(normalizer().normalize(raw), key);
    }

    #[rstest]
    #[case("STREETWISE DRIVEWAY")]
    #[case("COURTNEY LANEY")]
    fn partial_words_untouched(#[case] raw: &str) {
        assert_eq!(normalizer().normalize(raw), raw);
    }

    #[rstest]
    #[case("123 Main Street, Apt. 4B")]
    #[case("  weird!!  chars** Terrace , , ,")]
    #[case("Unit 5 / Suite 9 -- Blvd.")]
    #[case("ÉCOLE Street\t\tnº 4")]
    fn idempotent(#[case] raw: &str) {
        let n = normalizer();
        let once = n.normalize(raw);
        assert_eq!(n.normalize(&once), once);
    }
}

//! Organization name canonicalization.
//!
//! Discovery sources report employers inconsistently ("St. Example Hospital",
//! "Saint Example Hospital, Inc.", "Example Hospital CA"). A name is reduced to a
//! *set* of acceptable variants, and two names are considered the same
//! organization when their variant sets overlap (see [`crate::matcher`]).
//!
//! Steps, in order:
//! 1. case-fold, trim, turn punctuation (except `&`) into whitespace
//! 2. drop trailing two-letter US state codes, never emptying the name
//! 3. emit the fully expanded and fully contracted abbreviation spellings
//! 4. strip trailing legal/generic suffixes transitively, keeping every form
//! 5. collapse whitespace

use once_cell::sync::Lazy;
use std::collections::{BTreeSet, HashSet};

const DEFAULT_ABBREVIATIONS: [(&str, &str); 7] = [
    ("st", "saint"),
    ("mt", "mount"),
    ("ft", "fort"),
    ("&", "and"),
    ("ctr", "center"),
    ("hosp", "hospital"),
    ("univ", "university"),
];

const DEFAULT_SUFFIXES: [&str; 20] = [
    "inc",
    "incorporated",
    "llc",
    "llp",
    "ltd",
    "plc",
    "corp",
    "corporation",
    "co",
    "company",
    "hospital",
    "hospitals",
    "medical center",
    "health system",
    "health systems",
    "healthcare system",
    "healthcare",
    "system",
    "systems",
    "group",
];

const US_STATE_CODES: [&str; 51] = [
    "al", "ak", "az", "ar", "ca", "co", "ct", "de", "dc", "fl", "ga", "hi", "id", "il", "in",
    "ia", "ks", "ky", "la", "me", "md", "ma", "mi", "mn", "ms", "mo", "mt", "ne", "nv", "nh",
    "nj", "nm", "ny", "nc", "nd", "oh", "ok", "or", "pa", "ri", "sc", "sd", "tn", "tx", "ut",
    "vt", "va", "wa", "wv", "wi", "wy",
];

/// Normalizer with the built-in tables, shared by the free functions.
pub static DEFAULT_NORMALIZER: Lazy<NameNormalizer> = Lazy::new(NameNormalizer::default);

/// Configurable organization-name normalizer.
#[derive(Debug, Clone)]
pub struct NameNormalizer {
    /// `(short, long)` spellings treated as interchangeable.
    abbreviations: Vec<(String, String)>,
    /// Suffixes as expanded token sequences, longest first.
    suffixes: Vec<Vec<String>>,
    state_codes: HashSet<String>,
}

impl Default for NameNormalizer {
    fn default() -> Self {
        Self::new(
            DEFAULT_ABBREVIATIONS
                .iter()
                .map(|(s, l)| (s.to_string(), l.to_string()))
                .collect(),
            DEFAULT_SUFFIXES.iter().map(|s| s.to_string()).collect(),
        )
    }
}

impl NameNormalizer {
    pub fn new(abbreviations: Vec<(String, String)>, suffixes: Vec<String>) -> Self {
        let mut normalizer = Self {
            abbreviations: abbreviations
                .into_iter()
                .map(|(s, l)| (s.to_lowercase(), l.to_lowercase()))
                .collect(),
            suffixes: Vec::new(),
            state_codes: US_STATE_CODES.iter().map(|s| s.to_string()).collect(),
        };

        let mut suffixes: Vec<Vec<String>> = suffixes
            .iter()
            .map(|s| normalizer.expand(&tokenize(s)))
            .filter(|tokens| !tokens.is_empty())
            .collect();
        suffixes.sort_by(|a, b| b.len().cmp(&a.len()).then_with(|| a.cmp(b)));
        suffixes.dedup();
        normalizer.suffixes = suffixes;
        normalizer
    }

    /// Replaces the suffix table, keeping the abbreviation table.
    pub fn with_suffixes(self, suffixes: Vec<String>) -> Self {
        Self::new(self.abbreviations, suffixes)
    }

    /// All acceptable variant spellings of `name`. Empty input yields an empty set.
    pub fn normalize(&self, name: &str) -> BTreeSet<String> {
        let base = self.strip_state_codes(tokenize(name));
        let mut variants = BTreeSet::new();
        if base.is_empty() {
            return variants;
        }

        for form in [self.expand(&base), self.contract(&base)] {
            for stripped in self.suffix_closure(form) {
                variants.insert(stripped.join(" "));
            }
        }
        variants
    }

    /// Single canonical spelling: abbreviations expanded, state codes dropped,
    /// suffixes kept. Normalizing the canonical form yields the same variant set.
    pub fn canonical(&self, name: &str) -> String {
        self.expand(&self.strip_state_codes(tokenize(name)))
            .join(" ")
    }

    fn strip_state_codes(&self, mut tokens: Vec<String>) -> Vec<String> {
        while tokens.len() > 1
            && tokens
                .last()
                .is_some_and(|last| self.state_codes.contains(last.as_str()))
        {
            tokens.pop();
        }
        tokens
    }

    fn expand(&self, tokens: &[String]) -> Vec<String> {
        tokens
            .iter()
            .map(|t| {
                self.abbreviations
                    .iter()
                    .find(|(short, _)| short == t)
                    .map(|(_, long)| long.clone())
                    .unwrap_or_else(|| t.clone())
            })
            .collect()
    }

    fn contract(&self, tokens: &[String]) -> Vec<String> {
        tokens
            .iter()
            .map(|t| {
                self.abbreviations
                    .iter()
                    .find(|(short, long)| long == t || short == t)
                    .map(|(short, _)| short.clone())
                    .unwrap_or_else(|| t.clone())
            })
            .collect()
    }

    /// The form itself plus every form reachable by stripping one trailing suffix
    /// at a time. A strip that would empty the name is skipped.
    fn suffix_closure(&self, form: Vec<String>) -> Vec<Vec<String>> {
        let mut seen: BTreeSet<Vec<String>> = BTreeSet::new();
        let mut frontier = vec![form];

        while let Some(current) = frontier.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            let expanded = self.expand(&current);
            for suffix in &self.suffixes {
                if suffix.len() >= current.len() {
                    continue;
                }
                if expanded[current.len() - suffix.len()..] == suffix[..] {
                    frontier.push(current[..current.len() - suffix.len()].to_vec());
                }
            }
        }

        seen.into_iter().collect()
    }
}

/// Lower-cases and splits on anything that is not alphanumeric; `&` stands alone.
fn tokenize(name: &str) -> Vec<String> {
    let mut cleaned = String::with_capacity(name.len());
    for c in name.trim().chars().flat_map(char::to_lowercase) {
        match c {
            '&' => cleaned.push_str(" & "),
            '\'' | '\u{2019}' => {}
            c if c.is_alphanumeric() => cleaned.push(c),
            _ => cleaned.push(' '),
        }
    }
    cleaned.split_whitespace().map(str::to_string).collect()
}

/// [`NameNormalizer::normalize`] with the default tables.
pub fn normalize(name: &str) -> BTreeSet<String> {
    DEFAULT_NORMALIZER.normalize(name)
}

/// [`NameNormalizer::canonical`] with the default tables.
pub fn canonical(name: &str) -> String {
    DEFAULT_NORMALIZER.canonical(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_and_whitespace_are_folded() {
        let variants = normalize("  Example   HEALTH  ");
        assert!(variants.contains("example health"));
    }

    #[test]
    fn test_saint_abbreviation_both_directions() {
        let from_short = normalize("St. Example Hospital");
        let from_long = normalize("Saint Example Hospital");
        assert_eq!(from_short, from_long);
        assert!(from_short.contains("saint example hospital"));
        assert!(from_short.contains("st example hospital"));
    }

    #[test]
    fn test_suffix_stripping_keeps_unstripped_form() {
        let variants = normalize("Example Health System");
        assert!(variants.contains("example health system"));
        assert!(variants.contains("example health"));
        assert!(variants.contains("example"));
    }

    #[test]
    fn test_legal_suffix_with_punctuation() {
        let variants = normalize("Example Health, Inc.");
        assert!(variants.contains("example health inc"));
        assert!(variants.contains("example health"));
    }

    #[test]
    fn test_trailing_state_code_is_dropped() {
        let variants = normalize("Example Medical Center TX");
        assert!(variants.contains("example medical center"));
        assert!(variants.contains("example"));
        assert!(!variants.iter().any(|v| v.ends_with(" tx")));
    }

    #[test]
    fn test_stripping_never_empties_the_name() {
        // Every token is strippable, the name itself must survive
        let variants = normalize("Hospital");
        assert_eq!(variants, BTreeSet::from(["hospital".to_string(), "hosp".to_string()]));

        let states_only = normalize("CA");
        assert_eq!(states_only, BTreeSet::from(["ca".to_string()]));
    }

    #[test]
    fn test_empty_name_has_no_variants() {
        assert!(normalize("   ").is_empty());
        assert!(normalize("—").is_empty());
    }

    #[test]
    fn test_canonical_round_trip_is_stable() {
        for name in [
            "St. Example Hospital, Inc.",
            "Mt. Sinai Medical Center NY",
            "Example Health & Wellness Co",
            "Example Health — North Campus",
        ] {
            assert_eq!(normalize(&canonical(name)), normalize(name), "{}", name);
        }
    }

    #[test]
    fn test_custom_suffix_table() {
        let normalizer = NameNormalizer::default().with_suffixes(vec!["clinic".to_string()]);
        let variants = normalizer.normalize("Example Clinic Inc");
        assert!(variants.contains("example clinic inc"));
        assert!(!variants.contains("example clinic"));

        let variants = normalizer.normalize("Example Clinic");
        assert!(variants.contains("example"));
    }
}

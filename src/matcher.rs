use crate::name_normalizer::{NameNormalizer, DEFAULT_NORMALIZER};
use serde::Serialize;
use std::collections::BTreeSet;

/// A target organization together with its precomputed variant set.
#[derive(Debug, Clone, Serialize)]
pub struct TargetOrganization {
    pub name: String,
    pub variants: BTreeSet<String>,
}

impl TargetOrganization {
    pub fn new(name: &str, normalizer: &NameNormalizer) -> Self {
        Self {
            name: name.trim().to_string(),
            variants: normalizer.normalize(name),
        }
    }

    pub fn matches(&self, candidate_org: &str, normalizer: &NameNormalizer) -> bool {
        matches_with(&self.variants, candidate_org, normalizer)
    }
}

/// Recall-favoring organization match.
///
/// True when the candidate's variants intersect the target's, or when one
/// variant contains the other on token boundaries ("example health" inside
/// "example health north campus"). Later cascade rules weed out false positives.
pub fn matches(target_variants: &BTreeSet<String>, candidate_org: &str) -> bool {
    matches_with(target_variants, candidate_org, &DEFAULT_NORMALIZER)
}

pub fn matches_with(
    target_variants: &BTreeSet<String>,
    candidate_org: &str,
    normalizer: &NameNormalizer,
) -> bool {
    let candidate_variants = normalizer.normalize(candidate_org);
    if candidate_variants.is_empty() || target_variants.is_empty() {
        return false;
    }

    if !target_variants.is_disjoint(&candidate_variants) {
        return true;
    }

    target_variants.iter().any(|target| {
        candidate_variants
            .iter()
            .any(|candidate| contains_tokens(target, candidate) || contains_tokens(candidate, target))
    })
}

/// True when `needle` occurs in `haystack` on token boundaries. Both sides are
/// space-separated token strings.
pub fn contains_tokens(haystack: &str, needle: &str) -> bool {
    format!(" {} ", haystack).contains(&format!(" {} ", needle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name_normalizer::normalize;

    #[test]
    fn test_saint_abbreviation_and_suffix_match() {
        let target = normalize("Saint Example Hospital Inc");
        assert!(matches(&target, "St. Example Hospital"));
    }

    #[test]
    fn test_subsidiary_campus_matches_parent() {
        let target = normalize("Example Health");
        assert!(matches(&target, "Example Health — North Campus"));
    }

    #[test]
    fn test_parent_matches_when_candidate_is_shorter() {
        let target = normalize("Example Health North Campus");
        assert!(matches(&target, "Example Health"));
    }

    #[test]
    fn test_unrelated_organization_does_not_match() {
        let target = normalize("Example Health System");
        assert!(!matches(&target, "Acme Logistics LLC"));
    }

    #[test]
    fn test_partial_token_is_not_a_match() {
        let target = normalize("Examples Foundation");
        assert!(!matches(&target, "Example Corp"));
    }

    #[test]
    fn test_empty_candidate_never_matches() {
        let target = normalize("Example Health");
        assert!(!matches(&target, ""));
        assert!(!matches(&BTreeSet::new(), "Example Health"));
    }

    #[test]
    fn test_target_organization_helper() {
        let normalizer = NameNormalizer::default();
        let target = TargetOrganization::new("Example Health System", &normalizer);
        assert!(target.variants.contains("example health"));
        assert!(target.matches("Example Health Inc", &normalizer));
    }
}

//! Merges the two labeled candidate lists into one list of unique people.
//!
//! Matching is O(n): Source B is indexed by normalized profile reference and by
//! identity key, and every Source A candidate consumes at most one B entry.
//! Names spelled differently across sources are not merged.

use crate::models::{Candidate, MergedProspect, Source};
use std::collections::{BTreeSet, HashMap};

/// Canonical form of a profile reference for equality checks
/// (scheme, `www.`, query string and trailing slash removed).
pub fn normalize_profile_ref(profile_ref: &str) -> String {
    let lower = profile_ref.trim().to_lowercase();
    let without_scheme = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"))
        .unwrap_or(&lower);
    let without_www = without_scheme.strip_prefix("www.").unwrap_or(without_scheme);
    let without_query = without_www.split(['?', '#']).next().unwrap_or_default();
    without_query.trim_end_matches('/').to_string()
}

pub fn deduplicate(list_a: &[Candidate], list_b: &[Candidate]) -> Vec<MergedProspect> {
    let mut by_ref: HashMap<String, Vec<usize>> = HashMap::new();
    let mut by_identity: HashMap<&str, Vec<usize>> = HashMap::new();
    for (idx, candidate) in list_b.iter().enumerate() {
        if let Some(profile_ref) = candidate.profile_ref() {
            by_ref
                .entry(normalize_profile_ref(profile_ref))
                .or_default()
                .push(idx);
        }
        if !candidate.identity_key().is_empty() {
            by_identity
                .entry(candidate.identity_key())
                .or_default()
                .push(idx);
        }
    }

    let mut consumed = vec![false; list_b.len()];
    let mut merged = Vec::with_capacity(list_a.len() + list_b.len());

    for candidate_a in list_a {
        let first_unconsumed = |indices: Option<&Vec<usize>>, consumed: &[bool]| {
            indices.and_then(|idxs| idxs.iter().copied().find(|&i| !consumed[i]))
        };

        let by_ref_match = candidate_a
            .profile_ref()
            .map(normalize_profile_ref)
            .and_then(|r| first_unconsumed(by_ref.get(&r), &consumed));
        let matched = by_ref_match.or_else(|| {
            if candidate_a.identity_key().is_empty() {
                None
            } else {
                first_unconsumed(by_identity.get(candidate_a.identity_key()), &consumed)
            }
        });

        let index = merged.len();
        match matched {
            Some(b_idx) => {
                consumed[b_idx] = true;
                tracing::debug!(
                    "Merged '{}' found by both sources",
                    candidate_a.full_name()
                );
                merged.push(merge_pair(candidate_a, &list_b[b_idx], index));
            }
            None => merged.push(from_single(candidate_a, index)),
        }
    }

    for (idx, candidate_b) in list_b.iter().enumerate() {
        if !consumed[idx] {
            let index = merged.len();
            merged.push(from_single(candidate_b, index));
        }
    }

    tracing::info!(
        "Deduplicated {} + {} candidate(s) into {} prospect(s)",
        list_a.len(),
        list_b.len(),
        merged.len()
    );
    merged
}

fn from_single(candidate: &Candidate, discovery_index: usize) -> MergedProspect {
    MergedProspect {
        identity_key: candidate.identity_key().to_string(),
        full_name: candidate.full_name().to_string(),
        title: candidate.title_raw().to_string(),
        organization: candidate.organization_raw().to_string(),
        profile_ref: candidate.profile_ref().map(str::to_string),
        alternate_refs: Vec::new(),
        profile_data: candidate.profile_data().cloned(),
        sources_seen: BTreeSet::from([candidate.source()]),
        discovery_index,
        enrichment: None,
        validation: None,
        score: None,
    }
}

/// Source B wins unless only the Source A candidate carries profile data.
fn merge_pair(a: &Candidate, b: &Candidate, discovery_index: usize) -> MergedProspect {
    let (primary, secondary) = if a.profile_data().is_some() && b.profile_data().is_none() {
        (a, b)
    } else {
        (b, a)
    };

    let pick = |first: &str, second: &str| {
        if first.trim().is_empty() {
            second.to_string()
        } else {
            first.to_string()
        }
    };

    let profile_ref = primary
        .profile_ref()
        .or_else(|| secondary.profile_ref())
        .map(str::to_string);

    let alternate_refs = secondary
        .profile_ref()
        .filter(|alt| {
            profile_ref
                .as_deref()
                .map_or(true, |p| normalize_profile_ref(p) != normalize_profile_ref(alt))
        })
        .map(|alt| vec![alt.to_string()])
        .unwrap_or_default();

    MergedProspect {
        identity_key: a.identity_key().to_string(),
        full_name: pick(primary.full_name(), secondary.full_name()),
        title: pick(primary.title_raw(), secondary.title_raw()),
        organization: pick(primary.organization_raw(), secondary.organization_raw()),
        profile_ref,
        alternate_refs,
        profile_data: primary.profile_data().cloned(),
        sources_seen: BTreeSet::from([Source::SourceA, Source::SourceB]),
        discovery_index,
        enrichment: None,
        validation: None,
        score: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ProfileData;

    fn profile(name: &str, company: &str) -> ProfileData {
        ProfileData {
            full_name: name.to_string(),
            current_company: Some(company.to_string()),
            ..Default::default()
        }
    }

    fn a(name: &str, url: &str) -> Candidate {
        Candidate::new(Source::SourceA, name, "Example Health", "CFO", Some(url.to_string()), None, 0)
    }

    fn b(name: &str, url: &str, data: Option<ProfileData>) -> Candidate {
        Candidate::new(Source::SourceB, name, "Example Health", "CFO", Some(url.to_string()), data, 0)
    }

    #[test]
    fn test_same_name_merges_and_prefers_b_payload() {
        let list_a = vec![a("Jane Doe", "https://linkedin.com/in/jane")];
        let list_b = vec![b(
            "jane  doe",
            "https://linkedin.com/in/jane-doe",
            Some(profile("Jane Doe", "Example Health")),
        )];

        let merged = deduplicate(&list_a, &list_b);

        assert_eq!(merged.len(), 1);
        let prospect = &merged[0];
        assert_eq!(
            prospect.sources_seen,
            BTreeSet::from([Source::SourceA, Source::SourceB])
        );
        assert_eq!(prospect.profile_data, Some(profile("Jane Doe", "Example Health")));
        assert_eq!(prospect.profile_ref.as_deref(), Some("https://linkedin.com/in/jane-doe"));
        assert_eq!(prospect.alternate_refs, vec!["https://linkedin.com/in/jane".to_string()]);
    }

    #[test]
    fn test_a_payload_wins_when_b_has_none() {
        let list_a = vec![Candidate::new(
            Source::SourceA,
            "Jane Doe",
            "Example Health",
            "CFO",
            Some("https://linkedin.com/in/jane".into()),
            Some(profile("Jane Doe", "From A")),
            0,
        )];
        let list_b = vec![b("Jane Doe", "https://linkedin.com/in/jane", None)];

        let merged = deduplicate(&list_a, &list_b);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].profile_data, Some(profile("Jane Doe", "From A")));
        assert!(merged[0].alternate_refs.is_empty());
    }

    #[test]
    fn test_profile_ref_joins_different_spellings() {
        let list_a = vec![a("Jon Smith", "https://www.linkedin.com/in/jsmith/")];
        let list_b = vec![b(
            "Jonathan Smith",
            "http://linkedin.com/in/jsmith?trk=search",
            Some(profile("Jonathan Smith", "Example Health")),
        )];

        let merged = deduplicate(&list_a, &list_b);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].full_name, "Jonathan Smith");
    }

    #[test]
    fn test_unmatched_candidates_keep_their_source_and_order() {
        let list_a = vec![a("Ann One", "https://x/in/1"), a("Ann Two", "https://x/in/2")];
        let list_b = vec![
            b("Bob Three", "https://x/in/3", Some(profile("Bob Three", "E"))),
            b("Ann One", "https://x/in/4", Some(profile("Ann One", "E"))),
        ];

        let merged = deduplicate(&list_a, &list_b);

        let names: Vec<&str> = merged.iter().map(|m| m.full_name.as_str()).collect();
        assert_eq!(names, vec!["Ann One", "Ann Two", "Bob Three"]);
        assert_eq!(merged[1].sources_seen, BTreeSet::from([Source::SourceA]));
        assert!(merged[1].profile_data.is_none());
        assert_eq!(merged[2].sources_seen, BTreeSet::from([Source::SourceB]));
        let indices: Vec<usize> = merged.iter().map(|m| m.discovery_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_duplicate_names_consume_one_b_each() {
        let list_a = vec![a("Sam Lee", "https://x/in/a1"), a("Sam Lee", "https://x/in/a2")];
        let list_b = vec![b("Sam Lee", "https://x/in/b1", Some(profile("Sam Lee", "E")))];

        let merged = deduplicate(&list_a, &list_b);
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0].sources_seen.len(), 2);
        assert_eq!(merged[1].sources_seen, BTreeSet::from([Source::SourceA]));
    }

    #[test]
    fn test_normalize_profile_ref() {
        assert_eq!(
            normalize_profile_ref(" HTTPS://www.LinkedIn.com/in/Jane/?trk=x "),
            "linkedin.com/in/jane"
        );
    }
}

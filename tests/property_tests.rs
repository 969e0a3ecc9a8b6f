/// Property-based tests using proptest
/// Tests invariants and properties that should hold for all inputs
use proptest::prelude::*;
use prospect_pipeline::dedup::{deduplicate, normalize_profile_ref};
use prospect_pipeline::matcher::matches;
use prospect_pipeline::models::{Candidate, Source};
use prospect_pipeline::name_normalizer::{canonical, normalize};

const ORG_WORDS: &[&str] = &[
    "Example", "Health", "Saint", "St.", "Mount", "Regional", "Medical", "Center", "Ctr",
    "Hosp", "Hospital", "University", "Valley", "&", "Community", "General", "Inc.", "Group",
];

fn org_name() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(ORG_WORDS), 1..6).prop_map(|words| words.join(" "))
}

// Property: normalization should never panic and never invent empty variants
proptest! {
    #[test]
    fn normalize_never_panics(name in "\\PC*") {
        for variant in normalize(&name) {
            prop_assert!(!variant.is_empty());
            prop_assert_eq!(variant.trim(), variant.as_str());
            prop_assert!(!variant.contains("  "));
        }
    }

    #[test]
    fn alphanumeric_names_always_have_variants(name in "[A-Za-z0-9][A-Za-z0-9 .,]{0,30}") {
        prop_assert!(!normalize(&name).is_empty());
    }

    #[test]
    fn canonical_form_normalizes_identically(name in org_name()) {
        prop_assert_eq!(normalize(&canonical(&name)), normalize(&name));
    }

    #[test]
    fn normalization_ignores_case_and_spacing(name in org_name()) {
        let shouted = format!("  {}  ", name.to_uppercase().replace(' ', "   "));
        prop_assert_eq!(normalize(&shouted), normalize(&name));
    }
}

// Property: an organization always matches its own spellings
proptest! {
    #[test]
    fn target_matches_itself(name in org_name()) {
        let variants = normalize(&name);
        prop_assert!(matches(&variants, &name));
        prop_assert!(matches(&variants, &name.to_lowercase()));
    }

    #[test]
    fn target_matches_with_legal_suffix(name in org_name()) {
        let variants = normalize(&name);
        let with_suffix = format!("{}, Inc.", name);
        prop_assert!(matches(&variants, &with_suffix));
    }

    #[test]
    fn empty_candidate_never_matches(name in org_name()) {
        prop_assert!(!matches(&normalize(&name), "   "));
    }
}

// Property: profile reference normalization is stable
proptest! {
    #[test]
    fn profile_ref_normalization_is_idempotent(slug in "[a-z0-9-]{1,20}") {
        let raw = format!("https://www.LinkedIn.com/in/{}/?trk=search", slug);
        let once = normalize_profile_ref(&raw);
        prop_assert_eq!(normalize_profile_ref(&once), once.clone());
        prop_assert_eq!(once, format!("linkedin.com/in/{}", slug));
    }
}

const PEOPLE: &[&str] = &["Jane Doe", "John Roe", "Pat Smith", "Sam Lee", "Ann Wu"];

fn candidates(source: Source) -> impl Strategy<Value = Vec<Candidate>> {
    prop::collection::vec(
        (prop::sample::select(PEOPLE), proptest::option::of(0u8..4)),
        0..8,
    )
    .prop_map(move |entries| {
        entries
            .into_iter()
            .enumerate()
            .map(|(rank, (name, slug))| {
                Candidate::new(
                    source,
                    name,
                    "Example Health",
                    "CFO",
                    slug.map(|s| format!("https://linkedin.com/in/person-{}", s)),
                    None,
                    rank,
                )
            })
            .collect()
    })
}

// Property: deduplication never loses or invents people
proptest! {
    #[test]
    fn dedup_conserves_candidates(a in candidates(Source::SourceA), b in candidates(Source::SourceB)) {
        let merged = deduplicate(&a, &b);

        prop_assert!(merged.len() <= a.len() + b.len());
        prop_assert!(merged.len() >= a.len().max(b.len()));

        let seen_by_both = merged.iter().filter(|p| p.sources_seen.len() == 2).count();
        prop_assert_eq!(merged.len() + seen_by_both, a.len() + b.len());

        for (position, prospect) in merged.iter().enumerate() {
            prop_assert_eq!(prospect.discovery_index, position);
            prop_assert!(!prospect.sources_seen.is_empty());
        }
    }

    #[test]
    fn dedup_keeps_source_a_order_first(a in candidates(Source::SourceA), b in candidates(Source::SourceB)) {
        let merged = deduplicate(&a, &b);
        for prospect in merged.iter().take(a.len()) {
            prop_assert!(prospect.sources_seen.contains(&Source::SourceA));
        }
        for prospect in merged.iter().skip(a.len()) {
            prop_assert!(!prospect.sources_seen.contains(&Source::SourceA));
        }
    }
}

//! Multi-strategy entity resolution.
//!
//! Strategies run in fixed priority order and stop at the first that decides:
//!
//! 1. direct: the code equals a canonical ref (confidence 1.0)
//! 2. alias ref: the code is in exactly one organization's `alias_refs`
//!
//! Codes compare ignoring ASCII case, the same folding the store applies to
//! its identifier namespace.
//! 3. fuzzy name: best display-name similarity at or above the threshold
//! 4. fuzzy alias: best `name_aliases` similarity at or above the threshold
//!
//! Ambiguity never resolves. An alias held by more than one organization, or
//! a fuzzy winner with a runner-up within `tie_epsilon`, yields an unmatched
//! result carrying the contenders so an operator can choose.
//!
//! The resolver reads a snapshot of the catalog and has no side effects.

use std::collections::HashMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::entities::Organization;
use crate::enums::ResolutionMethod;
use crate::reference::{Reference, ReferenceKey};
use crate::responses::CandidateMatch;
use crate::similarity::Similarity;

const SCORE_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResolverSettings {
    /// Minimum similarity for a fuzzy match.
    pub threshold: f64,
    /// Candidates this close to the best score make the match ambiguous.
    pub tie_epsilon: f64,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self {
            threshold: 0.6,
            tie_epsilon: 0.02,
        }
    }
}

/// Why a reference did not resolve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UnresolvedReason {
    /// Neither code nor display name after trimming.
    Blank,
    /// No strategy produced a candidate.
    NoCandidate,
    /// The code is an alias of several organizations.
    AmbiguousAlias { entity_ids: Vec<String> },
    /// Several organizations tie on fuzzy similarity.
    AmbiguousName {
        method: ResolutionMethod,
        candidates: Vec<CandidateMatch>,
    },
}

/// Outcome of resolving one reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ResolutionResult {
    pub matched: bool,
    pub entity_id: Option<String>,
    pub method: Option<ResolutionMethod>,
    pub confidence: Option<f64>,
    /// The identifier or name that produced the match.
    pub matched_by: Option<String>,
    pub reason: Option<UnresolvedReason>,
}

impl ResolutionResult {
    #[must_use]
    pub fn matched(
        entity_id: impl Into<String>,
        method: ResolutionMethod,
        confidence: f64,
        matched_by: impl Into<String>,
    ) -> Self {
        Self {
            matched: true,
            entity_id: Some(entity_id.into()),
            method: Some(method),
            confidence: Some(confidence),
            matched_by: Some(matched_by.into()),
            reason: None,
        }
    }

    #[must_use]
    pub const fn unresolved(reason: UnresolvedReason) -> Self {
        Self {
            matched: false,
            entity_id: None,
            method: None,
            confidence: None,
            matched_by: None,
            reason: Some(reason),
        }
    }

    #[must_use]
    pub const fn is_ambiguous(&self) -> bool {
        matches!(
            self.reason,
            Some(UnresolvedReason::AmbiguousAlias { .. } | UnresolvedReason::AmbiguousName { .. })
        )
    }
}

enum Pick {
    Match(CandidateMatch),
    Ambiguous(Vec<CandidateMatch>),
    Nothing,
}

/// Resolver over a catalog snapshot.
pub struct Resolver<'a> {
    catalog: Vec<&'a Organization>,
    similarity: &'a dyn Similarity,
    settings: ResolverSettings,
}

impl<'a> Resolver<'a> {
    #[must_use]
    pub fn new(
        catalog: &'a [Organization],
        similarity: &'a dyn Similarity,
        settings: ResolverSettings,
    ) -> Self {
        let mut catalog: Vec<&Organization> = catalog.iter().collect();
        catalog.sort_by(|a, b| a.id.cmp(&b.id));
        Self {
            catalog,
            similarity,
            settings,
        }
    }

    #[must_use]
    pub fn resolve(&self, reference: &Reference) -> ResolutionResult {
        let reference = reference.normalized();
        if reference.code.is_none() && reference.display_name.is_none() {
            return ResolutionResult::unresolved(UnresolvedReason::Blank);
        }

        if let Some(code) = reference.code.as_deref() {
            if let Some(org) = self
                .catalog
                .iter()
                .find(|o| {
                    o.canonical_ref
                        .as_deref()
                        .is_some_and(|c| c.eq_ignore_ascii_case(code))
                })
            {
                return ResolutionResult::matched(&org.id, ResolutionMethod::Direct, 1.0, code);
            }

            let holders: Vec<&Organization> = self
                .catalog
                .iter()
                .copied()
                .filter(|o| o.alias_refs.iter().any(|a| a.eq_ignore_ascii_case(code)))
                .collect();
            match holders.as_slice() {
                [] => {}
                [org] => {
                    return ResolutionResult::matched(&org.id, ResolutionMethod::AliasRef, 1.0, code);
                }
                many => {
                    return ResolutionResult::unresolved(UnresolvedReason::AmbiguousAlias {
                        entity_ids: many.iter().map(|o| o.id.clone()).collect(),
                    });
                }
            }
        }

        if let Some(name) = reference.display_name.as_deref() {
            let by_name = self
                .catalog
                .iter()
                .map(|o| self.candidate(o, name, &o.name))
                .collect();
            match self.pick(by_name) {
                Pick::Match(c) => return Self::fuzzy(c, ResolutionMethod::FuzzyName),
                Pick::Ambiguous(candidates) => {
                    return ResolutionResult::unresolved(UnresolvedReason::AmbiguousName {
                        method: ResolutionMethod::FuzzyName,
                        candidates,
                    });
                }
                Pick::Nothing => {}
            }

            let by_alias = self
                .catalog
                .iter()
                .filter_map(|o| self.best_alias(o, name))
                .collect();
            match self.pick(by_alias) {
                Pick::Match(c) => return Self::fuzzy(c, ResolutionMethod::FuzzyAlias),
                Pick::Ambiguous(candidates) => {
                    return ResolutionResult::unresolved(UnresolvedReason::AmbiguousName {
                        method: ResolutionMethod::FuzzyAlias,
                        candidates,
                    });
                }
                Pick::Nothing => {}
            }
        }

        ResolutionResult::unresolved(UnresolvedReason::NoCandidate)
    }

    /// Resolve every reference, computing each distinct normalized reference
    /// once. The output has one result per input position.
    #[must_use]
    pub fn resolve_batch(&self, references: &[Reference]) -> Vec<ResolutionResult> {
        let mut cache: HashMap<ReferenceKey, ResolutionResult> = HashMap::new();
        references
            .iter()
            .map(|r| {
                cache
                    .entry(r.key())
                    .or_insert_with(|| self.resolve(r))
                    .clone()
            })
            .collect()
    }

    /// Organizations ranked by their best name or alias similarity to
    /// `query`, highest first. Zero scores are dropped.
    #[must_use]
    pub fn rank(&self, query: &str, limit: usize) -> Vec<CandidateMatch> {
        let query = query.trim();
        let mut ranked: Vec<CandidateMatch> = self
            .catalog
            .iter()
            .map(|o| {
                let by_name = self.candidate(o, query, &o.name);
                match self.best_alias(o, query) {
                    Some(alias) if alias.score > by_name.score => alias,
                    _ => by_name,
                }
            })
            .filter(|c| c.score > 0.0)
            .collect();
        sort_candidates(&mut ranked);
        ranked.truncate(limit);
        ranked
    }

    fn candidate(&self, org: &Organization, query: &str, against: &str) -> CandidateMatch {
        CandidateMatch {
            entity_id: org.id.clone(),
            name: org.name.clone(),
            matched_by: against.to_string(),
            score: self.similarity.score(query, against).clamp(0.0, 1.0),
        }
    }

    fn best_alias(&self, org: &Organization, query: &str) -> Option<CandidateMatch> {
        org.name_aliases
            .iter()
            .map(|alias| self.candidate(org, query, alias))
            .reduce(|best, c| if c.score > best.score { c } else { best })
    }

    fn pick(&self, mut candidates: Vec<CandidateMatch>) -> Pick {
        sort_candidates(&mut candidates);
        let Some(best) = candidates.first() else {
            return Pick::Nothing;
        };
        if best.score + SCORE_TOLERANCE < self.settings.threshold {
            return Pick::Nothing;
        }
        let floor = best.score - self.settings.tie_epsilon - SCORE_TOLERANCE;
        let contenders: Vec<CandidateMatch> = candidates
            .iter()
            .take_while(|c| c.score >= floor)
            .cloned()
            .collect();
        if contenders.len() > 1 {
            Pick::Ambiguous(contenders)
        } else {
            Pick::Match(best.clone())
        }
    }

    fn fuzzy(candidate: CandidateMatch, method: ResolutionMethod) -> ResolutionResult {
        ResolutionResult::matched(
            candidate.entity_id,
            method,
            candidate.score,
            candidate.matched_by,
        )
    }
}

/// Score descending, then entity id ascending.
fn sort_candidates(candidates: &mut [CandidateMatch]) {
    candidates.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then_with(|| a.entity_id.cmp(&b.entity_id))
    });
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use chrono::Utc;
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::enums::OrgType;
    use crate::similarity::{TableSimilarity, TrigramSimilarity};

    fn org(id: &str, canonical: Option<&str>, name: &str, aliases: &[&str]) -> Organization {
        let now = Utc::now();
        Organization {
            id: id.into(),
            canonical_ref: canonical.map(String::from),
            name: name.into(),
            org_type: OrgType::Other,
            alias_refs: aliases.iter().map(|s| (*s).to_string()).collect(),
            name_aliases: vec![],
            created_at: now,
            updated_at: now,
        }
    }

    fn koica_reference() -> Reference {
        Reference::new(Some("010712"), Some("KOREA INTERN. COOPERATION AGENCY"))
    }

    #[test]
    fn alias_ref_match_has_full_confidence() {
        let catalog = vec![org(
            "org-koica001",
            Some("KR-GOV-010"),
            "Korea International Cooperation Agency",
            &["010712"],
        )];
        let similarity = TrigramSimilarity;
        let resolver = Resolver::new(&catalog, &similarity, ResolverSettings::default());

        let result = resolver.resolve(&koica_reference());
        assert!(result.matched);
        assert_eq!(result.method, Some(ResolutionMethod::AliasRef));
        assert_eq!(result.confidence, Some(1.0));
        assert_eq!(result.entity_id.as_deref(), Some("org-koica001"));
    }

    #[test]
    fn fuzzy_name_match_reports_similarity() {
        let catalog = vec![org(
            "org-koica001",
            Some("KR-GOV-010"),
            "Korea International Cooperation Agency",
            &[],
        )];
        let similarity = TableSimilarity::new().with(
            "KOREA INTERN. COOPERATION AGENCY",
            "Korea International Cooperation Agency",
            0.82,
        );
        let resolver = Resolver::new(&catalog, &similarity, ResolverSettings::default());

        let result = resolver.resolve(&koica_reference());
        assert!(result.matched);
        assert_eq!(result.method, Some(ResolutionMethod::FuzzyName));
        assert_eq!(result.confidence, Some(0.82));
        assert_eq!(
            result.matched_by.as_deref(),
            Some("Korea International Cooperation Agency")
        );
    }

    #[test]
    fn direct_match_beats_alias_and_name() {
        let catalog = vec![
            org("org-a", Some("XM-DAC-1"), "Alpha", &[]),
            org("org-b", None, "Beta", &["XM-DAC-2"]),
        ];
        let similarity = TrigramSimilarity;
        let resolver = Resolver::new(&catalog, &similarity, ResolverSettings::default());

        let result = resolver.resolve(&Reference::new(Some("XM-DAC-1"), Some("Beta")));
        assert_eq!(result.method, Some(ResolutionMethod::Direct));
        assert_eq!(result.entity_id.as_deref(), Some("org-a"));
    }

    #[test]
    fn codes_match_regardless_of_case() {
        let catalog = vec![
            org("org-a", Some("XM-DAC-1"), "Alpha", &[]),
            org("org-b", None, "Beta", &["kr-gov-010"]),
        ];
        let similarity = TrigramSimilarity;
        let resolver = Resolver::new(&catalog, &similarity, ResolverSettings::default());

        let direct = resolver.resolve(&Reference::new(Some("xm-dac-1"), None));
        assert_eq!(direct.entity_id.as_deref(), Some("org-a"));
        assert_eq!(direct.method, Some(ResolutionMethod::Direct));

        let alias = resolver.resolve(&Reference::new(Some("KR-GOV-010"), None));
        assert_eq!(alias.entity_id.as_deref(), Some("org-b"));
        assert_eq!(alias.method, Some(ResolutionMethod::AliasRef));

        let other = resolver.resolve(&Reference::new(Some("XM-DAC-2"), None));
        assert!(!other.matched);
        assert_eq!(other.reason, Some(UnresolvedReason::NoCandidate));
    }

    #[test]
    fn shared_alias_fails_closed() {
        let catalog = vec![
            org("org-a", None, "Alpha", &["DUP"]),
            org("org-b", None, "Beta", &["DUP"]),
        ];
        let similarity = TrigramSimilarity;
        let resolver = Resolver::new(&catalog, &similarity, ResolverSettings::default());

        let result = resolver.resolve(&Reference::new(Some("DUP"), Some("Alpha")));
        assert!(!result.matched);
        assert_eq!(
            result.reason,
            Some(UnresolvedReason::AmbiguousAlias {
                entity_ids: vec!["org-a".into(), "org-b".into()],
            })
        );
    }

    #[test]
    fn near_tie_on_name_is_not_auto_resolved() {
        let catalog = vec![
            org("org-uk", None, "Save the Children UK", &[]),
            org("org-us", None, "Save the Children US", &[]),
        ];
        let similarity = TrigramSimilarity;
        let resolver = Resolver::new(&catalog, &similarity, ResolverSettings::default());

        let result = resolver.resolve(&Reference::new(None, Some("Save the Children")));
        assert!(!result.matched);
        assert!(result.is_ambiguous());
        let Some(UnresolvedReason::AmbiguousName { candidates, .. }) = result.reason else {
            panic!("expected ambiguous name");
        };
        let ids: Vec<_> = candidates.iter().map(|c| c.entity_id.as_str()).collect();
        assert_eq!(ids, vec!["org-uk", "org-us"]);
    }

    #[test]
    fn tie_outside_epsilon_resolves_to_best() {
        let catalog = vec![
            org("org-a", None, "Alpha Relief", &[]),
            org("org-b", None, "Alpha Relief Fund", &[]),
        ];
        let similarity = TableSimilarity::new()
            .with("Alpha", "Alpha Relief", 0.75)
            .with("Alpha", "Alpha Relief Fund", 0.72);
        let resolver = Resolver::new(&catalog, &similarity, ResolverSettings::default());

        let result = resolver.resolve(&Reference::new(None, Some("Alpha")));
        assert_eq!(result.entity_id.as_deref(), Some("org-a"));
    }

    #[test]
    fn below_threshold_is_unmatched() {
        let catalog = vec![org(
            "org-jica",
            None,
            "Japan International Cooperation Agency",
            &[],
        )];
        let similarity = TrigramSimilarity;
        let resolver = Resolver::new(&catalog, &similarity, ResolverSettings::default());

        let result = resolver.resolve(&Reference::new(
            None,
            Some("KOREA INTERN. COOPERATION AGENCY"),
        ));
        assert!(!result.matched);
    }

    #[test]
    fn fuzzy_alias_used_after_name_fails() {
        let mut koica = org(
            "org-koica001",
            None,
            "Korea International Cooperation Agency",
            &[],
        );
        koica.name_aliases = vec!["KOICA".into()];
        let catalog = vec![koica];
        let similarity = TrigramSimilarity;
        let resolver = Resolver::new(&catalog, &similarity, ResolverSettings::default());

        let result = resolver.resolve(&Reference::new(None, Some("koica")));
        assert_eq!(result.method, Some(ResolutionMethod::FuzzyAlias));
        assert_eq!(result.matched_by.as_deref(), Some("KOICA"));
        assert_eq!(result.confidence, Some(1.0));
    }

    #[test]
    fn blank_reference_is_unmatched() {
        let catalog = vec![org("org-a", Some("A"), "Alpha", &[])];
        let similarity = TrigramSimilarity;
        let resolver = Resolver::new(&catalog, &similarity, ResolverSettings::default());

        let result = resolver.resolve(&Reference::new(Some("  "), Some("")));
        assert_eq!(result.reason, Some(UnresolvedReason::Blank));
    }

    #[test]
    fn resolution_is_deterministic_regardless_of_catalog_order() {
        let a = org("org-a", None, "World Bank", &[]);
        let b = org("org-b", None, "World Bank Group", &[]);
        let similarity = TrigramSimilarity;
        let forward = [a.clone(), b.clone()];
        let backward = [b, a];
        let reference = Reference::new(None, Some("World Bank Grp"));

        let first = Resolver::new(&forward, &similarity, ResolverSettings::default())
            .resolve(&reference);
        let second = Resolver::new(&backward, &similarity, ResolverSettings::default())
            .resolve(&reference);
        assert_eq!(first, second);
    }

    struct CountingSimilarity {
        calls: AtomicUsize,
    }

    impl Similarity for CountingSimilarity {
        fn score(&self, _a: &str, _b: &str) -> f64 {
            self.calls.fetch_add(1, Ordering::Relaxed);
            0.0
        }
    }

    #[test]
    fn batch_deduplicates_identical_references() {
        let catalog = vec![org("org-a", None, "Alpha", &[]), org("org-b", None, "Beta", &[])];
        let similarity = CountingSimilarity {
            calls: AtomicUsize::new(0),
        };
        let resolver = Resolver::new(&catalog, &similarity, ResolverSettings::default());
        let refs = vec![
            Reference::new(None, Some("Gamma")),
            Reference::new(None, Some(" Gamma ")),
            Reference::new(None, Some("Gamma")),
        ];

        let results = resolver.resolve_batch(&refs);
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| !r.matched));
        assert_eq!(similarity.calls.load(Ordering::Relaxed), 2);
    }

    #[test]
    fn rank_orders_by_best_score() {
        let mut b = org("org-b", None, "International Bank for Reconstruction", &[]);
        b.name_aliases = vec!["World Bank".into()];
        let catalog = vec![org("org-a", None, "World Bank Group", &[]), b];
        let similarity = TrigramSimilarity;
        let resolver = Resolver::new(&catalog, &similarity, ResolverSettings::default());

        let ranked = resolver.rank("World Bank", 5);
        assert_eq!(ranked[0].entity_id, "org-b");
        assert_eq!(ranked[0].matched_by, "World Bank");
        assert_eq!(ranked[1].entity_id, "org-a");
    }
}

//! The proposal engine.
//!
//! Given a topic's current active subjects, rank related past subjects
//! across all topics:
//!
//! - similarity = Jaccard index of the keyword sets
//! - recency boost = linear decay over the configured window
//! - relevance = match_weight × jaccard + recency_weight × boost
//! - drop candidates below the Jaccard floor or from the same topic
//! - descending relevance, ties to the more recently seen subject
//!
//! Results are cached per `(topic, sorted active subject ids)` for 60
//! seconds in an LRU of 50 entries; dismissals live in memory only and
//! vanish on restart. A configuration write clears the cache.

use std::collections::HashSet;
use std::num::NonZeroUsize;
use std::sync::Mutex;
use std::time::Instant;

use lru::LruCache;
use parley_crypto::{IdHash, Timestamp};
use parley_types::{
    AnalysisConfig, Subject, Versioned as _, PROPOSAL_CACHE_CAPACITY, PROPOSAL_CACHE_TTL,
};
use tracing::{debug, trace};

use crate::engine::AnalysisEngine;
use crate::error::AnalysisResult;

/// One ranked proposal.
#[derive(Debug, Clone, PartialEq)]
pub struct Proposal {
    /// The related past subject.
    pub subject: IdHash,
    /// The topic it was discussed in.
    pub topic_id: String,
    /// Its keywords.
    pub keywords: Vec<String>,
    /// Jaccard index against the current subjects.
    pub jaccard: f64,
    /// Linear recency boost in [0, 1].
    pub recency: f64,
    /// Combined relevance score.
    pub relevance: f64,
    /// When the subject was last observed.
    pub last_seen_at: Timestamp,
}

struct CacheEntry {
    computed_at: Instant,
    proposals: Vec<Proposal>,
}

/// Computes and caches proposals.
pub struct ProposalEngine {
    analysis: AnalysisEngine,
    cache: Mutex<LruCache<String, CacheEntry>>,
    dismissed: Mutex<HashSet<(String, IdHash)>>,
}

impl ProposalEngine {
    /// Create a proposal engine sharing the analysis engine's store.
    pub fn new(analysis: AnalysisEngine) -> Self {
        let capacity = NonZeroUsize::new(PROPOSAL_CACHE_CAPACITY).expect("capacity is nonzero");
        Self {
            analysis,
            cache: Mutex::new(LruCache::new(capacity)),
            dismissed: Mutex::new(HashSet::new()),
        }
    }

    /// Ranked proposals for a topic's current subjects.
    ///
    /// `now` anchors the recency decay. `force_refresh` bypasses the
    /// cache.
    pub fn proposals(
        &self,
        topic_id: &str,
        config: &AnalysisConfig,
        now: Timestamp,
        force_refresh: bool,
    ) -> AnalysisResult<Vec<Proposal>> {
        let current = self.analysis.subjects_of_topic(topic_id)?;
        let key = cache_key(topic_id, &current);

        if !force_refresh {
            let mut cache = self.cache.lock().expect("cache lock");
            if let Some(entry) = cache.get(&key) {
                if entry.computed_at.elapsed() < PROPOSAL_CACHE_TTL {
                    trace!(topic_id, "proposal cache hit");
                    return Ok(self.without_dismissed(topic_id, entry.proposals.clone()));
                }
            }
        }

        let proposals = self.compute(topic_id, &current, config, now)?;
        self.cache.lock().expect("cache lock").put(
            key,
            CacheEntry { computed_at: Instant::now(), proposals: proposals.clone() },
        );
        Ok(self.without_dismissed(topic_id, proposals))
    }

    /// Hide one proposal for this topic until restart.
    pub fn dismiss(&self, topic_id: &str, subject: IdHash) {
        self.dismissed.lock().expect("dismissed lock").insert((topic_id.to_string(), subject));
    }

    /// Drop every cached result, e.g. after a configuration write.
    pub fn clear_cache(&self) {
        self.cache.lock().expect("cache lock").clear();
    }

    fn without_dismissed(&self, topic_id: &str, proposals: Vec<Proposal>) -> Vec<Proposal> {
        let dismissed = self.dismissed.lock().expect("dismissed lock");
        proposals
            .into_iter()
            .filter(|p| !dismissed.contains(&(topic_id.to_string(), p.subject)))
            .collect()
    }

    fn compute(
        &self,
        topic_id: &str,
        current: &[Subject],
        config: &AnalysisConfig,
        now: Timestamp,
    ) -> AnalysisResult<Vec<Proposal>> {
        let current_keywords: HashSet<&str> = current
            .iter()
            .flat_map(|subject| subject.keywords.iter().map(|k| k.as_str()))
            .collect();
        if current_keywords.is_empty() {
            return Ok(Vec::new());
        }

        let window_ms = config.recency_window_days as f64 * 24.0 * 3600.0 * 1000.0;
        let mut proposals = Vec::new();

        for candidate in self.analysis.all_subjects()? {
            if candidate.topic_id == topic_id {
                continue;
            }
            let candidate_keywords: HashSet<&str> =
                candidate.keywords.iter().map(|k| k.as_str()).collect();
            let jaccard = jaccard_index(&current_keywords, &candidate_keywords);
            if jaccard < config.min_jaccard {
                continue;
            }

            let age_ms = now.saturating_sub(candidate.last_seen_at) as f64;
            let recency = (1.0 - age_ms / window_ms).max(0.0);
            let relevance = config.match_weight * jaccard + config.recency_weight * recency;

            proposals.push(Proposal {
                subject: candidate.identity(),
                topic_id: candidate.topic_id.clone(),
                keywords: candidate.keywords.clone(),
                jaccard,
                recency,
                relevance,
                last_seen_at: candidate.last_seen_at,
            });
        }

        proposals.sort_by(|a, b| {
            b.relevance
                .partial_cmp(&a.relevance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.last_seen_at.cmp(&a.last_seen_at))
        });
        proposals.truncate(config.max_proposals.min(parley_types::MAX_PROPOSALS_CAP));
        debug!(topic_id, count = proposals.len(), "proposals computed");
        Ok(proposals)
    }
}

fn jaccard_index(a: &HashSet<&str>, b: &HashSet<&str>) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count() as f64;
    let union = a.union(b).count() as f64;
    intersection / union
}

fn cache_key(topic_id: &str, current: &[Subject]) -> String {
    let mut ids: Vec<String> =
        current.iter().map(|subject| subject.identity().to_hex()).collect();
    ids.sort_unstable();
    format!("{topic_id}|{}", ids.join("+"))
}

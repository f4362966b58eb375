//! Analysis entities: subjects, keywords, summaries, and the proposal
//! configuration.

use parley_crypto::{Hash, IdHash, Timestamp};
use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_MATCH_WEIGHT, DEFAULT_MAX_PROPOSALS, DEFAULT_MIN_JACCARD, DEFAULT_RECENCY_WEIGHT,
    DEFAULT_RECENCY_WINDOW_DAYS, MAX_PROPOSALS_CAP,
};
use crate::object::{Object, ObjectType, Versioned};
use crate::PersonId;

/// A cluster of keywords representing a discussion theme within a topic.
///
/// The identity is the sorted `+`-joined keyword combination scoped to the
/// topic; re-extraction of the same combination produces a new version
/// with updated counts and time range.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Subject {
    /// The topic this subject was observed in.
    pub topic_id: String,
    /// Sorted `+`-joined keyword terms, this entity's second id field.
    pub combination: String,
    /// Human-readable description from extraction.
    pub description: String,
    /// The keyword terms, sorted.
    pub keywords: Vec<String>,
    /// First observation time.
    pub first_seen_at: Timestamp,
    /// Latest observation time.
    pub last_seen_at: Timestamp,
    /// Messages that contributed to this subject.
    pub message_count: u64,
    /// The raw extraction attachment this subject derives from.
    pub source: Hash,
}

impl Subject {
    /// Build the canonical keyword combination: sorted terms joined by `+`.
    pub fn combination_of(keywords: &[String]) -> String {
        let mut sorted: Vec<&str> = keywords.iter().map(|k| k.as_str()).collect();
        sorted.sort_unstable();
        sorted.join("+")
    }
}

impl Versioned for Subject {
    const TYPE: ObjectType = ObjectType::Subject;

    fn id_fields(&self) -> Vec<Vec<u8>> {
        vec![self.topic_id.as_bytes().to_vec(), self.combination.as_bytes().to_vec()]
    }

    fn into_object(self) -> Object {
        Object::Subject(self)
    }
}

/// A single extracted term, keyed globally by the term itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Keyword {
    /// The term, this entity's id field.
    pub term: String,
    /// How many extractions produced this term.
    pub frequency: u64,
    /// Subjects referencing this term.
    pub subjects: Vec<IdHash>,
    /// The raw extraction attachment of the latest observation.
    pub source: Hash,
}

impl Versioned for Keyword {
    const TYPE: ObjectType = ObjectType::Keyword;

    fn id_fields(&self) -> Vec<Vec<u8>> {
        vec![self.term.as_bytes().to_vec()]
    }

    fn into_object(self) -> Object {
        Object::Keyword(self)
    }
}

/// An incrementally versioned conversation summary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Summary {
    /// The topic summarized.
    pub topic_id: String,
    /// Monotonic summary version within the topic.
    pub version: u32,
    /// Summary text.
    pub text: String,
    /// Subjects referenced by the summary.
    pub subjects: Vec<IdHash>,
    /// The preceding summary version, absent for the first.
    pub previous: Option<IdHash>,
    /// The raw extraction attachment this summary derives from.
    pub source: Hash,
}

impl Versioned for Summary {
    const TYPE: ObjectType = ObjectType::Summary;

    fn id_fields(&self) -> Vec<Vec<u8>> {
        vec![self.topic_id.as_bytes().to_vec(), self.version.to_string().into_bytes()]
    }

    fn into_object(self) -> Object {
        Object::Summary(self)
    }
}

/// Proposal-engine configuration, keyed by the owning user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisConfig {
    /// The configuring user.
    pub owner: PersonId,
    /// Weight of the keyword-set Jaccard index in relevance.
    pub match_weight: f64,
    /// Weight of the recency boost in relevance.
    pub recency_weight: f64,
    /// Recency decay window in days.
    pub recency_window_days: u32,
    /// Proposals below this Jaccard index are dropped.
    pub min_jaccard: f64,
    /// Maximum proposals returned.
    pub max_proposals: usize,
}

impl AnalysisConfig {
    /// Default configuration for an owner.
    pub fn for_owner(owner: PersonId) -> Self {
        Self {
            owner,
            match_weight: DEFAULT_MATCH_WEIGHT,
            recency_weight: DEFAULT_RECENCY_WEIGHT,
            recency_window_days: DEFAULT_RECENCY_WINDOW_DAYS,
            min_jaccard: DEFAULT_MIN_JACCARD,
            max_proposals: DEFAULT_MAX_PROPOSALS,
        }
    }

    /// Validate weights and limits.
    ///
    /// Weights must be finite, non-negative, and sum to a positive value;
    /// `max_proposals` is capped.
    pub fn validate(&self) -> Result<(), crate::ParleyError> {
        let weights_valid = self.match_weight.is_finite()
            && self.recency_weight.is_finite()
            && self.match_weight >= 0.0
            && self.recency_weight >= 0.0
            && self.match_weight + self.recency_weight > 0.0;
        if !weights_valid {
            return Err(crate::ParleyError::new(
                crate::ErrorKind::InvalidWeights,
                format!(
                    "match_weight {} / recency_weight {} are not usable",
                    self.match_weight, self.recency_weight
                ),
            ));
        }
        if !(0.0..=1.0).contains(&self.min_jaccard) {
            return Err(crate::ParleyError::new(
                crate::ErrorKind::InvalidWeights,
                format!("min_jaccard {} outside [0, 1]", self.min_jaccard),
            ));
        }
        if self.max_proposals == 0 || self.max_proposals > MAX_PROPOSALS_CAP {
            return Err(crate::ParleyError::new(
                crate::ErrorKind::InvalidWeights,
                format!("max_proposals {} outside 1..={}", self.max_proposals, MAX_PROPOSALS_CAP),
            ));
        }
        Ok(())
    }
}

impl Versioned for AnalysisConfig {
    const TYPE: ObjectType = ObjectType::AnalysisConfig;

    fn id_fields(&self) -> Vec<Vec<u8>> {
        vec![self.owner.to_hex().into_bytes()]
    }

    fn into_object(self) -> Object {
        Object::AnalysisConfig(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combination_is_sorted() {
        let combo = Subject::combination_of(&["yeast".into(), "dough".into(), "pizza".into()]);
        assert_eq!(combo, "dough+pizza+yeast");
    }

    #[test]
    fn same_combination_same_identity() {
        let source = Hash([1u8; 32]);
        let a = Subject {
            topic_id: "t".into(),
            combination: "dough+pizza".into(),
            description: "first".into(),
            keywords: vec!["dough".into(), "pizza".into()],
            first_seen_at: 1,
            last_seen_at: 1,
            message_count: 1,
            source,
        };
        let b = Subject { message_count: 5, last_seen_at: 9, ..a.clone() };
        assert_eq!(a.identity(), b.identity());
    }

    #[test]
    fn config_rejects_bad_weights() {
        let owner = IdHash([1u8; 32]);
        let mut config = AnalysisConfig::for_owner(owner);
        assert!(config.validate().is_ok());
        config.match_weight = -1.0;
        assert!(config.validate().is_err());
        config.match_weight = f64::NAN;
        assert!(config.validate().is_err());
        config.match_weight = 0.0;
        config.recency_weight = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn config_caps_proposals() {
        let mut config = AnalysisConfig::for_owner(IdHash([1u8; 32]));
        config.max_proposals = MAX_PROPOSALS_CAP + 1;
        assert!(config.validate().is_err());
    }
}

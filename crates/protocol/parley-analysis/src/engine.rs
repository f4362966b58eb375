//! Extraction persistence.

use parley_crypto::{Hash, IdHash, Timestamp};
use parley_store::ObjectStore;
use parley_types::{
    Blob, Clob, Keyword, Object, Subject, Summary, Unversioned as _, Versioned as _,
    INLINE_ATTACHMENT_CUTOFF, LLM_TIMEOUT,
};
use tracing::{debug, info};

use crate::error::{AnalysisError, AnalysisResult};
use crate::llm::{LlmClient, EXTRACTION_SYSTEM_PROMPT};
use crate::parser::{parse_extraction, ExtractionOutput};

/// What one analyzed message produced.
#[derive(Debug, Clone)]
pub struct Extraction {
    /// The assistant's reply text.
    pub response: String,
    /// The raw-output attachment hash, present when an analysis section
    /// was extracted and persisted.
    pub attachment: Option<Hash>,
    /// Subjects created or updated.
    pub subjects: Vec<IdHash>,
    /// Keywords created or updated.
    pub keywords: Vec<IdHash>,
    /// The summary version written, if the model updated it.
    pub summary: Option<IdHash>,
}

/// Runs extractions and persists their results.
///
/// Cheap to clone.
#[derive(Clone)]
pub struct AnalysisEngine {
    store: ObjectStore,
}

impl AnalysisEngine {
    /// Create an engine over a store.
    pub fn new(store: ObjectStore) -> Self {
        Self { store }
    }

    /// Analyze one message: call the model, parse strictly, persist.
    ///
    /// On malformed output nothing is persisted and `Malformed` surfaces;
    /// the message itself is unaffected.
    pub async fn analyze_message(
        &self,
        llm: &dyn LlmClient,
        topic_id: &str,
        message_text: &str,
        now: Timestamp,
    ) -> AnalysisResult<Extraction> {
        let raw = tokio::time::timeout(
            LLM_TIMEOUT,
            llm.complete(EXTRACTION_SYSTEM_PROMPT, message_text),
        )
        .await
        .map_err(|_| AnalysisError::LlmTimeout)??;

        // Strict parse happens before any write; either the whole
        // extraction persists or none of it does.
        let parsed = parse_extraction(&raw)?;
        self.persist(topic_id, &raw, parsed, now)
    }

    fn persist(
        &self,
        topic_id: &str,
        raw: &str,
        parsed: ExtractionOutput,
        now: Timestamp,
    ) -> AnalysisResult<Extraction> {
        let Some(analysis) = parsed.analysis else {
            return Ok(Extraction {
                response: parsed.response,
                attachment: None,
                subjects: Vec::new(),
                keywords: Vec::new(),
                summary: None,
            });
        };

        let attachment = self.store_attachment(raw)?;
        let mut subject_ids = Vec::new();
        let mut keyword_ids = Vec::new();

        for extracted in &analysis.subjects {
            let terms: Vec<String> = extracted.keywords.iter().map(|k| k.term.clone()).collect();
            let subject_id = self.upsert_subject(
                topic_id,
                &extracted.description,
                &terms,
                attachment,
                now,
            )?;
            subject_ids.push(subject_id);
            for term in &terms {
                keyword_ids.push(self.upsert_keyword(term, subject_id, attachment)?);
            }
        }

        let summary = match analysis.summary_update {
            Some(text) => {
                Some(self.append_summary(topic_id, &text, &subject_ids, attachment)?)
            }
            None => None,
        };

        info!(
            topic_id,
            subjects = subject_ids.len(),
            keywords = keyword_ids.len(),
            "extraction persisted"
        );
        Ok(Extraction {
            response: parsed.response,
            attachment: Some(attachment),
            subjects: subject_ids,
            keywords: keyword_ids,
            summary,
        })
    }

    /// Store the raw model output: inline Clob at or below the cutoff,
    /// Blob above it.
    fn store_attachment(&self, raw: &str) -> AnalysisResult<Hash> {
        let object = if raw.len() <= INLINE_ATTACHMENT_CUTOFF {
            Clob { text: raw.to_string() }.into_object()
        } else {
            Blob::from_bytes(raw.as_bytes()).into_object()
        };
        Ok(self.store.put_unversioned(object)?)
    }

    fn upsert_subject(
        &self,
        topic_id: &str,
        description: &str,
        terms: &[String],
        attachment: Hash,
        now: Timestamp,
    ) -> AnalysisResult<IdHash> {
        let combination = Subject::combination_of(terms);
        let mut sorted_terms = terms.to_vec();
        sorted_terms.sort_unstable();
        sorted_terms.dedup();

        let probe = Subject {
            topic_id: topic_id.to_string(),
            combination: combination.clone(),
            description: description.to_string(),
            keywords: sorted_terms.clone(),
            first_seen_at: now,
            last_seen_at: now,
            message_count: 1,
            source: attachment,
        };
        let id = probe.identity();

        let subject = match self.store.get_head(&id)? {
            Some(Object::Subject(existing)) => Subject {
                description: description.to_string(),
                last_seen_at: now,
                message_count: existing.message_count + 1,
                first_seen_at: existing.first_seen_at,
                source: attachment,
                ..probe
            },
            _ => probe,
        };
        self.store.put_versioned(subject.into_object())?;
        debug!(topic_id, combination, "subject upserted");
        Ok(id)
    }

    fn upsert_keyword(
        &self,
        term: &str,
        subject: IdHash,
        attachment: Hash,
    ) -> AnalysisResult<IdHash> {
        let probe = Keyword {
            term: term.to_string(),
            frequency: 1,
            subjects: vec![subject],
            source: attachment,
        };
        let id = probe.identity();

        let keyword = match self.store.get_head(&id)? {
            Some(Object::Keyword(existing)) => {
                let mut subjects = existing.subjects;
                if !subjects.contains(&subject) {
                    subjects.push(subject);
                }
                Keyword {
                    frequency: existing.frequency + 1,
                    subjects,
                    source: attachment,
                    ..probe
                }
            }
            _ => probe,
        };
        self.store.put_versioned(keyword.into_object())?;
        Ok(id)
    }

    /// Append the next summary version for a topic, linking back to the
    /// previous one.
    fn append_summary(
        &self,
        topic_id: &str,
        text: &str,
        subjects: &[IdHash],
        attachment: Hash,
    ) -> AnalysisResult<IdHash> {
        let previous = self.latest_summary(topic_id)?;
        let (version, previous_id) = match &previous {
            Some(summary) => (summary.version + 1, Some(summary.identity())),
            None => (1, None),
        };

        let summary = Summary {
            topic_id: topic_id.to_string(),
            version,
            text: text.to_string(),
            subjects: subjects.to_vec(),
            previous: previous_id,
            source: attachment,
        };
        let id = summary.identity();
        self.store.put_versioned(summary.into_object())?;
        debug!(topic_id, version, "summary appended");
        Ok(id)
    }

    /// The highest-version summary of a topic.
    pub fn latest_summary(&self, topic_id: &str) -> AnalysisResult<Option<Summary>> {
        let mut latest: Option<Summary> = None;
        for (_, head) in self.store.identities() {
            if self.store.type_of(&head).as_deref() != Some("Summary") {
                continue;
            }
            if let Some(Object::Summary(summary)) = self.store.get_object(&head)? {
                if summary.topic_id == topic_id
                    && latest.as_ref().is_none_or(|l| summary.version > l.version)
                {
                    latest = Some(summary);
                }
            }
        }
        Ok(latest)
    }

    /// Every current subject of a topic.
    pub fn subjects_of_topic(&self, topic_id: &str) -> AnalysisResult<Vec<Subject>> {
        let mut subjects = Vec::new();
        for (_, head) in self.store.identities() {
            if self.store.type_of(&head).as_deref() != Some("Subject") {
                continue;
            }
            if let Some(Object::Subject(subject)) = self.store.get_object(&head)? {
                if subject.topic_id == topic_id {
                    subjects.push(subject);
                }
            }
        }
        Ok(subjects)
    }

    /// Every current subject across all topics.
    pub fn all_subjects(&self) -> AnalysisResult<Vec<Subject>> {
        let mut subjects = Vec::new();
        for (_, head) in self.store.identities() {
            if self.store.type_of(&head).as_deref() != Some("Subject") {
                continue;
            }
            if let Some(Object::Subject(subject)) = self.store.get_object(&head)? {
                subjects.push(subject);
            }
        }
        Ok(subjects)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::ScriptedLlmClient;
    use tempfile::TempDir;

    fn engine() -> (AnalysisEngine, ObjectStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = ObjectStore::open(dir.path()).unwrap();
        (AnalysisEngine::new(store.clone()), store, dir)
    }

    fn scripted(raw: &str) -> ScriptedLlmClient {
        ScriptedLlmClient::new([raw.to_string()])
    }

    const OUTPUT: &str = r#"[response]
Preheat to 250C.
[/response]
[analysis]
[subject name="pizza baking" isNew="true"]
Home pizza baking.
[keyword term="pizza" confidence="0.9"/]
[keyword term="dough" confidence="0.8"/]
[/subject]
[summaryUpdate]
Covers pizza baking.
[/summaryUpdate]
[/analysis]"#;

    #[tokio::test]
    async fn extraction_persists_subjects_keywords_and_summary() {
        let (engine, store, _dir) = engine();
        let llm = scripted(OUTPUT);

        let extraction =
            engine.analyze_message(&llm, "pizza-talk", "how do I bake pizza?", 1_000).await.unwrap();
        assert_eq!(extraction.response, "Preheat to 250C.");
        assert_eq!(extraction.subjects.len(), 1);
        assert_eq!(extraction.keywords.len(), 2);
        assert!(extraction.summary.is_some());

        // Everything derived references the raw-output attachment.
        let attachment = extraction.attachment.unwrap();
        match store.get_head(&extraction.subjects[0]).unwrap().unwrap() {
            Object::Subject(subject) => {
                assert_eq!(subject.source, attachment);
                assert_eq!(subject.combination, "dough+pizza");
            }
            other => panic!("expected Subject, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn re_extraction_upserts_counts_and_time_range() {
        let (engine, store, _dir) = engine();
        let llm = ScriptedLlmClient::new([OUTPUT.to_string(), OUTPUT.to_string()]);

        let first = engine.analyze_message(&llm, "t", "msg one", 1_000).await.unwrap();
        let second = engine.analyze_message(&llm, "t", "msg two", 5_000).await.unwrap();
        assert_eq!(first.subjects, second.subjects);

        match store.get_head(&first.subjects[0]).unwrap().unwrap() {
            Object::Subject(subject) => {
                assert_eq!(subject.message_count, 2);
                assert_eq!(subject.first_seen_at, 1_000);
                assert_eq!(subject.last_seen_at, 5_000);
            }
            other => panic!("expected Subject, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn malformed_output_persists_nothing() {
        let (engine, store, _dir) = engine();
        let llm = scripted("not the schema at all");
        let before = store.object_count();

        let result = engine.analyze_message(&llm, "t", "hello", 1_000).await;
        assert!(matches!(result, Err(AnalysisError::Malformed(_))));
        assert_eq!(store.object_count(), before);
    }

    #[tokio::test]
    async fn summaries_version_incrementally() {
        let (engine, _store, _dir) = engine();
        let llm = ScriptedLlmClient::new([OUTPUT.to_string(), OUTPUT.to_string()]);

        engine.analyze_message(&llm, "t", "one", 1_000).await.unwrap();
        engine.analyze_message(&llm, "t", "two", 2_000).await.unwrap();

        let latest = engine.latest_summary("t").unwrap().unwrap();
        assert_eq!(latest.version, 2);
        assert!(latest.previous.is_some());
    }

    #[tokio::test]
    async fn large_raw_output_becomes_a_blob() {
        let (engine, store, _dir) = engine();
        let padding = "p".repeat(2_000);
        let raw = format!(
            "[response]\n{padding}\n[/response]\n[analysis]\n[subject name=\"s\"]\nd\n[keyword term=\"k\" confidence=\"0.5\"/]\n[/subject]\n[/analysis]"
        );
        let llm = scripted(&raw);

        let extraction = engine.analyze_message(&llm, "t", "x", 1).await.unwrap();
        let attachment = extraction.attachment.unwrap();
        assert_eq!(store.type_of(&attachment).as_deref(), Some("Blob"));
    }
}

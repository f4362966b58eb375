//! LLM analysis and proposal engine for the Parley protocol.
//!
//! After every message the analysis pipeline can ask a language model for
//! a structured reply: a response section plus an analysis section
//! enumerating subjects, keywords, and an optional summary update, in a
//! bracketed schema. Parsing is strict — malformed output fails the
//! extraction and nothing is persisted.
//!
//! Derived Subjects, Keywords, and Summaries are versioned objects that
//! carry a reference to the raw model output, stored as a Clob (small) or
//! Blob (large) attachment for traceability.
//!
//! The proposal engine ranks related past subjects by keyword-set Jaccard
//! similarity with a linear recency boost, caching results per topic and
//! active-subject set.

mod engine;
mod error;
mod llm;
mod parser;
mod proposal;

pub use engine::{AnalysisEngine, Extraction};
pub use error::{AnalysisError, AnalysisResult};
pub use llm::{HttpLlmClient, LlmClient, ScriptedLlmClient};
pub use parser::{
    parse_extraction, AnalysisBlock, ExtractedKeyword, ExtractedSubject, ExtractionOutput,
};
pub use proposal::{Proposal, ProposalEngine};

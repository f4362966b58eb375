//! Error types for parley-topics.

use thiserror::Error;

/// Result alias for topic operations.
pub type TopicResult<T> = std::result::Result<T, TopicError>;

/// Errors that can occur in the topic fabric.
#[derive(Debug, Error)]
pub enum TopicError {
    /// No topic with this id exists locally
    #[error("unknown topic: {0}")]
    UnknownTopic(String),

    /// Attempt to append to a channel the author does not own
    #[error("person {author} is not an author in topic {topic_id}")]
    NotAuthor { topic_id: String, author: String },

    /// The topic exists but has no channel the author could write to
    #[error("topic {0} has no channels")]
    NoChannels(String),

    /// Storage fault
    #[error("store: {0}")]
    Store(#[from] parley_store::StoreError),

    /// An object in the topic graph had an unexpected shape
    #[error("malformed topic graph: {0}")]
    Malformed(String),
}

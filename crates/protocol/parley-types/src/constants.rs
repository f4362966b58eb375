//! Protocol constants: limits, timing, and proposal defaults.

use std::time::Duration;

// =============================================================================
// Storage
// =============================================================================

/// Maximum size of one object-log or reverse-map segment: 64 MiB.
pub const SEGMENT_SIZE: u64 = 64 * 1024 * 1024;

/// Attachments at or below this size are stored inline as Clob objects;
/// larger payloads become Blobs.
pub const INLINE_ATTACHMENT_CUTOFF: usize = 1024;

/// Capacity of the store's event broadcast channel. Slow consumers lag and
/// drop the oldest events.
pub const EVENT_CHANNEL_CAPACITY: usize = 256;

// =============================================================================
// Sessions
// =============================================================================

/// Maximum encrypted frame size: 16 MiB.
pub const MAX_FRAME_SIZE: u32 = 16 * 1024 * 1024;

/// Wall-clock budget for each handshake step.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Idle interval after which a sync session sends a heartbeat.
pub const CHUM_IDLE_TIMEOUT: Duration = Duration::from_secs(120);

/// Wall-clock budget for one LLM call.
pub const LLM_TIMEOUT: Duration = Duration::from_secs(60);

/// How long a pairing invitation stays valid.
pub const INVITATION_TTL: Duration = Duration::from_secs(600);

/// Length of the encrypted ephemeral-key envelope exchanged during the
/// handshake preamble: 24-byte nonce + 32-byte key + 16-byte tag.
pub const HANDSHAKE_ENVELOPE_SIZE: usize = 72;

// =============================================================================
// Proposals
// =============================================================================

/// Default weight of the keyword Jaccard index in relevance.
pub const DEFAULT_MATCH_WEIGHT: f64 = 0.7;

/// Default weight of the recency boost in relevance.
pub const DEFAULT_RECENCY_WEIGHT: f64 = 0.3;

/// Default recency decay window in days.
pub const DEFAULT_RECENCY_WINDOW_DAYS: u32 = 30;

/// Default minimum Jaccard index for a proposal to survive.
pub const DEFAULT_MIN_JACCARD: f64 = 0.2;

/// Default number of proposals returned.
pub const DEFAULT_MAX_PROPOSALS: usize = 10;

/// Hard cap on configured `max_proposals`.
pub const MAX_PROPOSALS_CAP: usize = 50;

/// How long a computed proposal list stays cached.
pub const PROPOSAL_CACHE_TTL: Duration = Duration::from_secs(60);

/// LRU capacity of the proposal cache.
pub const PROPOSAL_CACHE_CAPACITY: usize = 50;

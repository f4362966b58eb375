//! The topic fabric.

use parley_crypto::{identity_hash, Hash, IdHash, Timestamp};
use parley_store::ObjectStore;
use parley_types::{
    Access, Channel, ChannelEntry, ChatMessage, Group, IdAccess, Object, PersonId, Topic,
    Unversioned as _, Versioned as _,
};
use tracing::{debug, info};

use crate::error::{TopicError, TopicResult};
use crate::slug::slugify;

/// Composes channels into topics over a shared store.
///
/// Cheap to clone.
#[derive(Clone)]
pub struct TopicFabric {
    store: ObjectStore,
}

/// One message in a topic's merged read order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicMessage {
    /// The ChatMessage object hash.
    pub hash: Hash,
    /// The authoring person.
    pub author: PersonId,
    /// Message text.
    pub text: String,
    /// Entry timestamp in milliseconds.
    pub timestamp: Timestamp,
    /// Attachment hashes.
    pub attachments: Vec<Hash>,
}

/// Summary of one topic for listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicView {
    pub topic_id: String,
    pub name: String,
    /// Channel owners; `None` entries mark the shared 2-party channel.
    pub participants: Vec<Option<PersonId>>,
    pub last_message: Option<TopicMessage>,
}

impl TopicFabric {
    /// Create a fabric over a store.
    pub fn new(store: ObjectStore) -> Self {
        Self { store }
    }

    /// The deterministic topic id for a 2-party conversation:
    /// lexicographically smaller id, `<->`, larger id.
    pub fn two_party_topic_id(a: &PersonId, b: &PersonId) -> String {
        let (low, high) = if a.to_hex() <= b.to_hex() { (a, b) } else { (b, a) };
        format!("{}<->{}", low.to_hex(), high.to_hex())
    }

    /// The identity hash a topic id resolves through.
    pub fn topic_identity(topic_id: &str) -> IdHash {
        identity_hash("Topic", &[topic_id.as_bytes()])
    }

    /// Whether a topic exists locally.
    pub fn topic_exists(&self, topic_id: &str) -> bool {
        self.store.head_of(&Self::topic_identity(topic_id)).is_some()
    }

    /// Derive a locally unique topic id from a conversation name,
    /// suffixing `-2`, `-3`, ... on collision.
    pub fn unique_topic_id(&self, name: &str) -> String {
        let base = slugify(name);
        if !self.topic_exists(&base) {
            return base;
        }
        let mut suffix = 2u32;
        loop {
            let candidate = format!("{base}-{suffix}");
            if !self.topic_exists(&candidate) {
                return candidate;
            }
            suffix += 1;
        }
    }

    /// Create (or return) the 2-party topic between two persons.
    ///
    /// One ownerless shared channel; access granted to both persons
    /// individually on the channel and on the topic.
    pub fn ensure_two_party_topic(&self, a: PersonId, b: PersonId) -> TopicResult<String> {
        let topic_id = Self::two_party_topic_id(&a, &b);
        if self.topic_exists(&topic_id) {
            return Ok(topic_id);
        }

        let channel = Channel { topic_id: topic_id.clone(), owner: None, head: None };
        let channel_id = channel.identity();
        self.store.put_versioned(channel.into_object())?;

        let topic = Topic {
            topic_id: topic_id.clone(),
            name: topic_id.clone(),
            channels: vec![channel_id],
        };
        let topic_identity = topic.identity();
        self.store.put_versioned(topic.into_object())?;

        for target in [channel_id, topic_identity] {
            self.store.put_unversioned(
                IdAccess { target, persons: vec![a, b], groups: vec![] }.into_object(),
            )?;
        }
        info!(topic_id, "created 2-party topic");
        Ok(topic_id)
    }

    /// Create an N-party topic (N ≥ 3): one owned channel per participant
    /// and a Group scoping access to all of them.
    pub fn create_group_topic(
        &self,
        name: &str,
        participants: &[PersonId],
    ) -> TopicResult<String> {
        let topic_id = self.unique_topic_id(name);
        // Sorted member list, so the same membership always hashes the
        // same Group.
        let mut members = participants.to_vec();
        members.sort_by(|a, b| a.as_bytes().cmp(b.as_bytes()));
        members.dedup();
        let group_hash = self.store.put_unversioned(Group { members }.into_object())?;

        let mut channels = Vec::with_capacity(participants.len());
        for participant in participants {
            let channel =
                Channel { topic_id: topic_id.clone(), owner: Some(*participant), head: None };
            let channel_id = channel.identity();
            self.store.put_versioned(channel.into_object())?;
            self.store.put_unversioned(
                IdAccess { target: channel_id, persons: vec![], groups: vec![group_hash] }
                    .into_object(),
            )?;
            channels.push(channel_id);
        }

        let topic = Topic { topic_id: topic_id.clone(), name: name.to_string(), channels };
        let topic_identity = topic.identity();
        self.store.put_versioned(topic.into_object())?;
        self.store.put_unversioned(
            IdAccess { target: topic_identity, persons: vec![], groups: vec![group_hash] }
                .into_object(),
        )?;

        info!(topic_id, participants = participants.len(), "created group topic");
        Ok(topic_id)
    }

    /// Append a message to the channel `author` may write to.
    ///
    /// In a 2-party topic both named parties append to the shared channel;
    /// in an N-party topic the author appends only to their own channel.
    /// Everything else is `NotAuthor`.
    pub fn append_message(
        &self,
        topic_id: &str,
        author: PersonId,
        message: ChatMessage,
        timestamp: Timestamp,
    ) -> TopicResult<Hash> {
        let topic = self.load_topic(topic_id)?;
        let channel = self.writable_channel(&topic, topic_id, author)?;

        let message_hash = self.store.put_unversioned(message.into_object())?;
        let entry = ChannelEntry { payload: message_hash, previous: channel.head, timestamp };
        let entry_hash = self.store.put_unversioned(entry.into_object())?;

        let updated = Channel { head: Some(entry_hash), ..channel };
        self.store.put_versioned(updated.into_object())?;

        self.mirror_channel_grants(topic_id, author, entry_hash)?;

        debug!(topic_id, %message_hash, "appended message");
        Ok(message_hash)
    }

    /// Time-ordered merge of every channel chain in the topic.
    ///
    /// Ascending by timestamp, ties broken by author id bytes. `before`
    /// keeps entries strictly older; `limit` keeps the newest that many.
    pub fn read_messages(
        &self,
        topic_id: &str,
        limit: Option<usize>,
        before: Option<Timestamp>,
    ) -> TopicResult<Vec<TopicMessage>> {
        let topic = self.load_topic(topic_id)?;
        let mut messages = Vec::new();

        for channel_id in &topic.channels {
            let Some(channel) = self.channel_head(channel_id)? else { continue };
            let mut cursor = channel.head;
            while let Some(entry_hash) = cursor {
                let entry = match self.store.get_object(&entry_hash)? {
                    Some(Object::ChannelEntry(entry)) => entry,
                    Some(other) => {
                        return Err(TopicError::Malformed(format!(
                            "channel entry {entry_hash} is a {}",
                            other.type_tag()
                        )))
                    }
                    // The chain tail has not synced yet; stop at the gap.
                    None => break,
                };
                if let Some(Object::ChatMessage(message)) = self.store.get_object(&entry.payload)? {
                    messages.push(TopicMessage {
                        hash: entry.payload,
                        author: message.author,
                        text: message.text,
                        timestamp: entry.timestamp,
                        attachments: message.attachments,
                    });
                }
                cursor = entry.previous;
            }
        }

        messages.sort_by(|a, b| {
            a.timestamp.cmp(&b.timestamp).then_with(|| a.author.as_bytes().cmp(b.author.as_bytes()))
        });
        if let Some(before) = before {
            messages.retain(|m| m.timestamp < before);
        }
        if let Some(limit) = limit {
            if messages.len() > limit {
                messages.drain(..messages.len() - limit);
            }
        }
        Ok(messages)
    }

    /// All locally known topics with their newest message.
    pub fn list_topics(&self) -> TopicResult<Vec<TopicView>> {
        let mut views = Vec::new();
        for topic in self.all_topics()? {
            let mut participants = Vec::new();
            for channel_id in &topic.channels {
                if let Some(channel) = self.channel_head(channel_id)? {
                    participants.push(channel.owner);
                }
            }
            let last_message =
                self.read_messages(&topic.topic_id, Some(1), None)?.into_iter().next();
            views.push(TopicView {
                topic_id: topic.topic_id,
                name: topic.name,
                participants,
                last_message,
            });
        }
        views.sort_by(|a, b| a.topic_id.cmp(&b.topic_id));
        Ok(views)
    }

    fn load_topic(&self, topic_id: &str) -> TopicResult<Topic> {
        match self.store.get_head(&Self::topic_identity(topic_id))? {
            Some(Object::Topic(topic)) => Ok(topic),
            Some(other) => Err(TopicError::Malformed(format!(
                "topic head for {topic_id} is a {}",
                other.type_tag()
            ))),
            None => Err(TopicError::UnknownTopic(topic_id.to_string())),
        }
    }

    fn channel_head(&self, channel_id: &IdHash) -> TopicResult<Option<Channel>> {
        match self.store.get_head(channel_id)? {
            Some(Object::Channel(channel)) => Ok(Some(channel)),
            Some(other) => Err(TopicError::Malformed(format!(
                "channel head {channel_id} is a {}",
                other.type_tag()
            ))),
            None => Ok(None),
        }
    }

    fn writable_channel(
        &self,
        topic: &Topic,
        topic_id: &str,
        author: PersonId,
    ) -> TopicResult<Channel> {
        let mut shared = None;
        for channel_id in &topic.channels {
            let Some(channel) = self.channel_head(channel_id)? else { continue };
            match channel.owner {
                Some(owner) if owner == author => return Ok(channel),
                None => shared = Some(channel),
                Some(_) => {}
            }
        }
        if let Some(shared) = shared {
            // The shared channel belongs to the two persons in the id.
            if topic_id.split("<->").any(|part| part == author.to_hex()) {
                return Ok(shared);
            }
        }
        Err(TopicError::NotAuthor {
            topic_id: topic_id.to_string(),
            author: author.to_hex(),
        })
    }

    /// Grant each fresh entry (and the author's channel line) to the
    /// topic's participants by person.
    ///
    /// Group objects never traverse a session, so a grant written by one
    /// participant must stay resolvable on every other replica; person
    /// lists are, group hashes are not. The participant set is derived
    /// from the channel owners, or from the id of a 2-party topic.
    fn mirror_channel_grants(
        &self,
        topic_id: &str,
        author: PersonId,
        entry_hash: Hash,
    ) -> TopicResult<()> {
        let participants = self.topic_participants(topic_id)?;
        if participants.is_empty() {
            return Ok(());
        }

        self.store.put_unversioned(
            Access { target: entry_hash, persons: participants.clone(), groups: vec![] }
                .into_object(),
        )?;

        // The author's channel line carries the head updates; the grant is
        // content-identical across appends, so re-putting is a no-op.
        let author_channel = Channel {
            topic_id: topic_id.to_string(),
            owner: self.channel_owner_field(topic_id, author)?,
            head: None,
        };
        self.store.put_unversioned(
            IdAccess {
                target: author_channel.identity(),
                persons: participants,
                groups: vec![],
            }
            .into_object(),
        )?;
        Ok(())
    }

    /// The persons participating in a topic.
    pub fn topic_participants(&self, topic_id: &str) -> TopicResult<Vec<PersonId>> {
        if let Some((low, high)) = topic_id.split_once("<->") {
            if let (Ok(a), Ok(b)) = (IdHash::from_hex(low), IdHash::from_hex(high)) {
                return Ok(vec![a, b]);
            }
        }
        let topic = self.load_topic(topic_id)?;
        let mut participants = Vec::new();
        for channel_id in &topic.channels {
            if let Some(channel) = self.channel_head(channel_id)? {
                if let Some(owner) = channel.owner {
                    participants.push(owner);
                }
            }
        }
        participants.sort_by(|a, b| a.as_bytes().cmp(b.as_bytes()));
        participants.dedup();
        Ok(participants)
    }

    /// The owner field of the channel `author` writes to: `None` for the
    /// shared 2-party channel, the author otherwise.
    fn channel_owner_field(&self, topic_id: &str, author: PersonId) -> TopicResult<Option<PersonId>> {
        if topic_id.contains("<->") {
            Ok(None)
        } else {
            Ok(Some(author))
        }
    }

    fn all_topics(&self) -> TopicResult<Vec<Topic>> {
        // Topics are found through the reverse map of their channels'
        // topic ids only indirectly; enumerate via stored Topic heads.
        let mut topics = Vec::new();
        for (id, head) in self.store.identities() {
            if self.store.type_of(&head).as_deref() == Some("Topic") {
                if let Some(Object::Topic(topic)) = self.store.get_object(&head)? {
                    debug_assert_eq!(Self::topic_identity(&topic.topic_id), id);
                    topics.push(topic);
                }
            }
        }
        Ok(topics)
    }
}

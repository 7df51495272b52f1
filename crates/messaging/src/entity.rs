//! Addressing of receivable entities (queues, topic subscriptions, and their
//! dead-letter sub-queues).

use core::fmt;

/// Which half of an entity to read from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum SubQueue {
    #[default]
    Active,
    DeadLetter,
}

/// A receivable entity.
///
/// Senders address a plain entity name (queue or topic). Receivers need the
/// full path because a topic is only readable through one of its
/// subscriptions.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EntityPath {
    Queue {
        name: String,
        sub_queue: SubQueue,
    },
    Subscription {
        topic: String,
        subscription: String,
        sub_queue: SubQueue,
    },
}

impl EntityPath {
    pub fn queue(name: impl Into<String>) -> Self {
        Self::Queue {
            name: name.into(),
            sub_queue: SubQueue::Active,
        }
    }

    pub fn subscription(topic: impl Into<String>, subscription: impl Into<String>) -> Self {
        Self::Subscription {
            topic: topic.into(),
            subscription: subscription.into(),
            sub_queue: SubQueue::Active,
        }
    }

    /// Same entity, dead-letter side.
    pub fn dead_letter(self) -> Self {
        self.with_sub_queue(SubQueue::DeadLetter)
    }

    pub fn with_sub_queue(self, sub_queue: SubQueue) -> Self {
        match self {
            Self::Queue { name, .. } => Self::Queue { name, sub_queue },
            Self::Subscription {
                topic,
                subscription,
                ..
            } => Self::Subscription {
                topic,
                subscription,
                sub_queue,
            },
        }
    }

    pub fn sub_queue(&self) -> SubQueue {
        match self {
            Self::Queue { sub_queue, .. } | Self::Subscription { sub_queue, .. } => *sub_queue,
        }
    }

    pub fn is_dead_letter(&self) -> bool {
        self.sub_queue() == SubQueue::DeadLetter
    }

    /// Name of the entity a sender would address (queue or topic).
    pub fn entity_name(&self) -> &str {
        match self {
            Self::Queue { name, .. } => name,
            Self::Subscription { topic, .. } => topic,
        }
    }
}

impl fmt::Display for EntityPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Queue { name, .. } => write!(f, "{name}")?,
            Self::Subscription {
                topic,
                subscription,
                ..
            } => write!(f, "{topic}/subscriptions/{subscription}")?,
        }
        if self.is_dead_letter() {
            f.write_str("/$deadletterqueue")?;
        }
        Ok(())
    }
}

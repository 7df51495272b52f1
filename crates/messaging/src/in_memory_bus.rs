//! In-memory broker for tests/dev.
//!
//! - Queues, and topics with named subscriptions (send to a topic fans out a copy
//!   to every subscription)
//! - Peek-lock receive with a configurable lock duration
//! - Delivery counting, with automatic dead-lettering past `max_delivery_count`
//! - Open sender/receiver count observable through `open_handles()`

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::bus::{MessageReceiver, MessageSender, ServiceBusClient};
use crate::entity::{EntityPath, SubQueue};
use crate::error::ServiceBusError;
use crate::message::{OutgoingMessage, ReceivedMessage};

/// Default peek-lock duration.
pub const DEFAULT_LOCK_DURATION: Duration = Duration::from_secs(60);

/// Default number of deliveries before the broker dead-letters a message.
pub const DEFAULT_MAX_DELIVERY_COUNT: u32 = 10;

/// Dead-letter reason set by the broker itself.
pub const MAX_DELIVERY_COUNT_EXCEEDED: &str = "MaxDeliveryCountExceeded";

#[derive(Debug, Clone)]
struct StoredMessage {
    message: ReceivedMessage,
    locked_until: Option<Instant>,
}

impl StoredMessage {
    fn is_available(&self, now: Instant) -> bool {
        self.locked_until.is_none_or(|until| until <= now)
    }

    fn is_locked_by(&self, message: &ReceivedMessage, now: Instant) -> bool {
        !message.lock_token.is_empty()
            && self.message.lock_token == message.lock_token
            && self.locked_until.is_some_and(|until| until > now)
    }

    fn unlock(&mut self) {
        self.locked_until = None;
        self.message.lock_token.clear();
    }
}

#[derive(Debug, Default)]
struct MessageStore {
    active: VecDeque<StoredMessage>,
    dead_letter: VecDeque<StoredMessage>,
}

impl MessageStore {
    fn side(&mut self, sub_queue: SubQueue) -> &mut VecDeque<StoredMessage> {
        match sub_queue {
            SubQueue::Active => &mut self.active,
            SubQueue::DeadLetter => &mut self.dead_letter,
        }
    }

    fn move_to_dead_letter(&mut self, mut entry: StoredMessage, reason: &str, description: &str) {
        entry.unlock();
        entry.message.dead_letter_reason = Some(reason.to_string());
        entry.message.dead_letter_description = Some(description.to_string());
        self.dead_letter.push_back(entry);
    }
}

#[derive(Debug, Default)]
struct BrokerState {
    queues: HashMap<String, MessageStore>,
    topics: HashMap<String, BTreeMap<String, MessageStore>>,
}

impl BrokerState {
    fn has_entity(&self, entity: &str) -> bool {
        self.queues.contains_key(entity) || self.topics.contains_key(entity)
    }

    fn store_mut(&mut self, path: &EntityPath) -> Result<&mut MessageStore, ServiceBusError> {
        let store = match path {
            EntityPath::Queue { name, .. } => self.queues.get_mut(name),
            EntityPath::Subscription {
                topic,
                subscription,
                ..
            } => self
                .topics
                .get_mut(topic)
                .and_then(|subs| subs.get_mut(subscription)),
        };
        store.ok_or_else(|| ServiceBusError::EntityNotFound(path.to_string()))
    }
}

/// Counts one open handle; releases it exactly once (explicitly or on drop).
#[derive(Debug)]
struct HandleGuard {
    open: Arc<AtomicUsize>,
    released: bool,
}

impl HandleGuard {
    fn acquire(open: &Arc<AtomicUsize>) -> Self {
        open.fetch_add(1, Ordering::SeqCst);
        Self {
            open: Arc::clone(open),
            released: false,
        }
    }

    fn ensure_open(&self) -> Result<(), ServiceBusError> {
        if self.released {
            Err(ServiceBusError::Closed)
        } else {
            Ok(())
        }
    }

    fn release(&mut self) {
        if !self.released {
            self.released = true;
            self.open.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

impl Drop for HandleGuard {
    fn drop(&mut self) {
        self.release();
    }
}

/// In-process broker with Service-Bus-like peek-lock semantics.
#[derive(Debug)]
pub struct InMemoryServiceBus {
    state: Arc<Mutex<BrokerState>>,
    open_handles: Arc<AtomicUsize>,
    lock_duration: Duration,
    max_delivery_count: u32,
}

impl InMemoryServiceBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_lock_duration(mut self, lock_duration: Duration) -> Self {
        self.lock_duration = lock_duration;
        self
    }

    pub fn with_max_delivery_count(mut self, max_delivery_count: u32) -> Self {
        self.max_delivery_count = max_delivery_count;
        self
    }

    pub fn lock_duration(&self) -> Duration {
        self.lock_duration
    }

    pub fn max_delivery_count(&self) -> u32 {
        self.max_delivery_count
    }

    /// Create a queue (idempotent).
    pub fn create_queue(&self, name: &str) -> Result<(), ServiceBusError> {
        let mut state = self.state.lock().map_err(|_| ServiceBusError::Poisoned)?;
        state.queues.entry(name.to_string()).or_default();
        Ok(())
    }

    /// Create a topic (idempotent).
    pub fn create_topic(&self, name: &str) -> Result<(), ServiceBusError> {
        let mut state = self.state.lock().map_err(|_| ServiceBusError::Poisoned)?;
        state.topics.entry(name.to_string()).or_default();
        Ok(())
    }

    /// Add a subscription to an existing topic (idempotent).
    ///
    /// Only messages sent after the subscription exists are delivered to it.
    pub fn create_subscription(&self, topic: &str, subscription: &str) -> Result<(), ServiceBusError> {
        let mut state = self.state.lock().map_err(|_| ServiceBusError::Poisoned)?;
        let subs = state
            .topics
            .get_mut(topic)
            .ok_or_else(|| ServiceBusError::EntityNotFound(topic.to_string()))?;
        subs.entry(subscription.to_string()).or_default();
        Ok(())
    }

    /// Number of messages held by `path` (locked or not).
    pub fn message_count(&self, path: &EntityPath) -> Result<usize, ServiceBusError> {
        let mut state = self.state.lock().map_err(|_| ServiceBusError::Poisoned)?;
        let store = state.store_mut(path)?;
        Ok(store.side(path.sub_queue()).len())
    }

    /// Senders and receivers currently open.
    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }
}

impl Default for InMemoryServiceBus {
    fn default() -> Self {
        Self {
            state: Arc::new(Mutex::new(BrokerState::default())),
            open_handles: Arc::new(AtomicUsize::new(0)),
            lock_duration: DEFAULT_LOCK_DURATION,
            max_delivery_count: DEFAULT_MAX_DELIVERY_COUNT,
        }
    }
}

#[async_trait]
impl ServiceBusClient for InMemoryServiceBus {
    async fn create_sender(&self, entity: &str) -> Result<Box<dyn MessageSender>, ServiceBusError> {
        let state = self.state.lock().map_err(|_| ServiceBusError::Poisoned)?;
        if !state.has_entity(entity) {
            return Err(ServiceBusError::EntityNotFound(entity.to_string()));
        }
        drop(state);

        Ok(Box::new(InMemorySender {
            state: Arc::clone(&self.state),
            entity: entity.to_string(),
            guard: HandleGuard::acquire(&self.open_handles),
        }))
    }

    async fn create_receiver(
        &self,
        path: EntityPath,
    ) -> Result<Box<dyn MessageReceiver>, ServiceBusError> {
        let mut state = self.state.lock().map_err(|_| ServiceBusError::Poisoned)?;
        state.store_mut(&path)?;
        drop(state);

        Ok(Box::new(InMemoryReceiver {
            state: Arc::clone(&self.state),
            path,
            lock_duration: self.lock_duration,
            max_delivery_count: self.max_delivery_count,
            guard: HandleGuard::acquire(&self.open_handles),
        }))
    }
}

struct InMemorySender {
    state: Arc<Mutex<BrokerState>>,
    entity: String,
    guard: HandleGuard,
}

#[async_trait]
impl MessageSender for InMemorySender {
    fn entity(&self) -> &str {
        &self.entity
    }

    async fn send(&mut self, message: OutgoingMessage) -> Result<String, ServiceBusError> {
        self.guard.ensure_open()?;

        let message_id = message
            .message_id
            .unwrap_or_else(|| Uuid::now_v7().to_string());
        let entry = StoredMessage {
            message: ReceivedMessage {
                message_id: message_id.clone(),
                body: message.body,
                content_type: message.content_type,
                subject: message.subject,
                application_properties: message.application_properties,
                delivery_count: 0,
                enqueued_at: Utc::now(),
                lock_token: String::new(),
                dead_letter_reason: None,
                dead_letter_description: None,
            },
            locked_until: None,
        };

        let mut state = self.state.lock().map_err(|_| ServiceBusError::Poisoned)?;
        if let Some(subs) = state.topics.get_mut(&self.entity) {
            for store in subs.values_mut() {
                store.active.push_back(entry.clone());
            }
        } else if let Some(store) = state.queues.get_mut(&self.entity) {
            store.active.push_back(entry);
        } else {
            return Err(ServiceBusError::EntityNotFound(self.entity.clone()));
        }

        debug!(entity = %self.entity, message_id = %message_id, "message enqueued");
        Ok(message_id)
    }

    async fn close(&mut self) -> Result<(), ServiceBusError> {
        self.guard.release();
        Ok(())
    }
}

struct InMemoryReceiver {
    state: Arc<Mutex<BrokerState>>,
    path: EntityPath,
    lock_duration: Duration,
    max_delivery_count: u32,
    guard: HandleGuard,
}

impl InMemoryReceiver {
    /// Run `f` on the locked entry matching `message`, or fail with `LockLost`.
    fn with_locked_entry<T>(
        &self,
        message: &ReceivedMessage,
        f: impl FnOnce(&mut MessageStore, usize) -> T,
    ) -> Result<T, ServiceBusError> {
        self.guard.ensure_open()?;
        let now = Instant::now();
        let mut state = self.state.lock().map_err(|_| ServiceBusError::Poisoned)?;
        let store = state.store_mut(&self.path)?;
        let idx = store
            .side(self.path.sub_queue())
            .iter()
            .position(|entry| entry.is_locked_by(message, now))
            .ok_or_else(|| ServiceBusError::LockLost {
                message_id: message.message_id.clone(),
            })?;
        Ok(f(store, idx))
    }
}

#[async_trait]
impl MessageReceiver for InMemoryReceiver {
    fn path(&self) -> &EntityPath {
        &self.path
    }

    async fn receive_one(&mut self) -> Result<Option<ReceivedMessage>, ServiceBusError> {
        self.guard.ensure_open()?;
        let now = Instant::now();
        let sub_queue = self.path.sub_queue();
        let mut state = self.state.lock().map_err(|_| ServiceBusError::Poisoned)?;
        let store = state.store_mut(&self.path)?;

        loop {
            let Some(idx) = store.side(sub_queue).iter().position(|m| m.is_available(now)) else {
                return Ok(None);
            };

            if sub_queue == SubQueue::Active
                && store.active[idx].message.delivery_count >= self.max_delivery_count
            {
                if let Some(entry) = store.active.remove(idx) {
                    warn!(
                        entity = %self.path,
                        message_id = %entry.message.message_id,
                        delivery_count = entry.message.delivery_count,
                        "max delivery count exceeded, dead-lettering"
                    );
                    let description =
                        format!("delivery count exceeded {}", self.max_delivery_count);
                    store.move_to_dead_letter(entry, MAX_DELIVERY_COUNT_EXCEEDED, &description);
                }
                continue;
            }

            let entry = &mut store.side(sub_queue)[idx];
            entry.message.delivery_count += 1;
            entry.message.lock_token = Uuid::now_v7().to_string();
            entry.locked_until = Some(now + self.lock_duration);
            return Ok(Some(entry.message.clone()));
        }
    }

    async fn complete(&mut self, message: &ReceivedMessage) -> Result<(), ServiceBusError> {
        let sub_queue = self.path.sub_queue();
        self.with_locked_entry(message, |store, idx| {
            store.side(sub_queue).remove(idx);
        })?;
        debug!(entity = %self.path, message_id = %message.message_id, "message completed");
        Ok(())
    }

    async fn abandon(&mut self, message: &ReceivedMessage) -> Result<(), ServiceBusError> {
        let sub_queue = self.path.sub_queue();
        self.with_locked_entry(message, |store, idx| {
            store.side(sub_queue)[idx].unlock();
        })?;
        debug!(entity = %self.path, message_id = %message.message_id, "message abandoned");
        Ok(())
    }

    async fn dead_letter(
        &mut self,
        message: &ReceivedMessage,
        reason: &str,
        description: &str,
    ) -> Result<(), ServiceBusError> {
        if self.path.is_dead_letter() {
            return Err(ServiceBusError::Settle(format!(
                "cannot dead-letter from {}",
                self.path
            )));
        }
        self.with_locked_entry(message, |store, idx| {
            if let Some(entry) = store.active.remove(idx) {
                store.move_to_dead_letter(entry, reason, description);
            }
        })?;
        debug!(entity = %self.path, message_id = %message.message_id, reason, "message dead-lettered");
        Ok(())
    }

    async fn close(&mut self) -> Result<(), ServiceBusError> {
        self.guard.release();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TOPIC: &str = "employees";

    fn bus_with_subscriptions(subs: &[&str]) -> InMemoryServiceBus {
        let bus = InMemoryServiceBus::new();
        bus.create_topic(TOPIC).unwrap();
        for sub in subs {
            bus.create_subscription(TOPIC, sub).unwrap();
        }
        bus
    }

    async fn send_text(bus: &InMemoryServiceBus, entity: &str, body: &str) -> String {
        let mut sender = bus.create_sender(entity).await.unwrap();
        let id = sender.send(OutgoingMessage::text(body)).await.unwrap();
        sender.close().await.unwrap();
        id
    }

    #[tokio::test]
    async fn topic_send_fans_out_to_every_subscription() {
        let bus = bus_with_subscriptions(&["hr", "it"]);
        let id = send_text(&bus, TOPIC, "hello").await;

        for sub in ["hr", "it"] {
            let mut rx = bus.create_receiver(EntityPath::subscription(TOPIC, sub)).await.unwrap();
            let msg = rx.receive_one().await.unwrap().unwrap();
            assert_eq!(msg.message_id, id);
            assert_eq!(msg.body_as_str().unwrap(), "hello");
            assert_eq!(msg.delivery_count, 1);
        }
    }

    #[tokio::test]
    async fn locked_message_is_hidden_until_lock_expires() {
        let bus = InMemoryServiceBus::new().with_lock_duration(Duration::from_millis(30));
        bus.create_queue("q").unwrap();
        send_text(&bus, "q", "body").await;

        let mut rx = bus.create_receiver(EntityPath::queue("q")).await.unwrap();
        let first = rx.receive_one().await.unwrap().unwrap();
        assert!(rx.receive_one().await.unwrap().is_none());

        tokio::time::sleep(Duration::from_millis(60)).await;
        let second = rx.receive_one().await.unwrap().unwrap();
        assert_eq!(second.message_id, first.message_id);
        assert_eq!(second.delivery_count, 2);

        // The first delivery's lock is gone.
        assert!(matches!(
            rx.complete(&first).await,
            Err(ServiceBusError::LockLost { .. })
        ));
        rx.complete(&second).await.unwrap();
        assert_eq!(bus.message_count(&EntityPath::queue("q")).unwrap(), 0);
    }

    #[tokio::test]
    async fn abandon_makes_message_available_immediately() {
        let bus = InMemoryServiceBus::new();
        bus.create_queue("q").unwrap();
        send_text(&bus, "q", "body").await;

        let mut rx = bus.create_receiver(EntityPath::queue("q")).await.unwrap();
        let msg = rx.receive_one().await.unwrap().unwrap();
        rx.abandon(&msg).await.unwrap();

        let again = rx.receive_one().await.unwrap().unwrap();
        assert_eq!(again.delivery_count, 2);
    }

    #[tokio::test]
    async fn exceeding_max_delivery_count_dead_letters() {
        let bus = InMemoryServiceBus::new().with_max_delivery_count(2);
        bus.create_queue("q").unwrap();
        send_text(&bus, "q", "poison").await;

        let mut rx = bus.create_receiver(EntityPath::queue("q")).await.unwrap();
        for _ in 0..2 {
            let msg = rx.receive_one().await.unwrap().unwrap();
            rx.abandon(&msg).await.unwrap();
        }
        assert!(rx.receive_one().await.unwrap().is_none());

        let mut dlq = bus
            .create_receiver(EntityPath::queue("q").dead_letter())
            .await
            .unwrap();
        let dead = dlq.receive_one().await.unwrap().unwrap();
        assert_eq!(dead.dead_letter_reason.as_deref(), Some(MAX_DELIVERY_COUNT_EXCEEDED));
        assert_eq!(dead.body_as_str().unwrap(), "poison");
    }

    #[tokio::test]
    async fn explicit_dead_letter_records_reason() {
        let bus = bus_with_subscriptions(&["hr"]);
        send_text(&bus, TOPIC, "{}").await;
        let path = EntityPath::subscription(TOPIC, "hr");

        let mut rx = bus.create_receiver(path.clone()).await.unwrap();
        let msg = rx.receive_one().await.unwrap().unwrap();
        rx.dead_letter(&msg, "MalformedPayload", "missing fields").await.unwrap();

        assert_eq!(bus.message_count(&path).unwrap(), 0);
        assert_eq!(bus.message_count(&path.clone().dead_letter()).unwrap(), 1);

        let mut dlq = bus.create_receiver(path.dead_letter()).await.unwrap();
        let dead = dlq.receive_one().await.unwrap().unwrap();
        assert_eq!(dead.dead_letter_reason.as_deref(), Some("MalformedPayload"));
        assert_eq!(dead.dead_letter_description.as_deref(), Some("missing fields"));
        assert!(dlq.dead_letter(&dead, "again", "").await.is_err());
    }

    #[tokio::test]
    async fn handles_are_counted_and_released_on_drop() {
        let bus = InMemoryServiceBus::new();
        bus.create_queue("q").unwrap();

        let mut sender = bus.create_sender("q").await.unwrap();
        let receiver = bus.create_receiver(EntityPath::queue("q")).await.unwrap();
        assert_eq!(bus.open_handles(), 2);

        sender.close().await.unwrap();
        sender.close().await.unwrap();
        assert_eq!(bus.open_handles(), 1);
        assert_eq!(
            sender.send(OutgoingMessage::text("late")).await,
            Err(ServiceBusError::Closed)
        );

        drop(receiver);
        assert_eq!(bus.open_handles(), 0);
    }

    #[tokio::test]
    async fn unknown_entities_are_rejected() {
        let bus = bus_with_subscriptions(&["hr"]);
        assert!(matches!(
            bus.create_sender("missing").await,
            Err(ServiceBusError::EntityNotFound(_))
        ));
        assert!(matches!(
            bus.create_receiver(EntityPath::subscription(TOPIC, "nope")).await,
            Err(ServiceBusError::EntityNotFound(_))
        ));
        assert_eq!(bus.open_handles(), 0);
    }
}

//! Redis Streams-backed broker (durable, at-least-once, peek-lock emulation).
//!
//! ## Layout
//!
//! - **Entity stream**: `{prefix}:{entity}`, one per queue or topic
//! - **Queue**: a single consumer group (`$queue`) on the entity stream; completed
//!   entries are acknowledged and deleted
//! - **Topic subscription**: one consumer group per subscription on the topic
//!   stream (fan-out); completed entries are acknowledged only, since other
//!   groups may still need them
//! - **Dead-letter sub-queue**: `{prefix}:{entity}:{group}:dlq`, read through its
//!   own `$deadletter` group
//!
//! ## Peek-lock mapping
//!
//! - receive one: reclaim one pending entry idle for longer than the lock
//!   duration (`XPENDING IDLE` + `XCLAIM`), else read one new entry (`XREADGROUP`)
//! - complete: `XACK` (plus `XDEL` where the group is the only reader)
//! - abandon: `XCLAIM ... IDLE <lock> JUSTID`, making the entry reclaimable at once
//!   without counting a delivery
//! - dead-letter: `XADD` to the dead-letter stream, then `XACK`
//! - an entry that cannot be decoded (no body, unreadable properties) is
//!   dead-lettered as `MalformedEntry` as soon as it is read or claimed
//!
//! Delivery counts come from the consumer group's pending entries list.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::MultiplexedConnection;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

use emphub_messaging::{
    EntityPath, MessageReceiver, MessageSender, OutgoingMessage, ReceivedMessage,
    ServiceBusClient, ServiceBusError,
};

/// Default key prefix for entity streams.
const DEFAULT_KEY_PREFIX: &str = "emphub";

/// Consumer group used for queues.
const QUEUE_GROUP: &str = "$queue";

/// Consumer group used for dead-letter streams.
const DEAD_LETTER_GROUP: &str = "$deadletter";

/// Default approximate stream length cap (`XADD MAXLEN ~`).
const DEFAULT_MAX_LEN: usize = 10_000;

/// Default pending entry timeout (entries idle longer than this are redelivered).
const DEFAULT_LOCK_DURATION_MS: u64 = 60_000;

/// Default max deliveries before the broker dead-letters an entry.
const DEFAULT_MAX_DELIVERY_COUNT: u32 = 10;

/// Upper bound on reclaim iterations within one receive.
const MAX_RECLAIM_ATTEMPTS: usize = 16;

const MAX_DELIVERY_COUNT_EXCEEDED: &str = "MaxDeliveryCountExceeded";

/// Dead-letter reason for stream entries that cannot be decoded into a message.
const MALFORMED_ENTRY: &str = "MalformedEntry";

#[derive(Debug, thiserror::Error)]
pub enum RedisStreamsError {
    #[error("Redis connection error: {0}")]
    Connection(String),

    #[error("Redis command error: {0}")]
    Command(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Consumer group error: {0}")]
    ConsumerGroup(String),
}

impl From<RedisStreamsError> for ServiceBusError {
    fn from(value: RedisStreamsError) -> Self {
        match value {
            RedisStreamsError::Connection(msg) => ServiceBusError::Connection(msg),
            RedisStreamsError::Command(msg) => ServiceBusError::Receive(msg),
            RedisStreamsError::Deserialization(msg) => ServiceBusError::Receive(msg),
            RedisStreamsError::ConsumerGroup(msg) => ServiceBusError::Receive(msg),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RedisStreamsServiceBus {
    client: Arc<redis::Client>,
    key_prefix: String,
    lock_duration: Duration,
    max_delivery_count: u32,
    max_len: usize,
    /// Consumer name used in every group this process reads from.
    consumer_name: String,
}

impl RedisStreamsServiceBus {
    /// Create a new Redis Streams broker client.
    ///
    /// * `redis_url` - Redis connection URL (e.g., "redis://localhost:6379")
    /// * `key_prefix` - stream key prefix (default: "emphub")
    pub fn new(
        redis_url: impl AsRef<str>,
        key_prefix: Option<String>,
    ) -> Result<Self, RedisStreamsError> {
        let client = redis::Client::open(redis_url.as_ref())
            .map_err(|e| RedisStreamsError::Connection(e.to_string()))?;

        Ok(Self {
            client: Arc::new(client),
            key_prefix: key_prefix.unwrap_or_else(|| DEFAULT_KEY_PREFIX.to_string()),
            lock_duration: Duration::from_millis(DEFAULT_LOCK_DURATION_MS),
            max_delivery_count: DEFAULT_MAX_DELIVERY_COUNT,
            max_len: DEFAULT_MAX_LEN,
            consumer_name: format!("consumer-{}", Uuid::now_v7()),
        })
    }

    pub fn with_lock_duration(mut self, lock_duration: Duration) -> Self {
        self.lock_duration = lock_duration;
        self
    }

    pub fn with_max_delivery_count(mut self, max_delivery_count: u32) -> Self {
        self.max_delivery_count = max_delivery_count;
        self
    }

    pub fn with_max_len(mut self, max_len: usize) -> Self {
        self.max_len = max_len;
        self
    }

    async fn connection(&self) -> Result<MultiplexedConnection, RedisStreamsError> {
        self.client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| RedisStreamsError::Connection(e.to_string()))
    }

    /// Ensure a subscription's consumer group exists on the topic stream (idempotent).
    pub async fn ensure_subscription(
        &self,
        topic: &str,
        subscription: &str,
    ) -> Result<(), RedisStreamsError> {
        let mut conn = self.connection().await?;
        let keys = StreamKeys::for_path(&self.key_prefix, &EntityPath::subscription(topic, subscription));
        ensure_group(&mut conn, &keys.source, &keys.group).await
    }

    /// Ensure a queue's stream and consumer group exist (idempotent).
    pub async fn ensure_queue(&self, queue: &str) -> Result<(), RedisStreamsError> {
        let mut conn = self.connection().await?;
        let keys = StreamKeys::for_path(&self.key_prefix, &EntityPath::queue(queue));
        ensure_group(&mut conn, &keys.source, &keys.group).await
    }
}

#[async_trait]
impl ServiceBusClient for RedisStreamsServiceBus {
    async fn create_sender(&self, entity: &str) -> Result<Box<dyn MessageSender>, ServiceBusError> {
        let conn = self.connection().await?;
        Ok(Box::new(RedisStreamsSender {
            conn: Some(conn),
            entity: entity.to_string(),
            stream_key: entity_stream_key(&self.key_prefix, entity),
            max_len: self.max_len,
        }))
    }

    async fn create_receiver(
        &self,
        path: EntityPath,
    ) -> Result<Box<dyn MessageReceiver>, ServiceBusError> {
        let mut conn = self.connection().await?;
        let keys = StreamKeys::for_path(&self.key_prefix, &path);
        ensure_group(&mut conn, &keys.source, &keys.group).await?;

        Ok(Box::new(RedisStreamsReceiver {
            conn: Some(conn),
            path,
            keys,
            consumer: self.consumer_name.clone(),
            lock_ms: self.lock_duration.as_millis() as u64,
            max_delivery_count: self.max_delivery_count,
        }))
    }
}

fn entity_stream_key(prefix: &str, entity: &str) -> String {
    format!("{prefix}:{entity}")
}

/// Keys and group a receiver works against.
#[derive(Debug, Clone, PartialEq, Eq)]
struct StreamKeys {
    /// Stream the receiver reads from.
    source: String,
    group: String,
    /// Dead-letter stream for the active side; `None` when reading a dead-letter stream.
    dead_letter: Option<String>,
    /// Whether completed entries are deleted (single-reader streams).
    delete_on_complete: bool,
}

impl StreamKeys {
    fn for_path(prefix: &str, path: &EntityPath) -> Self {
        let entity_key = entity_stream_key(prefix, path.entity_name());
        let (active_group, single_reader) = match path {
            EntityPath::Queue { .. } => (QUEUE_GROUP.to_string(), true),
            EntityPath::Subscription { subscription, .. } => (subscription.clone(), false),
        };
        let dead_letter_key = format!("{entity_key}:{active_group}:dlq");

        if path.is_dead_letter() {
            Self {
                source: dead_letter_key,
                group: DEAD_LETTER_GROUP.to_string(),
                dead_letter: None,
                delete_on_complete: true,
            }
        } else {
            Self {
                source: entity_key,
                group: active_group,
                dead_letter: Some(dead_letter_key),
                delete_on_complete: single_reader,
            }
        }
    }
}

/// XGROUP CREATE with MKSTREAM; an existing group (BUSYGROUP) is fine.
///
/// Groups start at "0" so a subscription created after messages were published
/// still sees everything retained in the stream.
async fn ensure_group(
    conn: &mut MultiplexedConnection,
    key: &str,
    group: &str,
) -> Result<(), RedisStreamsError> {
    let created: redis::RedisResult<String> = redis::cmd("XGROUP")
        .arg("CREATE")
        .arg(key)
        .arg(group)
        .arg("0")
        .arg("MKSTREAM")
        .query_async(conn)
        .await;

    match created {
        Ok(_) => Ok(()),
        Err(e) if e.code() == Some("BUSYGROUP") => Ok(()),
        Err(e) => Err(RedisStreamsError::ConsumerGroup(format!(
            "XGROUP CREATE {key} {group} failed: {e}"
        ))),
    }
}

struct RedisStreamsSender {
    conn: Option<MultiplexedConnection>,
    entity: String,
    stream_key: String,
    max_len: usize,
}

#[async_trait]
impl MessageSender for RedisStreamsSender {
    fn entity(&self) -> &str {
        &self.entity
    }

    #[instrument(skip(self, message), fields(stream_key = %self.stream_key), err)]
    async fn send(&mut self, message: OutgoingMessage) -> Result<String, ServiceBusError> {
        let mut conn = self.conn.clone().ok_or(ServiceBusError::Closed)?;
        let message_id = message
            .message_id
            .clone()
            .unwrap_or_else(|| Uuid::now_v7().to_string());

        let mut cmd = redis::cmd("XADD");
        cmd.arg(&self.stream_key)
            .arg("MAXLEN")
            .arg("~")
            .arg(self.max_len)
            .arg("*");
        for (field, value) in outgoing_fields(&message_id, &message) {
            cmd.arg(field).arg(value);
        }

        let _: String = cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| ServiceBusError::Send(format!("XADD failed: {e}")))?;

        Ok(message_id)
    }

    async fn close(&mut self) -> Result<(), ServiceBusError> {
        self.conn = None;
        Ok(())
    }
}

/// Outcome of one reclaim attempt.
enum Reclaim {
    /// Nothing pending past its lock.
    Nothing,
    /// An entry was listed but another consumer claimed or deleted it first.
    Raced,
    Claimed(ReceivedMessage),
    Malformed(MalformedEntry),
}

/// A stream entry read or claimed as a message, or one that could not be decoded.
enum Decoded {
    Message(ReceivedMessage),
    Malformed(MalformedEntry),
}

/// Raw entry kept for the dead-letter stream when decoding failed.
#[derive(Debug, Clone)]
struct MalformedEntry {
    entry_id: String,
    fields: HashMap<String, Vec<u8>>,
    delivery_count: u32,
    error: String,
}

struct RedisStreamsReceiver {
    conn: Option<MultiplexedConnection>,
    path: EntityPath,
    keys: StreamKeys,
    consumer: String,
    lock_ms: u64,
    max_delivery_count: u32,
}

impl RedisStreamsReceiver {
    fn conn(&self) -> Result<MultiplexedConnection, ServiceBusError> {
        self.conn.clone().ok_or(ServiceBusError::Closed)
    }

    /// Claim one entry whose lock has expired, if any.
    async fn reclaim_one(&self) -> Result<Reclaim, ServiceBusError> {
        let mut conn = self.conn()?;

        let pending: Vec<(String, String, u64, u64)> = redis::cmd("XPENDING")
            .arg(&self.keys.source)
            .arg(&self.keys.group)
            .arg("IDLE")
            .arg(self.lock_ms)
            .arg("-")
            .arg("+")
            .arg(1)
            .query_async(&mut conn)
            .await
            .map_err(|e| ServiceBusError::Receive(format!("XPENDING failed: {e}")))?;

        let Some((entry_id, _, _, deliveries)) = pending.into_iter().next() else {
            return Ok(Reclaim::Nothing);
        };

        let claimed: redis::Value = redis::cmd("XCLAIM")
            .arg(&self.keys.source)
            .arg(&self.keys.group)
            .arg(&self.consumer)
            .arg(self.lock_ms)
            .arg(&entry_id)
            .query_async(&mut conn)
            .await
            .map_err(|e| ServiceBusError::Receive(format!("XCLAIM failed: {e}")))?;

        let entry = parse_entries(claimed)?.into_iter().next();
        match entry {
            Some((id, fields)) => {
                let delivery_count = u32::try_from(deliveries + 1).unwrap_or(u32::MAX);
                Ok(match decode_entry(id, fields, delivery_count) {
                    Decoded::Message(message) => Reclaim::Claimed(message),
                    Decoded::Malformed(entry) => Reclaim::Malformed(entry),
                })
            }
            None => Ok(Reclaim::Raced),
        }
    }

    async fn read_new(&self) -> Result<Option<Decoded>, ServiceBusError> {
        let mut conn = self.conn()?;
        let reply: redis::Value = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.keys.group)
            .arg(&self.consumer)
            .arg("COUNT")
            .arg(1)
            .arg("STREAMS")
            .arg(&self.keys.source)
            .arg(">")
            .query_async(&mut conn)
            .await
            .map_err(|e| ServiceBusError::Receive(format!("XREADGROUP failed: {e}")))?;

        let entry = parse_read_reply(reply)?.into_iter().next();
        Ok(entry.map(|(id, fields)| decode_entry(id, fields, 1)))
    }

    async fn acknowledge(&self, conn: &mut MultiplexedConnection, entry_id: &str) -> Result<u64, ServiceBusError> {
        let acked: u64 = redis::cmd("XACK")
            .arg(&self.keys.source)
            .arg(&self.keys.group)
            .arg(entry_id)
            .query_async(conn)
            .await
            .map_err(|e| ServiceBusError::Settle(format!("XACK failed: {e}")))?;

        if acked > 0 && self.keys.delete_on_complete {
            let _: u64 = redis::cmd("XDEL")
                .arg(&self.keys.source)
                .arg(entry_id)
                .query_async(conn)
                .await
                .map_err(|e| ServiceBusError::Settle(format!("XDEL failed: {e}")))?;
        }
        Ok(acked)
    }

    async fn move_to_dead_letter(
        &self,
        message: &ReceivedMessage,
        reason: &str,
        description: &str,
    ) -> Result<(), ServiceBusError> {
        let Some(dead_letter_key) = &self.keys.dead_letter else {
            return Err(ServiceBusError::Settle(format!(
                "cannot dead-letter from {}",
                self.path
            )));
        };
        let mut conn = self.conn()?;

        let mut cmd = redis::cmd("XADD");
        cmd.arg(dead_letter_key).arg("*");
        for (field, value) in received_fields(message) {
            cmd.arg(field).arg(value);
        }
        cmd.arg("original_entry_id")
            .arg(&message.lock_token)
            .arg("retry_count")
            .arg(message.delivery_count.to_string())
            .arg("failed_at")
            .arg(Utc::now().to_rfc3339())
            .arg("dead_letter_reason")
            .arg(reason)
            .arg("dead_letter_description")
            .arg(description);

        let _: String = cmd
            .query_async(&mut conn)
            .await
            .map_err(|e| ServiceBusError::Settle(format!("DLQ XADD failed: {e}")))?;

        self.acknowledge(&mut conn, &message.lock_token).await?;

        warn!(
            message_id = %message.message_id,
            retry_count = message.delivery_count,
            reason,
            "Message sent to dead-letter queue"
        );
        Ok(())
    }

    /// Take an undecodable entry out of the pending list.
    ///
    /// It is copied to the dead-letter stream when there is one; entries that are
    /// already on a dead-letter stream are acknowledged and dropped.
    async fn discard_malformed(&self, entry: &MalformedEntry) -> Result<(), ServiceBusError> {
        let mut conn = self.conn()?;

        match &self.keys.dead_letter {
            Some(dead_letter_key) => {
                let mut cmd = redis::cmd("XADD");
                cmd.arg(dead_letter_key).arg("*");
                for (field, value) in malformed_fields(entry, Utc::now()) {
                    cmd.arg(field).arg(value);
                }
                let _: String = cmd
                    .query_async(&mut conn)
                    .await
                    .map_err(|e| ServiceBusError::Settle(format!("DLQ XADD failed: {e}")))?;
                warn!(
                    entry_id = %entry.entry_id,
                    error = %entry.error,
                    "Malformed entry sent to dead-letter queue"
                );
            }
            None => {
                warn!(
                    entry_id = %entry.entry_id,
                    error = %entry.error,
                    "Dropping malformed dead-letter entry"
                );
            }
        }

        self.acknowledge(&mut conn, &entry.entry_id).await?;
        Ok(())
    }
}

#[async_trait]
impl MessageReceiver for RedisStreamsReceiver {
    fn path(&self) -> &EntityPath {
        &self.path
    }

    #[instrument(skip(self), fields(stream_key = %self.keys.source, group = %self.keys.group), err)]
    async fn receive_one(&mut self) -> Result<Option<ReceivedMessage>, ServiceBusError> {
        for _ in 0..MAX_RECLAIM_ATTEMPTS {
            match self.reclaim_one().await? {
                Reclaim::Nothing => break,
                Reclaim::Raced => continue,
                Reclaim::Malformed(entry) => {
                    self.discard_malformed(&entry).await?;
                    continue;
                }
                Reclaim::Claimed(message) => {
                    if !self.path.is_dead_letter() && message.delivery_count > self.max_delivery_count {
                        let description = format!("delivery count exceeded {}", self.max_delivery_count);
                        self.move_to_dead_letter(&message, MAX_DELIVERY_COUNT_EXCEEDED, &description)
                            .await?;
                        continue;
                    }
                    debug!(entry_id = %message.lock_token, delivery_count = message.delivery_count, "reclaimed entry");
                    return Ok(Some(message));
                }
            }
        }

        for _ in 0..MAX_RECLAIM_ATTEMPTS {
            match self.read_new().await? {
                None => return Ok(None),
                Some(Decoded::Message(message)) => return Ok(Some(message)),
                Some(Decoded::Malformed(entry)) => self.discard_malformed(&entry).await?,
            }
        }
        Ok(None)
    }

    async fn complete(&mut self, message: &ReceivedMessage) -> Result<(), ServiceBusError> {
        let mut conn = self.conn()?;
        let acked = self.acknowledge(&mut conn, &message.lock_token).await?;
        if acked == 0 {
            return Err(ServiceBusError::LockLost {
                message_id: message.message_id.clone(),
            });
        }
        Ok(())
    }

    async fn abandon(&mut self, message: &ReceivedMessage) -> Result<(), ServiceBusError> {
        let mut conn = self.conn()?;
        let claimed: Vec<String> = redis::cmd("XCLAIM")
            .arg(&self.keys.source)
            .arg(&self.keys.group)
            .arg(&self.consumer)
            .arg(0)
            .arg(&message.lock_token)
            .arg("IDLE")
            .arg(self.lock_ms)
            .arg("JUSTID")
            .query_async(&mut conn)
            .await
            .map_err(|e| ServiceBusError::Settle(format!("XCLAIM IDLE failed: {e}")))?;

        if claimed.is_empty() {
            return Err(ServiceBusError::LockLost {
                message_id: message.message_id.clone(),
            });
        }
        Ok(())
    }

    async fn dead_letter(
        &mut self,
        message: &ReceivedMessage,
        reason: &str,
        description: &str,
    ) -> Result<(), ServiceBusError> {
        self.move_to_dead_letter(message, reason, description).await
    }

    async fn close(&mut self) -> Result<(), ServiceBusError> {
        self.conn = None;
        Ok(())
    }
}

/// Stream fields for one message.
fn encode_fields(
    message_id: &str,
    body: &[u8],
    enqueued_at: DateTime<Utc>,
    content_type: Option<&str>,
    subject: Option<&str>,
    properties: &BTreeMap<String, String>,
) -> Vec<(&'static str, Vec<u8>)> {
    let mut fields = vec![
        ("message_id", message_id.as_bytes().to_vec()),
        ("body", body.to_vec()),
        ("enqueued_at", enqueued_at.to_rfc3339().into_bytes()),
    ];
    if let Some(ct) = content_type {
        fields.push(("content_type", ct.as_bytes().to_vec()));
    }
    if let Some(subject) = subject {
        fields.push(("subject", subject.as_bytes().to_vec()));
    }
    if !properties.is_empty() {
        fields.push(("properties", serde_json::to_vec(properties).unwrap_or_default()));
    }
    fields
}

fn outgoing_fields(message_id: &str, message: &OutgoingMessage) -> Vec<(&'static str, Vec<u8>)> {
    encode_fields(
        message_id,
        &message.body,
        Utc::now(),
        message.content_type.as_deref(),
        message.subject.as_deref(),
        &message.application_properties,
    )
}

fn received_fields(message: &ReceivedMessage) -> Vec<(&'static str, Vec<u8>)> {
    encode_fields(
        &message.message_id,
        &message.body,
        message.enqueued_at,
        message.content_type.as_deref(),
        message.subject.as_deref(),
        &message.application_properties,
    )
}

type StreamEntry = (String, HashMap<String, Vec<u8>>);

/// Parse an XREADGROUP reply: `[[stream_key, [entry, ...]], ...]` or nil.
fn parse_read_reply(reply: redis::Value) -> Result<Vec<StreamEntry>, RedisStreamsError> {
    let streams = match reply {
        redis::Value::Nil => return Ok(vec![]),
        redis::Value::Bulk(v) => v,
        _ => return Err(RedisStreamsError::Deserialization("Invalid XREADGROUP reply".to_string())),
    };

    let mut entries = Vec::new();
    for stream in streams {
        let mut parts = match stream {
            redis::Value::Bulk(v) if v.len() == 2 => v,
            _ => return Err(RedisStreamsError::Deserialization("Invalid stream reply".to_string())),
        };
        if let Some(stream_entries) = parts.pop() {
            entries.extend(parse_entries(stream_entries)?);
        }
    }
    Ok(entries)
}

/// Parse a list of entries: `[[id, [field, value, ...]], ...]`.
///
/// Entries deleted from the stream (nil fields) are skipped.
fn parse_entries(value: redis::Value) -> Result<Vec<StreamEntry>, RedisStreamsError> {
    let items = match value {
        redis::Value::Nil => return Ok(vec![]),
        redis::Value::Bulk(v) => v,
        _ => return Err(RedisStreamsError::Deserialization("Invalid entry list".to_string())),
    };

    let mut entries = Vec::with_capacity(items.len());
    for item in items {
        let entry_vec = match item {
            redis::Value::Bulk(v) => v,
            redis::Value::Nil => continue,
            _ => return Err(RedisStreamsError::Deserialization("Invalid entry format".to_string())),
        };
        if entry_vec.len() < 2 {
            return Err(RedisStreamsError::Deserialization("Entry too short".to_string()));
        }

        let id = match &entry_vec[0] {
            redis::Value::Data(data) => String::from_utf8_lossy(data).to_string(),
            _ => return Err(RedisStreamsError::Deserialization("Invalid message ID format".to_string())),
        };

        let fields_vec = match &entry_vec[1] {
            redis::Value::Bulk(v) => v,
            redis::Value::Nil => continue,
            _ => return Err(RedisStreamsError::Deserialization("Invalid fields format".to_string())),
        };

        let mut fields = HashMap::new();
        for chunk in fields_vec.chunks(2) {
            if let [redis::Value::Data(key), redis::Value::Data(value)] = chunk {
                fields.insert(String::from_utf8_lossy(key).to_string(), value.clone());
            }
        }
        entries.push((id, fields));
    }
    Ok(entries)
}

fn decode_entry(entry_id: String, fields: HashMap<String, Vec<u8>>, delivery_count: u32) -> Decoded {
    match to_received(entry_id.clone(), fields.clone(), delivery_count) {
        Ok(message) => Decoded::Message(message),
        Err(e) => Decoded::Malformed(MalformedEntry {
            entry_id,
            fields,
            delivery_count,
            error: e.to_string(),
        }),
    }
}

/// Dead-letter stream fields for an undecodable entry.
///
/// The result always decodes: a missing body becomes empty and unreadable
/// properties are kept verbatim under `raw_properties`.
fn malformed_fields(entry: &MalformedEntry, failed_at: DateTime<Utc>) -> Vec<(String, Vec<u8>)> {
    const RESERVED: [&str; 6] = [
        "properties",
        "original_entry_id",
        "retry_count",
        "failed_at",
        "dead_letter_reason",
        "dead_letter_description",
    ];

    let mut raw: Vec<(&String, &Vec<u8>)> = entry
        .fields
        .iter()
        .filter(|(k, _)| !RESERVED.contains(&k.as_str()))
        .collect();
    raw.sort();

    let mut fields: Vec<(String, Vec<u8>)> = raw.into_iter().map(|(k, v)| (k.clone(), v.clone())).collect();
    if !entry.fields.contains_key("body") {
        fields.push(("body".to_string(), Vec::new()));
    }
    if !entry.fields.contains_key("message_id") {
        fields.push(("message_id".to_string(), entry.entry_id.as_bytes().to_vec()));
    }
    if let Some(props) = entry.fields.get("properties") {
        match serde_json::from_slice::<BTreeMap<String, String>>(props) {
            Ok(_) => fields.push(("properties".to_string(), props.clone())),
            Err(_) => fields.push(("raw_properties".to_string(), props.clone())),
        }
    }

    fields.extend([
        ("original_entry_id".to_string(), entry.entry_id.as_bytes().to_vec()),
        ("retry_count".to_string(), entry.delivery_count.to_string().into_bytes()),
        ("failed_at".to_string(), failed_at.to_rfc3339().into_bytes()),
        ("dead_letter_reason".to_string(), MALFORMED_ENTRY.as_bytes().to_vec()),
        ("dead_letter_description".to_string(), entry.error.as_bytes().to_vec()),
    ]);
    fields
}

fn to_received(
    entry_id: String,
    mut fields: HashMap<String, Vec<u8>>,
    delivery_count: u32,
) -> Result<ReceivedMessage, RedisStreamsError> {
    let text = |fields: &mut HashMap<String, Vec<u8>>, key: &str| -> Option<String> {
        fields
            .remove(key)
            .map(|v| String::from_utf8_lossy(&v).to_string())
    };

    let body = fields
        .remove("body")
        .ok_or_else(|| RedisStreamsError::Deserialization("Missing body field".to_string()))?;

    let application_properties: BTreeMap<String, String> = match fields.remove("properties") {
        Some(raw) => serde_json::from_slice(&raw)
            .map_err(|e| RedisStreamsError::Deserialization(format!("Invalid properties: {e}")))?,
        None => BTreeMap::new(),
    };

    let enqueued_at = text(&mut fields, "enqueued_at")
        .and_then(|s| DateTime::parse_from_rfc3339(&s).ok())
        .map(|t| t.with_timezone(&Utc))
        .unwrap_or_else(Utc::now);

    Ok(ReceivedMessage {
        message_id: text(&mut fields, "message_id").unwrap_or_else(|| entry_id.clone()),
        body,
        content_type: text(&mut fields, "content_type"),
        subject: text(&mut fields, "subject"),
        application_properties,
        delivery_count,
        enqueued_at,
        lock_token: entry_id,
        dead_letter_reason: text(&mut fields, "dead_letter_reason"),
        dead_letter_description: text(&mut fields, "dead_letter_description"),
    })
}

//! Failure policy of the shared subscriber handler, driven through the host
//! against the in-memory broker.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;

use emphub_core::{EmployeeId, EmployeeSnapshot, NewEmployee};
use emphub_messaging::{
    EntityPath, InMemoryServiceBus, OutgoingMessage, ServiceBusError, ServiceBusHelper,
};
use emphub_subscribers::{
    DeadLetterReason, EmployeeProcessor, HandlerOutcome, LoggingProcessor, ProcessingError, RunOutcome,
    SubscriberConfig, SubscriberError, SubscriberHandler, SubscriberHost, SubscriberKind,
};

const TOPIC: &str = "employees";

/// Processor that returns a fixed result and counts calls.
struct ScriptedProcessor {
    result: Result<(), ProcessingError>,
    delay: Duration,
    calls: AtomicUsize,
}

impl ScriptedProcessor {
    fn returning(result: Result<(), ProcessingError>) -> Arc<Self> {
        Arc::new(Self {
            result,
            delay: Duration::ZERO,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmployeeProcessor for ScriptedProcessor {
    async fn process(&self, _snapshot: &EmployeeSnapshot) -> Result<(), ProcessingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.result.clone()
    }
}

fn bus(lock: Duration) -> Arc<InMemoryServiceBus> {
    let bus = InMemoryServiceBus::new().with_lock_duration(lock);
    bus.create_topic(TOPIC).unwrap();
    bus.create_subscription(TOPIC, "hr").unwrap();
    bus.create_subscription(TOPIC, "it").unwrap();
    Arc::new(bus)
}

fn config(kind: SubscriberKind, max_attempts: u32) -> SubscriberConfig {
    SubscriberConfig::for_kind(kind)
        .with_topic(TOPIC)
        .with_max_attempts(max_attempts)
        .with_poll_interval(Duration::from_millis(10))
}

fn host(bus: &Arc<InMemoryServiceBus>, config: SubscriberConfig, processor: Arc<dyn EmployeeProcessor>) -> SubscriberHost {
    let handler = SubscriberHandler::new(&config, processor);
    SubscriberHost::new(bus.clone(), config, handler)
}

fn snapshot_json() -> String {
    let employee = NewEmployee {
        name: "A".into(),
        email: "a@b.com".into(),
        department: "IT".into(),
        hire_date: NaiveDate::from_ymd_opt(2024, 1, 1),
        salary: Decimal::new(5_000_000, 2),
        phone_number: "+15551234567".into(),
    }
    .validate()
    .unwrap()
    .with_id(EmployeeId::new(1));
    EmployeeSnapshot::from_employee(employee).to_json().unwrap()
}

async fn publish(bus: &Arc<InMemoryServiceBus>, message: OutgoingMessage) {
    ServiceBusHelper::new(bus.clone())
        .send_message(TOPIC, message)
        .await
        .unwrap();
}

fn snapshot_message() -> OutgoingMessage {
    OutgoingMessage::text(snapshot_json())
        .with_content_type(EmployeeSnapshot::CONTENT_TYPE)
        .with_subject(EmployeeSnapshot::SUBJECT)
        .with_property("schema_version", EmployeeSnapshot::SCHEMA_VERSION)
}

fn hr_path() -> EntityPath {
    EntityPath::subscription(TOPIC, "hr")
}

#[tokio::test]
async fn empty_subscription_is_idle() {
    let bus = bus(Duration::from_secs(30));
    let processor = ScriptedProcessor::returning(Ok(()));
    let host = host(&bus, config(SubscriberKind::Hr, 3), processor.clone());

    assert_eq!(host.run_once().await.unwrap(), RunOutcome::Idle);
    assert_eq!(processor.calls(), 0);
    assert_eq!(bus.open_handles(), 0);
}

#[tokio::test]
async fn successful_processing_completes_on_both_subscriptions() {
    let bus = bus(Duration::from_secs(30));
    publish(&bus, snapshot_message()).await;

    for kind in [SubscriberKind::Hr, SubscriberKind::It] {
        let cfg = config(kind, 3);
        let path = EntityPath::subscription(TOPIC, cfg.subscription.clone());
        let host = host(&bus, cfg, Arc::new(LoggingProcessor::new(kind.name())));

        let outcome = host.run_once().await.unwrap();
        assert!(matches!(outcome, RunOutcome::Handled(HandlerOutcome::Completed { .. })));
        assert_eq!(bus.message_count(&path).unwrap(), 0);
        assert_eq!(bus.message_count(&path.dead_letter()).unwrap(), 0);
    }
    assert_eq!(bus.open_handles(), 0);
}

#[tokio::test]
async fn malformed_body_is_dead_lettered_without_processing() {
    let bus = bus(Duration::from_secs(30));
    publish(&bus, OutgoingMessage::text("{\"name\":")).await;
    let processor = ScriptedProcessor::returning(Ok(()));
    let host = host(&bus, config(SubscriberKind::Hr, 3), processor.clone());

    match host.run_once().await.unwrap() {
        RunOutcome::Handled(HandlerOutcome::DeadLettered { reason, .. }) => {
            assert_eq!(reason, DeadLetterReason::MalformedPayload)
        }
        other => panic!("expected dead-letter, got {other:?}"),
    }
    assert_eq!(processor.calls(), 0);
    assert_eq!(bus.message_count(&hr_path()).unwrap(), 0);

    let dead = ServiceBusHelper::new(bus.clone())
        .receive_dead_letter(TOPIC, Some("hr"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(dead.dead_letter_reason.as_deref(), Some("MalformedPayload"));
    assert_eq!(bus.open_handles(), 0);
}

#[tokio::test]
async fn unknown_schema_version_is_dead_lettered() {
    let bus = bus(Duration::from_secs(30));
    publish(
        &bus,
        OutgoingMessage::text(snapshot_json()).with_property("schema_version", "2"),
    )
    .await;
    let processor = ScriptedProcessor::returning(Ok(()));
    let host = host(&bus, config(SubscriberKind::It, 3).with_subscription("hr"), processor.clone());

    let outcome = host.run_once().await.unwrap();
    assert!(matches!(
        outcome,
        RunOutcome::Handled(HandlerOutcome::DeadLettered {
            reason: DeadLetterReason::UnsupportedSchema,
            ..
        })
    ));
    assert_eq!(processor.calls(), 0);
}

#[tokio::test]
async fn retryable_failure_abandons_until_the_attempt_limit() {
    let bus = bus(Duration::from_secs(30));
    publish(&bus, snapshot_message()).await;
    let processor = ScriptedProcessor::returning(Err(ProcessingError::Retryable("hr system busy".into())));
    let host = host(&bus, config(SubscriberKind::Hr, 2), processor.clone());

    // Abandon releases the lock, so the next poll sees the message again.
    let first = host.run_once().await.unwrap();
    assert!(matches!(
        first,
        RunOutcome::Handled(HandlerOutcome::Abandoned { delivery_count: 1, .. })
    ));
    assert_eq!(bus.message_count(&hr_path()).unwrap(), 1);

    let second = host.run_once().await.unwrap();
    assert!(matches!(
        second,
        RunOutcome::Handled(HandlerOutcome::DeadLettered {
            reason: DeadLetterReason::MaxAttemptsExceeded,
            ..
        })
    ));
    assert_eq!(processor.calls(), 2);
    assert_eq!(bus.message_count(&hr_path()).unwrap(), 0);
    assert_eq!(bus.message_count(&hr_path().dead_letter()).unwrap(), 1);
    assert_eq!(bus.open_handles(), 0);
}

#[tokio::test]
async fn terminal_failure_is_dead_lettered_immediately() {
    let bus = bus(Duration::from_secs(30));
    publish(&bus, snapshot_message()).await;
    let processor = ScriptedProcessor::returning(Err(ProcessingError::Terminal("no such department".into())));
    let host = host(&bus, config(SubscriberKind::Hr, 5), processor.clone());

    let outcome = host.run_once().await.unwrap();
    assert!(matches!(
        outcome,
        RunOutcome::Handled(HandlerOutcome::DeadLettered {
            reason: DeadLetterReason::ProcessingFailed,
            ..
        })
    ));
    assert_eq!(processor.calls(), 1);

    let dead = ServiceBusHelper::new(bus.clone())
        .receive_dead_letter(TOPIC, Some("hr"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(dead.dead_letter_description.as_deref(), Some("no such department"));
}

#[tokio::test]
async fn lost_lock_surfaces_as_settlement_error() {
    let bus = bus(Duration::from_millis(30));
    publish(&bus, snapshot_message()).await;
    let processor = Arc::new(ScriptedProcessor {
        result: Ok(()),
        delay: Duration::from_millis(80),
        calls: AtomicUsize::new(0),
    });
    let host = host(&bus, config(SubscriberKind::Hr, 3), processor);

    match host.run_once().await {
        Err(SubscriberError::Settle { action, source, .. }) => {
            assert_eq!(action, "complete");
            assert!(matches!(source, ServiceBusError::LockLost { .. }));
        }
        other => panic!("expected settlement failure, got {other:?}"),
    }
    // Still on the subscription for redelivery.
    assert_eq!(bus.message_count(&hr_path()).unwrap(), 1);
    assert_eq!(bus.open_handles(), 0);
}

#[tokio::test]
async fn spawned_host_drains_and_stops_on_shutdown() {
    let bus = bus(Duration::from_secs(30));
    publish(&bus, snapshot_message()).await;
    publish(&bus, snapshot_message()).await;

    let handle = host(
        &bus,
        config(SubscriberKind::It, 3),
        Arc::new(LoggingProcessor::new("it-subscriber")),
    )
    .spawn();

    for _ in 0..100 {
        if handle.stats().completed == 2 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let stats = handle.shutdown().await;
    assert_eq!(stats.completed, 2);
    assert_eq!(stats.received, 2);
    assert_eq!(stats.errors, 0);
    assert_eq!(bus.open_handles(), 0);
}

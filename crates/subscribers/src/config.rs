use std::time::Duration;

use emphub_infra::BusConfig;
use emphub_infra::config::env_or;

/// The two subscriber variants. They share the handler policy and differ only
/// in name, subscription, and injected processor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubscriberKind {
    Hr,
    It,
}

impl SubscriberKind {
    pub fn name(self) -> &'static str {
        match self {
            SubscriberKind::Hr => "hr-subscriber",
            SubscriberKind::It => "it-subscriber",
        }
    }

    pub fn default_subscription(self) -> &'static str {
        match self {
            SubscriberKind::Hr => "hr",
            SubscriberKind::It => "it",
        }
    }
}

/// Subscriber configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscriberConfig {
    /// Name for logging
    pub name: String,
    pub topic: String,
    pub subscription: String,
    /// Deliveries after which a retryable failure is dead-lettered.
    pub max_attempts: u32,
    /// Sleep between polls when the subscription is empty
    pub poll_interval: Duration,
}

impl SubscriberConfig {
    pub const DEFAULT_MAX_ATTEMPTS: u32 = 5;
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);

    pub fn for_kind(kind: SubscriberKind) -> Self {
        Self {
            name: kind.name().to_string(),
            topic: BusConfig::DEFAULT_TOPIC.to_string(),
            subscription: kind.default_subscription().to_string(),
            max_attempts: Self::DEFAULT_MAX_ATTEMPTS,
            poll_interval: Self::DEFAULT_POLL_INTERVAL,
        }
    }

    /// `SB_TOPIC`, `SB_SUBSCRIPTION`, `SB_MAX_ATTEMPTS`, `SB_POLL_INTERVAL_MS`,
    /// each falling back to the variant's defaults.
    pub fn from_env(kind: SubscriberKind) -> anyhow::Result<Self> {
        let defaults = Self::for_kind(kind);
        let max_attempts: u32 = env_or("SB_MAX_ATTEMPTS", defaults.max_attempts)?;
        if max_attempts == 0 {
            anyhow::bail!("SB_MAX_ATTEMPTS must be at least 1");
        }
        let poll_ms: u64 = env_or("SB_POLL_INTERVAL_MS", defaults.poll_interval.as_millis() as u64)?;

        Ok(Self {
            topic: env_or("SB_TOPIC", defaults.topic.clone())?,
            subscription: env_or("SB_SUBSCRIPTION", defaults.subscription.clone())?,
            max_attempts,
            poll_interval: Duration::from_millis(poll_ms),
            ..defaults
        })
    }

    pub fn with_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic = topic.into();
        self
    }

    pub fn with_subscription(mut self, subscription: impl Into<String>) -> Self {
        self.subscription = subscription.into();
        self
    }

    pub fn with_max_attempts(mut self, max: u32) -> Self {
        self.max_attempts = max;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn variants_differ_only_by_name_and_subscription() {
        let hr = SubscriberConfig::for_kind(SubscriberKind::Hr);
        let it = SubscriberConfig::for_kind(SubscriberKind::It);
        assert_eq!(hr.subscription, "hr");
        assert_eq!(it.subscription, "it");
        assert_eq!(hr.topic, it.topic);
        assert_eq!(hr.max_attempts, it.max_attempts);
        assert_ne!(hr.name, it.name);
    }
}

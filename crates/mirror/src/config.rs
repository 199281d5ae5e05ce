use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which role, if any, this instance plays in the mirror transport
/// (§6 `mirror_direction`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MirrorDirection {
    None,
    Send,
    Recv,
}

/// Exponential backoff with a cap, shared shape with any other
/// operation in this stack retried against an unreliable peer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RetryPolicy {
    #[serde(with = "duration_millis")]
    pub initial_delay: Duration,
    #[serde(with = "duration_millis")]
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl RetryPolicy {
    pub const fn new(initial_delay: Duration, max_delay: Duration, backoff_multiplier: f64) -> Self {
        Self { initial_delay, max_delay, backoff_multiplier }
    }

    /// Delay to wait before the `attempt`-th retry (0-indexed, 0 = first
    /// retry after the initial failed attempt).
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_ms =
            self.initial_delay.as_millis() as f64 * self.backoff_multiplier.powi(attempt as i32);
        Duration::from_millis(delay_ms as u64).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        // §6's "≥1 s interval" floor on sender reconnect.
        Self::new(Duration::from_secs(1), Duration::from_secs(30), 2.0)
    }
}

/// Tuning for [`crate::MirrorSender`]/[`crate::MirrorReceiver`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MirrorConfig {
    pub direction: MirrorDirection,
    /// `host:port` of the peer (sender's target, or receiver's own bind
    /// address).
    pub endpoint: String,
    #[serde(with = "duration_millis")]
    pub connect_timeout: Duration,
    /// If a write would block longer than this, the in-flight block is
    /// dropped and counted rather than stalling the sender indefinitely.
    #[serde(with = "duration_millis")]
    pub write_timeout: Duration,
    #[serde(with = "duration_millis")]
    pub read_timeout: Duration,
    pub retry: RetryPolicy,
    /// How often the receiver's connection map is swept for connections
    /// whose reader thread has exited.
    #[serde(with = "duration_millis")]
    pub cleanup_interval: Duration,
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (d.as_millis() as u64).serialize(s)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

impl MirrorConfig {
    pub fn disabled() -> Self {
        Self {
            direction: MirrorDirection::None,
            endpoint: String::new(),
            connect_timeout: Duration::from_secs(2),
            write_timeout: Duration::from_secs(1),
            read_timeout: Duration::from_millis(500),
            retry: RetryPolicy::default(),
            cleanup_interval: Duration::from_secs(5),
        }
    }

    pub fn sender(endpoint: impl Into<String>) -> Self {
        Self { direction: MirrorDirection::Send, endpoint: endpoint.into(), ..Self::disabled() }
    }

    pub fn receiver(endpoint: impl Into<String>) -> Self {
        Self { direction: MirrorDirection::Recv, endpoint: endpoint.into(), ..Self::disabled() }
    }
}

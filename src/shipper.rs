//! Queueing and retry machinery shared by the remote sinks.
//!
//! A [`Shipper`] owns a bounded queue and one background task. The task
//! takes records in FIFO order and retries each one until its
//! [`Transport`] accepts it, reconnecting lazily and sleeping with
//! exponential backoff between attempts. A stuck record holds back the
//! records queued behind it.

use crate::backoff::{Backoff, BackoffPolicy};
use crate::error::DeliveryError;
use crate::last_resort;
use crate::record::Record;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::runtime::{Handle, RuntimeFlavor};
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio::time::sleep;

/// Network backend driven by a shipper worker.
///
/// The worker owns the transport and the connection exclusively, so
/// neither needs to be shareable.
#[async_trait]
pub trait Transport: Send + 'static {
    type Connection: Send;

    /// Short name used in diagnostics.
    fn name(&self) -> &str;

    /// Open a new connection to the aggregator.
    async fn connect(&mut self) -> Result<Self::Connection, DeliveryError>;

    /// Deliver one record over an open connection.
    ///
    /// Returning a retryable error discards `conn`; the worker reconnects
    /// before the next attempt.
    async fn send(
        &mut self,
        conn: &mut Self::Connection,
        record: &Record,
    ) -> Result<(), DeliveryError>;
}

/// What `print` does when the queue is full.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverflowPolicy {
    /// Discard the new record and count it.
    #[default]
    DropNewest,
    /// Wait for room. Only possible off the runtime or on a multi-thread
    /// runtime; on a current-thread runtime the record is dropped instead.
    Block,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ShipperConfig {
    pub capacity: usize,
    pub overflow: OverflowPolicy,
    pub backoff: BackoffPolicy,
}

impl Default for ShipperConfig {
    fn default() -> Self {
        Self {
            capacity: 1000,
            overflow: OverflowPolicy::default(),
            backoff: BackoffPolicy::default(),
        }
    }
}

/// Connection state of a shipper worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Sending,
}

impl ConnectionState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => ConnectionState::Connecting,
            2 => ConnectionState::Connected,
            3 => ConnectionState::Sending,
            _ => ConnectionState::Disconnected,
        }
    }
}

/// Counters updated by a shipper and its worker.
#[derive(Debug, Default)]
pub struct ShipperStats {
    enqueued: AtomicU64,
    dropped: AtomicU64,
    delivered: AtomicU64,
    retries: AtomicU64,
    state: AtomicU8,
}

impl ShipperStats {
    /// Records accepted into the queue.
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    /// Records discarded because the queue was full, the worker was gone
    /// or the record could not be encoded.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }

    /// Failed attempts that were followed by a backoff sleep.
    pub fn retries(&self) -> u64 {
        self.retries.load(Ordering::Relaxed)
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Relaxed))
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state as u8, Ordering::Relaxed);
    }

    fn record_drop(&self) -> u64 {
        self.dropped.fetch_add(1, Ordering::Relaxed) + 1
    }
}

/// Producer side of a shipper: a bounded queue in front of one worker.
pub struct Shipper {
    name: String,
    sender: mpsc::Sender<Arc<Record>>,
    overflow: OverflowPolicy,
    stats: Arc<ShipperStats>,
}

impl Shipper {
    /// Spawn the worker for `transport` and return the queue handle.
    ///
    /// `connection` is an already-open connection, if the caller made one;
    /// otherwise the worker connects on the first record.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn spawn<T: Transport>(
        transport: T,
        connection: Option<T::Connection>,
        config: ShipperConfig,
    ) -> (Self, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel::<Arc<Record>>(config.capacity.max(1));
        let stats = Arc::new(ShipperStats::default());
        if connection.is_some() {
            stats.set_state(ConnectionState::Connected);
        }

        let shipper = Self {
            name: transport.name().to_string(),
            sender: tx,
            overflow: config.overflow,
            stats: Arc::clone(&stats),
        };
        let handle = tokio::spawn(run_worker(transport, connection, rx, config.backoff, stats));

        (shipper, handle)
    }

    pub fn stats(&self) -> &ShipperStats {
        &self.stats
    }

    /// Queue a record without waiting on the network.
    pub fn enqueue(&self, record: Arc<Record>) {
        match self.sender.try_send(record) {
            Ok(()) => {
                self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
            }
            Err(TrySendError::Full(record)) => {
                if self.overflow == OverflowPolicy::Block && self.send_blocking(record) {
                    self.stats.enqueued.fetch_add(1, Ordering::Relaxed);
                } else {
                    self.drop_record("queue full");
                }
            }
            Err(TrySendError::Closed(_)) => self.drop_record("worker stopped"),
        }
    }

    fn send_blocking(&self, record: Arc<Record>) -> bool {
        match Handle::try_current() {
            Err(_) => self.sender.blocking_send(record).is_ok(),
            Ok(handle) if handle.runtime_flavor() == RuntimeFlavor::MultiThread => {
                tokio::task::block_in_place(|| self.sender.blocking_send(record)).is_ok()
            }
            Ok(_) => false,
        }
    }

    fn drop_record(&self, reason: &str) {
        let dropped = self.stats.record_drop();
        if dropped == 1 || dropped % 1000 == 0 {
            last_resort::report(
                &format!("{} sink dropped log records", self.name),
                &format!("{}; {} dropped so far", reason, dropped),
            );
        }
    }
}

async fn run_worker<T: Transport>(
    mut transport: T,
    mut connection: Option<T::Connection>,
    mut rx: mpsc::Receiver<Arc<Record>>,
    policy: BackoffPolicy,
    stats: Arc<ShipperStats>,
) {
    let mut backoff = Backoff::new(policy);

    while let Some(record) = rx.recv().await {
        loop {
            match deliver(&mut transport, &mut connection, &record, &stats).await {
                Ok(()) => {
                    stats.delivered.fetch_add(1, Ordering::Relaxed);
                    backoff.reset();
                    break;
                }
                Err(e) if !e.is_retryable() => {
                    stats.record_drop();
                    last_resort::report(
                        &format!("error during encoding {} payload, record dropped", transport.name()),
                        &e,
                    );
                    break;
                }
                Err(e) => {
                    stats.set_state(ConnectionState::Disconnected);
                    stats.retries.fetch_add(1, Ordering::Relaxed);
                    let delay = backoff.next_delay();
                    tracing::debug!(
                        transport = transport.name(),
                        error = %e,
                        ?delay,
                        "log delivery failed, retrying"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// One attempt: connect if needed, then send. The connection survives
/// only when the attempt did not fail with a retryable error.
async fn deliver<T: Transport>(
    transport: &mut T,
    connection: &mut Option<T::Connection>,
    record: &Record,
    stats: &ShipperStats,
) -> Result<(), DeliveryError> {
    let mut conn = match connection.take() {
        Some(conn) => conn,
        None => {
            stats.set_state(ConnectionState::Connecting);
            transport.connect().await?
        }
    };

    stats.set_state(ConnectionState::Sending);
    let result = transport.send(&mut conn, record).await;
    match &result {
        Err(e) if e.is_retryable() => {}
        _ => {
            *connection = Some(conn);
            stats.set_state(ConnectionState::Connected);
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::level::Level;
    use crate::record::Fields;
    use chrono::Utc;
    use std::io;
    use std::time::Duration;
    use tokio::time::Instant;

    fn record(message: &str) -> Arc<Record> {
        Arc::new(Record::compose(
            Level::Info,
            message.to_string(),
            Fields::new(),
            Utc::now(),
        ))
    }

    /// Fails the first `connect_failures` connects and `send_failures`
    /// sends, plus one send per entry of `fail_once`, reporting every
    /// attempt and delivery.
    struct FlakyTransport {
        connect_failures: usize,
        send_failures: usize,
        fail_once: Vec<String>,
        attempts: mpsc::UnboundedSender<Instant>,
        delivered: mpsc::UnboundedSender<String>,
        connects: usize,
    }

    #[async_trait]
    impl Transport for FlakyTransport {
        type Connection = usize;

        fn name(&self) -> &str {
            "flaky"
        }

        async fn connect(&mut self) -> Result<usize, DeliveryError> {
            self.connects += 1;
            if self.connect_failures > 0 {
                self.connect_failures -= 1;
                let _ = self.attempts.send(Instant::now());
                return Err(DeliveryError::Connect(io::Error::new(
                    io::ErrorKind::ConnectionRefused,
                    "refused",
                )));
            }
            Ok(self.connects)
        }

        async fn send(&mut self, _conn: &mut usize, record: &Record) -> Result<(), DeliveryError> {
            let _ = self.attempts.send(Instant::now());
            if record.message == "unencodable" {
                return Err(DeliveryError::Encode(serde_json::Error::io(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "bad",
                ))));
            }
            let targeted = match self.fail_once.iter().position(|m| *m == record.message) {
                Some(idx) => {
                    self.fail_once.remove(idx);
                    true
                }
                None => false,
            };
            let counted = !targeted && self.send_failures > 0;
            if counted {
                self.send_failures -= 1;
            }
            if targeted || counted {
                return Err(DeliveryError::Io(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "broken pipe",
                )));
            }
            let _ = self.delivered.send(record.message.clone());
            Ok(())
        }
    }

    struct Harness {
        shipper: Shipper,
        attempts: mpsc::UnboundedReceiver<Instant>,
        delivered: mpsc::UnboundedReceiver<String>,
    }

    fn harness(connect_failures: usize, send_failures: usize, config: ShipperConfig) -> Harness {
        harness_failing(connect_failures, send_failures, &[], config)
    }

    fn harness_failing(
        connect_failures: usize,
        send_failures: usize,
        fail_once: &[&str],
        config: ShipperConfig,
    ) -> Harness {
        let (attempts_tx, attempts) = mpsc::unbounded_channel();
        let (delivered_tx, delivered) = mpsc::unbounded_channel();
        let transport = FlakyTransport {
            connect_failures,
            send_failures,
            fail_once: fail_once.iter().map(|m| m.to_string()).collect(),
            attempts: attempts_tx,
            delivered: delivered_tx,
            connects: 0,
        };
        let (shipper, _handle) = Shipper::spawn(transport, None, config);
        Harness {
            shipper,
            attempts,
            delivered,
        }
    }

    fn gaps(attempts: &mut mpsc::UnboundedReceiver<Instant>) -> Vec<Duration> {
        let mut instants = Vec::new();
        while let Ok(i) = attempts.try_recv() {
            instants.push(i);
        }
        instants.windows(2).map(|w| w[1] - w[0]).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn retries_follow_doubling_delays_until_delivered() {
        let mut h = harness(0, 7, ShipperConfig::default());
        h.shipper.enqueue(record("one"));

        assert_eq!(h.delivered.recv().await.as_deref(), Some("one"));
        let secs: Vec<u64> = gaps(&mut h.attempts).iter().map(|d| d.as_secs()).collect();
        assert_eq!(secs, vec![1, 2, 4, 8, 16, 32, 60]);
        assert_eq!(h.shipper.stats().retries(), 7);
        assert_eq!(h.shipper.stats().delivered(), 1);
        assert_eq!(h.shipper.stats().state(), ConnectionState::Connected);
    }

    #[tokio::test(start_paused = true)]
    async fn connect_failures_keep_the_item_and_back_off() {
        let mut h = harness(3, 0, ShipperConfig::default());
        h.shipper.enqueue(record("kept"));

        assert_eq!(h.delivered.recv().await.as_deref(), Some("kept"));
        let secs: Vec<u64> = gaps(&mut h.attempts).iter().map(|d| d.as_secs()).collect();
        assert_eq!(secs, vec![1, 2, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn backoff_resets_after_success() {
        let mut h = harness_failing(0, 2, &["b"], ShipperConfig::default());
        h.shipper.enqueue(record("a"));
        assert_eq!(h.delivered.recv().await.as_deref(), Some("a"));
        let secs: Vec<u64> = gaps(&mut h.attempts).iter().map(|d| d.as_secs()).collect();
        assert_eq!(secs, vec![1, 2]);

        // Without a reset the next delay would be 4s.
        h.shipper.enqueue(record("b"));
        assert_eq!(h.delivered.recv().await.as_deref(), Some("b"));
        let gaps_b = gaps(&mut h.attempts);
        assert_eq!(gaps_b, vec![BackoffPolicy::default().initial]);
        assert_eq!(h.shipper.stats().retries(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_item_holds_back_later_items_in_order() {
        let mut h = harness(0, 3, ShipperConfig::default());
        for name in ["first", "second", "third"] {
            h.shipper.enqueue(record(name));
        }
        let mut got = Vec::new();
        for _ in 0..3 {
            got.push(h.delivered.recv().await.unwrap());
        }
        assert_eq!(got, vec!["first", "second", "third"]);
    }

    #[tokio::test(start_paused = true)]
    async fn encode_failure_drops_only_that_item() {
        let mut h = harness(0, 0, ShipperConfig::default());
        h.shipper.enqueue(record("unencodable"));
        h.shipper.enqueue(record("fine"));
        assert_eq!(h.delivered.recv().await.as_deref(), Some("fine"));
        assert_eq!(h.shipper.stats().dropped(), 1);
        assert_eq!(h.shipper.stats().retries(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn full_queue_drops_newest() {
        let config = ShipperConfig {
            capacity: 2,
            ..ShipperConfig::default()
        };
        // The worker is stuck retrying the first record it pulls.
        let h = harness(usize::MAX, 0, config);
        for i in 0..10 {
            h.shipper.enqueue(record(&i.to_string()));
        }
        let stats = h.shipper.stats();
        assert_eq!(stats.enqueued() + stats.dropped(), 10);
        assert!(stats.dropped() >= 7);
    }
}

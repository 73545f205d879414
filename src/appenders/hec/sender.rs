//! Batching sender for the HTTP Event Collector
//!
//! Events are serialized on the caller's thread and queued to a worker that
//! groups them into batches. A batch is posted when it reaches the configured
//! event count or byte size, when the batch interval elapses, or on
//! [`HecSender::flush`].

use super::config::{BatchPolicy, HecConfig, SendMode};
use super::event::{HecEvent, HecMetadata};
use super::middleware::{Next, SenderMiddleware};
use crate::core::{LoggerError, LoggerMetrics, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use ureq::tls::{RootCerts, TlsConfig, TlsProvider};
use ureq::Agent;

const COLLECTOR_PATH: &str = "/services/collector";
const EVENT_ENDPOINT: &str = "/services/collector/event/1.0";

/// Serialized events posted together
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Batch {
    payload: String,
    len: usize,
}

impl Batch {
    pub fn single(event: String) -> Self {
        Self {
            payload: event,
            len: 1,
        }
    }

    /// Events concatenated the way the collector's batch endpoint expects them
    pub fn payload(&self) -> &str {
        &self.payload
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bytes(&self) -> usize {
        self.payload.len()
    }

    fn push(&mut self, event: &str) {
        self.payload.push_str(event);
        self.len += 1;
    }
}

/// Delivers one batch payload to the collector
pub trait Transport: Send + Sync {
    fn post(&self, payload: &str) -> Result<()>;
}

/// HTTPS transport authenticated with an event collector token
pub struct HttpTransport {
    agent: Agent,
    endpoint: String,
    authorization: String,
}

impl HttpTransport {
    pub fn new(config: &HecConfig) -> Result<Self> {
        config.validate()?;

        let tls_config = TlsConfig::builder()
            .provider(TlsProvider::NativeTls)
            .root_certs(RootCerts::PlatformVerifier)
            .disable_verification(config.disable_certificate_validation)
            .build();

        let agent: Agent = Agent::config_builder()
            .tls_config(tls_config)
            .timeout_global(Some(config.timeout))
            .build()
            .into();

        Ok(Self {
            agent,
            endpoint: endpoint_url(&config.url),
            authorization: format!("Splunk {}", config.token),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl Transport for HttpTransport {
    fn post(&self, payload: &str) -> Result<()> {
        self.agent
            .post(self.endpoint.as_str())
            .header("Authorization", self.authorization.as_str())
            .header("Content-Type", "application/json")
            .send(payload.as_bytes())
            .map(|_| ())
            .map_err(|e| LoggerError::transport(&self.endpoint, e.to_string()))
    }
}

/// Event endpoint for a collector base URL
///
/// ```
/// use rust_opslog::appenders::hec::endpoint_url;
///
/// assert_eq!(
///     endpoint_url("https://hec.example.com:8088/"),
///     "https://hec.example.com:8088/services/collector/event/1.0"
/// );
/// assert_eq!(
///     endpoint_url("https://hec.example.com/services/collector/raw"),
///     "https://hec.example.com/services/collector/raw"
/// );
/// ```
pub fn endpoint_url(url: &str) -> String {
    let url = url.trim().trim_end_matches('/');
    if url.contains(COLLECTOR_PATH) {
        url.to_string()
    } else {
        format!("{url}{EVENT_ENDPOINT}")
    }
}

/// Middleware chain in front of a transport
struct Poster {
    middleware: Vec<Box<dyn SenderMiddleware>>,
    transport: Box<dyn Transport>,
    metrics: Arc<LoggerMetrics>,
}

impl Poster {
    fn post(&self, batch: &Batch) {
        match Next::new(&self.middleware, self.transport.as_ref()).run(batch) {
            Ok(()) => self.metrics.record_batch(batch.len() as u64),
            Err(e) => {
                self.metrics.record_failed_batch(batch.len() as u64);
                eprintln!("[HEC ERROR] Dropped batch of {} events: {}", batch.len(), e);
            }
        }
    }
}

enum Command {
    Event(String),
    Flush(Sender<()>),
}

/// Queues events to a batching worker thread
pub struct HecSender {
    metadata: HecMetadata,
    sender: Option<Sender<Command>>,
    worker: Option<JoinHandle<()>>,
    metrics: Arc<LoggerMetrics>,
}

impl HecSender {
    /// Start the worker
    ///
    /// Middleware runs in the given order, outermost first.
    pub fn spawn(
        policy: BatchPolicy,
        mode: SendMode,
        metadata: HecMetadata,
        middleware: Vec<Box<dyn SenderMiddleware>>,
        transport: Box<dyn Transport>,
    ) -> Result<Self> {
        let metrics = Arc::new(LoggerMetrics::new());
        let poster = Arc::new(Poster {
            middleware,
            transport,
            metrics: Arc::clone(&metrics),
        });
        let (sender, receiver) = unbounded();

        let worker = thread::Builder::new()
            .name("opslog-hec".to_string())
            .spawn(move || run_worker(receiver, policy, mode, poster))?;

        Ok(Self {
            metadata,
            sender: Some(sender),
            worker: Some(worker),
            metrics,
        })
    }

    pub fn metadata(&self) -> &HecMetadata {
        &self.metadata
    }

    /// Events posted and dropped so far
    pub fn metrics(&self) -> &LoggerMetrics {
        &self.metrics
    }

    pub fn send(&self, event: &HecEvent) -> Result<()> {
        let json = event.to_json(&self.metadata)?;
        self.sender
            .as_ref()
            .ok_or(LoggerError::ChannelSendError)?
            .send(Command::Event(json))
            .map_err(|_| LoggerError::ChannelSendError)
    }

    /// Post everything queued so far and wait until it has been posted
    pub fn flush(&self) -> Result<()> {
        let sender = self.sender.as_ref().ok_or(LoggerError::ChannelSendError)?;
        let (ack, done) = bounded(1);
        sender
            .send(Command::Flush(ack))
            .map_err(|_| LoggerError::ChannelSendError)?;
        done.recv().map_err(|_| LoggerError::ChannelSendError)
    }

    /// Flush and stop the worker
    pub fn close(&mut self) {
        if let Err(e) = self.flush() {
            if self.worker.is_some() {
                eprintln!("[HEC ERROR] Flush on close failed: {}", e);
            }
        }
        drop(self.sender.take());
        if let Some(handle) = self.worker.take() {
            if handle.join().is_err() {
                eprintln!("[HEC ERROR] Sender worker panicked");
            }
        }
    }
}

impl Drop for HecSender {
    fn drop(&mut self) {
        self.close();
    }
}

fn run_worker(
    receiver: Receiver<Command>,
    policy: BatchPolicy,
    mode: SendMode,
    poster: Arc<Poster>,
) {
    let mut batch = Batch::default();
    let mut deadline: Option<Instant> = None;
    let mut in_flight: Vec<JoinHandle<()>> = Vec::new();

    loop {
        let command = match deadline {
            Some(at) => receiver.recv_deadline(at),
            None => receiver.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        match command {
            Ok(Command::Event(json)) => {
                if batch.is_empty() && !policy.interval.is_zero() {
                    deadline = Some(Instant::now() + policy.interval);
                }
                batch.push(&json);
                if policy.is_full(batch.len(), batch.bytes()) {
                    dispatch(&mut batch, mode, &poster, &mut in_flight);
                    deadline = None;
                }
            }
            Ok(Command::Flush(ack)) => {
                dispatch(&mut batch, mode, &poster, &mut in_flight);
                deadline = None;
                join_all(&mut in_flight);
                let _ = ack.send(());
            }
            Err(RecvTimeoutError::Timeout) => {
                dispatch(&mut batch, mode, &poster, &mut in_flight);
                deadline = None;
            }
            Err(RecvTimeoutError::Disconnected) => {
                dispatch(&mut batch, mode, &poster, &mut in_flight);
                join_all(&mut in_flight);
                break;
            }
        }
    }
}

fn dispatch(
    batch: &mut Batch,
    mode: SendMode,
    poster: &Arc<Poster>,
    in_flight: &mut Vec<JoinHandle<()>>,
) {
    if batch.is_empty() {
        return;
    }
    let batch = std::mem::take(batch);

    match mode {
        SendMode::Sequential => poster.post(&batch),
        SendMode::Parallel => {
            in_flight.retain(|handle| !handle.is_finished());
            let poster = Arc::clone(poster);
            let spawned = thread::Builder::new()
                .name("opslog-hec-post".to_string())
                .spawn(move || poster.post(&batch));
            match spawned {
                Ok(handle) => in_flight.push(handle),
                Err(e) => eprintln!("[HEC ERROR] Failed to spawn post thread: {}", e),
            }
        }
    }
}

fn join_all(in_flight: &mut Vec<JoinHandle<()>>) {
    for handle in in_flight.drain(..) {
        if handle.join().is_err() {
            eprintln!("[HEC ERROR] Post thread panicked");
        }
    }
}


#[cfg(test)]
mod tests {
    use super::testing::MemoryTransport;
    use super::*;
    use std::time::Duration;

    fn event(message: &str) -> HecEvent {
        HecEvent {
            time: 1.5,
            severity: "INFO".to_string(),
            message: message.to_string(),
            logger_name: None,
            thread_name: None,
            properties: Default::default(),
            exception_message: None,
            marker: None,
        }
    }

    fn policy(max_count: usize, max_bytes: usize, interval: Duration) -> BatchPolicy {
        BatchPolicy {
            max_count,
            max_bytes,
            interval,
        }
    }

    fn sender(policy: BatchPolicy, mode: SendMode, transport: &MemoryTransport) -> HecSender {
        HecSender::spawn(
            policy,
            mode,
            HecMetadata::default(),
            Vec::new(),
            Box::new(transport.clone()),
        )
        .unwrap()
    }

    #[test]
    fn batches_by_count() {
        let transport = MemoryTransport::default();
        let sender = sender(policy(2, 0, Duration::ZERO), SendMode::Sequential, &transport);

        for message in ["a", "b", "c"] {
            sender.send(&event(message)).unwrap();
        }
        sender.flush().unwrap();

        let posted = transport.posted();
        assert_eq!(posted.len(), 2);
        assert_eq!(posted[0].matches("\"event\"").count(), 2);
        assert_eq!(posted[1].matches("\"event\"").count(), 1);
        let metrics = sender.metrics().snapshot();
        assert_eq!(metrics.delivered, 3);
        assert_eq!(metrics.batches_posted, 2);
    }

    #[test]
    fn batches_by_bytes() {
        let transport = MemoryTransport::default();
        let sender = sender(policy(0, 1, Duration::ZERO), SendMode::Sequential, &transport);

        sender.send(&event("a")).unwrap();
        sender.send(&event("b")).unwrap();
        sender.flush().unwrap();

        assert_eq!(transport.posted().len(), 2);
    }

    #[test]
    fn all_zero_posts_each_event() {
        let transport = MemoryTransport::default();
        let sender = sender(policy(0, 0, Duration::ZERO), SendMode::Sequential, &transport);

        sender.send(&event("a")).unwrap();
        sender.send(&event("b")).unwrap();
        sender.flush().unwrap();

        assert_eq!(transport.posted().len(), 2);
    }

    #[test]
    fn flush_posts_partial_batch() {
        let transport = MemoryTransport::default();
        let sender = sender(policy(100, 0, Duration::ZERO), SendMode::Sequential, &transport);

        sender.send(&event("a")).unwrap();
        sender.flush().unwrap();
        assert_eq!(transport.posted().len(), 1);
    }

    #[test]
    fn interval_posts_without_flush() {
        let transport = MemoryTransport::default();
        let _sender = {
            let sender = sender(
                policy(100, 0, Duration::from_millis(20)),
                SendMode::Sequential,
                &transport,
            );
            sender.send(&event("a")).unwrap();
            sender
        };

        let deadline = Instant::now() + Duration::from_secs(5);
        while transport.posted().is_empty() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(transport.posted().len(), 1);
    }

    #[test]
    fn parallel_flush_waits_for_posts() {
        let transport = MemoryTransport::default();
        let sender = sender(policy(1, 0, Duration::ZERO), SendMode::Parallel, &transport);

        for i in 0..5 {
            sender.send(&event(&format!("e{i}"))).unwrap();
        }
        sender.flush().unwrap();
        assert_eq!(transport.posted().len(), 5);
    }

    #[test]
    fn close_flushes() {
        let transport = MemoryTransport::default();
        let mut sender = sender(policy(100, 0, Duration::ZERO), SendMode::Sequential, &transport);
        sender.send(&event("a")).unwrap();
        sender.close();

        assert_eq!(transport.posted().len(), 1);
        assert!(sender.send(&event("b")).is_err());
    }

    #[test]
    fn endpoint_normalization() {
        assert_eq!(
            endpoint_url("http://localhost:8088"),
            "http://localhost:8088/services/collector/event/1.0"
        );
        assert_eq!(
            endpoint_url("http://localhost:8088/services/collector"),
            "http://localhost:8088/services/collector"
        );
    }

    #[test]
    fn http_transport_requires_url_and_token() {
        assert!(HttpTransport::new(&HecConfig::default()).is_err());
        let transport =
            HttpTransport::new(&HecConfig::builder("http://localhost:8088", "t").build()).unwrap();
        assert_eq!(
            transport.endpoint(),
            "http://localhost:8088/services/collector/event/1.0"
        );
    }
}

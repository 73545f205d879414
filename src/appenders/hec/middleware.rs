//! Middleware around batch posting
//!
//! Each middleware receives the batch and a [`Next`] handle that runs the
//! rest of the chain and finally the transport.

use super::sender::{Batch, Transport};
use crate::core::Result;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;

static GLOBAL_MIDDLEWARE: OnceLock<MiddlewareRegistry> = OnceLock::new();

const DEFAULT_RESEND_DELAY: Duration = Duration::from_secs(1);
const MAX_RESEND_DELAY: Duration = Duration::from_secs(60);

pub trait SenderMiddleware: Send + Sync {
    fn post(&self, batch: &Batch, next: Next<'_>) -> Result<()>;
}

/// The remainder of a middleware chain
#[derive(Clone, Copy)]
pub struct Next<'a> {
    chain: &'a [Box<dyn SenderMiddleware>],
    transport: &'a dyn Transport,
}

impl<'a> Next<'a> {
    pub fn new(chain: &'a [Box<dyn SenderMiddleware>], transport: &'a dyn Transport) -> Self {
        Self { chain, transport }
    }

    pub fn run(self, batch: &Batch) -> Result<()> {
        match self.chain.split_first() {
            Some((first, rest)) => first.post(batch, Next::new(rest, self.transport)),
            None => self.transport.post(batch.payload()),
        }
    }
}

/// Retries a failed post, doubling the pause after each attempt
pub struct ResendMiddleware {
    retries: u64,
    initial_delay: Duration,
}

impl ResendMiddleware {
    pub fn new(retries: u64) -> Self {
        Self {
            retries,
            initial_delay: DEFAULT_RESEND_DELAY,
        }
    }

    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }
}

impl SenderMiddleware for ResendMiddleware {
    fn post(&self, batch: &Batch, next: Next<'_>) -> Result<()> {
        let mut delay = self.initial_delay;
        let mut attempt = 0;
        loop {
            match next.run(batch) {
                Ok(()) => return Ok(()),
                Err(e) if attempt < self.retries => {
                    attempt += 1;
                    eprintln!(
                        "[HEC WARNING] Post of {} events failed ({}), retry {}/{}",
                        batch.len(),
                        e,
                        attempt,
                        self.retries
                    );
                    if !delay.is_zero() {
                        thread::sleep(delay);
                    }
                    delay = next_delay(delay);
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Doubled, capped at [`MAX_RESEND_DELAY`]
fn next_delay(delay: Duration) -> Duration {
    delay.saturating_mul(2).min(MAX_RESEND_DELAY)
}

pub type MiddlewareFactory = Arc<dyn Fn() -> Result<Box<dyn SenderMiddleware>> + Send + Sync>;

/// Middleware constructors selectable by name from configuration
#[derive(Default)]
pub struct MiddlewareRegistry {
    factories: RwLock<HashMap<String, MiddlewareFactory>>,
}

impl MiddlewareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> &'static MiddlewareRegistry {
        GLOBAL_MIDDLEWARE.get_or_init(MiddlewareRegistry::new)
    }

    pub fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Result<Box<dyn SenderMiddleware>> + Send + Sync + 'static,
    {
        self.factories.write().insert(name.into(), Arc::new(factory));
    }

    /// Build the middleware registered as `name`
    ///
    /// Unknown names and failing factories yield `None`.
    pub fn create(&self, name: &str) -> Option<Box<dyn SenderMiddleware>> {
        let factory = self.factories.read().get(name).cloned()?;
        factory().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::LoggerError;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails the first `failures` posts
    struct Flaky {
        failures: usize,
        attempts: AtomicUsize,
    }

    impl Transport for Flaky {
        fn post(&self, _payload: &str) -> Result<()> {
            let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
            if attempt < self.failures {
                Err(LoggerError::transport("test", "unavailable"))
            } else {
                Ok(())
            }
        }
    }

    struct Tagging(Arc<Mutex<Vec<&'static str>>>, &'static str);

    impl SenderMiddleware for Tagging {
        fn post(&self, batch: &Batch, next: Next<'_>) -> Result<()> {
            self.0.lock().push(self.1);
            next.run(batch)
        }
    }

    fn flaky(failures: usize) -> Flaky {
        Flaky {
            failures,
            attempts: AtomicUsize::new(0),
        }
    }

    #[test]
    fn resend_retries_until_success() {
        let transport = flaky(2);
        let chain: Vec<Box<dyn SenderMiddleware>> =
            vec![Box::new(ResendMiddleware::new(3).with_initial_delay(Duration::ZERO))];

        let batch = Batch::single("{}".to_string());
        Next::new(&chain, &transport).run(&batch).unwrap();
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn resend_gives_up_after_retries() {
        let transport = flaky(10);
        let chain: Vec<Box<dyn SenderMiddleware>> =
            vec![Box::new(ResendMiddleware::new(2).with_initial_delay(Duration::ZERO))];

        let batch = Batch::single("{}".to_string());
        let err = Next::new(&chain, &transport).run(&batch).unwrap_err();
        assert!(matches!(err, LoggerError::Transport { .. }));
        assert_eq!(transport.attempts.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn resend_delay_doubles_up_to_cap() {
        assert_eq!(next_delay(Duration::ZERO), Duration::ZERO);
        assert_eq!(next_delay(Duration::from_millis(250)), Duration::from_millis(500));
        assert_eq!(next_delay(Duration::from_secs(45)), MAX_RESEND_DELAY);
        assert_eq!(next_delay(Duration::MAX), MAX_RESEND_DELAY);
    }

    #[test]
    fn chain_runs_in_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let transport = flaky(0);
        let chain: Vec<Box<dyn SenderMiddleware>> = vec![
            Box::new(Tagging(Arc::clone(&seen), "outer")),
            Box::new(Tagging(Arc::clone(&seen), "inner")),
        ];

        Next::new(&chain, &transport)
            .run(&Batch::single("{}".to_string()))
            .unwrap();
        assert_eq!(*seen.lock(), vec!["outer", "inner"]);
    }

    #[test]
    fn registry_swallows_unknown_and_failing() {
        let registry = MiddlewareRegistry::new();
        registry.register("broken", || Err(LoggerError::other("no")));
        registry.register("resend", || {
            Ok(Box::new(ResendMiddleware::new(1)) as Box<dyn SenderMiddleware>)
        });

        assert!(registry.create("missing").is_none());
        assert!(registry.create("broken").is_none());
        assert!(registry.create("resend").is_some());
    }
}

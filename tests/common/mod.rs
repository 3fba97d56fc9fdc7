//! Live resources and pickles shared by the integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use hibernate::{
    Environment, HibernateError, LiveObject, Pickle, PickleFactories, TaskListener, TypedFactory,
    async_trait,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;

// --- LIVE RESOURCES ---

/// Stand-in for an open network connection. Cannot be written as plain data.
#[derive(Debug)]
pub struct Connection {
    pub url: String,
    pub reconnected: bool,
}

impl Connection {
    pub fn open(url: &str) -> Self {
        Self {
            url: url.to_string(),
            reconnected: false,
        }
    }
}

/// A resource whose pickle always fails to rehydrate.
#[derive(Debug)]
pub struct Doomed;

/// A resource whose rehydration takes `millis` and reports when it is dropped.
#[derive(Debug)]
pub struct Slow {
    pub millis: u64,
}

/// Rehydrates only once a [`Bell`] of the same file has rung.
#[derive(Debug)]
pub struct Waiter;

#[derive(Debug)]
pub struct Bell;

/// A connection that has to be re-established through a flaky endpoint.
#[derive(Debug)]
pub struct Remote {
    pub url: String,
    pub max_attempts: u32,
}

// --- PICKLES ---

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionPickle {
    pub url: String,
}

#[async_trait]
impl Pickle for ConnectionPickle {
    const KIND: &'static str = "test.connection";

    async fn rehydrate(&self, _env: &Environment) -> anyhow::Result<LiveObject> {
        Ok(Arc::new(Connection {
            url: self.url.clone(),
            reconnected: true,
        }))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct DoomedPickle {
    pub reason: String,
}

#[async_trait]
impl Pickle for DoomedPickle {
    const KIND: &'static str = "test.doomed";

    async fn rehydrate(&self, _env: &Environment) -> anyhow::Result<LiveObject> {
        anyhow::bail!("{}", self.reason)
    }
}

/// Counts dropped futures of [`SlowPickle`], finished or not.
#[derive(Debug, Default)]
pub struct DropCounter(pub AtomicUsize);

struct CountOnDrop(Arc<DropCounter>);

impl Drop for CountOnDrop {
    fn drop(&mut self) {
        self.0.0.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SlowPickle {
    pub millis: u64,
}

#[async_trait]
impl Pickle for SlowPickle {
    const KIND: &'static str = "test.slow";

    async fn rehydrate(&self, env: &Environment) -> anyhow::Result<LiveObject> {
        let _guard = env.service::<DropCounter>().map(CountOnDrop);
        tokio::time::sleep(Duration::from_millis(self.millis)).await;
        Ok(Arc::new(Slow {
            millis: self.millis,
        }))
    }
}

/// Waits until another pickle of the same catalog has rung the shared [`Notify`].
#[derive(Debug, Serialize, Deserialize)]
pub struct WaiterPickle;

#[async_trait]
impl Pickle for WaiterPickle {
    const KIND: &'static str = "test.waiter";

    async fn rehydrate(&self, env: &Environment) -> anyhow::Result<LiveObject> {
        env.require::<Notify>()?.notified().await;
        Ok(Arc::new(Waiter))
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BellPickle;

#[async_trait]
impl Pickle for BellPickle {
    const KIND: &'static str = "test.bell";

    async fn rehydrate(&self, env: &Environment) -> anyhow::Result<LiveObject> {
        env.require::<Notify>()?.notify_one();
        Ok(Arc::new(Bell))
    }
}

/// A remote endpoint that refuses the first `failures` connection attempts.
#[derive(Debug)]
pub struct FlakyEndpoint {
    failures_left: AtomicU32,
    attempts: AtomicU32,
}

impl FlakyEndpoint {
    pub fn refusing(failures: u32) -> Self {
        Self {
            failures_left: AtomicU32::new(failures),
            attempts: AtomicU32::new(0),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }

    fn connect(&self, url: &str) -> anyhow::Result<()> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        let refused = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if refused {
            anyhow::bail!("connection to {url} refused");
        }
        Ok(())
    }
}

/// Reconnects through the environment's [`FlakyEndpoint`], retrying a bounded number of times.
#[derive(Debug, Serialize, Deserialize)]
pub struct ReconnectPickle {
    pub url: String,
    pub max_attempts: u32,
}

#[async_trait]
impl Pickle for ReconnectPickle {
    const KIND: &'static str = "test.reconnect";

    async fn rehydrate(&self, env: &Environment) -> anyhow::Result<LiveObject> {
        let endpoint = env.require::<FlakyEndpoint>()?;
        let mut last_error = None;
        for attempt in 1..=self.max_attempts {
            match endpoint.connect(&self.url) {
                Ok(()) => {
                    return Ok(Arc::new(Remote {
                        url: self.url.clone(),
                        max_attempts: self.max_attempts,
                    }));
                }
                Err(e) => {
                    tracing::debug!(attempt, error = %e, "reconnect failed");
                    last_error = Some(e);
                    tokio::time::sleep(Duration::from_millis(1)).await;
                }
            }
        }
        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("no reconnect attempted")))
    }
}

// --- LISTENER ---

/// Records every rehydration event in arrival order.
#[derive(Debug, Default)]
pub struct Recorder {
    pub started: Mutex<Vec<u32>>,
    pub rehydrated: Mutex<Vec<u32>>,
    pub failed: Mutex<Vec<u32>>,
    pub discarded: Mutex<Vec<u32>>,
}

impl Recorder {
    pub fn started(&self) -> Vec<u32> {
        self.started.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn rehydrated(&self) -> Vec<u32> {
        self.rehydrated.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn failed(&self) -> Vec<u32> {
        self.failed.lock().map(|v| v.clone()).unwrap_or_default()
    }

    pub fn discarded(&self) -> Vec<u32> {
        self.discarded.lock().map(|v| v.clone()).unwrap_or_default()
    }
}

impl TaskListener for Recorder {
    fn on_started(&self, index: u32, _kind: &str) {
        if let Ok(mut v) = self.started.lock() {
            v.push(index);
        }
    }

    fn on_rehydrated(&self, index: u32, _kind: &str) {
        if let Ok(mut v) = self.rehydrated.lock() {
            v.push(index);
        }
    }

    fn on_failed(&self, index: u32, _kind: &str, _error: &HibernateError) {
        if let Ok(mut v) = self.failed.lock() {
            v.push(index);
        }
    }

    fn on_discarded(&self, index: u32, _kind: &str) {
        if let Ok(mut v) = self.discarded.lock() {
            v.push(index);
        }
    }
}

// --- SETUP HELPERS ---

pub fn connection_factories() -> PickleFactories {
    PickleFactories::new().with(TypedFactory::new(|c: &Connection| ConnectionPickle {
        url: c.url.clone(),
    }))
}

pub fn all_factories() -> PickleFactories {
    connection_factories()
        .with(TypedFactory::new(|_: &Doomed| DoomedPickle {
            reason: "peer is gone".into(),
        }))
        .with(TypedFactory::new(|s: &Slow| SlowPickle { millis: s.millis }))
        .with(TypedFactory::new(|_: &Waiter| WaiterPickle))
        .with(TypedFactory::new(|_: &Bell| BellPickle))
        .with(TypedFactory::new(|r: &Remote| ReconnectPickle {
            url: r.url.clone(),
            max_attempts: r.max_attempts,
        }))
}

pub fn full_environment() -> Environment {
    Environment::new()
        .with_pickle::<ConnectionPickle>()
        .with_pickle::<DoomedPickle>()
        .with_pickle::<SlowPickle>()
        .with_pickle::<WaiterPickle>()
        .with_pickle::<BellPickle>()
        .with_pickle::<ReconnectPickle>()
}

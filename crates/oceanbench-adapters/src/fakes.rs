//! In-memory capability fakes.
//!
//! Scriptable implementations of the adapter traits, used by the
//! orchestrator test suites. Each fake records the calls made against it
//! so tests can assert on side effects (for example, that the platform
//! start was invoked exactly once).

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use oceanbench_types::{
    BroadcastConfig, BroadcastLifecycle, ForwarderMode, NotifyKind, Privacy, SiteKey, StreamHealth,
};

use crate::error::AdapterError;
use crate::forwarder::Forwarder;
use crate::notifier::Notifier;
use crate::platform::{BroadcastHandles, HealthReport, VideoPlatform};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Platform
// ---------------------------------------------------------------------------

/// A scriptable [`VideoPlatform`].
pub struct FakePlatform {
    calls: Mutex<Vec<String>>,
    start_calls: AtomicU32,
    fail_start: AtomicBool,
    health: Mutex<HealthReport>,
    status: Mutex<BroadcastLifecycle>,
    chat: Mutex<Vec<(String, String)>>,
    privacy: Mutex<Vec<(String, Privacy)>>,
}

impl Default for FakePlatform {
    fn default() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            start_calls: AtomicU32::new(0),
            fail_start: AtomicBool::new(false),
            health: Mutex::new(HealthReport {
                status: StreamHealth::Good,
                issues: Vec::new(),
            }),
            status: Mutex::new(BroadcastLifecycle::Live),
            chat: Mutex::new(Vec::new()),
            privacy: Mutex::new(Vec::new()),
        }
    }
}

impl FakePlatform {
    /// A fake that succeeds everywhere with a healthy stream.
    pub fn new() -> Self {
        Self::default()
    }

    /// Script the next `start_broadcast` calls to fail.
    pub fn set_fail_start(&self, fail: bool) {
        self.fail_start.store(fail, Ordering::SeqCst);
    }

    /// Script the health probe result.
    pub fn set_health(&self, report: HealthReport) {
        *lock(&self.health) = report;
    }

    /// Script the lifecycle status result.
    pub fn set_status(&self, status: BroadcastLifecycle) {
        *lock(&self.status) = status;
    }

    /// Number of `start_broadcast` invocations.
    pub fn start_count(&self) -> u32 {
        self.start_calls.load(Ordering::SeqCst)
    }

    /// Every call made, in order, as `"<op> <subject>"` strings.
    pub fn calls(&self) -> Vec<String> {
        lock(&self.calls).clone()
    }

    /// Chat messages posted, as `(chat_id, text)` pairs.
    pub fn chat_messages(&self) -> Vec<(String, String)> {
        lock(&self.chat).clone()
    }

    /// Privacy changes applied, as `(broadcast_id, privacy)` pairs.
    pub fn privacy_changes(&self) -> Vec<(String, Privacy)> {
        lock(&self.privacy).clone()
    }

    fn record(&self, call: String) {
        lock(&self.calls).push(call);
    }
}

#[async_trait]
impl VideoPlatform for FakePlatform {
    async fn create_broadcast(
        &self,
        cfg: &BroadcastConfig,
    ) -> Result<BroadcastHandles, AdapterError> {
        self.record(format!("create {}", cfg.uuid));
        Ok(BroadcastHandles {
            broadcast_id: format!("B-{}", cfg.uuid),
            stream_id: format!("S-{}", cfg.uuid),
            chat_id: format!("C-{}", cfg.uuid),
            stream_name: cfg.name.clone(),
            rtmp_key: format!("key-{}", cfg.uuid),
            ingestion_address: String::from("rtmp://ingest.test/live2"),
        })
    }

    async fn start_broadcast(&self, cfg: &BroadcastConfig) -> Result<(), AdapterError> {
        self.record(format!("start {}", cfg.uuid));
        self.start_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_start.load(Ordering::SeqCst) {
            return Err(AdapterError::Status {
                status: 500,
                body: String::from("scripted start failure"),
            });
        }
        Ok(())
    }

    async fn stop_broadcast(&self, cfg: &BroadcastConfig) -> Result<(), AdapterError> {
        self.record(format!("stop {}", cfg.uuid));
        Ok(())
    }

    async fn broadcast_status(
        &self,
        broadcast_id: &str,
    ) -> Result<BroadcastLifecycle, AdapterError> {
        self.record(format!("status {broadcast_id}"));
        Ok(*lock(&self.status))
    }

    async fn health_status(&self, stream_id: &str) -> Result<HealthReport, AdapterError> {
        self.record(format!("health {stream_id}"));
        Ok(lock(&self.health).clone())
    }

    async fn post_chat(&self, chat_id: &str, msg: &str) -> Result<(), AdapterError> {
        lock(&self.chat).push((chat_id.to_owned(), msg.to_owned()));
        Ok(())
    }

    async fn set_privacy(
        &self,
        broadcast_id: &str,
        privacy: Privacy,
    ) -> Result<(), AdapterError> {
        lock(&self.privacy).push((broadcast_id.to_owned(), privacy));
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Forwarder
// ---------------------------------------------------------------------------

/// A recording [`Forwarder`].
#[derive(Default)]
pub struct FakeForwarder {
    modes: Mutex<Vec<ForwarderMode>>,
    uploads: Mutex<Vec<String>>,
}

impl FakeForwarder {
    /// A fake that accepts every command.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every mode commanded, in order.
    pub fn modes(&self) -> Vec<ForwarderMode> {
        lock(&self.modes).clone()
    }

    /// The most recent mode commanded.
    pub fn last_mode(&self) -> Option<ForwarderMode> {
        lock(&self.modes).last().copied()
    }

    /// Names of slates uploaded.
    pub fn uploads(&self) -> Vec<String> {
        lock(&self.uploads).clone()
    }
}

#[async_trait]
impl Forwarder for FakeForwarder {
    async fn stream(&self, _cfg: &BroadcastConfig) -> Result<(), AdapterError> {
        lock(&self.modes).push(ForwarderMode::Stream);
        Ok(())
    }

    async fn slate(&self, _cfg: &BroadcastConfig) -> Result<(), AdapterError> {
        lock(&self.modes).push(ForwarderMode::Slate);
        Ok(())
    }

    async fn upload_slate(
        &self,
        _cfg: &BroadcastConfig,
        name: &str,
        _bytes: Vec<u8>,
    ) -> Result<(), AdapterError> {
        lock(&self.uploads).push(name.to_owned());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Notifier
// ---------------------------------------------------------------------------

/// A recording [`Notifier`] with no rate limiting.
#[derive(Default)]
pub struct FakeNotifier {
    notes: Mutex<Vec<(SiteKey, NotifyKind, String)>>,
}

impl FakeNotifier {
    /// A fake that records every notification.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every notification sent.
    pub fn notes(&self) -> Vec<(SiteKey, NotifyKind, String)> {
        lock(&self.notes).clone()
    }

    /// Number of notifications of a given kind.
    pub fn count_of(&self, kind: NotifyKind) -> usize {
        lock(&self.notes).iter().filter(|(_, k, _)| *k == kind).count()
    }
}

#[async_trait]
impl Notifier for FakeNotifier {
    async fn notify(
        &self,
        site: SiteKey,
        kind: NotifyKind,
        message: &str,
    ) -> Result<(), AdapterError> {
        lock(&self.notes).push((site, kind, message.to_owned()));
        Ok(())
    }
}

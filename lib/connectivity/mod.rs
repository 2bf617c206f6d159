use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use futures::future::BoxFuture;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Snapshot of the device's connectivity, as last reported by the platform
/// signal or the probe loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityState {
    Online,
    Offline,
}

impl ConnectivityState {
    pub fn is_online(self) -> bool {
        matches!(self, ConnectivityState::Online)
    }

    fn as_str(self) -> &'static str {
        match self {
            ConnectivityState::Online => "online",
            ConnectivityState::Offline => "offline",
        }
    }
}

/// One edge: a genuine transition between offline and online. Steady state
/// never produces an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectivityEvent {
    Online,
    Offline,
}

/// Answers "is the backend reachable right now".
///
/// This trait exists so the concrete platform signal stays a collaborator
/// detail and monitor logic can be unit-tested against scripted reachability.
pub trait ConnectivityProbe: Send + Sync {
    fn check(&self) -> BoxFuture<'_, bool>;
}

impl<T> ConnectivityProbe for Arc<T>
where
    T: ConnectivityProbe + ?Sized,
{
    fn check(&self) -> BoxFuture<'_, bool> {
        (**self).check()
    }
}

struct Subscriber {
    id: u64,
    sender: flume::Sender<ConnectivityEvent>,
}

struct MonitorInner {
    state: Mutex<ConnectivityState>,
    subscribers: Mutex<Vec<Subscriber>>,
    next_subscriber_id: AtomicU64,
}

/// Edge-triggered connectivity monitor.
///
/// `report_*` calls are the entry points for whatever platform signal exists;
/// `run_probe_loop` adapts a polling [`ConnectivityProbe`] onto them. Rapid
/// flapping is not debounced here: each genuine edge is delivered, and
/// expensive subscribers (a sync run) coalesce overlapping triggers
/// themselves.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    inner: Arc<MonitorInner>,
}

impl ConnectivityMonitor {
    pub fn new(initial: ConnectivityState) -> Self {
        Self {
            inner: Arc::new(MonitorInner {
                state: Mutex::new(initial),
                subscribers: Mutex::new(Vec::new()),
                next_subscriber_id: AtomicU64::new(0),
            }),
        }
    }

    /// Synchronous snapshot; always answerable without suspension.
    pub fn current_state(&self) -> ConnectivityState {
        *self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers an edge-event subscription. Dropping the returned handle
    /// unsubscribes.
    pub fn subscribe(&self) -> ConnectivitySubscription {
        let (sender, receiver) = flume::unbounded();
        let id = self.inner.next_subscriber_id.fetch_add(1, Ordering::Relaxed);

        self.inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(Subscriber { id, sender });

        ConnectivitySubscription {
            id,
            receiver,
            monitor: Arc::downgrade(&self.inner),
        }
    }

    pub fn report_online(&self) -> bool {
        self.report(ConnectivityState::Online)
    }

    pub fn report_offline(&self) -> bool {
        self.report(ConnectivityState::Offline)
    }

    /// Applies a reported state. Returns `true` when this was a genuine
    /// transition (an edge was emitted), `false` when already in that state.
    pub fn report(&self, reported: ConnectivityState) -> bool {
        let mut state = self
            .inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *state == reported {
            return false;
        }
        *state = reported;
        drop(state);

        info!(
            event = "connectivity_edge",
            state = reported.as_str(),
            "connectivity transition"
        );

        let edge = match reported {
            ConnectivityState::Online => ConnectivityEvent::Online,
            ConnectivityState::Offline => ConnectivityEvent::Offline,
        };

        let mut subscribers = self
            .inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|subscriber| subscriber.sender.send(edge).is_ok());

        true
    }

    /// Drives the monitor from a polling probe until cancellation.
    ///
    /// The first check runs immediately so startup state does not wait one
    /// full interval.
    pub async fn run_probe_loop<P>(
        &self,
        probe: P,
        interval: Duration,
        cancel_token: CancellationToken,
    ) where
        P: ConnectivityProbe,
    {
        loop {
            let reachable = probe.check().await;
            let reported = if reachable {
                ConnectivityState::Online
            } else {
                ConnectivityState::Offline
            };
            if !self.report(reported) {
                debug!(
                    event = "connectivity_probe_steady",
                    state = reported.as_str(),
                    "probe confirmed current state"
                );
            }

            tokio::select! {
                _ = cancel_token.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    fn unsubscribe(inner: &MonitorInner, id: u64) {
        inner
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|subscriber| subscriber.id != id);
    }
}

/// Live edge-event subscription; unsubscribes on drop.
pub struct ConnectivitySubscription {
    id: u64,
    receiver: flume::Receiver<ConnectivityEvent>,
    monitor: Weak<MonitorInner>,
}

impl ConnectivitySubscription {
    /// Waits for the next edge. Returns `None` once the monitor is gone.
    pub async fn next_event(&self) -> Option<ConnectivityEvent> {
        self.receiver.recv_async().await.ok()
    }

    /// Non-blocking drain used by tests and status displays.
    pub fn try_next_event(&self) -> Option<ConnectivityEvent> {
        self.receiver.try_recv().ok()
    }
}

impl Drop for ConnectivitySubscription {
    fn drop(&mut self) {
        if let Some(inner) = self.monitor.upgrade() {
            ConnectivityMonitor::unsubscribe(&inner, self.id);
        }
    }
}

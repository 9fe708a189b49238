//! Adapter status observation.
//!
//! [`AdapterStatusObserver`] keeps one OS-wide interface change subscription
//! alive while at least one adapter is watched, drops changes for adapters
//! nobody asked about, and republishes the rest as [`StatusEvent`]s on a
//! single sink obtained from [`AdapterStatusObserver::listen`].
//!
//! The subscription is consumed by a spawned task. The monitored set and the
//! task handle share one lock which is never held across an `.await`: stopping
//! takes the handle out under the lock, then aborts and joins the task after
//! releasing it. Membership is checked again under the lock right before each
//! publish, so once `stop_observing` returns no further event for that
//! adapter is published.
//!
//! If the change source ends on its own, the consumer subscribes again and
//! republishes the status of every watched adapter.

use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::UnboundedReceiverStream;

use crate::error::Result;
use crate::interface_id::InterfaceId;
use crate::status::{ConnectionStatus, OperStatus};

/// Pause before subscribing again after the change source ended.
const RESUBSCRIBE_DELAY: Duration = Duration::from_millis(100);

/// One interface change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceChange {
    pub interface: InterfaceId,
    /// Status carried by the notification, if any. When `None` the
    /// observer reads it with [`InterfaceMonitor::oper_status`].
    pub status: Option<OperStatus>,
}

/// A live OS-wide change subscription.
///
/// Dropping it cancels the registration.
pub struct Subscription {
    events: mpsc::UnboundedReceiver<InterfaceChange>,
    reader: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Wrap a change channel and the task feeding it, if there is one.
    pub fn new(events: mpsc::UnboundedReceiver<InterfaceChange>, reader: Option<JoinHandle<()>>) -> Self {
        Self { events, reader }
    }

    /// A subscription fed directly through the returned sender.
    pub fn channel() -> (mpsc::UnboundedSender<InterfaceChange>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (tx, Self::new(rx, None))
    }

    pub async fn recv(&mut self) -> Option<InterfaceChange> {
        self.events.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}

/// Source of interface change notifications and status reads.
pub trait InterfaceMonitor: Send + Sync + 'static {
    /// Register for changes on all interfaces.
    fn subscribe(&self) -> Result<Subscription>;

    /// Current operational status of one interface.
    fn oper_status(&self, interface: InterfaceId) -> impl Future<Output = Result<OperStatus>> + Send;
}

/// Status record pushed to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatusEvent {
    pub status: ConnectionStatus,
    pub luid: InterfaceId,
}

#[derive(Default)]
struct State {
    monitored: HashSet<InterfaceId>,
    /// Consumer of the OS subscription. Running iff `monitored` is non-empty.
    consumer: Option<JoinHandle<()>>,
}

struct Shared<M> {
    monitor: M,
    state: Mutex<State>,
    sink: Mutex<Option<mpsc::UnboundedSender<StatusEvent>>>,
}

impl<M: InterfaceMonitor> Shared<M> {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn is_monitoring(&self, interface: InterfaceId) -> bool {
        self.state().monitored.contains(&interface)
    }

    async fn read_status(&self, interface: InterfaceId) -> OperStatus {
        match self.monitor.oper_status(interface).await {
            Ok(status) => status,
            Err(e) => {
                tracing::debug!(%interface, error = %e, "status read failed");
                OperStatus::Unknown
            }
        }
    }

    /// Publish unless `interface` stopped being watched in the meantime.
    fn publish_if_monitored(&self, interface: InterfaceId, status: OperStatus) {
        let state = self.state();
        if state.monitored.contains(&interface) {
            self.publish(interface, status);
        }
    }

    /// Re-read and publish every watched adapter.
    async fn resync(&self) {
        let monitored: Vec<InterfaceId> = self.state().monitored.iter().copied().collect();
        for interface in monitored {
            let status = self.read_status(interface).await;
            self.publish_if_monitored(interface, status);
        }
    }

    fn publish(&self, interface: InterfaceId, status: OperStatus) {
        let event = StatusEvent {
            status: status.into(),
            luid: interface,
        };

        let mut sink = self.sink.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(tx) = sink.as_ref() {
            tracing::debug!(%interface, status = %event.status, "publishing status");
            if tx.send(event).is_err() {
                *sink = None;
            }
        }
    }
}

async fn consume<M: InterfaceMonitor>(shared: Arc<Shared<M>>, mut subscription: Subscription) {
    loop {
        while let Some(change) = subscription.recv().await {
            if !shared.is_monitoring(change.interface) {
                continue;
            }

            let status = match change.status {
                Some(status) => status,
                None => shared.read_status(change.interface).await,
            };
            shared.publish_if_monitored(change.interface, status);
        }

        if shared.state().monitored.is_empty() {
            break;
        }

        tracing::warn!("interface change subscription ended, subscribing again");
        tokio::time::sleep(RESUBSCRIBE_DELAY).await;
        subscription = match shared.monitor.subscribe() {
            Ok(subscription) => subscription,
            Err(e) => {
                tracing::warn!(error = %e, "failed to subscribe to interface changes");
                break;
            }
        };
        shared.resync().await;
    }

    tracing::debug!("interface change subscription ended");
}

/// Watches a set of adapters and publishes their status transitions.
pub struct AdapterStatusObserver<M: InterfaceMonitor> {
    shared: Arc<Shared<M>>,
}

impl<M: InterfaceMonitor> AdapterStatusObserver<M> {
    pub fn new(monitor: M) -> Self {
        Self {
            shared: Arc::new(Shared {
                monitor,
                state: Mutex::new(State::default()),
                sink: Mutex::new(None),
            }),
        }
    }

    /// Start watching `interface` and publish its current status.
    ///
    /// Watching an already watched adapter does nothing while the OS
    /// subscription is live. The subscription is established with the first
    /// adapter, or again if the previous one died; if that fails the adapter
    /// is not added.
    pub async fn start_observing(&self, interface: InterfaceId) -> Result<()> {
        {
            let mut state = self.shared.state();
            let live = state.consumer.as_ref().is_some_and(|c| !c.is_finished());
            if live && state.monitored.contains(&interface) {
                return Ok(());
            }

            if !live {
                let subscription = self.shared.monitor.subscribe().inspect_err(|e| {
                    tracing::warn!(%interface, error = %e, "failed to subscribe to interface changes");
                })?;
                let shared = Arc::clone(&self.shared);
                state.consumer = Some(tokio::spawn(consume(shared, subscription)));
                tracing::debug!("subscribed to interface changes");
            }

            state.monitored.insert(interface);
        }

        tracing::info!(%interface, "observing adapter");
        let status = self.shared.read_status(interface).await;
        self.shared.publish_if_monitored(interface, status);
        Ok(())
    }

    /// Stop watching `interface`, dropping the OS subscription with the last one.
    pub async fn stop_observing(&self, interface: InterfaceId) {
        let consumer = {
            let mut state = self.shared.state();
            if !state.monitored.remove(&interface) {
                return;
            }
            if state.monitored.is_empty() {
                state.consumer.take()
            } else {
                None
            }
        };

        tracing::info!(%interface, "stopped observing adapter");
        if let Some(consumer) = consumer {
            teardown(consumer).await;
        }
    }

    /// Stop watching every adapter.
    pub async fn stop_all_observing(&self) {
        let consumer = {
            let mut state = self.shared.state();
            state.monitored.clear();
            state.consumer.take()
        };

        if let Some(consumer) = consumer {
            teardown(consumer).await;
        }
    }

    pub fn is_monitoring(&self, interface: InterfaceId) -> bool {
        self.shared.is_monitoring(interface)
    }

    /// Number of adapters being watched.
    pub fn monitored_count(&self) -> usize {
        self.shared.state().monitored.len()
    }

    /// Whether the OS-wide subscription is active.
    pub fn is_subscribed(&self) -> bool {
        self.shared
            .state()
            .consumer
            .as_ref()
            .is_some_and(|consumer| !consumer.is_finished())
    }

    /// Attach the event sink, replacing any previous one.
    pub fn listen(&self) -> UnboundedReceiverStream<StatusEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        *self.shared.sink.lock().unwrap_or_else(PoisonError::into_inner) = Some(tx);
        UnboundedReceiverStream::new(rx)
    }

    /// Detach the event sink. Events published afterwards are dropped.
    pub fn cancel_listen(&self) {
        *self.shared.sink.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl<M: InterfaceMonitor> Drop for AdapterStatusObserver<M> {
    fn drop(&mut self) {
        let mut state = self.shared.state();
        state.monitored.clear();
        if let Some(consumer) = state.consumer.take() {
            consumer.abort();
        }
    }
}

/// Abort the consumer and wait until it can no longer publish.
async fn teardown(consumer: JoinHandle<()>) {
    consumer.abort();
    if let Err(e) = consumer.await {
        if !e.is_cancelled() {
            tracing::warn!(error = %e, "interface change consumer failed");
        }
    }
    tracing::debug!("unsubscribed from interface changes");
}

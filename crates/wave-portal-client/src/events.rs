//! # Event Hub
//!
//! Handler registry behind `subscribe`/`unsubscribe` for contract events.
//!
//! - At most one active registration per (event, subscriber).
//! - Registration returns a [`SubscriptionGuard`]; dropping it deregisters.
//! - One pump task per event runs while at least one handler is registered.
//!   It dispatches events in delivery order, awaiting each handler in turn.
//! - Delivery errors are logged and skipped. A stream that ends, or a
//!   subscription that cannot be opened, is retried with exponential backoff.
//!
//! ## Usage
//!
//! ```ignore
//! let hub = EventHub::new(contract);
//! let guard = hub.subscribe(ContractEvent::NewWave, "logger", handler(|wave| async move {
//!     info!(sender = %wave.sender, "NewWave");
//! }))?;
//! // ...
//! drop(guard); // unsubscribes
//! ```

use crate::{ContractEvent, WaveContract, WaveEntry, WaveError};
use futures_util::{StreamExt, future::BoxFuture};
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Initial re-subscription delay
pub const INITIAL_RESUBSCRIBE_DELAY: Duration = Duration::from_secs(1);
/// Maximum re-subscription delay
pub const MAX_RESUBSCRIBE_DELAY: Duration = Duration::from_secs(60);

/// Async callback invoked once per delivered event.
pub type WaveHandler = Arc<dyn Fn(WaveEntry) -> BoxFuture<'static, ()> + Send + Sync>;

/// Wrap an async closure into a [`WaveHandler`].
pub fn handler<F, Fut>(f: F) -> WaveHandler
where
    F: Fn(WaveEntry) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    Arc::new(move |wave| Box::pin(f(wave)))
}

struct Registration {
    id: u64,
    event: ContractEvent,
    subscriber: String,
    handler: WaveHandler,
}

#[derive(Default)]
struct HubState {
    next_id: u64,
    registrations: Vec<Registration>,
    pumps: HashMap<ContractEvent, CancellationToken>,
}

struct HubInner<C> {
    contract: Arc<C>,
    state: Mutex<HubState>,
    initial_delay: Duration,
    max_delay: Duration,
}

impl<C> HubInner<C> {
    fn lock(&self) -> MutexGuard<'_, HubState> {
        // Handlers never run under this lock, so a poisoned state is still consistent
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Remove the first registration for `event` that `matches` selects,
    /// stopping the pump when none are left.
    fn remove(&self, event: ContractEvent, matches: impl Fn(&Registration) -> bool) -> bool {
        let mut state = self.lock();
        let Some(index) = state
            .registrations
            .iter()
            .position(|r| r.event == event && matches(r))
        else {
            return false;
        };
        let removed = state.registrations.remove(index);
        debug!(event = %event, subscriber = %removed.subscriber, "Unsubscribed");

        if !state.registrations.iter().any(|r| r.event == event) {
            if let Some(pump) = state.pumps.remove(&event) {
                pump.cancel();
                info!(event = %event, "No subscribers left, stopped listening");
            }
        }
        true
    }

    fn handlers(&self, event: ContractEvent) -> Vec<WaveHandler> {
        self.lock()
            .registrations
            .iter()
            .filter(|r| r.event == event)
            .map(|r| r.handler.clone())
            .collect()
    }
}

/// Contract event subscriptions shared by every subscriber.
pub struct EventHub<C: WaveContract> {
    inner: Arc<HubInner<C>>,
}

impl<C: WaveContract> Clone for EventHub<C> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<C: WaveContract> EventHub<C> {
    pub fn new(contract: Arc<C>) -> Self {
        Self::with_backoff(contract, INITIAL_RESUBSCRIBE_DELAY, MAX_RESUBSCRIBE_DELAY)
    }

    pub fn with_backoff(contract: Arc<C>, initial_delay: Duration, max_delay: Duration) -> Self {
        Self {
            inner: Arc::new(HubInner {
                contract,
                state: Mutex::new(HubState::default()),
                initial_delay,
                max_delay,
            }),
        }
    }

    /// Register `handler` for `event` under a logical subscriber name.
    ///
    /// Must be called from within a tokio runtime: the first registration for
    /// an event spawns its pump task.
    pub fn subscribe(
        &self,
        event: ContractEvent,
        subscriber: impl Into<String>,
        handler: WaveHandler,
    ) -> Result<SubscriptionGuard, WaveError> {
        let subscriber = subscriber.into();
        let mut state = self.inner.lock();

        if state
            .registrations
            .iter()
            .any(|r| r.event == event && r.subscriber == subscriber)
        {
            return Err(WaveError::AlreadySubscribed {
                event: event.to_string(),
                subscriber,
            });
        }

        let id = state.next_id;
        state.next_id += 1;
        state.registrations.push(Registration {
            id,
            event,
            subscriber: subscriber.clone(),
            handler,
        });
        debug!(event = %event, subscriber = %subscriber, "Subscribed");

        if !state.pumps.contains_key(&event) {
            let cancel = CancellationToken::new();
            state.pumps.insert(event, cancel.clone());
            tokio::spawn(run_pump(self.inner.clone(), event, cancel));
        }
        drop(state);

        let hub = Arc::downgrade(&self.inner);
        Ok(SubscriptionGuard {
            event,
            subscriber,
            release: Some(Box::new(move || release(hub, event, id))),
        })
    }

    /// Deregister a subscriber. Returns whether it was registered.
    pub fn unsubscribe(&self, event: ContractEvent, subscriber: &str) -> bool {
        self.inner.remove(event, |r| r.subscriber == subscriber)
    }

    pub fn subscriber_count(&self, event: ContractEvent) -> usize {
        self.inner
            .lock()
            .registrations
            .iter()
            .filter(|r| r.event == event)
            .count()
    }

    /// Whether a pump is running for `event`.
    pub fn is_listening(&self, event: ContractEvent) -> bool {
        self.inner.lock().pumps.contains_key(&event)
    }
}

fn release<C>(hub: Weak<HubInner<C>>, event: ContractEvent, id: u64) {
    if let Some(hub) = hub.upgrade() {
        hub.remove(event, |r| r.id == id);
    }
}

/// Scoped registration. Dropping it deregisters the handler it was issued
/// for, and nothing else.
#[must_use = "dropping the guard unsubscribes immediately"]
pub struct SubscriptionGuard {
    event: ContractEvent,
    subscriber: String,
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl SubscriptionGuard {
    pub fn event(&self) -> ContractEvent {
        self.event
    }

    pub fn subscriber(&self) -> &str {
        &self.subscriber
    }

    /// Deregister now.
    pub fn unsubscribe(self) {
        drop(self);
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl std::fmt::Debug for SubscriptionGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionGuard")
            .field("event", &self.event)
            .field("subscriber", &self.subscriber)
            .finish()
    }
}

async fn run_pump<C: WaveContract>(
    hub: Arc<HubInner<C>>,
    event: ContractEvent,
    cancel: CancellationToken,
) {
    let mut delay = hub.initial_delay;
    loop {
        let subscribed = tokio::select! {
            _ = cancel.cancelled() => return,
            subscribed = hub.contract.events(event) => subscribed,
        };

        match subscribed {
            Ok(mut stream) => {
                info!(event = %event, "Listening for contract events");
                delay = hub.initial_delay;
                loop {
                    let next = tokio::select! {
                        _ = cancel.cancelled() => return,
                        next = stream.next() => next,
                    };
                    match next {
                        Some(Ok(wave)) => {
                            for handler in hub.handlers(event) {
                                handler(wave.clone()).await;
                            }
                        }
                        Some(Err(e)) => {
                            error!(event = %event, error = %e, "Error receiving event");
                        }
                        None => {
                            warn!(event = %event, "Event stream ended. Resubscribing...");
                            break;
                        }
                    }
                }
            }
            Err(e) => {
                error!(event = %event, error = %e, "Failed to subscribe. Retrying...");
            }
        }

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(delay) => {
                delay = std::cmp::min(delay * 2, hub.max_delay);
            }
        }
    }
}

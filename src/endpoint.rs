//! Subscriber endpoints
//!
//! A subscriber endpoint is the sink a consumer reads events from. The bus
//! only ever talks to the `Sink` trait; `Endpoint` is the stock
//! implementation, a single-slot rendezvous channel: `send` completes only
//! once a receiver has taken the payload, and nothing is buffered when a
//! send is abandoned.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{oneshot, Notify};

/// Returned by `Sink::send` when the sink has been closed
///
/// Carries the undelivered payload back to the caller.
#[derive(Error, PartialEq, Eq)]
#[error("sending on a closed endpoint")]
pub struct SendError<T>(pub T);

impl<T> SendError<T> {
    /// Recover the undelivered payload
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> fmt::Debug for SendError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SendError").finish_non_exhaustive()
    }
}

/// Delivery target registered with the bus
///
/// Implementations must tolerate any number of concurrent `send` calls:
/// the same sink may be registered under several events and published to
/// from several tasks at once.
#[async_trait]
pub trait Sink<T: Send + 'static>: Send + Sync {
    /// Deliver one payload, waiting until the consumer accepts it
    async fn send(&self, payload: T) -> Result<(), SendError<T>>;

    /// Mark the sink closed and wake pending receivers with end-of-stream
    ///
    /// Closing is terminal. Closing an already closed sink is a no-op.
    fn close(&self);

    /// Whether `close` has been called
    fn is_closed(&self) -> bool;
}

/// A payload parked by `send` until a receiver takes it
struct Offer<T> {
    slot: Arc<Mutex<Option<T>>>,
    /// Fired by the receiver after emptying `slot`
    taken: oneshot::Sender<()>,
}

struct State<T> {
    /// Senders waiting for a receiver, oldest first
    offers: VecDeque<Offer<T>>,
    closed: bool,
}

/// Takes back a parked payload when `send` is abandoned
struct Reclaim<'a, T>(&'a Mutex<Option<T>>);

impl<T> Reclaim<'_, T> {
    fn take(&self) -> Option<T> {
        self.0.lock().take()
    }
}

impl<T> Drop for Reclaim<'_, T> {
    fn drop(&mut self) {
        drop(self.take());
    }
}

/// Single-slot rendezvous endpoint
///
/// Share it as an `Arc<Endpoint<T>>`: one clone goes to the bus via
/// `EventBus::subscribe`, the consumer keeps another and loops on `recv`
/// until it returns `None`.
pub struct Endpoint<T> {
    state: Mutex<State<T>>,
    sender_ready: Notify,
}

impl<T: Send + 'static> Endpoint<T> {
    /// Create an open endpoint
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                offers: VecDeque::new(),
                closed: false,
            }),
            sender_ready: Notify::new(),
        }
    }

    /// Hand `payload` to a receiver, waiting for one if necessary
    ///
    /// If this future is dropped before a receiver takes the payload, the
    /// payload is dropped with it and no receiver ever sees it.
    pub async fn send(&self, payload: T) -> Result<(), SendError<T>> {
        let slot = Arc::new(Mutex::new(None::<T>));
        let (taken_tx, taken_rx) = oneshot::channel();
        {
            let mut state = self.state.lock();
            if state.closed {
                return Err(SendError(payload));
            }
            *slot.lock() = Some(payload);
            state.offers.retain(|offer| !offer.taken.is_closed());
            state.offers.push_back(Offer {
                slot: slot.clone(),
                taken: taken_tx,
            });
        }
        self.sender_ready.notify_one();

        let reclaim = Reclaim(slot.as_ref());
        // Resolves once a receiver emptied the slot, or `close` dropped the offer.
        let _ = taken_rx.await;
        match reclaim.take() {
            None => Ok(()),
            Some(payload) => Err(SendError(payload)),
        }
    }

    /// Receive the next payload, or `None` once the endpoint is closed
    ///
    /// Cancel safe: a payload is only removed from a sender in the poll
    /// that returns it.
    pub async fn recv(&self) -> Option<T> {
        loop {
            let ready = self.sender_ready.notified();
            tokio::pin!(ready);
            // Register interest before inspecting the state so a sender
            // arriving in between cannot be missed.
            ready.as_mut().enable();

            {
                let mut state = self.state.lock();
                while let Some(offer) = state.offers.pop_front() {
                    let taken = offer.slot.lock().take();
                    if let Some(payload) = taken {
                        let _ = offer.taken.send(());
                        return Some(payload);
                    }
                    // sender gave up on its send
                }
                if state.closed {
                    return None;
                }
            }

            ready.await;
        }
    }

    /// Close the endpoint
    ///
    /// Parked senders get their payload back as `SendError`.
    pub fn close(&self) {
        let parked = {
            let mut state = self.state.lock();
            if state.closed {
                return;
            }
            state.closed = true;
            std::mem::take(&mut state.offers)
        };
        drop(parked);
        self.sender_ready.notify_waiters();
    }

    /// Whether the endpoint has been closed
    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    /// Number of senders currently parked in `send`
    pub fn pending_senders(&self) -> usize {
        self.state
            .lock()
            .offers
            .iter()
            .filter(|offer| !offer.taken.is_closed())
            .count()
    }
}

impl<T: Send + 'static> Default for Endpoint<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Endpoint<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("Endpoint")
            .field("closed", &state.closed)
            .field("parked_senders", &state.offers.len())
            .finish()
    }
}

#[async_trait]
impl<T: Send + 'static> Sink<T> for Endpoint<T> {
    async fn send(&self, payload: T) -> Result<(), SendError<T>> {
        Endpoint::send(self, payload).await
    }

    fn close(&self) {
        Endpoint::close(self)
    }

    fn is_closed(&self) -> bool {
        Endpoint::is_closed(self)
    }
}

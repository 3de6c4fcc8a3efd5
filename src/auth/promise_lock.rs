//! Deduplicating refresh lock (spec.md §4.8, §9).
//!
//! N concurrent callers observing an expired access token must trigger
//! exactly one refresh and all observe the same result. Grounded in the
//! teacher's `CachedJwks` (`server::auth::jwt`), which guards its refresh
//! with a `tokio::sync::RwLock` so only one fetch happens at a time;
//! generalized here into a reusable primitive that also fans the single
//! result out to every waiter via a broadcast channel.

use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::broadcast;

enum State<T> {
    Idle,
    InFlight(broadcast::Sender<T>),
}

/// Deduplicates concurrent async operations keyed by nothing but call
/// order: the first caller to arrive while idle runs `refresh`; everyone
/// else who arrives before it completes receives a clone of its result.
pub struct PromiseLock<T> {
    state: Mutex<State<T>>,
}

impl<T: Clone + Send + 'static> PromiseLock<T> {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::Idle),
        }
    }

    /// Run `refresh` if no refresh is in flight; otherwise await the
    /// in-flight one's result.
    pub async fn run<F, Fut>(&self, refresh: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: std::future::Future<Output = T>,
    {
        let mut receiver = {
            let mut state = self.state.lock();
            match &*state {
                State::InFlight(sender) => Some(sender.subscribe()),
                State::Idle => {
                    let (sender, _) = broadcast::channel(1);
                    *state = State::InFlight(sender);
                    None
                },
            }
        };

        if let Some(receiver) = receiver.as_mut() {
            // Another caller is already refreshing; wait for its result.
            return receiver.recv().await.expect("sender outlives this receiver");
        }

        let result = refresh().await;

        let sender = {
            let mut state = self.state.lock();
            let sender = match std::mem::replace(&mut *state, State::Idle) {
                State::InFlight(sender) => sender,
                State::Idle => unreachable!("this caller set InFlight above"),
            };
            sender
        };
        let _ = sender.send(result.clone());
        result
    }
}

impl<T: Clone + Send + 'static> Default for PromiseLock<T> {
    fn default() -> Self {
        Self::new()
    }
}

pub type SharedPromiseLock<T> = Arc<PromiseLock<T>>;

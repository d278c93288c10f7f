//! Multicast combinator for [`Observable`]
//!
//! The upstream is subscribed when the first downstream observer arrives and
//! unsubscribed when the last one leaves. A later subscriber after that reconnects.

use super::observable::{lock, Observable, Observer, ObserverList, Subscription};
use crate::error::TurnError;
use std::sync::{Arc, Mutex, Weak};

struct ShareState<T> {
    observers: ObserverList<T>,
    source: Option<Subscription>,
    connected: bool,
    generation: u64,
}

/// Forwards upstream notifications to every downstream observer
struct ShareForwarder<T> {
    state: Weak<Mutex<ShareState<T>>>,
}

impl<T: Clone + Send + 'static> ShareForwarder<T> {
    fn observers(&self) -> Vec<super::SubscriptionObserver<T>> {
        match self.state.upgrade() {
            Some(state) => lock(&state).observers.snapshot(),
            None => Vec::new(),
        }
    }

    /// Observers to notify of the upstream's end.
    ///
    /// The upstream is released in the same step, so a subscriber arriving afterwards
    /// reconnects instead of joining a finished stream.
    fn final_observers(&self) -> Vec<super::SubscriptionObserver<T>> {
        let Some(state) = self.state.upgrade() else {
            return Vec::new();
        };

        let mut shared = lock(&state);
        shared.connected = false;
        shared.source = None;
        shared.observers.snapshot()
    }
}

impl<T: Clone + Send + 'static> Observer<T> for ShareForwarder<T> {
    fn next(&self, value: T) {
        for observer in self.observers() {
            observer.next(value.clone());
        }
    }

    fn error(&self, error: TurnError) {
        for observer in self.final_observers() {
            observer.error(error.clone());
        }
    }

    fn complete(&self) {
        for observer in self.final_observers() {
            observer.complete();
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Observable<T> {
    /// Share one upstream subscription among all current subscribers
    pub fn share(&self) -> Observable<T> {
        let upstream = self.clone();
        let state = Arc::new(Mutex::new(ShareState {
            observers: ObserverList::new(),
            source: None,
            connected: false,
            generation: 0,
        }));

        Observable::new(move |observer| {
            let (id, connect) = {
                let mut shared = lock(&state);
                let id = shared.observers.add(observer);
                let connect = if shared.connected {
                    None
                } else {
                    shared.connected = true;
                    shared.generation += 1;
                    Some(shared.generation)
                };
                (id, connect)
            };

            if let Some(generation) = connect {
                let subscription = upstream.subscribe(ShareForwarder {
                    state: Arc::downgrade(&state),
                });

                let stale = {
                    let mut shared = lock(&state);
                    if shared.connected && shared.generation == generation {
                        shared.source = Some(subscription);
                        None
                    } else {
                        Some(subscription)
                    }
                };

                // Every observer left while connecting.
                if let Some(subscription) = stale {
                    subscription.unsubscribe();
                }
            }

            let state = Arc::clone(&state);
            Box::new(move || {
                let source = {
                    let mut shared = lock(&state);
                    shared.observers.remove(id);
                    if shared.observers.is_empty() && shared.connected {
                        shared.connected = false;
                        shared.source.take()
                    } else {
                        None
                    }
                };

                if let Some(source) = source {
                    source.unsubscribe();
                }
            })
        })
    }
}

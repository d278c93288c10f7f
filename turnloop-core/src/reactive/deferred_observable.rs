//! Subject-style event source driven from outside

use super::observable::{lock, Observable, ObserverList, SubscriptionObserver};
use crate::error::TurnError;
use std::sync::{Arc, Mutex};

type Registry<T> = Arc<Mutex<ObserverList<T>>>;

/// An [`Observable`] paired with `next`/`error`/`complete` controls that broadcast to
/// every current subscriber.
///
/// A fixed instance built with [`DeferredObservable::from_iter`] replays its items to
/// each subscriber and ignores the controls.
pub struct DeferredObservable<T> {
    observable: Observable<T>,
    registry: Option<Registry<T>>,
}

impl<T> Clone for DeferredObservable<T> {
    fn clone(&self) -> Self {
        Self {
            observable: self.observable.clone(),
            registry: self.registry.clone(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> DeferredObservable<T> {
    pub fn new() -> Self {
        Self::with_subscribe_hook(|_, register| register())
    }

    /// `hook` runs with every new subscriber and decides when, if at all, it joins the
    /// broadcast list by calling `register`.
    ///
    /// A subscriber that is never registered only sees what the hook sends it.
    pub fn with_subscribe_hook<F>(hook: F) -> Self
    where
        F: Fn(&SubscriptionObserver<T>, &mut dyn FnMut()) + Send + Sync + 'static,
    {
        let registry: Registry<T> = Arc::new(Mutex::new(ObserverList::new()));
        let observers = Arc::clone(&registry);

        let observable = Observable::new(move |observer: SubscriptionObserver<T>| {
            let mut id = None;
            hook(&observer, &mut || {
                if id.is_none() {
                    id = Some(lock(&observers).add(observer.clone()));
                }
            });

            let observers = Arc::clone(&observers);
            Box::new(move || {
                if let Some(id) = id {
                    lock(&observers).remove(id);
                }
            })
        });

        Self {
            observable,
            registry: Some(registry),
        }
    }

    /// A terminal source: every subscriber gets `items` then completion
    pub fn from_iter<I>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
    {
        Self {
            observable: Observable::from_iter(items),
            registry: None,
        }
    }

    pub fn observable(&self) -> Observable<T> {
        self.observable.clone()
    }

    pub fn next(&self, value: T) {
        for observer in self.observers() {
            observer.next(value.clone());
        }
    }

    pub fn error(&self, error: TurnError) {
        for observer in self.observers() {
            observer.error(error.clone());
        }
    }

    pub fn complete(&self) {
        for observer in self.observers() {
            observer.complete();
        }
    }

    fn observers(&self) -> Vec<SubscriptionObserver<T>> {
        match &self.registry {
            Some(registry) => lock(registry).snapshot(),
            None => Vec::new(),
        }
    }
}

impl<T: Clone + Send + Sync + 'static> Default for DeferredObservable<T> {
    fn default() -> Self {
        Self::new()
    }
}

//! Minimal push-based observable
//!
//! `subscribe(observer) -> Subscription`, with the usual guarantees: after `error` or
//! `complete` an observer receives nothing more, and the producer's teardown runs exactly
//! once, either on unsubscribe or right after the terminal notification.

use crate::error::TurnError;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

/// Cleanup returned by a producer; runs once when the subscription closes
pub type Teardown = Box<dyn FnOnce() + Send>;

/// Teardown that does nothing
pub fn noop_teardown() -> Teardown {
    Box::new(|| {})
}

/// Receives notifications from an [`Observable`]
pub trait Observer<T>: Send + Sync {
    fn next(&self, value: T);
    fn error(&self, error: TurnError);
    fn complete(&self);
}

impl<T, O> Observer<T> for Arc<O>
where
    O: Observer<T> + ?Sized,
{
    fn next(&self, value: T) {
        (**self).next(value)
    }

    fn error(&self, error: TurnError) {
        (**self).error(error)
    }

    fn complete(&self) {
        (**self).complete()
    }
}

/// Observer built from three closures, see [`observer_fn`]
pub struct FnObserver<N, E, C> {
    on_next: N,
    on_error: E,
    on_complete: C,
}

/// Build an observer from `next`, `error` and `complete` callbacks
pub fn observer_fn<T, N, E, C>(on_next: N, on_error: E, on_complete: C) -> FnObserver<N, E, C>
where
    N: Fn(T) + Send + Sync,
    E: Fn(TurnError) + Send + Sync,
    C: Fn() + Send + Sync,
{
    FnObserver {
        on_next,
        on_error,
        on_complete,
    }
}

impl<T, N, E, C> Observer<T> for FnObserver<N, E, C>
where
    N: Fn(T) + Send + Sync,
    E: Fn(TurnError) + Send + Sync,
    C: Fn() + Send + Sync,
{
    fn next(&self, value: T) {
        (self.on_next)(value)
    }

    fn error(&self, error: TurnError) {
        (self.on_error)(error)
    }

    fn complete(&self) {
        (self.on_complete)()
    }
}

struct SubscriptionInner<T> {
    observer: Box<dyn Observer<T>>,
    closed: AtomicBool,
    teardown: Mutex<Option<Teardown>>,
}

/// Normalized observer handed to producers.
///
/// Drops notifications once closed and owns the producer's teardown.
pub struct SubscriptionObserver<T> {
    inner: Arc<SubscriptionInner<T>>,
}

impl<T> Clone for SubscriptionObserver<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Send + 'static> SubscriptionObserver<T> {
    fn new(observer: Box<dyn Observer<T>>) -> Self {
        Self {
            inner: Arc::new(SubscriptionInner {
                observer,
                closed: AtomicBool::new(false),
                teardown: Mutex::new(None),
            }),
        }
    }

    pub fn next(&self, value: T) {
        if !self.is_closed() {
            self.inner.observer.next(value);
        }
    }

    pub fn error(&self, error: TurnError) {
        if self.close() {
            self.inner.observer.error(error);
            self.cleanup();
        }
    }

    pub fn complete(&self) {
        if self.close() {
            self.inner.observer.complete();
            self.cleanup();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    fn unsubscribe(&self) {
        if self.close() {
            self.cleanup();
        }
    }

    /// Marks closed; true only for the call that closed it.
    fn close(&self) -> bool {
        !self.inner.closed.swap(true, Ordering::SeqCst)
    }

    fn cleanup(&self) {
        let teardown = lock(&self.inner.teardown).take();
        if let Some(teardown) = teardown {
            teardown();
        }
    }

    fn set_teardown(&self, teardown: Teardown) {
        let mut slot = lock(&self.inner.teardown);
        if self.is_closed() {
            // Closed while the producer was still subscribing.
            drop(slot);
            teardown();
        } else {
            *slot = Some(teardown);
        }
    }
}

impl<T: Send + 'static> Observer<T> for SubscriptionObserver<T> {
    fn next(&self, value: T) {
        SubscriptionObserver::next(self, value)
    }

    fn error(&self, error: TurnError) {
        SubscriptionObserver::error(self, error)
    }

    fn complete(&self) {
        SubscriptionObserver::complete(self)
    }
}

trait SubscriptionHandle: Send + Sync {
    fn unsubscribe(&self);
    fn is_closed(&self) -> bool;
}

impl<T: Send + 'static> SubscriptionHandle for SubscriptionObserver<T> {
    fn unsubscribe(&self) {
        SubscriptionObserver::unsubscribe(self)
    }

    fn is_closed(&self) -> bool {
        SubscriptionObserver::is_closed(self)
    }
}

/// Handle returned by [`Observable::subscribe`].
///
/// Dropping it does not unsubscribe.
#[derive(Clone)]
pub struct Subscription {
    handle: Arc<dyn SubscriptionHandle>,
}

impl Subscription {
    pub fn unsubscribe(&self) {
        self.handle.unsubscribe()
    }

    pub fn is_closed(&self) -> bool {
        self.handle.is_closed()
    }
}

type SubscriberFn<T> = dyn Fn(SubscriptionObserver<T>) -> Teardown + Send + Sync;

/// A lazily produced sequence of values.
///
/// The producer runs once per subscription; use [`Observable::share`] to multicast.
pub struct Observable<T> {
    subscriber: Arc<SubscriberFn<T>>,
}

impl<T> Clone for Observable<T> {
    fn clone(&self) -> Self {
        Self {
            subscriber: Arc::clone(&self.subscriber),
        }
    }
}

impl<T: Send + 'static> Observable<T> {
    pub fn new<F>(subscriber: F) -> Self
    where
        F: Fn(SubscriptionObserver<T>) -> Teardown + Send + Sync + 'static,
    {
        Self {
            subscriber: Arc::new(subscriber),
        }
    }

    /// Emit every item synchronously on subscribe, then complete
    pub fn from_iter<I>(items: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Clone + Sync,
    {
        let items: Vec<T> = items.into_iter().collect();
        Self::new(move |observer| {
            for item in &items {
                observer.next(item.clone());
            }
            observer.complete();
            noop_teardown()
        })
    }

    /// Complete immediately without emitting
    pub fn empty() -> Self {
        Self::new(|observer| {
            observer.complete();
            noop_teardown()
        })
    }

    pub fn subscribe<O>(&self, observer: O) -> Subscription
    where
        O: Observer<T> + 'static,
    {
        let observer = SubscriptionObserver::new(Box::new(observer));
        let teardown = (self.subscriber)(observer.clone());
        observer.set_teardown(teardown);

        Subscription {
            handle: Arc::new(observer),
        }
    }
}

/// Observers registered with a multicast producer
pub(crate) struct ObserverList<T> {
    entries: Vec<(u64, SubscriptionObserver<T>)>,
    next_id: u64,
}

impl<T: Send + 'static> ObserverList<T> {
    pub(crate) fn new() -> Self {
        Self {
            entries: Vec::new(),
            next_id: 0,
        }
    }

    pub(crate) fn add(&mut self, observer: SubscriptionObserver<T>) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push((id, observer));
        id
    }

    pub(crate) fn remove(&mut self, id: u64) {
        self.entries.retain(|(entry_id, _)| *entry_id != id);
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Copy of the current observers, so callbacks run without holding a lock
    pub(crate) fn snapshot(&self) -> Vec<SubscriptionObserver<T>> {
        self.entries
            .iter()
            .map(|(_, observer)| observer.clone())
            .collect()
    }
}

/// Lock ignoring poisoning; observer callbacks never run under these locks.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

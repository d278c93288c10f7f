//! Concurrency toolkit
//!
//! Small primitives the orchestrator is assembled from: a cancellation token, a
//! single-resolution future, push-based observables with a multicast combinator and a
//! subject, an async serializer and a queue with a single ordered consumer.

pub mod abort;
pub mod critical_section;
pub mod deferred;
pub mod deferred_observable;
pub mod observable;
pub mod queue;
pub mod share;
pub mod stream;
pub mod testing;

pub use abort::{AbortPromise, AbortSignal};
pub use critical_section::CriticalSection;
pub use deferred::DeferredPromise;
pub use deferred_observable::DeferredObservable;
pub use observable::{
    noop_teardown, observer_fn, Observable, Observer, Subscription, SubscriptionObserver,
    Teardown,
};
pub use queue::QueueWithConsumer;
pub use stream::ObservableStream;

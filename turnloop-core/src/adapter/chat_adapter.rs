//! Turn orchestrator
//!
//! Drives one connection through `Uninitialized → Connecting → Online → Ended |
//! FailedToConnect`, publishes every received activity on one multicast stream, and
//! serializes `post_activity` calls so only one execute-and-iterate cycle runs at a time.

use super::{ActivityBatches, StartConversation, TurnExecution, TurnExecutor, TurnIteratorClient};
use crate::error::TurnError;
use crate::models::{Activity, ConnectionStatus};
use crate::reactive::observable::lock;
use crate::reactive::{
    noop_teardown, AbortPromise, AbortSignal, DeferredObservable, DeferredPromise, Observable,
    QueueWithConsumer, SubscriptionObserver,
};
use crate::services::logging::{log_post_failure, log_status_change};
use futures_util::{FutureExt, StreamExt};
use std::future::Future;
use std::sync::{Arc, Mutex, Weak};
use tracing::debug;

/// One queued `post_activity` call
#[derive(Clone)]
struct PendingPost {
    activity: Activity,
    reply: SubscriptionObserver<String>,
}

impl PendingPost {
    fn resolve(&self, activity_id: String) {
        self.reply.next(activity_id);
        self.reply.complete();
    }

    fn reject(&self, error: TurnError) {
        self.reply.error(error);
    }
}

/// Resources replaced with permanently closed ones when the connection ends
struct Sources {
    connection: DeferredPromise<Arc<dyn TurnExecutor>>,
    activities: DeferredObservable<Activity>,
    statuses: DeferredObservable<ConnectionStatus>,
    shared_activities: Observable<Activity>,
    shared_statuses: Observable<ConnectionStatus>,
}

struct AdapterInner {
    abort: AbortPromise,
    post_queue: QueueWithConsumer<PendingPost>,
    /// Taken by the one-time kickoff
    start: Mutex<Option<StartConversation>>,
    status: Arc<Mutex<ConnectionStatus>>,
    sources: Mutex<Sources>,
}

/// Chat adapter over a turn-based backend.
///
/// Inert until `activities()` or `connection_statuses()` is first subscribed; the
/// conversation-start callback then runs exactly once. Subscribing and posting must
/// happen inside a tokio runtime. Cloning yields another handle to the same connection.
#[derive(Clone)]
pub struct TurnBasedChatAdapter {
    inner: Arc<AdapterInner>,
}

impl TurnBasedChatAdapter {
    /// `start_conversation` receives the connection's abort signal and must honor it.
    pub fn new<F, Fut>(start_conversation: F) -> Self
    where
        F: Fn(AbortSignal) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TurnIteratorClient, TurnError>> + Send + 'static,
    {
        let start: StartConversation = Box::new(move |signal| start_conversation(signal).boxed());
        let status = Arc::new(Mutex::new(ConnectionStatus::Uninitialized));

        let inner = Arc::new_cyclic(|adapter: &Weak<AdapterInner>| {
            let consumer = adapter.clone();
            let post_queue = QueueWithConsumer::new(move |post: PendingPost| {
                let adapter = consumer.upgrade();
                async move {
                    match adapter {
                        Some(adapter) => adapter.consume_post(post).await,
                        None => {
                            post.reject(TurnError::Closed);
                            Err(TurnError::Closed)
                        }
                    }
                }
                .boxed()
            })
            .with_error_callback(|post, error| {
                log_post_failure(post.activity.activity_type.as_deref(), error);
            });

            let current = Arc::clone(&status);
            let statuses = DeferredObservable::with_subscribe_hook(move |observer, register| {
                // Registered under the status lock, so no transition after the status read
                // here can miss this subscriber.
                let status = {
                    let status = lock(&current);
                    if !status.is_terminal() {
                        register();
                    }
                    *status
                };

                observer.next(status);
                if status.is_terminal() {
                    observer.complete();
                }
            });
            let current = Arc::clone(&status);
            let activities = DeferredObservable::with_subscribe_hook(move |observer, register| {
                let ended = {
                    let status = lock(&current);
                    if !status.is_terminal() {
                        register();
                    }
                    status.is_terminal()
                };

                if ended {
                    observer.complete();
                }
            });

            AdapterInner {
                abort: AbortPromise::new(),
                post_queue,
                start: Mutex::new(Some(start)),
                status,
                sources: Mutex::new(Sources {
                    connection: DeferredPromise::new(),
                    shared_activities: activities.observable().share(),
                    shared_statuses: statuses.observable().share(),
                    activities,
                    statuses,
                }),
            }
        });

        Self { inner }
    }

    /// Every activity of the conversation, including echoes of posted ones.
    ///
    /// Subscribing kicks off the connection. After the connection ends, new subscribers
    /// complete immediately.
    pub fn activities(&self) -> Observable<Activity> {
        let inner = Arc::clone(&self.inner);
        Observable::new(move |observer| {
            let shared = lock(&inner.sources).shared_activities.clone();
            let subscription = shared.subscribe(observer);
            inner.kickoff();
            Box::new(move || subscription.unsubscribe())
        })
    }

    /// Connection status transitions.
    ///
    /// Each new group of subscribers first receives the current status. Subscribing kicks
    /// off the connection.
    pub fn connection_statuses(&self) -> Observable<ConnectionStatus> {
        let inner = Arc::clone(&self.inner);
        Observable::new(move |observer| {
            let shared = lock(&inner.sources).shared_statuses.clone();
            let subscription = shared.subscribe(observer);
            inner.kickoff();
            Box::new(move || subscription.unsubscribe())
        })
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        *lock(&self.inner.status)
    }

    /// Send `activity` once the returned observable is first subscribed.
    ///
    /// Emits the assigned activity id as soon as the backend accepted the turn, then
    /// completes. Every subscriber of the returned observable sees the same outcome.
    pub fn post_activity(&self, activity: Activity) -> Observable<String> {
        let inner = Arc::clone(&self.inner);
        Observable::new(move |reply: SubscriptionObserver<String>| {
            inner.post_queue.push(PendingPost {
                activity: activity.clone(),
                reply,
            });
            noop_teardown()
        })
        .share()
    }

    /// Close the connection; later calls have no effect.
    pub fn end(&self) {
        self.inner.end_with(None);
    }
}

impl AdapterInner {
    fn kickoff(self: &Arc<Self>) {
        let Some(start) = lock(&self.start).take() else {
            return;
        };

        if self.abort.is_aborted() {
            return;
        }

        self.set_status(ConnectionStatus::Connecting);

        let inner = Arc::clone(self);
        tokio::spawn(async move { inner.connect(start).await });
    }

    async fn connect(self: Arc<Self>, start: StartConversation) {
        let signal = self.abort.signal();

        let connected: Result<Option<Arc<dyn TurnExecutor>>, TurnError> = async {
            let client = signal.race(start(signal.clone())).await?;
            if signal.is_aborted() {
                return Ok(None);
            }

            self.set_status(ConnectionStatus::Online);
            // Let subscribers react to `Online` before activities are published.
            tokio::task::yield_now().await;

            self.iterate_activities(client.initial_activities).await?;
            Ok(Some(client.executor))
        }
        .await;

        match connected {
            Ok(Some(executor)) => {
                lock(&self.sources).connection.resolve(executor);
            }
            Ok(None) => {}
            Err(error) => self.end_with(Some(error)),
        }
    }

    async fn consume_post(self: Arc<Self>, post: PendingPost) -> Result<(), TurnError> {
        let result = self.execute_post(&post).await;

        if let Err(error) = &result {
            post.reject(error.clone());
            self.end_with(Some(error.clone()));
        }

        result
    }

    async fn execute_post(&self, post: &PendingPost) -> Result<(), TurnError> {
        let connection = lock(&self.sources).connection.promise();
        let executor = connection.await?;

        let TurnExecution {
            activities,
            activity_id,
        } = executor.execute(post.activity.clone());

        let signal = self.abort.signal();
        signal
            .race(async {
                let accepted = async {
                    match activity_id.await {
                        Ok(id) => {
                            debug!(activity_id = %id, "Activity accepted");
                            post.resolve(id);
                            Ok(())
                        }
                        Err(error) => {
                            post.reject(error.clone());
                            Err(error)
                        }
                    }
                };

                futures_util::future::try_join(accepted, self.iterate_activities(activities))
                    .await?;
                Ok(())
            })
            .await
    }

    async fn iterate_activities(&self, mut batches: ActivityBatches) -> Result<(), TurnError> {
        let signal = self.abort.signal();

        loop {
            let next = signal.race(async { Ok(batches.next().await) }).await?;
            let Some(batch) = next else {
                return Ok(());
            };
            let batch = batch?;

            // Iterators should stop on abort themselves; do not trust them to.
            if signal.is_aborted() {
                return Err(signal.reason().unwrap_or(TurnError::Closed));
            }

            let activities = lock(&self.sources).activities.clone();
            for activity in batch {
                activities.next(activity);
            }
        }
    }

    fn set_status(&self, status: ConnectionStatus) {
        {
            let mut current = lock(&self.status);
            if current.is_terminal() || *current == status {
                return;
            }
            *current = status;
        }

        log_status_change(status, None);
        let statuses = lock(&self.sources).statuses.clone();
        statuses.next(status);
    }

    fn end_with(&self, reason: Option<TurnError>) {
        if !self.abort.abort(reason.clone()) {
            return;
        }

        let terminal = match reason {
            Some(_) => ConnectionStatus::FailedToConnect,
            None => ConnectionStatus::Ended,
        };
        let error = reason.clone().unwrap_or(TurnError::Closed);

        *lock(&self.status) = terminal;
        log_status_change(terminal, reason.as_ref());

        // Never kicked off: nothing will call it any more.
        drop(lock(&self.start).take());

        let (activities, statuses) = {
            let mut sources = lock(&self.sources);

            sources.connection.reject(error.clone());
            sources.connection = DeferredPromise::rejected(error);

            let activities =
                std::mem::replace(&mut sources.activities, DeferredObservable::from_iter([]));
            let statuses = std::mem::replace(
                &mut sources.statuses,
                DeferredObservable::from_iter([terminal]),
            );
            sources.shared_activities = sources.activities.observable().share();
            sources.shared_statuses = sources.statuses.observable().share();

            (activities, statuses)
        };

        activities.complete();
        statuses.next(terminal);
        statuses.complete();
    }
}

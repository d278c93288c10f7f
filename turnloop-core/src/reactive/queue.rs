//! Ordered queue processed by a single async consumer

use super::critical_section::CriticalSection;
use crate::error::TurnError;
use futures_util::future::BoxFuture;
use std::sync::Arc;

type Consumer<T> = dyn Fn(T) -> BoxFuture<'static, Result<(), TurnError>> + Send + Sync;
type ErrorCallback<T> = dyn Fn(&T, &TurnError) + Send + Sync;

/// Items are consumed one at a time in push order.
///
/// A failing item is reported to the error callback and does not stop the queue.
pub struct QueueWithConsumer<T> {
    consumer: Arc<Consumer<T>>,
    on_error: Option<Arc<ErrorCallback<T>>>,
    section: CriticalSection,
}

impl<T> QueueWithConsumer<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new<F>(consumer: F) -> Self
    where
        F: Fn(T) -> BoxFuture<'static, Result<(), TurnError>> + Send + Sync + 'static,
    {
        Self {
            consumer: Arc::new(consumer),
            on_error: None,
            section: CriticalSection::new(),
        }
    }

    /// Call `on_error` with the item and error whenever consuming an item fails
    pub fn with_error_callback<E>(mut self, on_error: E) -> Self
    where
        E: Fn(&T, &TurnError) + Send + Sync + 'static,
    {
        self.on_error = Some(Arc::new(on_error));
        self
    }

    /// Enqueue `item`; returns immediately
    pub fn push(&self, item: T) {
        let consumer = Arc::clone(&self.consumer);
        let on_error = self.on_error.clone();

        // The job is queued on enter; its outcome is handled inside the job.
        drop(self.section.enter(move || async move {
            if let Err(error) = consumer(item.clone()).await {
                if let Some(on_error) = on_error {
                    on_error(&item, &error);
                }
            }
            Ok(())
        }));
    }
}

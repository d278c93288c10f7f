//! Adapters from [`Observable`] to async pull

use super::observable::{observer_fn, Observable, Subscription};
use crate::error::TurnError;
use futures_util::{Stream, StreamExt};
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::mpsc;

enum Notification<T> {
    Next(T),
    Error(TurnError),
    Complete,
}

/// A subscription consumed as a [`Stream`]; ends after an error or completion.
///
/// Dropping the stream unsubscribes.
pub struct ObservableStream<T> {
    receiver: mpsc::UnboundedReceiver<Notification<T>>,
    subscription: Subscription,
    done: bool,
}

impl<T> Stream for ObservableStream<T> {
    type Item = Result<T, TurnError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.done {
            return Poll::Ready(None);
        }

        match this.receiver.poll_recv(cx) {
            Poll::Ready(Some(Notification::Next(value))) => Poll::Ready(Some(Ok(value))),
            Poll::Ready(Some(Notification::Error(error))) => {
                this.done = true;
                Poll::Ready(Some(Err(error)))
            }
            Poll::Ready(Some(Notification::Complete)) | Poll::Ready(None) => {
                this.done = true;
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> Drop for ObservableStream<T> {
    fn drop(&mut self) {
        self.subscription.unsubscribe();
    }
}

impl<T: Send + 'static> Observable<T> {
    /// Subscribe and buffer notifications for pulling
    pub fn into_stream(&self) -> ObservableStream<T> {
        let (sender, receiver) = mpsc::unbounded_channel();
        let on_error = sender.clone();
        let on_complete = sender.clone();

        let subscription = self.subscribe(observer_fn(
            move |value| {
                let _ = sender.send(Notification::Next(value));
            },
            move |error| {
                let _ = on_error.send(Notification::Error(error));
            },
            move || {
                let _ = on_complete.send(Notification::Complete);
            },
        ));

        ObservableStream {
            receiver,
            subscription,
            done: false,
        }
    }

    /// Await the first value, then unsubscribe
    pub async fn first_value(&self) -> Result<T, TurnError> {
        let mut stream = self.into_stream();
        match stream.next().await {
            Some(result) => result,
            None => Err(TurnError::other("completed without a value")),
        }
    }
}

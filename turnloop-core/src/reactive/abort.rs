//! One-shot cancellation token
//!
//! `AbortPromise` owns the trigger, `AbortSignal` is the cheap observing half handed to
//! every network call and iteration step of a connection.

use crate::error::TurnError;
use std::future::Future;
use tokio::sync::watch;

#[derive(Debug, Clone, PartialEq)]
enum AbortState {
    Pending,
    Aborted(Option<TurnError>),
}

/// Abort trigger paired with a signal that fires exactly once
#[derive(Debug)]
pub struct AbortPromise {
    sender: watch::Sender<AbortState>,
}

impl AbortPromise {
    pub fn new() -> Self {
        let (sender, _) = watch::channel(AbortState::Pending);
        Self { sender }
    }

    /// Observing half of this token
    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            receiver: self.sender.subscribe(),
        }
    }

    /// Abort with an optional reason. Only the first call has effect; returns whether
    /// this call was the one that aborted.
    pub fn abort(&self, reason: Option<TurnError>) -> bool {
        self.sender.send_if_modified(move |state| match state {
            AbortState::Pending => {
                *state = AbortState::Aborted(reason);
                true
            }
            AbortState::Aborted(_) => false,
        })
    }

    pub fn is_aborted(&self) -> bool {
        matches!(*self.sender.borrow(), AbortState::Aborted(_))
    }
}

impl Default for AbortPromise {
    fn default() -> Self {
        Self::new()
    }
}

/// Observer of an [`AbortPromise`]
#[derive(Debug, Clone)]
pub struct AbortSignal {
    receiver: watch::Receiver<AbortState>,
}

impl AbortSignal {
    /// A signal that is never aborted
    pub fn never() -> Self {
        AbortPromise::new().signal()
    }

    pub fn is_aborted(&self) -> bool {
        matches!(*self.receiver.borrow(), AbortState::Aborted(_))
    }

    /// Reason passed to `abort`, if aborted with one
    pub fn reason(&self) -> Option<TurnError> {
        match &*self.receiver.borrow() {
            AbortState::Aborted(reason) => reason.clone(),
            AbortState::Pending => None,
        }
    }

    /// Resolves with the abort reason once aborted; stays pending forever otherwise.
    pub async fn aborted(&self) -> Option<TurnError> {
        let mut receiver = self.receiver.clone();
        let outcome = receiver
            .wait_for(|state| matches!(state, AbortState::Aborted(_)))
            .await
            .map(|state| match &*state {
                AbortState::Aborted(reason) => reason.clone(),
                AbortState::Pending => None,
            });

        match outcome {
            Ok(reason) => reason,
            // Trigger dropped without aborting: can never fire.
            Err(_) => std::future::pending().await,
        }
    }

    /// Run `future` until it completes or this signal fires, whichever comes first.
    ///
    /// On abort the future is dropped and the abort reason (or `Closed`) is returned.
    pub async fn race<T, F>(&self, future: F) -> Result<T, TurnError>
    where
        F: Future<Output = Result<T, TurnError>>,
    {
        tokio::select! {
            biased;
            reason = self.aborted() => Err(reason.unwrap_or(TurnError::Closed)),
            result = future => result,
        }
    }
}

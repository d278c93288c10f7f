//! Recording observer for tests

use super::observable::{lock, Observer};
use crate::error::TurnError;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// One notification received by a [`MockObserver`]
#[derive(Debug, Clone, PartialEq)]
pub enum Observation<T> {
    Next(T),
    Error(TurnError),
    Complete,
}

/// Observer that records every notification in order.
///
/// Clones share the same record, so keep one clone and subscribe the other.
#[derive(Debug)]
pub struct MockObserver<T> {
    observations: Arc<Mutex<Vec<Observation<T>>>>,
}

impl<T> Clone for MockObserver<T> {
    fn clone(&self) -> Self {
        Self {
            observations: Arc::clone(&self.observations),
        }
    }
}

impl<T: Clone> MockObserver<T> {
    pub fn new() -> Self {
        Self {
            observations: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn observations(&self) -> Vec<Observation<T>> {
        lock(&self.observations).clone()
    }

    /// Values passed to `next`, in order
    pub fn values(&self) -> Vec<T> {
        lock(&self.observations)
            .iter()
            .filter_map(|observation| match observation {
                Observation::Next(value) => Some(value.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn error(&self) -> Option<TurnError> {
        lock(&self.observations)
            .iter()
            .find_map(|observation| match observation {
                Observation::Error(error) => Some(error.clone()),
                _ => None,
            })
    }

    pub fn is_completed(&self) -> bool {
        lock(&self.observations)
            .iter()
            .any(|observation| matches!(observation, Observation::Complete))
    }

    /// Whether `error` or `complete` has been received
    pub fn is_closed(&self) -> bool {
        lock(&self.observations)
            .iter()
            .any(|observation| !matches!(observation, Observation::Next(_)))
    }

    /// Poll until `predicate` holds over the recorded observations.
    ///
    /// Returns `false` if it still does not hold after `timeout`.
    pub async fn wait_until<F>(&self, timeout: Duration, predicate: F) -> bool
    where
        F: Fn(&[Observation<T>]) -> bool,
    {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            if predicate(&lock(&self.observations)) {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

impl<T: Clone> Default for MockObserver<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Send> Observer<T> for MockObserver<T> {
    fn next(&self, value: T) {
        lock(&self.observations).push(Observation::Next(value));
    }

    fn error(&self, error: TurnError) {
        lock(&self.observations).push(Observation::Error(error));
    }

    fn complete(&self) {
        lock(&self.observations).push(Observation::Complete);
    }
}

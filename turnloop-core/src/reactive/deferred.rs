//! Single-resolution future, settled from outside its own construction scope

use crate::error::TurnError;
use std::future::Future;
use tokio::sync::watch;

type Settlement<T> = Option<Result<T, TurnError>>;

/// A promise-like value resolvable or rejectable exactly once.
///
/// Any number of awaiters may hold [`DeferredPromise::promise`]; all observe the same
/// outcome. Later calls to `resolve`/`reject` are no-ops.
#[derive(Debug)]
pub struct DeferredPromise<T> {
    sender: watch::Sender<Settlement<T>>,
}

impl<T> DeferredPromise<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        let (sender, _) = watch::channel(None);
        Self { sender }
    }

    /// A promise that is already rejected, used to represent a permanently closed resource
    pub fn rejected(error: TurnError) -> Self {
        let (sender, _) = watch::channel(Some(Err(error)));
        Self { sender }
    }

    /// Resolve with `value`. Returns `false` if already settled.
    pub fn resolve(&self, value: T) -> bool {
        self.settle(Ok(value))
    }

    /// Reject with `error`. Returns `false` if already settled.
    pub fn reject(&self, error: TurnError) -> bool {
        self.settle(Err(error))
    }

    pub fn is_settled(&self) -> bool {
        self.sender.borrow().is_some()
    }

    /// A future for the outcome that does not borrow this deferred.
    ///
    /// If the deferred is dropped unsettled, the future rejects with `Closed`.
    pub fn promise(&self) -> impl Future<Output = Result<T, TurnError>> + Send + 'static {
        let mut receiver = self.sender.subscribe();
        async move {
            let settled = receiver
                .wait_for(Option::is_some)
                .await
                .map(|settlement| (*settlement).clone());

            match settled {
                Ok(Some(outcome)) => outcome,
                Ok(None) | Err(_) => Err(TurnError::Closed),
            }
        }
    }

    fn settle(&self, outcome: Result<T, TurnError>) -> bool {
        self.sender.send_if_modified(move |settlement| {
            if settlement.is_some() {
                return false;
            }
            *settlement = Some(outcome);
            true
        })
    }
}

impl<T> Default for DeferredPromise<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

//! `IntoFuture` for promises, backed by a tokio oneshot channel.

use std::future::{Future, IntoFuture};
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use parking_lot::Mutex;
use tokio::sync::oneshot;

use crate::promise::{CancelablePromise, Promise, Settlement};

/// Future resolving to the [`Settlement`] of a promise.
///
/// Yields `Settlement::Cancelled` if the promise is cancelled or its
/// continuations are dropped without running.
#[derive(Debug)]
pub struct PromiseFuture<T> {
    receiver: oneshot::Receiver<Settlement<T>>,
}

impl<T> Future for PromiseFuture<T> {
    type Output = Settlement<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.get_mut().receiver).poll(cx) {
            Poll::Ready(Ok(settlement)) => Poll::Ready(settlement),
            Poll::Ready(Err(_)) => Poll::Ready(Settlement::Cancelled),
            Poll::Pending => Poll::Pending,
        }
    }
}

type SharedSender<T> = Arc<Mutex<Option<oneshot::Sender<Settlement<T>>>>>;

fn send<T>(sender: &SharedSender<T>, settlement: Settlement<T>) {
    if let Some(tx) = sender.lock().take() {
        // The receiver may have been dropped by an abandoned task.
        let _ = tx.send(settlement);
    }
}

impl<T> IntoFuture for Promise<T>
where
    T: Clone + Send + 'static,
{
    type Output = Settlement<T>;
    type IntoFuture = PromiseFuture<T>;

    fn into_future(self) -> Self::IntoFuture {
        let (tx, receiver) = oneshot::channel();
        let on_resolved: SharedSender<T> = Arc::new(Mutex::new(Some(tx)));
        let on_rejected = Arc::clone(&on_resolved);

        self.then_or_else(
            move |value| send(&on_resolved, Settlement::Resolved(value)),
            move |reason| send(&on_rejected, Settlement::Rejected(reason)),
        );
        PromiseFuture { receiver }
    }
}

impl<T> IntoFuture for CancelablePromise<T>
where
    T: Clone + Send + 'static,
{
    type Output = Settlement<T>;
    type IntoFuture = PromiseFuture<T>;

    fn into_future(self) -> Self::IntoFuture {
        self.promise().into_future()
    }
}

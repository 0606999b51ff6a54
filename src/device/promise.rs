//! One-shot promise returned by device-facing calls

use tokio::sync::oneshot;

use super::DeviceStatus;

/// Producer half of a [`Promise`]
///
/// Resolving consumes the resolver, so a promise settles at most once.
#[derive(Debug)]
pub struct Resolver<T> {
    tx: oneshot::Sender<Result<T, DeviceStatus>>,
}

impl<T> Resolver<T> {
    /// Settle the promise with a value
    ///
    /// Returns false if nobody is waiting anymore.
    pub fn resolve(self, value: T) -> bool {
        self.tx.send(Ok(value)).is_ok()
    }

    /// Settle the promise with a failure
    ///
    /// Returns false if nobody is waiting anymore.
    pub fn reject(self, status: DeviceStatus) -> bool {
        self.tx.send(Err(status)).is_ok()
    }
}

/// Consumer half: resolved exactly once by the device, awaited by one waiter
#[derive(Debug)]
pub struct Promise<T> {
    rx: oneshot::Receiver<Result<T, DeviceStatus>>,
}

impl<T> Promise<T> {
    /// Create an unresolved promise and its resolver
    #[must_use]
    pub fn pending() -> (Resolver<T>, Self) {
        let (tx, rx) = oneshot::channel();
        (Resolver { tx }, Self { rx })
    }

    /// Create a promise that is already resolved
    #[must_use]
    pub fn resolved(value: T) -> Self {
        let (resolver, promise) = Self::pending();
        resolver.resolve(value);
        promise
    }

    /// Suspend until the device settles the promise
    ///
    /// # Errors
    ///
    /// Returns the device status if the promise was rejected, or
    /// [`DeviceStatus::Dropped`] if the resolver went away unresolved.
    pub async fn wait(self) -> Result<T, DeviceStatus> {
        self.rx.await.unwrap_or(Err(DeviceStatus::Dropped))
    }
}

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

/// Action scheduled to run once after a delay.
///
/// The owner holds the handle; dropping it before the delay elapses cancels
/// the action.
pub struct DelayedTask<T> {
    handle: JoinHandle<T>,
}

impl<T: Send + 'static> DelayedTask<T> {
    pub fn schedule<F>(delay: Duration, action: F) -> Self
    where
        F: Future<Output = T> + Send + 'static,
    {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            action.await
        });
        Self { handle }
    }

    /// Waits for the action. `None` if it was cancelled or panicked.
    pub async fn wait(mut self) -> Option<T> {
        (&mut self.handle).await.ok()
    }

    pub fn cancel(self) {
        drop(self);
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl<T> Drop for DelayedTask<T> {
    fn drop(&mut self) {
        if !self.handle.is_finished() {
            self.handle.abort();
            debug!("Delayed task cancelled");
        }
    }
}

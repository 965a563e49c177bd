//! Resource services: the lifecycle engines behind each RPC.
//!
//! Services load metadata, validate preconditions, drive the provider,
//! update property bags and persist metadata. Any resource acquired before
//! a later step fails is released through a [`Rollback`] armed at the point
//! of acquisition.

use std::future::Future;
use std::pin::Pin;
use tracing::warn;

pub mod bucket;
pub mod host;
pub mod network;
pub mod share;
pub mod volume;

pub use bucket::BucketService;
pub use host::{HostCreateRequest, HostService};
pub use network::{GatewaySizing, NetworkCreateRequest, NetworkService};
pub use share::ShareService;
pub use volume::VolumeService;

type CompensationFuture = Pin<Box<dyn Future<Output = crate::error::Result<()>> + Send>>;
type Compensation = Box<dyn FnOnce() -> CompensationFuture + Send>;

/// Deferred compensation for partially created resources.
///
/// Push a cleanup action right after each acquisition; on the success path
/// call [`Rollback::disarm`], on failure [`Rollback::fire`]. Compensation is
/// fire-and-log: a failing cleanup is logged at warn level and never
/// replaces the primary error.
#[derive(Default)]
pub struct Rollback {
    steps: Vec<(String, Compensation)>,
    disarmed: bool,
}

impl Rollback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push<F, Fut>(&mut self, label: impl Into<String>, compensation: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = crate::error::Result<()>> + Send + 'static,
    {
        let step = move || -> CompensationFuture { Box::pin(compensation()) };
        self.steps.push((label.into(), Box::new(step)));
    }

    /// Suppress compensation; call on the success path.
    pub fn disarm(&mut self) {
        self.disarmed = true;
        self.steps.clear();
    }

    /// Run the compensation steps, most recent first.
    pub async fn fire(&mut self) {
        if self.disarmed {
            return;
        }
        while let Some((label, step)) = self.steps.pop() {
            if let Err(e) = step().await {
                warn!("compensation '{label}' failed: {e}");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn fires_in_reverse_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut rollback = Rollback::new();
        for step in ["first", "second"] {
            let order = order.clone();
            rollback.push(step, move || async move {
                order.lock().unwrap().push(step);
                Ok(())
            });
        }
        rollback.fire().await;
        assert_eq!(*order.lock().unwrap(), vec!["second", "first"]);
    }

    #[tokio::test]
    async fn disarmed_rollback_is_inert() {
        let fired = Arc::new(AtomicUsize::new(0));
        let mut rollback = Rollback::new();
        let counter = fired.clone();
        rollback.push("delete host", move || async move {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        });
        rollback.disarm();
        rollback.fire().await;
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }
}

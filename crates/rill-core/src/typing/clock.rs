//! Injectable clock for the typing scheduler.
//!
//! Delays are routed through a `Clock` trait so the release cadence is
//! driven by the tokio timer in production and by a hand-cranked clock in
//! tests, keeping cancellation and timing deterministic.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

/// Source of delayed wake-ups for the typing scheduler.
pub trait Clock: Send + Sync + 'static {
    /// Completes after roughly `duration` has elapsed.
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>>;
}

/// Production clock backed by the tokio timer.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioClock;

impl Clock for TokioClock {
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send>> {
        Box::pin(tokio::time::sleep(duration))
    }
}
